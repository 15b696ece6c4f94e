//! Routing policy model and policy store trait
//!
//! A `RoutingPolicy` binds a flow name to a `WeightedOption`: an ordered list
//! of backend identifiers where repetition encodes relative weight.
//!
//! ```rust
//! use mailroute_core::WeightedOption;
//!
//! // sendgrid receives half of the traffic, mailgun and directSend a quarter each
//! let options = WeightedOption::from(vec!["sendgrid", "sendgrid", "mailgun", "directSend"]);
//! assert_eq!(options.len(), 4);
//! assert_eq!(options.distinct(), vec!["sendgrid", "mailgun", "directSend"]);
//! ```
//!
//! The `PolicyStore` trait abstracts over where policies live, so the
//! dispatcher can run against an in-memory store in tests and a persistent
//! store in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Identifier assigned to a policy by its store
pub type PolicyId = u64;

/// Ordered, possibly repeating list of backend identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightedOption(Vec<String>);

impl WeightedOption {
    /// Create a weighted option list
    pub fn new(options: Vec<String>) -> Self {
        Self(options)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Backend identifiers in first-appearance order, without repeats
    pub fn distinct(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for id in self.iter() {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }

    /// Number of slots held by `backend_id`
    pub fn share_of(&self, backend_id: &str) -> usize {
        self.iter().filter(|id| *id == backend_id).count()
    }
}

impl From<Vec<String>> for WeightedOption {
    fn from(options: Vec<String>) -> Self {
        Self(options)
    }
}

impl From<Vec<&str>> for WeightedOption {
    fn from(options: Vec<&str>) -> Self {
        Self(options.into_iter().map(str::to_string).collect())
    }
}

/// Weighted option list bound to a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: PolicyId,
    /// Flow name (e.g. `MAIL_SERVICE`)
    pub flow: String,
    /// Weighted backend list
    pub options: WeightedOption,
    /// Whether the dispatcher should use this policy
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Storage for routing policies
///
/// Implementations must give read-after-write consistency to the
/// administrator that just toggled a policy. `active_policy` returns an owned
/// snapshot; callers hold it for the duration of one dispatch.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get the active policy for a flow, if any
    async fn active_policy(&self, flow: &str) -> Result<Option<RoutingPolicy>>;

    /// Create a new policy
    ///
    /// # Errors
    /// - `Error::EmptyPolicy` if an active policy has no options
    /// - `Error::PolicyConflict` if the flow already has an active policy
    async fn create_policy(
        &self,
        flow: &str,
        options: WeightedOption,
        is_active: bool,
    ) -> Result<RoutingPolicy>;

    /// Flip the active flag of a policy
    ///
    /// # Errors
    /// - `Error::PolicyNotFound` if no policy has this id
    /// - `Error::PolicyConflict` if activating would leave two active policies
    async fn toggle_policy(&self, id: PolicyId) -> Result<RoutingPolicy>;

    /// List every stored policy
    async fn list_policies(&self) -> Result<Vec<RoutingPolicy>>;

    /// Delete a policy
    ///
    /// # Errors
    /// - `Error::PolicyNotFound` if no policy has this id
    async fn delete_policy(&self, id: PolicyId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_option_share() {
        let options = WeightedOption::from(vec!["a", "a", "b", "c"]);
        assert_eq!(options.share_of("a"), 2);
        assert_eq!(options.share_of("b"), 1);
        assert_eq!(options.share_of("missing"), 0);
    }

    #[test]
    fn test_weighted_option_distinct_keeps_order() {
        let options = WeightedOption::from(vec!["b", "a", "b", "c", "a"]);
        assert_eq!(options.distinct(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_policy_serde() {
        let yaml = r#"
flow: MAIL_SERVICE
options: [sendgrid, sendgrid, mailgun]
"#;
        let policy: RoutingPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.flow, "MAIL_SERVICE");
        assert_eq!(policy.options.len(), 3);
        assert!(policy.is_active);
        assert_eq!(policy.id, 0);

        let back = serde_yaml::to_string(&policy).unwrap();
        assert!(back.contains("- sendgrid"));
        assert!(back.contains("is_active: true"));
    }
}
