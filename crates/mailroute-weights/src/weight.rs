//! Provider weight record

use mailroute_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest ratio a single provider may carry
pub const MAX_RATIO: u32 = 100;

/// A named backend with an integer percentage share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderWeight {
    /// Backend name (matches a registry identifier)
    pub name: String,
    /// Percentage share, 0..=100
    pub ratio: u32,
    /// Inactive entries are kept for history but ignored by validation
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderWeight {
    /// Create an active weight
    pub fn new(name: impl Into<String>, ratio: u32) -> Self {
        Self {
            name: name.into(),
            ratio,
            is_active: true,
        }
    }

    /// Create an inactive weight
    pub fn inactive(name: impl Into<String>, ratio: u32) -> Self {
        Self {
            is_active: false,
            ..Self::new(name, ratio)
        }
    }

    /// Reject ratios outside 0..=100
    pub fn check_range(&self) -> Result<()> {
        if self.ratio > MAX_RATIO {
            return Err(Error::InvalidRatio {
                name: self.name.clone(),
                ratio: self.ratio,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_check() {
        assert!(ProviderWeight::new("a", 0).check_range().is_ok());
        assert!(ProviderWeight::new("a", 100).check_range().is_ok());
        assert!(matches!(
            ProviderWeight::new("a", 101).check_range(),
            Err(Error::InvalidRatio { ratio: 101, .. })
        ));
    }

    #[test]
    fn test_weight_serde_defaults_active() {
        let weight: ProviderWeight = serde_yaml::from_str("name: sendgrid\nratio: 70\n").unwrap();
        assert_eq!(weight, ProviderWeight::new("sendgrid", 70));
    }
}
