//! In-memory routing policy store
//!
//! Reference `PolicyStore` used by tests, the CLI and the file-backed loader.
//! It enforces the store-side invariants:
//! - an active policy has at least one option
//! - at most one policy per flow is active at a time
//!
//! Reads hand out owned clones, so a dispatcher's snapshot is unaffected by
//! toggles that land while it is traversing backends.

use async_trait::async_trait;
use mailroute_core::{Error, PolicyId, PolicyStore, Result, RoutingPolicy, WeightedOption};
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct Inner {
    policies: Vec<RoutingPolicy>,
    next_id: PolicyId,
}

impl Inner {
    fn allocate_id(&mut self) -> PolicyId {
        self.next_id += 1;
        self.next_id
    }

    fn active_for(&self, flow: &str) -> Option<&RoutingPolicy> {
        self.policies.iter().find(|p| p.is_active && p.flow == flow)
    }
}

/// Policy store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    inner: RwLock<Inner>,
}

impl InMemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with policies
    ///
    /// # Errors
    /// Same as [`InMemoryPolicyStore::replace_all`].
    pub fn with_policies(policies: Vec<RoutingPolicy>) -> Result<Self> {
        let inner = build_inner(policies)?;
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Atomically swap every stored policy for `policies`
    ///
    /// Non-zero ids are kept; entries with id 0 get fresh ids above the
    /// largest kept one, in list order. Nothing changes if validation fails.
    ///
    /// # Errors
    /// - `Error::Config` if two entries carry the same non-zero id
    /// - `Error::EmptyPolicy` if an active policy has no options
    /// - `Error::PolicyConflict` if two active policies share a flow
    pub async fn replace_all(&self, policies: Vec<RoutingPolicy>) -> Result<()> {
        let fresh = build_inner(policies)?;
        let mut inner = self.inner.write().await;
        *inner = fresh;

        tracing::info!(policies = inner.policies.len(), "Routing policies replaced");
        Ok(())
    }

    /// Independent copy of the current contents, id counter included
    ///
    /// Lets a caller stage a mutation and [`adopt`](Self::adopt) it only once
    /// a side effect such as a file write has succeeded.
    pub async fn fork(&self) -> Self {
        let inner = self.inner.read().await.clone();
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Take over the contents of a store produced by [`fork`](Self::fork)
    pub async fn adopt(&self, staged: Self) {
        *self.inner.write().await = staged.inner.into_inner();
    }
}

fn build_inner(policies: Vec<RoutingPolicy>) -> Result<Inner> {
    let mut seen = HashSet::new();
    for policy in policies.iter().filter(|p| p.id != 0) {
        if !seen.insert(policy.id) {
            return Err(Error::Config(format!("duplicate policy id {}", policy.id)));
        }
    }

    let mut inner = Inner {
        policies: Vec::with_capacity(policies.len()),
        next_id: seen.into_iter().max().unwrap_or(0),
    };
    for mut policy in policies {
        if policy.id == 0 {
            policy.id = inner.allocate_id();
        }
        check_insert(&inner, &policy.flow, &policy.options, policy.is_active)?;
        inner.policies.push(policy);
    }
    Ok(inner)
}

fn check_insert(inner: &Inner, flow: &str, options: &WeightedOption, is_active: bool) -> Result<()> {
    if !is_active {
        return Ok(());
    }
    if options.is_empty() {
        return Err(Error::EmptyPolicy(flow.to_string()));
    }
    if let Some(active) = inner.active_for(flow) {
        return Err(Error::PolicyConflict {
            flow: flow.to_string(),
            active: active.id,
        });
    }
    Ok(())
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn active_policy(&self, flow: &str) -> Result<Option<RoutingPolicy>> {
        let inner = self.inner.read().await;
        Ok(inner.active_for(flow).cloned())
    }

    async fn create_policy(
        &self,
        flow: &str,
        options: WeightedOption,
        is_active: bool,
    ) -> Result<RoutingPolicy> {
        let mut inner = self.inner.write().await;
        check_insert(&inner, flow, &options, is_active)?;

        let policy = RoutingPolicy {
            id: inner.allocate_id(),
            flow: flow.to_string(),
            options,
            is_active,
        };
        inner.policies.push(policy.clone());

        tracing::info!(
            id = policy.id,
            flow = %policy.flow,
            options = ?policy.options,
            active = policy.is_active,
            "Routing policy created"
        );
        Ok(policy)
    }

    async fn toggle_policy(&self, id: PolicyId) -> Result<RoutingPolicy> {
        let mut inner = self.inner.write().await;

        let pos = inner
            .policies
            .iter()
            .position(|p| p.id == id)
            .ok_or(Error::PolicyNotFound(id))?;

        let current = &inner.policies[pos];
        if !current.is_active {
            check_insert(&inner, &current.flow, &current.options, true)?;
        }

        let policy = &mut inner.policies[pos];
        policy.is_active = !policy.is_active;

        tracing::info!(
            id = policy.id,
            flow = %policy.flow,
            active = policy.is_active,
            "Routing policy toggled"
        );
        Ok(policy.clone())
    }

    async fn list_policies(&self) -> Result<Vec<RoutingPolicy>> {
        Ok(self.inner.read().await.policies.clone())
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let before = inner.policies.len();
        inner.policies.retain(|p| p.id != id);

        if inner.policies.len() == before {
            return Err(Error::PolicyNotFound(id));
        }

        tracing::info!(id, "Routing policy deleted");
        Ok(())
    }
}
