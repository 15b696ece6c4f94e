//! Backend registry
//!
//! Fixed, ordered mapping from backend identifier to a delivery backend.
//! Registration order is the fallback order, so it is preserved exactly.
//! The registry is built once at startup and shared read-only behind an `Arc`.

use mailroute_core::{DeliveryBackend, Error, Result, WeightedOption};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered collection of named delivery backends
pub struct BackendRegistry {
    /// Backends in registration order
    entries: Vec<(String, Arc<dyn DeliveryBackend>)>,
    /// Identifier to position in `entries`
    index: HashMap<String, usize>,
}

impl BackendRegistry {
    /// Start building a registry
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Look up a backend by identifier
    ///
    /// # Errors
    /// - `Error::BackendNotFound` if nothing is registered under `id`
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn DeliveryBackend>> {
        self.index
            .get(id)
            .map(|&pos| self.entries[pos].1.clone())
            .ok_or_else(|| Error::BackendNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Backend identifiers in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Backends in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn DeliveryBackend>)> {
        self.entries.iter().map(|(id, backend)| (id.as_str(), backend))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every identifier in a weighted option list is registered
    ///
    /// # Errors
    /// - `Error::BackendNotFound` naming the first unknown identifier
    pub fn check_options(&self, options: &WeightedOption) -> Result<()> {
        match options.iter().find(|id| !self.contains(id)) {
            Some(missing) => Err(Error::BackendNotFound(missing.to_string())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`BackendRegistry`]
#[derive(Default)]
pub struct BackendRegistryBuilder {
    entries: Vec<(String, Arc<dyn DeliveryBackend>)>,
}

impl BackendRegistryBuilder {
    /// Register a backend under `id`
    ///
    /// # Errors
    /// - `Error::DuplicateBackend` if `id` is already taken
    pub fn register(
        mut self,
        id: impl Into<String>,
        backend: Arc<dyn DeliveryBackend>,
    ) -> Result<Self> {
        let id = id.into();
        if self.entries.iter().any(|(existing, _)| *existing == id) {
            return Err(Error::DuplicateBackend(id));
        }
        self.entries.push((id, backend));
        Ok(self)
    }

    pub fn build(self) -> BackendRegistry {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (id.clone(), pos))
            .collect();

        tracing::debug!(
            backends = ?self.entries.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            "Backend registry built"
        );

        BackendRegistry {
            entries: self.entries,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailroute_core::DeliveryRequest;

    struct NoopBackend;

    #[async_trait]
    impl DeliveryBackend for NoopBackend {
        async fn attempt(&self, _request: &DeliveryRequest) -> Result<()> {
            Ok(())
        }
    }

    fn registry(ids: &[&str]) -> BackendRegistry {
        let mut builder = BackendRegistry::builder();
        for id in ids {
            builder = builder.register(*id, Arc::new(NoopBackend)).unwrap();
        }
        builder.build()
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = registry(&["mailgun", "sendgrid", "directSend"]);
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec!["mailgun", "sendgrid", "directSend"]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_resolve() {
        let registry = registry(&["sendgrid"]);
        assert!(registry.resolve("sendgrid").is_ok());
        assert!(matches!(
            registry.resolve("mailgun"),
            Err(Error::BackendNotFound(id)) if id == "mailgun"
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = BackendRegistry::builder()
            .register("sendgrid", Arc::new(NoopBackend))
            .unwrap()
            .register("sendgrid", Arc::new(NoopBackend));
        assert!(matches!(result, Err(Error::DuplicateBackend(id)) if id == "sendgrid"));
    }

    #[test]
    fn test_check_options() {
        let registry = registry(&["a", "b"]);
        assert!(registry.check_options(&WeightedOption::from(vec!["a", "b", "a"])).is_ok());

        let err = registry
            .check_options(&WeightedOption::from(vec!["a", "gone", "b"]))
            .unwrap_err();
        assert!(matches!(err, Error::BackendNotFound(id) if id == "gone"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = BackendRegistry::builder().build();
        assert!(registry.is_empty());
        assert_eq!(registry.ids().count(), 0);
    }
}
