//! Stub delivery backends built from the `backends` config section
//!
//! The CLI has no real provider integrations; each configured backend either
//! accepts or rejects every attempt after an optional delay, which is enough
//! to exercise routing, fallback and retry end to end.

use async_trait::async_trait;
use mailroute_config_file::{BackendConfig, BackendMode, RouterConfig};
use mailroute_core::{DeliveryBackend, DeliveryRequest, Error, Result};
use mailroute_routing::BackendRegistry;
use std::sync::Arc;
use std::time::Duration;

pub struct StubBackend {
    name: String,
    mode: BackendMode,
    latency: Duration,
}

impl StubBackend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            name: config.name.clone(),
            mode: config.mode,
            latency: Duration::from_millis(config.latency_ms),
        }
    }
}

#[async_trait]
impl DeliveryBackend for StubBackend {
    async fn attempt(&self, request: &DeliveryRequest) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.mode {
            BackendMode::Succeed => {
                tracing::info!(
                    backend = %self.name,
                    from = %request.from,
                    to = %request.to,
                    "Message accepted"
                );
                Ok(())
            }
            BackendMode::Fail => Err(Error::Delivery(format!(
                "{} is configured to fail",
                self.name
            ))),
        }
    }
}

/// Register every enabled backend in config order
pub fn build_registry(config: &RouterConfig) -> Result<BackendRegistry> {
    let mut builder = BackendRegistry::builder();
    for backend in config.enabled_backends() {
        builder = builder.register(
            backend.name.clone(),
            Arc::new(StubBackend::from_config(backend)),
        )?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, mode: BackendMode, enabled: bool) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            enabled,
            mode,
            latency_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_stub_modes() {
        let request = DeliveryRequest::new(1, "a@example.com", "b@example.com", "hi");

        let ok = StubBackend::from_config(&backend("ok", BackendMode::Succeed, true));
        assert!(ok.attempt(&request).await.is_ok());

        let bad = StubBackend::from_config(&backend("bad", BackendMode::Fail, true));
        assert!(matches!(bad.attempt(&request).await, Err(Error::Delivery(_))));
    }

    #[test]
    fn test_registry_skips_disabled() {
        let config = RouterConfig {
            backends: vec![
                backend("sendgrid", BackendMode::Succeed, true),
                backend("legacy", BackendMode::Succeed, false),
                backend("mailgun", BackendMode::Fail, true),
            ],
            ..Default::default()
        };

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["sendgrid", "mailgun"]);
    }
}
