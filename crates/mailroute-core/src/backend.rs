//! Delivery backend trait definition

use crate::{Result, request::DeliveryRequest};

/// A pluggable email-provider integration
///
/// Implementations own their wire protocol (SMTP, HTTP API, ...). The router
/// only cares whether a single attempt succeeded; any error is treated as a
/// failure of this backend and triggers fallback.
#[async_trait::async_trait]
pub trait DeliveryBackend: Send + Sync {
    /// Attempt to deliver one message
    async fn attempt(&self, request: &DeliveryRequest) -> Result<()>;
}
