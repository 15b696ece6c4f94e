//! Delivery request submitted by callers

use serde::{Deserialize, Serialize};

/// A single message to hand to a delivery backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Deterministic routing input, usually the originating user's id
    pub selection_key: i64,
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Message body
    pub content: String,
}

impl DeliveryRequest {
    /// Create a new delivery request
    pub fn new(
        selection_key: i64,
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            selection_key,
            from: from.into(),
            to: to.into(),
            content: content.into(),
        }
    }
}
