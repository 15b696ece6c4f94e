//! MailRoute Routing Engine
//!
//! This crate provides the routing logic for MailRoute:
//! - Deterministic weighted backend selection
//! - Backend registry
//! - In-memory routing policy store
//! - Resilient dispatcher with fallback traversal
//! - Retry driver and mail router facade

pub mod dispatcher;
pub mod mailer;
pub mod policy_store;
pub mod registry;
pub mod retry;
pub mod selector;

// Re-export commonly used types
pub use dispatcher::{DeliveryAttemptResult, DispatchMode, Dispatcher};
pub use mailer::MailRouter;
pub use policy_store::InMemoryPolicyStore;
pub use registry::{BackendRegistry, BackendRegistryBuilder};
pub use retry::{Backoff, RetryDriver, RetryPolicy};
pub use selector::select;
