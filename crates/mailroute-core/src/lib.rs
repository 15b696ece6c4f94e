//! MailRoute Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout MailRoute:
//! - Delivery request type
//! - Delivery backend trait abstraction
//! - Routing policy model and policy store trait
//! - Core error types

pub mod backend;
pub mod error;
pub mod flow;
pub mod policy;
pub mod request;

pub use backend::DeliveryBackend;
pub use error::{Error, Result};
pub use policy::{PolicyId, PolicyStore, RoutingPolicy, WeightedOption};
pub use request::DeliveryRequest;
