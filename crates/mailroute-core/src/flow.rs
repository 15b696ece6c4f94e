//! Well-known flow names
//!
//! A flow is the logical channel a routing policy applies to. Policies are
//! looked up by flow name, so these constants are also what appears in
//! configuration files.

/// Outbound mail sending
pub const MAIL_SERVICE: &str = "MAIL_SERVICE";

/// Inbound mail receiving
pub const RECEIVE_MAIL_SERVICE: &str = "RECEIVE_MAIL_SERVICE";
