//! File-based configuration for MailRoute deployments
//!
//! This crate loads the router configuration from a YAML or TOML file and
//! serves its routing policies through the `PolicyStore` trait.
//!
//! # Features
//! - YAML (default) and TOML formats, chosen by file extension
//! - Environment variable overrides
//! - Policy toggles written back to the file
//! - Real-time file watching with `notify`
//!
//! # Example
//! ```no_run
//! # use mailroute_config_file::FilePolicyStore;
//! # use mailroute_core::PolicyStore;
//! # async fn example() -> mailroute_core::Result<()> {
//! let store = FilePolicyStore::new("~/.mailroute/config.yaml").await?;
//! let policy = store.active_policy("MAIL_SERVICE").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod file_store;

pub use config::{
    BackendConfig, BackendMode, DispatchConfig, LoggingConfig, RetryConfig, RouterConfig,
    expand_tilde,
};
pub use file_store::{FilePolicyStore, PolicyChange, PolicyChangeStream};
