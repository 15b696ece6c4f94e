//! Router configuration file model

use mailroute_core::{Error, Result, RoutingPolicy};
use mailroute_routing::{InMemoryPolicyStore, RetryPolicy};
use mailroute_weights::{ProviderWeight, WeightBook};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Backends in registry (fallback) order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<BackendConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<RoutingPolicy>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<ProviderWeight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound for a single backend attempt
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::send_default")]
    pub send: RetryPolicy,

    #[serde(default = "RetryPolicy::receive_default")]
    pub receive: RetryPolicy,
}

/// How a configured stub backend answers delivery attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Succeed,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: BackendMode,

    /// Simulated latency per attempt
    #[serde(default)]
    pub latency_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            send: RetryPolicy::send_default(),
            receive: RetryPolicy::receive_default(),
        }
    }
}

/// Resolve a leading `~` against the home directory
pub fn expand_tilde(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

pub(crate) fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

impl RouterConfig {
    /// Load from a YAML file, or TOML when the extension is `.toml`
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file does not exist
    /// - `Error::Io` if it cannot be read
    /// - `Error::Config` if it does not parse
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path)?;
        if !path.exists() {
            return Err(Error::ConfigNotFound);
        }

        let contents = std::fs::read_to_string(&path)?;
        Self::parse(&contents, is_toml(&path))
    }

    pub(crate) fn parse(contents: &str, toml: bool) -> Result<Self> {
        if toml {
            toml::from_str(contents).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
        } else {
            // Default to YAML
            serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("Invalid YAML: {}", e)))
        }
    }

    pub(crate) fn render(&self, toml: bool) -> Result<String> {
        if toml {
            toml::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("TOML serialization error: {}", e)))
        } else {
            serde_yaml::to_string(self)
                .map_err(|e| Error::Config(format!("YAML serialization error: {}", e)))
        }
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("MAILROUTE_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("MAILROUTE_ATTEMPT_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => self.dispatch.attempt_timeout_ms = ms,
                Err(_) => eprintln!(
                    "Warning: Invalid MAILROUTE_ATTEMPT_TIMEOUT_MS '{}', keeping {}",
                    val, self.dispatch.attempt_timeout_ms
                ),
            }
        }

        // Applies to both flows
        if let Ok(val) = std::env::var("MAILROUTE_MAX_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(attempts) => {
                    self.retry.send.max_attempts = attempts;
                    self.retry.receive.max_attempts = attempts;
                }
                Err(_) => eprintln!("Warning: Invalid MAILROUTE_MAX_ATTEMPTS '{}', ignoring", val),
            }
        }
    }

    /// Check cross-section consistency
    ///
    /// # Errors
    /// - `Error::Config` for duplicate backends, a zero timeout, or retry
    ///   policies without attempts
    /// - `Error::BackendNotFound` if an active policy names a backend that is
    ///   not configured and enabled
    /// - `Error::EmptyPolicy` / `Error::PolicyConflict` as raised by the policy store
    /// - weight errors as raised by [`WeightBook::replace_all`], when weights are present
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.attempt_timeout_ms == 0 {
            return Err(Error::Config(
                "'dispatch.attempt_timeout_ms' must be greater than 0".to_string(),
            ));
        }
        self.retry.send.validate()?;
        self.retry.receive.validate()?;

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(Error::Config(format!(
                    "backend '{}' is configured twice",
                    backend.name
                )));
            }
        }

        let enabled: HashSet<&str> = self.enabled_backends().map(|b| b.name.as_str()).collect();
        for policy in self.policies.iter().filter(|p| p.is_active) {
            if let Some(missing) = policy.options.iter().find(|id| !enabled.contains(id)) {
                return Err(Error::BackendNotFound(missing.to_string()));
            }
        }
        InMemoryPolicyStore::with_policies(self.policies.clone())?;

        if !self.weights.is_empty() {
            self.weight_book()?;
        }

        Ok(())
    }

    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.iter().filter(|b| b.enabled)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.attempt_timeout_ms)
    }

    /// Weight book seeded from the `weights` section
    ///
    /// # Errors
    /// Same as [`WeightBook::from_weights`].
    pub fn weight_book(&self) -> Result<WeightBook> {
        WeightBook::from_weights(self.weights.clone())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
