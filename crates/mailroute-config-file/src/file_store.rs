//! File-based PolicyStore implementation

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use mailroute_core::{Error, PolicyId, PolicyStore, Result, RoutingPolicy, WeightedOption};
use mailroute_routing::InMemoryPolicyStore;

use crate::config::{RouterConfig, expand_tilde, is_toml};

/// Notification that the configuration file changed on disk
#[derive(Debug, Clone)]
pub struct PolicyChange {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Store version at the time of the event
    pub version: u32,
}

pub type PolicyChangeStream = BoxStream<'static, Result<PolicyChange>>;

/// Routing policies kept in the `policies` section of a config file
///
/// Reads are served from memory. Administrative mutations are staged on a
/// copy, written back to the file (other sections untouched) and only then
/// made visible to readers. Policy ids are stored in the file and survive
/// reloads.
#[derive(Debug)]
pub struct FilePolicyStore {
    /// Path to the configuration file
    config_path: PathBuf,
    store: InMemoryPolicyStore,
    /// Incremented on each reload or write
    version: Arc<AtomicU32>,
    /// Serializes read-modify-write cycles on the file
    write_lock: Mutex<()>,
}

impl FilePolicyStore {
    /// Open a configuration file and load its policies
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file doesn't exist
    /// - `Error::Io` / `Error::Config` if it can't be read or parsed
    /// - `Error::EmptyPolicy` / `Error::PolicyConflict` if its policies are inconsistent
    pub async fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        if !config_path.exists() {
            return Err(Error::ConfigNotFound);
        }

        let config = read_config(&config_path)?;
        let store = InMemoryPolicyStore::with_policies(config.policies)?;

        info!("Initialized FilePolicyStore for {:?}", config_path);

        Ok(Self {
            config_path,
            store,
            version: Arc::new(AtomicU32::new(1)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Re-read the file and swap in its policies
    ///
    /// On error the previously loaded policies stay in place.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let config = read_config(&self.config_path)?;
        let count = config.policies.len();
        self.store.replace_all(config.policies).await?;

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(policies = count, version, "Reloaded routing policies from file");
        Ok(count)
    }

    /// Stream of file change notifications
    ///
    /// The watcher runs on a blocking thread until the stream is dropped.
    pub fn watch_changes(&self) -> PolicyChangeStream {
        // Create a channel for file system events
        let (tx, rx) = mpsc::channel(100);

        let config_path = self.config_path.clone();
        let version = self.version.clone();

        tokio::task::spawn_blocking(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Err(e) = notify_tx.send(res) {
                        error!("Failed to send file watch event: {}", e);
                    }
                },
                notify::Config::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                error!("Failed to watch config file: {}", e);
                return;
            }

            info!("Watching config file for changes: {:?}", config_path);

            while let Ok(event_result) = notify_rx.recv() {
                match event_result {
                    Ok(event) => {
                        if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                            let change = PolicyChange {
                                timestamp: chrono::Utc::now(),
                                version: version.load(Ordering::SeqCst),
                            };

                            if tx.blocking_send(Ok(change)).is_err() {
                                debug!("Policy change stream closed, stopping watcher");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("File watch error: {}", e);
                        if tx
                            .blocking_send(Err(Error::Internal(format!("File watch error: {}", e))))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Box::pin(stream)
    }

    /// Reload policies whenever the file changes
    ///
    /// A file that fails to parse mid-edit is logged and skipped; the last
    /// good policies keep serving.
    pub fn spawn_reloader(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut changes = self.watch_changes();
            while let Some(change) = changes.next().await {
                match change {
                    Ok(change) => {
                        debug!(version = change.version, "Config file changed");
                        if let Err(e) = self.reload().await {
                            warn!(error = %e, "Ignoring config file change");
                        }
                    }
                    Err(e) => warn!(error = %e, "Config watch error"),
                }
            }
        })
    }

    /// Write `policies` into the file, keeping its other sections
    fn persist(&self, policies: Vec<RoutingPolicy>) -> Result<()> {
        let mut config = read_config(&self.config_path)?;
        config.policies = policies;
        let contents = config.render(is_toml(&self.config_path))?;

        std::fs::write(&self.config_path, contents).map_err(|e| {
            error!("Failed to write config file: {}", e);
            Error::Io(e)
        })?;

        self.version.fetch_add(1, Ordering::SeqCst);
        debug!("Wrote routing policies to {:?}", self.config_path);
        Ok(())
    }

    /// Make a staged store live once its policies are on disk
    ///
    /// If the write fails the staged change is dropped and routing keeps
    /// using the previous policies.
    async fn commit(&self, staged: InMemoryPolicyStore) -> Result<()> {
        self.persist(staged.list_policies().await?)?;
        self.store.adopt(staged).await;
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<RouterConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        error!("Failed to read config file: {}", e);
        Error::Io(e)
    })?;
    RouterConfig::parse(&contents, is_toml(path))
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn active_policy(&self, flow: &str) -> Result<Option<RoutingPolicy>> {
        self.store.active_policy(flow).await
    }

    async fn create_policy(
        &self,
        flow: &str,
        options: WeightedOption,
        is_active: bool,
    ) -> Result<RoutingPolicy> {
        let _guard = self.write_lock.lock().await;
        let staged = self.store.fork().await;
        let policy = staged.create_policy(flow, options, is_active).await?;
        self.commit(staged).await?;
        Ok(policy)
    }

    async fn toggle_policy(&self, id: PolicyId) -> Result<RoutingPolicy> {
        let _guard = self.write_lock.lock().await;
        let staged = self.store.fork().await;
        let policy = staged.toggle_policy(id).await?;
        self.commit(staged).await?;
        Ok(policy)
    }

    async fn list_policies(&self) -> Result<Vec<RoutingPolicy>> {
        self.store.list_policies().await
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let staged = self.store.fork().await;
        staged.delete_policy(id).await?;
        self.commit(staged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroute_core::flow::{MAIL_SERVICE, RECEIVE_MAIL_SERVICE};
    use tempfile::{NamedTempFile, TempDir};

    const CONFIG: &str = r#"
logging:
  level: warn
backends:
  - name: sendgrid
  - name: mailgun
policies:
  - flow: MAIL_SERVICE
    options: [sendgrid, mailgun]
  - flow: RECEIVE_MAIL_SERVICE
    options: [mailgun]
    is_active: false
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), contents).unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_file_not_found() {
        let result = FilePolicyStore::new("/nonexistent/mailroute.yaml").await;
        assert!(matches!(result.unwrap_err(), Error::ConfigNotFound));
    }

    #[tokio::test]
    async fn test_loads_policies() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        let send = store.active_policy(MAIL_SERVICE).await.unwrap().unwrap();
        assert_eq!(send.id, 1);
        assert_eq!(send.options, WeightedOption::from(vec!["sendgrid", "mailgun"]));
        assert!(store.active_policy(RECEIVE_MAIL_SERVICE).await.unwrap().is_none());
        assert_eq!(store.list_policies().await.unwrap().len(), 2);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_rejects_conflicting_policies() {
        let temp_file = write_config(
            "policies:\n  - flow: MAIL_SERVICE\n    options: [a]\n  - flow: MAIL_SERVICE\n    options: [b]\n",
        );
        let result = FilePolicyStore::new(temp_file.path()).await;
        assert!(matches!(result, Err(Error::PolicyConflict { .. })));
    }

    #[tokio::test]
    async fn test_toggle_is_written_back() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        store.toggle_policy(1).await.unwrap();
        store.toggle_policy(2).await.unwrap();
        assert_eq!(store.version(), 3);

        let on_disk = RouterConfig::from_file(temp_file.path()).unwrap();
        assert!(!on_disk.policies[0].is_active);
        assert!(on_disk.policies[1].is_active);
        // Other sections survive the rewrite
        assert_eq!(on_disk.logging.level, "warn");
        assert_eq!(on_disk.backends.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_file_alone() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        let result = store
            .create_policy(MAIL_SERVICE, WeightedOption::from(vec!["mailgun"]), true)
            .await;
        assert!(matches!(result, Err(Error::PolicyConflict { .. })));

        assert!(matches!(
            store.delete_policy(42).await,
            Err(Error::PolicyNotFound(42))
        ));
        assert_eq!(store.version(), 1);
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_create_and_delete_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mailroute.toml");
        std::fs::write(&path, "[[backends]]\nname = \"sendgrid\"\n").unwrap();

        let store = FilePolicyStore::new(&path).await.unwrap();
        let created = store
            .create_policy(MAIL_SERVICE, WeightedOption::from(vec!["sendgrid"]), true)
            .await
            .unwrap();

        let on_disk = RouterConfig::from_file(&path).unwrap();
        assert_eq!(on_disk.policies.len(), 1);
        assert_eq!(on_disk.policies[0].flow, MAIL_SERVICE);

        store.delete_policy(created.id).await.unwrap();
        let on_disk = RouterConfig::from_file(&path).unwrap();
        assert!(on_disk.policies.is_empty());
        assert_eq!(on_disk.backends[0].name, "sendgrid");
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_edit() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        std::fs::write(
            temp_file.path(),
            "policies:\n  - flow: MAIL_SERVICE\n    options: [mailgun]\n",
        )
        .unwrap();

        assert_eq!(store.reload().await.unwrap(), 1);
        assert_eq!(store.version(), 2);
        let send = store.active_policy(MAIL_SERVICE).await.unwrap().unwrap();
        assert_eq!(send.options, WeightedOption::from(vec!["mailgun"]));
    }

    #[tokio::test]
    async fn test_reload_keeps_last_good_policies() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        std::fs::write(temp_file.path(), "policies: [").unwrap();
        assert!(matches!(store.reload().await, Err(Error::Config(_))));

        assert!(store.active_policy(MAIL_SERVICE).await.unwrap().is_some());
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_ids_survive_delete_and_reload() {
        let temp_file = write_config(
            r#"
policies:
  - flow: MAIL_SERVICE
    options: [sendgrid]
  - flow: DIGEST
    options: [mailgun]
  - flow: RECEIVE_MAIL_SERVICE
    options: [mailgun]
    is_active: false
"#,
        );
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        store.delete_policy(2).await.unwrap();
        store.reload().await.unwrap();

        let ids: Vec<(PolicyId, String)> = store
            .list_policies()
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.flow))
            .collect();
        assert_eq!(
            ids,
            vec![
                (1, MAIL_SERVICE.to_string()),
                (3, RECEIVE_MAIL_SERVICE.to_string()),
            ]
        );

        let toggled = store.toggle_policy(3).await.unwrap();
        assert_eq!(toggled.flow, RECEIVE_MAIL_SERVICE);
        assert!(toggled.is_active);

        // Fresh ids never reuse a persisted one
        let created = store
            .create_policy("DIGEST", WeightedOption::from(vec!["sendgrid"]), false)
            .await
            .unwrap();
        assert_eq!(created.id, 4);
    }

    #[tokio::test]
    async fn test_failed_write_back_leaves_routing_unchanged() {
        let temp_file = write_config(CONFIG);
        let store = FilePolicyStore::new(temp_file.path()).await.unwrap();

        // File is mid-edit and no longer parses
        std::fs::write(temp_file.path(), "policies: [").unwrap();

        assert!(matches!(store.toggle_policy(1).await, Err(Error::Config(_))));
        let send = store.active_policy(MAIL_SERVICE).await.unwrap().unwrap();
        assert_eq!(send.id, 1);

        assert!(store.delete_policy(1).await.is_err());
        assert!(
            store
                .create_policy("DIGEST", WeightedOption::from(vec!["mailgun"]), true)
                .await
                .is_err()
        );

        let policies = store.list_policies().await.unwrap();
        assert_eq!(policies.len(), 2);
        assert!(store.active_policy(RECEIVE_MAIL_SERVICE).await.unwrap().is_none());
        assert_eq!(store.version(), 1);
    }
}
