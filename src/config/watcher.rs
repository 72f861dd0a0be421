//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ProxyConfig;

/// Watches the configuration file and publishes every distinct, valid
/// version of it.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reloader = Reloader {
            path: self.path.clone(),
            tx: self.update_tx,
            last: Mutex::new(load_config(&self.path).ok()),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reloader.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Loads the file on change and forwards it when it differs from the last
/// published version. Editors often emit several events per save.
struct Reloader {
    path: PathBuf,
    tx: mpsc::UnboundedSender<ProxyConfig>,
    last: Mutex<Option<ProxyConfig>>,
}

impl Reloader {
    fn reload(&self) -> Option<ProxyConfig> {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) => {
                tracing::debug!(error = %e, "Config file not readable yet");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                return None;
            }
        };

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() == Some(&config) {
            return None;
        }

        tracing::info!(path = ?self.path, "Config file changed, publishing update");
        *last = Some(config.clone());
        let _ = self.tx.send(config.clone());
        Some(config)
    }
}
