//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temporary file and renaming it are picked up.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Decides whether a change on disk yields a new configuration.
struct Reloader {
    path: PathBuf,
    /// Last configuration handed to the service.
    current: Mutex<GatewayConfig>,
}

impl Reloader {
    fn concerns(&self, event: &Event) -> bool {
        (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == self.path.file_name())
    }

    /// Load the file; `None` if it is invalid or equal to the active config.
    fn reload(&self) -> Option<GatewayConfig> {
        let new_config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
                return None;
            }
        };

        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current == new_config {
            tracing::debug!(path = ?self.path, "Config file touched without changes");
            return None;
        }
        *current = new_config.clone();
        Some(new_config)
    }
}

/// Watches the configuration file and forwards every configuration that
/// parses, validates and differs from the active one.
pub struct ConfigWatcher {
    reloader: Arc<Reloader>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the already loaded `current`.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(
        path: &Path,
        current: GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let reloader = Arc::new(Reloader {
            path: path.to_path_buf(),
            current: Mutex::new(current),
        });
        (Self { reloader, update_tx }, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reloader = Arc::clone(&self.reloader);
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if reloader.concerns(&event) => {
                    tracing::info!(path = ?reloader.path, "Config file change detected, reloading");
                    if let Some(config) = reloader.reload() {
                        if tx.send(config).is_err() {
                            tracing::debug!("Config receiver dropped, ignoring update");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.reloader.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.reloader.path, "Config watcher started");
        Ok(watcher)
    }
}
