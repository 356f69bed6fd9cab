//! Hot reload of the TOML configuration file.
//!
//! Only policy settings (CORS allow-list, limiter ceilings, endpoint lists)
//! take effect on reload. Listener, TLS, metrics and timeout settings are
//! read once at startup, and so is `rate_limit.sweep_interval_secs`: the
//! sweep task keeps the interval it was started with. Limiter state is never
//! reset by a reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Watches a config file and publishes every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end handed to the server.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                updates,
            },
            rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let updates = self.updates;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(config) => {
                            tracing::info!(path = %path.display(), "Config change detected, reloading");
                            if updates.send(config).is_err() {
                                tracing::debug!("Config receiver dropped, ignoring reload");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected config reload, keeping current policy");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}
