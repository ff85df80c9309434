//! Application state management

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::ledger::LedgerApi;

/// Tracks working directories owned by in-flight split and reassembly
/// operations so shutdown can best-effort remove whatever is still on disk.
#[derive(Clone, Default)]
pub struct WorkdirRegistry {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl WorkdirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly created working directory
    pub async fn register(&self, path: &Path) {
        self.inner.lock().await.insert(path.to_path_buf());
    }

    /// Stop tracking a directory (its owner finished with it)
    pub async fn deregister(&self, path: &Path) {
        self.inner.lock().await.remove(path);
    }

    /// Number of directories currently tracked
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Remove every still-tracked directory from disk. Called on shutdown.
    pub async fn cleanup_all(&self) {
        let dirs: Vec<PathBuf> = self.inner.lock().await.drain().collect();
        for dir in dirs {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::info!(dir = %dir.display(), "Removed leftover working directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove working directory"),
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    ledger: Arc<dyn LedgerApi>,
    workdirs: WorkdirRegistry,
}

impl AppState {
    pub fn new(config: Config, ledger: Arc<dyn LedgerApi>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                ledger,
                workdirs: WorkdirRegistry::new(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the shared ledger client
    pub fn ledger(&self) -> Arc<dyn LedgerApi> {
        self.inner.ledger.clone()
    }

    /// Get the working-directory registry
    pub fn workdirs(&self) -> &WorkdirRegistry {
        &self.inner.workdirs
    }

    /// Best-effort cleanup of in-flight working directories before exit
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.workdirs.cleanup_all().await;
    }
}
