use crate::config::ServerConfig;
use crate::flush::{FlushMode, FlushTrigger, FlushWorker};
use anyhow::{bail, Context, Result};
use oxmetrics_storage::{MemStorage, MetricStorage, SqliteStorage};
use std::sync::Arc;
use std::time::Duration;

const FLUSH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The storage backend selected at startup, plus the flush worker that
/// keeps a file-backed store's snapshot current.
pub struct Backend {
    storage: Arc<dyn MetricStorage>,
    file_store: Option<Arc<MemStorage>>,
    flush: Option<FlushWorker>,
}

impl Backend {
    /// Opens the backend named by `config`.
    ///
    /// `database_dsn` selects SQLite. Otherwise `store_file` selects the
    /// in-memory store, restored from the file when `restore` is set, with a
    /// flush worker started on the current runtime.
    pub fn open(config: &ServerConfig) -> Result<Self> {
        if let Some(dsn) = config.database_dsn.as_deref().filter(|d| !d.trim().is_empty()) {
            let store = SqliteStorage::open(dsn, config.drop_database)
                .with_context(|| format!("cannot open database {dsn}"))?;
            tracing::info!(backend = "sqlite", "Storage backend selected");
            return Ok(Self {
                storage: Arc::new(store),
                file_store: None,
                flush: None,
            });
        }

        let Some(path) = config.store_file.as_deref().filter(|p| !p.trim().is_empty()) else {
            bail!("no storage configured: set database_dsn or store_file");
        };
        let store = Arc::new(MemStorage::with_snapshot(path));
        if config.restore {
            match store.download_storage() {
                Ok(count) => tracing::info!(path = %path, count, "Restored metrics from snapshot"),
                Err(e) if e.is_missing_snapshot() => {
                    tracing::info!(path = %path, "No snapshot to restore, starting empty")
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("cannot restore snapshot {path}"));
                }
            }
        }
        let worker = FlushWorker::spawn(
            Arc::clone(&store),
            FlushMode::from_secs(config.store_interval_secs),
        );
        tracing::info!(backend = "file", path = %path, "Storage backend selected");
        Ok(Self {
            storage: store.clone(),
            file_store: Some(store),
            flush: Some(worker),
        })
    }

    pub fn storage(&self) -> Arc<dyn MetricStorage> {
        Arc::clone(&self.storage)
    }

    /// Present only for a file-backed store flushing on every write.
    pub fn flush_trigger(&self) -> Option<FlushTrigger> {
        self.flush.as_ref().and_then(FlushWorker::trigger)
    }

    /// Stops the flush worker, writes a final snapshot for a file-backed
    /// store and closes the backend.
    pub async fn shutdown(self) {
        if let Some(worker) = self.flush {
            let handle = worker.shutdown();
            match tokio::time::timeout(FLUSH_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Flush worker panicked"),
                Err(_) => tracing::warn!("Flush worker did not stop in time"),
            }
        }
        if let Some(store) = &self.file_store {
            crate::flush::flush(store).await;
            tracing::info!("Final snapshot written");
        }
        if let Err(e) = self.storage.close() {
            tracing::warn!(error = %e, "Failed to close storage");
        }
    }
}
