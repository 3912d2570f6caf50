//! Metric storage layer shared by the agent and the server.
//!
//! Two backends implement [`MetricStorage`]:
//!
//! - [`memory::MemStorage`]: a `RwLock`-guarded map with full-snapshot
//!   upload/download to a line-delimited JSON file. The agent uses it as its
//!   local buffer, the server as its file-backed store.
//! - [`sqlite::SqliteStorage`]: a single SQLite table with database-side
//!   counter accumulation and transactional batches.
//!
//! Both apply the same merge rule: an incoming `delta` adds to the stored
//! delta, an incoming `value` replaces the stored value, and absent fields
//! leave the stored ones untouched.

pub mod error;
pub mod memory;
pub mod sqlite;


pub use error::{Result, StorageError};
pub use memory::MemStorage;
pub use sqlite::SqliteStorage;

use oxmetrics_common::types::Metric;

/// Capability contract for metric backends.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the storage is accessed concurrently from HTTP handlers, the flush
/// worker and, on the agent, from every polling task.
pub trait MetricStorage: Send + Sync {
    /// Returns the metric stored under `id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if no such metric exists.
    fn get_metric(&self, id: &str) -> Result<Metric>;

    /// Returns a snapshot of every stored metric, in no particular order.
    fn get_all(&self) -> Result<Vec<Metric>>;

    /// Applies one update with merge semantics.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidFormat`] if the metric id is empty.
    fn update_metric(&self, metric: &Metric) -> Result<()>;

    /// Applies every update in `batch`. Either all of them take effect or,
    /// on error, none do.
    fn update_batch(&self, batch: &[Metric]) -> Result<()>;

    /// Verifies the backend is initialized and reachable.
    fn health_check(&self) -> Result<()>;

    /// Releases backend resources. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}

/// Rejects updates that must never reach a backend.
pub(crate) fn validate(metric: &Metric) -> Result<()> {
    if metric.id.is_empty() {
        return Err(StorageError::InvalidFormat);
    }
    Ok(())
}
