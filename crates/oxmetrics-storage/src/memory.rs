use crate::error::{Result, StorageError};
use crate::{validate, MetricStorage};
use oxmetrics_common::types::Metric;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type MetricMap = HashMap<String, Metric>;

/// Map-backed metric store with optional file snapshots.
///
/// A single reader/writer lock covers the whole map. `None` inside the lock
/// means the store has been closed.
pub struct MemStorage {
    metrics: RwLock<Option<MetricMap>>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    /// Creates a store with no snapshot file (the agent's local buffer).
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(Some(HashMap::new())),
            snapshot_path: None,
        }
    }

    /// Creates a store that snapshots to `path`.
    pub fn with_snapshot(path: impl AsRef<Path>) -> Self {
        Self {
            metrics: RwLock::new(Some(HashMap::new())),
            snapshot_path: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Lock for reading, recovering from a poisoned lock if necessary.
    fn read_map(&self) -> RwLockReadGuard<'_, Option<MetricMap>> {
        self.metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, Option<MetricMap>> {
        self.metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subtracts an acknowledged amount from a counter's stored delta.
    ///
    /// Used by the agent after the server has acknowledged a send. Increments
    /// merged after the report snapshot was taken stay in the buffer for the
    /// next report.
    pub fn reset_delta(&self, id: &str, sent: i64) -> Result<()> {
        let mut guard = self.write_map();
        let map = guard.as_mut().ok_or(StorageError::NotInitialized)?;
        let metric = map.get_mut(id).ok_or_else(|| StorageError::NotFound {
            id: id.to_string(),
        })?;
        metric.delta = Some(metric.delta.unwrap_or(0).saturating_sub(sent));
        Ok(())
    }

    /// Writes every record to the snapshot file, one JSON object per line.
    ///
    /// The file is truncated first; this is a full snapshot, not a log.
    pub fn upload_storage(&self) -> Result<usize> {
        let path = self
            .snapshot_path
            .as_ref()
            .ok_or(StorageError::SnapshotPathMissing)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Held for the whole write so the file reflects one point in time.
        let guard = self.read_map();
        let map = guard.as_ref().ok_or(StorageError::NotInitialized)?;

        let mut writer = BufWriter::new(File::create(path)?);
        for metric in map.values() {
            serde_json::to_writer(&mut writer, metric)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        tracing::debug!(path = %path.display(), count = map.len(), "Uploaded storage snapshot");
        Ok(map.len())
    }

    /// Loads the snapshot file, merging each line as a regular update.
    ///
    /// Counters that were not reset before the snapshot was taken will keep
    /// accumulating on top of the restored totals.
    pub fn download_storage(&self) -> Result<usize> {
        let path = self
            .snapshot_path
            .as_ref()
            .ok_or(StorageError::SnapshotPathMissing)?;
        let reader = BufReader::new(File::open(path)?);

        let mut guard = self.write_map();
        let map = guard.as_mut().ok_or(StorageError::NotInitialized)?;

        let mut loaded = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let metric: Metric = serde_json::from_str(&line)?;
            validate(&metric)?;
            merge_into(map, &metric);
            loaded += 1;
        }

        tracing::debug!(path = %path.display(), count = loaded, "Downloaded storage snapshot");
        Ok(loaded)
    }
}

/// Applies one validated update to the map.
fn merge_into(map: &mut MetricMap, update: &Metric) {
    match map.get_mut(&update.id) {
        Some(stored) => {
            stored.kind = update.kind;
            if let Some(delta) = update.delta {
                stored.delta = Some(stored.delta.map_or(delta, |d| d.saturating_add(delta)));
            }
            if let Some(value) = update.value {
                stored.value = Some(value);
            }
        }
        None => {
            map.insert(update.id.clone(), update.clone());
        }
    }
}

impl MetricStorage for MemStorage {
    fn get_metric(&self, id: &str) -> Result<Metric> {
        let guard = self.read_map();
        let map = guard.as_ref().ok_or(StorageError::NotInitialized)?;
        map.get(id).cloned().ok_or_else(|| StorageError::NotFound {
            id: id.to_string(),
        })
    }

    fn get_all(&self) -> Result<Vec<Metric>> {
        let guard = self.read_map();
        let map = guard.as_ref().ok_or(StorageError::NotInitialized)?;
        Ok(map.values().cloned().collect())
    }

    fn update_metric(&self, metric: &Metric) -> Result<()> {
        validate(metric)?;
        let mut guard = self.write_map();
        let map = guard.as_mut().ok_or(StorageError::NotInitialized)?;
        merge_into(map, metric);
        Ok(())
    }

    fn update_batch(&self, batch: &[Metric]) -> Result<()> {
        // Validate everything up front so a bad element leaves the map untouched.
        batch.iter().try_for_each(validate)?;
        let mut guard = self.write_map();
        let map = guard.as_mut().ok_or(StorageError::NotInitialized)?;
        for metric in batch {
            merge_into(map, metric);
        }
        Ok(())
    }

    fn health_check(&self) -> Result<()> {
        match self.read_map().as_ref() {
            Some(_) => Ok(()),
            None => Err(StorageError::NotInitialized),
        }
    }

    fn close(&self) -> Result<()> {
        self.write_map().take();
        Ok(())
    }
}
