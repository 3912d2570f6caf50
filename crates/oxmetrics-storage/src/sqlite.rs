use crate::error::{Result, StorageError};
use crate::{validate, MetricStorage};
use oxmetrics_common::types::Metric;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    name TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    value REAL,
    delta INTEGER
);
";

const DROP_METRICS: &str = "DROP TABLE IF EXISTS metrics;";

// Absent fields keep the stored column; deltas accumulate in the database.
const UPSERT_METRIC: &str = "
INSERT INTO metrics (name, type, value, delta) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(name) DO UPDATE SET
    type = excluded.type,
    value = COALESCE(excluded.value, metrics.value),
    delta = CASE
        WHEN excluded.delta IS NULL THEN metrics.delta
        ELSE COALESCE(metrics.delta, 0) + excluded.delta
    END
";

const SELECT_METRIC: &str = "SELECT name, type, value, delta FROM metrics WHERE name = ?1";

const SELECT_ALL: &str = "SELECT name, type, value, delta FROM metrics";

type MetricRow = (String, String, Option<f64>, Option<i64>);

/// Metric store backed by a single SQLite table.
pub struct SqliteStorage {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStorage {
    /// Opens the database named by `dsn` and creates the table if needed.
    ///
    /// `dsn` is a file path, `sqlite://<path>`, or `:memory:`. With
    /// `drop_existing` the table is dropped first, discarding all metrics.
    pub fn open(dsn: &str, drop_existing: bool) -> Result<Self> {
        let target = dsn.strip_prefix("sqlite://").unwrap_or(dsn);
        let conn = if target == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(target).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(target)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };

        if drop_existing {
            conn.execute_batch(DROP_METRICS)?;
            tracing::warn!(dsn = %dsn, "Dropped existing metrics table");
        }
        conn.execute_batch(METRICS_SCHEMA)?;
        tracing::info!(dsn = %dsn, "Initialized SQLite metric storage");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut guard = self.lock_conn();
        let conn = guard.as_mut().ok_or(StorageError::NotInitialized)?;
        f(conn)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_metric((id, kind, value, delta): MetricRow) -> Result<Metric> {
    let kind = kind
        .parse()
        .map_err(|_| StorageError::UnexpectedColumnType {
            column: "type",
            expected: "'gauge' or 'counter'",
        })?;
    Ok(Metric {
        id,
        kind,
        delta,
        value,
    })
}

impl MetricStorage for SqliteStorage {
    fn get_metric(&self, id: &str) -> Result<Metric> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(SELECT_METRIC)?;
            Ok(stmt.query_row([id], read_row).optional()?)
        })?;
        match row {
            Some(row) => to_metric(row),
            None => Err(StorageError::NotFound { id: id.to_string() }),
        }
    }

    fn get_all(&self) -> Result<Vec<Metric>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(SELECT_ALL)?;
            let rows = stmt.query_map([], read_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;
        rows.into_iter().map(to_metric).collect()
    }

    fn update_metric(&self, metric: &Metric) -> Result<()> {
        validate(metric)?;
        self.with_conn(|conn| {
            conn.prepare_cached(UPSERT_METRIC)?.execute(rusqlite::params![
                &metric.id,
                metric.kind.as_str(),
                metric.value,
                metric.delta,
            ])?;
            Ok(())
        })
    }

    fn update_batch(&self, batch: &[Metric]) -> Result<()> {
        self.with_conn(|conn| {
            // Any early return drops `tx` uncommitted, which rolls it back.
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_METRIC)?;
                for metric in batch {
                    validate(metric)?;
                    stmt.execute(rusqlite::params![
                        &metric.id,
                        metric.kind.as_str(),
                        metric.value,
                        metric.delta,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        let Some(conn) = self.lock_conn().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxmetrics_common::types::MetricKind;
    use tempfile::TempDir;

    fn memory_store() -> SqliteStorage {
        SqliteStorage::open(":memory:", false).unwrap()
    }

    #[test]
    fn upsert_accumulates_counter_in_database() {
        let store = memory_store();
        store.update_metric(&Metric::counter("hits", 5)).unwrap();
        store.update_metric(&Metric::counter("hits", 3)).unwrap();
        assert_eq!(store.get_metric("hits").unwrap().delta, Some(8));
    }

    #[test]
    fn upsert_overwrites_gauge() {
        let store = memory_store();
        store.update_metric(&Metric::gauge("temp", 21.5)).unwrap();
        store.update_metric(&Metric::gauge("temp", 19.75)).unwrap();
        let metric = store.get_metric("temp").unwrap();
        assert_eq!(metric.kind, MetricKind::Gauge);
        assert_eq!(metric.value, Some(19.75));
        assert_eq!(metric.delta, None);
    }

    #[test]
    fn batch_with_invalid_element_rolls_back() {
        let store = memory_store();
        store.update_metric(&Metric::counter("hits", 1)).unwrap();

        let batch = vec![
            Metric::counter("hits", 10),
            Metric::gauge("temp", 3.0),
            Metric::counter("", 1),
        ];
        assert!(matches!(
            store.update_batch(&batch).unwrap_err(),
            StorageError::InvalidFormat
        ));

        assert_eq!(store.get_metric("hits").unwrap().delta, Some(1));
        assert!(store.get_metric("temp").unwrap_err().is_not_found());
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn batch_applies_all_elements() {
        let store = memory_store();
        let batch = vec![
            Metric::counter("PollCount", 2),
            Metric::counter("PollCount", 3),
            Metric::gauge("Alloc", 10.0),
        ];
        store.update_batch(&batch).unwrap();
        assert_eq!(store.get_metric("PollCount").unwrap().delta, Some(5));
        assert_eq!(store.get_metric("Alloc").unwrap().value, Some(10.0));
    }

    #[test]
    fn drop_existing_discards_table() {
        let tmp = TempDir::new().unwrap();
        let dsn = tmp.path().join("metrics.db");
        let dsn = dsn.to_string_lossy();

        let store = SqliteStorage::open(&dsn, false).unwrap();
        store.update_metric(&Metric::counter("hits", 1)).unwrap();
        store.close().unwrap();

        let reopened = SqliteStorage::open(&dsn, false).unwrap();
        assert_eq!(reopened.get_metric("hits").unwrap().delta, Some(1));
        reopened.close().unwrap();

        let dropped = SqliteStorage::open(&dsn, true).unwrap();
        assert!(dropped.get_all().unwrap().is_empty());
    }

    #[test]
    fn close_then_health_check_fails() {
        let store = memory_store();
        store.health_check().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.health_check().unwrap_err(),
            StorageError::NotInitialized
        ));
    }
}
