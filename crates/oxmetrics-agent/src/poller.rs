use oxmetrics_collector::Collector;
use oxmetrics_storage::{MemStorage, MetricStorage};
use std::sync::{Arc, Mutex};

type SharedCollector = Arc<Mutex<Box<dyn Collector>>>;

/// Runs every collector once per poll tick and merges the results into the
/// agent's local buffer.
pub struct Poller {
    collectors: Vec<SharedCollector>,
    storage: Arc<MemStorage>,
}

impl Poller {
    pub fn new(collectors: Vec<Box<dyn Collector>>, storage: Arc<MemStorage>) -> Self {
        Self {
            collectors: collectors
                .into_iter()
                .map(|c| Arc::new(Mutex::new(c)))
                .collect(),
            storage,
        }
    }

    /// Samples all collectors concurrently on the blocking pool and waits
    /// for every one of them. Returns the number of metrics stored.
    ///
    /// A failing collector is logged and skipped; the others still land.
    pub async fn poll_once(&self) -> usize {
        let mut handles = Vec::with_capacity(self.collectors.len());
        for collector in &self.collectors {
            let collector = Arc::clone(collector);
            let storage = Arc::clone(&self.storage);
            handles.push(tokio::task::spawn_blocking(move || {
                let mut collector = collector
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let metrics = match collector.collect() {
                    Ok(metrics) => metrics,
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                        return 0;
                    }
                };
                match storage.update_batch(&metrics) {
                    Ok(()) => metrics.len(),
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), error = %e, "Failed to buffer metrics");
                        0
                    }
                }
            }));
        }

        let mut stored = 0;
        for handle in handles {
            match handle.await {
                Ok(count) => stored += count,
                Err(e) => tracing::error!(error = %e, "Collector task panicked"),
            }
        }
        tracing::debug!(count = stored, "Poll tick complete");
        stored
    }
}
