//! Background snapshot writer for the file-backed store.
//!
//! In [`FlushMode::Interval`] the worker writes a full snapshot on a fixed
//! timer. In [`FlushMode::OnWrite`] it writes one snapshot per
//! [`FlushTrigger::notify`] call, in order, without coalescing.

use oxmetrics_storage::MemStorage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Interval(Duration),
    OnWrite,
}

impl FlushMode {
    /// `0` selects [`FlushMode::OnWrite`], anything else an interval.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            FlushMode::OnWrite
        } else {
            FlushMode::Interval(Duration::from_secs(secs))
        }
    }
}

/// Handle given to request handlers to request a flush after a write.
#[derive(Clone)]
pub struct FlushTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl FlushTrigger {
    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Flush worker stopped, dropping flush request");
        }
    }
}

pub struct FlushWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    trigger: Option<FlushTrigger>,
    attempts: Arc<AtomicU64>,
}

impl FlushWorker {
    /// Starts the worker on the current Tokio runtime.
    pub fn spawn(storage: Arc<MemStorage>, mode: FlushMode) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let attempts = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&attempts);
        match mode {
            FlushMode::Interval(period) => {
                tracing::info!(interval_secs = period.as_secs(), "Flush worker started");
                let handle = tokio::spawn(run_interval(storage, period, token, counter));
                Self {
                    cancel,
                    handle,
                    trigger: None,
                    attempts,
                }
            }
            FlushMode::OnWrite => {
                tracing::info!("Flush worker started in on-write mode");
                let (tx, rx) = mpsc::unbounded_channel();
                let handle = tokio::spawn(run_on_write(storage, rx, token, counter));
                Self {
                    cancel,
                    handle,
                    trigger: Some(FlushTrigger { tx }),
                    attempts,
                }
            }
        }
    }

    /// Snapshots attempted so far, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Trigger for on-write mode; `None` when flushing on an interval.
    pub fn trigger(&self) -> Option<FlushTrigger> {
        self.trigger.clone()
    }

    /// Signals the worker to stop and returns its task handle without
    /// waiting on it.
    pub fn shutdown(self) -> JoinHandle<()> {
        self.cancel.cancel();
        drop(self.trigger);
        self.handle
    }
}

async fn run_interval(
    storage: Arc<MemStorage>,
    period: Duration,
    cancel: CancellationToken,
    attempts: Arc<AtomicU64>,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                flush(&storage).await;
                attempts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    tracing::info!(attempts = attempts.load(Ordering::Relaxed), "Flush worker stopped");
}

async fn run_on_write(
    storage: Arc<MemStorage>,
    mut rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
    attempts: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(()) => {
                    flush(&storage).await;
                    attempts.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            },
        }
    }
    tracing::info!(attempts = attempts.load(Ordering::Relaxed), "Flush worker stopped");
}

/// Writes one full snapshot on the blocking pool. Errors are logged only.
pub async fn flush(storage: &Arc<MemStorage>) {
    let storage = Arc::clone(storage);
    match tokio::task::spawn_blocking(move || storage.upload_storage()).await {
        Ok(Ok(count)) => tracing::debug!(count, "Snapshot written"),
        Ok(Err(e)) => tracing::error!(error = %e, "Snapshot failed"),
        Err(e) => tracing::error!(error = %e, "Snapshot task panicked"),
    }
}
