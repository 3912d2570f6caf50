//! The oxmetrics agent.
//!
//! Two loops share one local [`MemStorage`] buffer: the poll loop runs every
//! collector and merges their samples into it, and the report loop ships a
//! snapshot of it to the server. Both stop when the [`CancellationToken`]
//! passed to [`Agent::run`] is cancelled.

pub mod config;
pub mod poller;
pub mod reporter;

use config::AgentConfig;
use oxmetrics_collector::Collector;
use oxmetrics_storage::MemStorage;
use poller::Poller;
use reporter::{ReportError, Reporter};
use std::sync::Arc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Agent {
    config: AgentConfig,
    storage: Arc<MemStorage>,
    poller: Poller,
    reporter: Arc<Reporter>,
}

impl Agent {
    /// Builds an agent polling the default collector set.
    pub fn new(config: AgentConfig) -> Result<Self, ReportError> {
        let collectors = oxmetrics_collector::default_collectors(config.random_max);
        Self::with_collectors(config, collectors)
    }

    pub fn with_collectors(
        config: AgentConfig,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Result<Self, ReportError> {
        let storage = Arc::new(MemStorage::new());
        let reporter = Arc::new(Reporter::new(&config, Arc::clone(&storage))?);
        let poller = Poller::new(collectors, Arc::clone(&storage));
        Ok(Self {
            config,
            storage,
            poller,
            reporter,
        })
    }

    /// The local metric buffer.
    pub fn storage(&self) -> &Arc<MemStorage> {
        &self.storage
    }

    pub async fn poll_once(&self) -> usize {
        self.poller.poll_once().await
    }

    pub async fn report_once(&self) -> Result<usize, ReportError> {
        self.reporter.report_once().await
    }

    /// Runs the poll and report loops until `cancel` fires.
    ///
    /// A tick that is already in progress completes before its loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            server = %self.config.server_url(),
            poll_secs = self.config.poll_interval_secs,
            report_secs = self.config.report_interval_secs,
            mode = ?self.config.report_mode,
            "Starting agent loops"
        );
        tokio::join!(self.poll_loop(&cancel), self.report_loop(&cancel));
        tracing::info!("Agent loops stopped");
    }

    async fn poll_loop(&self, cancel: &CancellationToken) {
        let mut tick = interval(self.config.poll_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    self.poller.poll_once().await;
                }
            }
        }
    }

    async fn report_loop(&self, cancel: &CancellationToken) {
        let period = self.config.report_interval();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    match self.reporter.report_once().await {
                        Ok(count) => tracing::debug!(count, "Report tick complete"),
                        Err(e) => tracing::warn!(error = %e, "Report failed, keeping metrics buffered"),
                    }
                }
            }
        }
    }
}
