//! Metric collectors for the oxmetrics agent.
//!
//! Each [`Collector`] samples one group of gauges or counters and returns them
//! as [`Metric`] updates. The agent writes those into its local buffer, where
//! counters accumulate until the next successful report.

pub mod counter;
pub mod cpu;
pub mod memory;
pub mod random;
pub mod runtime;

use anyhow::Result;
use oxmetrics_common::types::Metric;

/// A metric source polled by the agent on every poll tick.
///
/// `collect` may block on OS calls, so the agent runs each collector on the
/// blocking thread pool.
pub trait Collector: Send {
    /// Short collector name used in logs (e.g. `"runtime"`, `"cpu"`).
    fn name(&self) -> &str;

    /// Samples current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system query fails.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}

/// The full collector set the agent polls: runtime gauges, system memory and
/// CPU gauges, the random gauge and the poll counter.
pub fn default_collectors(random_max: f64) -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(runtime::RuntimeCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(cpu::CpuCollector::new()),
        Box::new(random::RandomCollector::new(random_max)),
        Box::new(counter::PollCounter),
    ]
}
