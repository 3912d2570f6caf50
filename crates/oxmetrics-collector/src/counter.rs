use crate::Collector;
use anyhow::Result;
use oxmetrics_common::types::Metric;

pub const POLL_COUNT: &str = "PollCount";

/// Emits `PollCount += 1` on every poll tick.
pub struct PollCounter;

impl Collector for PollCounter {
    fn name(&self) -> &str {
        "counter"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        Ok(vec![Metric::counter(POLL_COUNT, 1)])
    }
}
