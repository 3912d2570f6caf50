use crate::Collector;
use anyhow::Result;
use oxmetrics_common::types::Metric;
use rand::Rng;

pub struct RandomCollector {
    max: f64,
}

impl RandomCollector {
    /// Samples `RandomValue` uniformly from `[0, max)`. A non-positive `max`
    /// always yields `0.0`.
    pub fn new(max: f64) -> Self {
        Self { max }
    }
}

impl Collector for RandomCollector {
    fn name(&self) -> &str {
        "random"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        let value = if self.max > 0.0 {
            rand::thread_rng().gen_range(0.0..self.max)
        } else {
            0.0
        };
        Ok(vec![Metric::gauge("RandomValue", value)])
    }
}
