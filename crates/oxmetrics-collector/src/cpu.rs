use crate::Collector;
use anyhow::Result;
use oxmetrics_common::types::Metric;
use sysinfo::System;

/// Per-core utilization gauges named `CPUutilization1..=N`.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is a delta between two refreshes; prime the first sample.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_cpu_all();
        Ok(self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(i, cpu)| Metric::gauge(format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64))
            .collect())
    }
}
