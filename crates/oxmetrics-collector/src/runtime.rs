use crate::Collector;
use anyhow::{anyhow, Result};
use oxmetrics_common::types::Metric;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resource usage of the agent's own process at one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub cpu_percent: f32,
    pub run_time_secs: u64,
    pub read_bytes: u64,
    pub written_bytes: u64,
    pub total_read_bytes: u64,
    pub total_written_bytes: u64,
}

type Accessor = fn(&ProcessStats) -> f64;

/// Gauge name and accessor for each exported runtime field.
pub const RUNTIME_GAUGES: &[(&str, Accessor)] = &[
    ("ResidentMemory", |s: &ProcessStats| s.resident_bytes as f64),
    ("VirtualMemory", |s: &ProcessStats| s.virtual_bytes as f64),
    ("ProcessCpuUsage", |s: &ProcessStats| s.cpu_percent as f64),
    ("RunTime", |s: &ProcessStats| s.run_time_secs as f64),
    ("DiskReadBytes", |s: &ProcessStats| s.read_bytes as f64),
    ("DiskWrittenBytes", |s: &ProcessStats| s.written_bytes as f64),
    ("TotalDiskReadBytes", |s: &ProcessStats| s.total_read_bytes as f64),
    ("TotalDiskWrittenBytes", |s: &ProcessStats| s.total_written_bytes as f64),
];

impl ProcessStats {
    /// Expands the stats into one gauge per [`RUNTIME_GAUGES`] entry.
    pub fn to_metrics(&self) -> Vec<Metric> {
        RUNTIME_GAUGES
            .iter()
            .map(|(name, read)| Metric::gauge(*name, read(self)))
            .collect()
    }
}

pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        Self {
            system: System::new(),
            pid,
        }
    }

    fn sample(&mut self) -> Result<ProcessStats> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id unavailable on this platform"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;
        let disk = process.disk_usage();
        Ok(ProcessStats {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            cpu_percent: process.cpu_usage(),
            run_time_secs: process.run_time(),
            read_bytes: disk.read_bytes,
            written_bytes: disk.written_bytes,
            total_read_bytes: disk.total_read_bytes,
            total_written_bytes: disk.total_written_bytes,
        })
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        Ok(self.sample()?.to_metrics())
    }
}
