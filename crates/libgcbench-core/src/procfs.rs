//! Linux reclaim telemetry read from procfs
//!
//! The kernel's page reclaim is the collector being measured:
//! - cycles: `pageoutrun` (kswapd passes) plus every `allocstall*` (direct reclaim) in `vmstat`
//! - pause time: the `full` memory-pressure stall total in `pressure/memory`
//! - heap: `Slab` in `meminfo`
//! - collector CPU: utime+stime of the `kswapd*` threads against the `cpu` line of `stat`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{BenchError, Result};
use crate::telemetry::{CollectorTelemetry, CpuTime};

/// Telemetry source backed by a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsTelemetry {
    root: PathBuf,
}

impl ProcfsTelemetry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, rel: &str, query: &'static str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path)
            .map_err(|e| BenchError::telemetry(query, format!("{}: {}", path.display(), e)))
    }

    fn collector_ticks(&self) -> Result<u64> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            BenchError::telemetry("kswapd_cpu", format!("{}: {}", self.root.display(), e))
        })?;

        let mut ticks = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str() else { continue };
            if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            // Tasks come and go while we scan; a vanished one is not a failure
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            if !comm.trim_end().starts_with("kswapd") {
                continue;
            }
            let stat = self.read(&format!("{}/stat", pid), "kswapd_cpu")?;
            let task = parse_task_cpu_ticks(&stat).ok_or_else(|| {
                BenchError::telemetry("kswapd_cpu", format!("malformed stat for task {}", pid))
            })?;
            trace!(pid, ticks = task, "kswapd cpu");
            ticks += task;
        }
        Ok(ticks)
    }
}

impl Default for ProcfsTelemetry {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl CollectorTelemetry for ProcfsTelemetry {
    fn cycle_count(&self) -> Result<u64> {
        let vmstat = self.read("vmstat", "cycle_count")?;
        parse_reclaim_cycles(&vmstat)
            .ok_or_else(|| BenchError::telemetry("cycle_count", "no reclaim counters in vmstat"))
    }

    fn cycle_time_ns(&self) -> Result<u64> {
        let psi = self.read("pressure/memory", "cycle_time")?;
        let total_us = parse_psi_full_total_us(&psi)
            .ok_or_else(|| BenchError::telemetry("cycle_time", "no full stall total"))?;
        Ok(total_us.saturating_mul(1_000))
    }

    fn heap_bytes(&self) -> Result<u64> {
        let meminfo = self.read("meminfo", "heap_bytes")?;
        let kb = parse_meminfo_kb(&meminfo, "Slab")
            .ok_or_else(|| BenchError::telemetry("heap_bytes", "no Slab line in meminfo"))?;
        Ok(kb.saturating_mul(1024))
    }

    fn cpu_time(&self) -> Result<CpuTime> {
        let stat = self.read("stat", "cpu_time")?;
        let total = parse_total_cpu_ticks(&stat)
            .ok_or_else(|| BenchError::telemetry("cpu_time", "no cpu line in stat"))?;
        Ok(CpuTime {
            collector: self.collector_ticks()?,
            total,
        })
    }
}

/// Sum of kswapd passes and direct-reclaim stalls, if any counter is present
pub fn parse_reclaim_cycles(vmstat: &str) -> Option<u64> {
    let mut found = false;
    let mut total = 0u64;
    for line in vmstat.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key == "pageoutrun" || key.starts_with("allocstall") {
            total = total.saturating_add(value.parse().ok()?);
            found = true;
        }
    }
    found.then_some(total)
}

/// `total=` of the `full` line, in microseconds
pub fn parse_psi_full_total_us(psi: &str) -> Option<u64> {
    psi.lines()
        .find(|line| line.starts_with("full "))?
        .split_whitespace()
        .find_map(|field| field.strip_prefix("total="))?
        .parse()
        .ok()
}

/// Value of a `Key:   1234 kB` line
pub fn parse_meminfo_kb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Busy plus idle ticks of the aggregate `cpu` line (user through steal)
pub fn parse_total_cpu_ticks(stat: &str) -> Option<u64> {
    let line = stat.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    Some(fields.iter().sum())
}

/// utime + stime of a `/proc/<pid>/stat` line
pub fn parse_task_cpu_ticks(stat: &str) -> Option<u64> {
    // comm may contain spaces and parens; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}
