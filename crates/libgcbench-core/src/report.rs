//! Aggregated run results and the emitters that print them

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{RunConfig, WorkloadKind};
use crate::error::Result;
use crate::telemetry::TelemetryDelta;
use crate::worker::WorkerResult;

/// Everything a run measured. Built once after every worker has reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub workload: WorkloadKind,
    pub duration_secs: u64,
    pub workers: usize,
    pub throughput_per_sec: u64,
    pub total_iterations: u64,
    pub max_latency_ms: u64,
    /// Indexed by worker id
    pub per_worker_latency_ms: Vec<u64>,
    /// Indexed by worker id
    pub per_worker_iterations: Vec<u64>,
    pub gc_cycles: u64,
    pub gc_time_ms: u64,
    pub gc_cpu_percent: f64,
    pub heap_size_mb: u64,
}

impl AggregateReport {
    /// Fold worker results and telemetry into a report.
    ///
    /// `total_iterations` is the shared counter's final value, not a sum of
    /// `results`.
    pub fn aggregate(
        config: &RunConfig,
        total_iterations: u64,
        results: &[WorkerResult],
        delta: TelemetryDelta,
        gc_cpu_percent: f64,
        heap_bytes: u64,
    ) -> Self {
        let mut ordered = results.to_vec();
        ordered.sort_by_key(|r| r.worker_id);

        let duration_secs = config.duration_secs();
        Self {
            workload: config.workload(),
            duration_secs,
            workers: config.workers(),
            throughput_per_sec: if duration_secs > 0 {
                total_iterations / duration_secs
            } else {
                0
            },
            total_iterations,
            max_latency_ms: ordered.iter().map(|r| r.max_latency_ms).max().unwrap_or(0),
            per_worker_latency_ms: ordered.iter().map(|r| r.max_latency_ms).collect(),
            per_worker_iterations: ordered.iter().map(|r| r.iterations).collect(),
            gc_cycles: delta.cycles,
            gc_time_ms: delta.cycle_time_ms(),
            gc_cpu_percent,
            heap_size_mb: heap_bytes >> 20,
        }
    }

    /// Iterations counted by the workers themselves
    pub fn summed_worker_iterations(&self) -> u64 {
        self.per_worker_iterations.iter().sum()
    }
}

/// Destination for a finished report
pub trait ReportSink {
    fn emit(&mut self, report: &AggregateReport) -> Result<()>;
}

impl ReportSink for Vec<Box<dyn ReportSink>> {
    fn emit(&mut self, report: &AggregateReport) -> Result<()> {
        for sink in self.iter_mut() {
            sink.emit(report)?;
        }
        Ok(())
    }
}

/// Human-readable summary
#[derive(Debug)]
pub struct TextReport<W: Write> {
    out: W,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn emit(&mut self, report: &AggregateReport) -> Result<()> {
        let out = &mut self.out;
        writeln!(
            out,
            "{} work for {} seconds with {} threads",
            report.workload, report.duration_secs, report.workers
        )?;
        writeln!(
            out,
            "iterations/sec: {} ({} total)",
            report.throughput_per_sec, report.total_iterations
        )?;
        writeln!(out, "CPU time GC'ing: {:.6}%", report.gc_cpu_percent)?;
        writeln!(out, "max latency: {} ms", report.max_latency_ms)?;
        writeln!(out, "each thread's latency:")?;
        for latency in &report.per_worker_latency_ms {
            writeln!(out, "     {}", latency)?;
        }
        writeln!(out, "{} gcs ({} ms)", report.gc_cycles, report.gc_time_ms)?;
        writeln!(out, "kernel heap use:   {} Mb", report.heap_size_mb)?;
        out.flush()?;
        Ok(())
    }
}

/// Machine-readable report written to a file
#[derive(Debug, Clone)]
pub struct JsonReport {
    path: PathBuf,
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a AggregateReport,
}

impl JsonReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonReport {
    fn emit(&mut self, report: &AggregateReport) -> Result<()> {
        let envelope = JsonEnvelope {
            generated_at: Utc::now(),
            report,
        };
        let json = serde_json::to_string_pretty(&envelope)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
