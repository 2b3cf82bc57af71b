//! Harness controller - orchestrates one measured run
//!
//! Spawns the worker pool, lines every worker up on the start barrier,
//! brackets the timed window with telemetry snapshots and folds the results
//! into an `AggregateReport`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::barrier::StartBarrier;
use crate::config::RunConfig;
use crate::error::{BenchError, Result};
use crate::report::{AggregateReport, ReportSink};
use crate::telemetry::{CollectorTelemetry, CpuFractionSampler};
use crate::worker::{self, WorkerResult};
use crate::workload::Workload;

/// Where the controller is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    BarrierArmed,
    WorkersRunning,
    Joining,
    Reporting,
    Done,
    Failed,
}

/// Runs one benchmark: a fixed worker pool bound to one workload
pub struct Harness {
    config: RunConfig,
    workload: Arc<dyn Workload>,
    telemetry: Arc<dyn CollectorTelemetry>,
    state: HarnessState,
}

impl Harness {
    pub fn new(
        config: RunConfig,
        workload: Arc<dyn Workload>,
        telemetry: Arc<dyn CollectorTelemetry>,
    ) -> Self {
        Self {
            config,
            workload,
            telemetry,
            state: HarnessState::Idle,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Run the benchmark and hand the report to `sink`.
    ///
    /// Any failure, in a worker or in the controller, ends the run with that
    /// error and nothing is emitted. Workers still inside their timed loop
    /// are left to hit their deadline on their own.
    pub fn run(&mut self, sink: &mut dyn ReportSink) -> Result<AggregateReport> {
        if self.state != HarnessState::Idle {
            return Err(BenchError::Coordination(format!(
                "harness already used (state {:?})",
                self.state
            )));
        }

        match self.execute(sink) {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, state = ?self.state, "run failed");
                self.state = HarnessState::Failed;
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: HarnessState) {
        debug!(from = ?self.state, to = ?next, "harness state");
        self.state = next;
    }

    fn execute(&mut self, sink: &mut dyn ReportSink) -> Result<AggregateReport> {
        self.config.validate()?;
        let workers = self.config.workers();
        let duration = self.config.duration();
        info!(
            workload = %self.workload.kind(),
            secs = self.config.duration_secs(),
            workers,
            "starting run"
        );

        let barrier = Arc::new(StartBarrier::new(self.config.participants())?);
        let total = Arc::new(AtomicU64::new(0));
        self.transition(HarnessState::BarrierArmed);

        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::new();
        for worker_id in 0..workers {
            let workload = Arc::clone(&self.workload);
            let barrier = Arc::clone(&barrier);
            let total = Arc::clone(&total);
            let tx = tx.clone();

            let handle = thread::Builder::new()
                .name(format!("gcbench-worker-{}", worker_id))
                .spawn(move || {
                    worker_main(worker_id, workload, barrier, duration, total, tx);
                })
                .map_err(|e| {
                    BenchError::Coordination(format!("spawn worker {}: {}", worker_id, e))
                })?;
            handles.push(handle);
        }
        drop(tx);
        self.transition(HarnessState::WorkersRunning);

        barrier.wait()?;
        let before = self.telemetry.snapshot()?;
        let sampler = CpuFractionSampler::start(self.telemetry.as_ref())?;
        self.transition(HarnessState::Joining);

        let mut results: Vec<WorkerResult> = Vec::new();
        while results.len() < workers {
            match rx.recv() {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(BenchError::Coordination(format!(
                        "{} of {} workers exited without a result",
                        workers - results.len(),
                        workers
                    )))
                }
            }
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| BenchError::Coordination("worker panicked".to_string()))?;
        }

        barrier.destroy()?;
        self.transition(HarnessState::Reporting);

        let after = self.telemetry.snapshot()?;
        let gc_cpu_percent = sampler.finish(self.telemetry.as_ref())?;
        let heap_bytes = self.telemetry.heap_bytes()?;

        let total_iterations = total.load(Ordering::Acquire);
        let counted: u64 = results.iter().map(|r| r.iterations).sum();
        if counted != total_iterations {
            return Err(BenchError::Coordination(format!(
                "workers counted {} iterations but the shared counter holds {}",
                counted, total_iterations
            )));
        }

        let report = AggregateReport::aggregate(
            &self.config,
            total_iterations,
            &results,
            after.since(&before),
            gc_cpu_percent,
            heap_bytes,
        );
        sink.emit(&report)?;
        self.transition(HarnessState::Done);

        info!(
            iterations = report.total_iterations,
            max_latency_ms = report.max_latency_ms,
            gc_cycles = report.gc_cycles,
            "run complete"
        );
        Ok(report)
    }
}

fn worker_main(
    worker_id: usize,
    workload: Arc<dyn Workload>,
    barrier: Arc<StartBarrier>,
    duration: Duration,
    total: Arc<AtomicU64>,
    tx: Sender<Result<WorkerResult>>,
) {
    let outcome = run_worker(worker_id, workload.as_ref(), &barrier, duration, &total);
    if let Err(ref e) = outcome {
        error!(worker_id, error = %e, "worker failed");
    }
    // The controller stops listening after the first failure
    let _ = tx.send(outcome);
}

fn run_worker(
    worker_id: usize,
    workload: &dyn Workload,
    barrier: &StartBarrier,
    duration: Duration,
    total: &AtomicU64,
) -> Result<WorkerResult> {
    let prepared = workload.prepare(worker_id);

    // Arrive even when setup failed, so nobody else is stranded at the line
    barrier.wait()?;
    let mut body = prepared?;

    debug!(worker_id, "timed loop start");
    let result = worker::run_timed(worker_id, body.as_mut(), duration, total)?;
    body.finish()?;
    debug!(
        worker_id,
        iterations = result.iterations,
        max_latency_ms = result.max_latency_ms,
        "worker done"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostPaths, WorkloadKind};
    use crate::fs::{HostFs, StdFs};
    use crate::report::TextReport;
    use crate::telemetry::fake::FakeTelemetry;
    use crate::workload::{self, WorkerBody};
    use std::fs::File;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Collect(Vec<AggregateReport>);

    impl ReportSink for Collect {
        fn emit(&mut self, report: &AggregateReport) -> Result<()> {
            self.0.push(report.clone());
            Ok(())
        }
    }

    /// Deletes start failing after a number of successful calls
    struct FailingRemove {
        remaining: AtomicUsize,
    }

    impl HostFs for FailingRemove {
        fn create_new(&self, path: &Path) -> io::Result<File> {
            StdFs.create_new(path)
        }

        fn open(&self, path: &Path) -> io::Result<File> {
            StdFs.open(path)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            let left = self.remaining.fetch_sub(1, Ordering::SeqCst);
            if left == 0 || left > usize::MAX / 2 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
            }
            StdFs.remove_file(path)
        }
    }

    /// Counts `prepare` calls; its bodies do nothing
    struct CountingPrepare(Arc<AtomicUsize>);

    struct IdleBody;

    impl Workload for CountingPrepare {
        fn kind(&self) -> WorkloadKind {
            WorkloadKind::MemoryMap
        }

        fn prepare(&self, _worker_id: usize) -> Result<Box<dyn WorkerBody>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(IdleBody))
        }
    }

    impl WorkerBody for IdleBody {
        fn iterate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Each iteration moves the fake collector by one cycle and 1 ms
    struct Ticking {
        telemetry: Arc<FakeTelemetry>,
    }

    struct TickingBody(Arc<FakeTelemetry>);

    impl Workload for Ticking {
        fn kind(&self) -> WorkloadKind {
            WorkloadKind::MemoryMap
        }

        fn prepare(&self, _worker_id: usize) -> Result<Box<dyn WorkerBody>> {
            Ok(Box::new(TickingBody(Arc::clone(&self.telemetry))))
        }
    }

    impl WorkerBody for TickingBody {
        fn iterate(&mut self) -> Result<()> {
            // Sleep first so the controller's "before" snapshot lands ahead of any tick
            thread::sleep(Duration::from_millis(5));
            self.0.advance(1, 1_000_000, 1, 4);
            Ok(())
        }
    }

    #[test]
    fn test_readfile_four_workers() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("reference.bin");
        std::fs::write(&reference, [0x5a; 512]).unwrap();
        let paths = HostPaths {
            work_dir: dir.path().to_path_buf(),
            reference_file: reference,
            ..HostPaths::default()
        };

        let config = RunConfig::new(WorkloadKind::ReadFile, 1, 4, 1);
        let workload = workload::build(config.workload(), &paths, Arc::new(StdFs));
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        let mut sink = TextReport::new(Vec::new());
        let report = harness.run(&mut sink).unwrap();

        assert_eq!(harness.state(), HarnessState::Done);
        assert_eq!(report.per_worker_latency_ms.len(), 4);
        assert!(report.total_iterations > 0);
        assert_eq!(report.summed_worker_iterations(), report.total_iterations);
        assert_eq!(report.throughput_per_sec, report.total_iterations);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let latency_lines = text
            .lines()
            .skip_while(|l| !l.starts_with("each thread's latency"))
            .skip(1)
            .take_while(|l| l.starts_with("     "))
            .count();
        assert_eq!(latency_lines, 4);

        // Every worker removed its private copy
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("gcbench."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_delete_aborts_without_report() {
        let dir = tempdir().unwrap();
        let paths = HostPaths {
            work_dir: dir.path().to_path_buf(),
            ..HostPaths::default()
        };
        let fs = Arc::new(FailingRemove {
            remaining: AtomicUsize::new(25),
        });

        let config = RunConfig::new(WorkloadKind::VnodeChurn, 1, 2, 1);
        let workload = workload::build(config.workload(), &paths, fs);
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        let mut sink = Collect::default();
        let err = harness.run(&mut sink).unwrap_err();

        assert!(matches!(err, BenchError::Workload { op: "unlink", .. }));
        assert!(err.to_string().contains("unlink"));
        assert!(sink.0.is_empty());
        assert_eq!(harness.state(), HarnessState::Failed);
    }

    #[test]
    fn test_setup_failure_does_not_strand_barrier() {
        let dir = tempdir().unwrap();
        let paths = HostPaths {
            work_dir: dir.path().to_path_buf(),
            reference_file: dir.path().join("missing"),
            ..HostPaths::default()
        };

        let config = RunConfig::new(WorkloadKind::ReadFile, 1, 3, 1);
        let workload = workload::build(config.workload(), &paths, Arc::new(StdFs));
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        let err = harness.run(&mut Collect::default()).unwrap_err();
        assert!(matches!(err, BenchError::Setup { .. }));
    }

    #[test]
    fn test_telemetry_deltas_cover_window_only() {
        let telemetry = Arc::new(FakeTelemetry::default());
        // Counters already advanced before the run
        telemetry.advance(100, 9_000_000_000, 50, 400);
        telemetry.heap_bytes.store(64 << 20, Ordering::SeqCst);

        let workload = Arc::new(Ticking {
            telemetry: Arc::clone(&telemetry),
        });
        let config = RunConfig::new(WorkloadKind::MemoryMap, 1, 2, 1);
        let mut harness = Harness::new(config, workload, telemetry.clone());

        let report = harness.run(&mut Collect::default()).unwrap();

        assert_eq!(report.gc_cycles, report.total_iterations);
        assert_eq!(report.gc_time_ms, report.total_iterations);
        assert!((report.gc_cpu_percent - 25.0).abs() < 1e-9);
        assert_eq!(report.heap_size_mb, 64);
    }

    #[test]
    fn test_telemetry_failure_is_fatal() {
        let telemetry = FakeTelemetry {
            fail: true,
            ..FakeTelemetry::default()
        };
        let config = RunConfig::new(WorkloadKind::MemoryMap, 1, 1, 1);
        let workload = workload::build(config.workload(), &HostPaths::default(), Arc::new(StdFs));
        let mut harness = Harness::new(config, workload, Arc::new(telemetry));

        let mut sink = Collect::default();
        let err = harness.run(&mut sink).unwrap_err();
        assert!(matches!(err, BenchError::Telemetry { .. }));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_harness_runs_once() {
        let config = RunConfig::new(WorkloadKind::MemoryMap, 1, 1, 1);
        let workload = workload::build(config.workload(), &HostPaths::default(), Arc::new(StdFs));
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        harness.run(&mut Collect::default()).unwrap();
        let err = harness.run(&mut Collect::default()).unwrap_err();
        assert!(matches!(err, BenchError::Coordination(_)));
    }

    #[test]
    fn test_oversized_pool_rejected_before_spawn() {
        let prepared = Arc::new(AtomicUsize::new(0));
        let workload = Arc::new(CountingPrepare(Arc::clone(&prepared)));
        let config = RunConfig::new(WorkloadKind::MemoryMap, 1, 100_000_000_000_000, 1);
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        let mut sink = Collect::default();
        let err = harness.run(&mut sink).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(harness.state(), HarnessState::Failed);
        assert_eq!(prepared.load(Ordering::SeqCst), 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_endless_duration_rejected_before_spawn() {
        let prepared = Arc::new(AtomicUsize::new(0));
        let workload = Arc::new(CountingPrepare(Arc::clone(&prepared)));
        let config = RunConfig::new(WorkloadKind::MemoryMap, i64::MAX, 1, 1);
        let mut harness = Harness::new(config, workload, Arc::new(FakeTelemetry::default()));

        let err = harness.run(&mut Collect::default()).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(prepared.load(Ordering::SeqCst), 0);
    }
}
