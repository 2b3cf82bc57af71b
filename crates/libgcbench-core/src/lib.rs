pub mod admin;
pub mod barrier;
pub mod config;
pub mod error;
pub mod fs;
pub mod harness;
pub mod prewarm;
pub mod procfs;
pub mod report;
pub mod telemetry;
pub mod worker;
pub mod workload;

pub use admin::{AdminControl, ProcfsAdmin};
pub use barrier::StartBarrier;
pub use config::{
    load_file_config, BenchFileConfig, HostPaths, RunConfig, WorkloadKind, MAX_WORKERS,
};
pub use error::BenchError;
pub use fs::{HostFs, StdFs};
pub use harness::{Harness, HarnessState};
pub use prewarm::{run_prewarm, PrewarmConfig, PrewarmStats};
pub use procfs::ProcfsTelemetry;
pub use report::{AggregateReport, JsonReport, ReportSink, TextReport};
pub use telemetry::{
    CollectorTelemetry, CpuFractionSampler, CpuTime, TelemetryDelta, TelemetrySnapshot,
};
pub use worker::WorkerResult;
pub use workload::{WorkerBody, Workload};
