use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Which workload body the worker pool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    #[default]
    #[serde(alias = "readfile")]
    ReadFile,
    #[serde(alias = "mmap", alias = "mmaps")]
    MemoryMap,
    #[serde(alias = "vnode", alias = "vnodes")]
    VnodeChurn,
}

impl WorkloadKind {
    /// Name printed in the report header
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::ReadFile => "READFILE",
            WorkloadKind::MemoryMap => "MMAPS",
            WorkloadKind::VnodeChurn => "VNODES",
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Largest worker pool a run will spawn
pub const MAX_WORKERS: usize = 4096;

/// Parameters of one harness run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    workload: WorkloadKind,
    duration_secs: u64,
    workers: usize,
    scale: u64,
}

impl RunConfig {
    /// Build a run config from raw (possibly nonsensical) inputs.
    ///
    /// Non-positive durations and worker counts become 1. A negative scale
    /// becomes 1; a zero scale is kept and means "no pre-warming".
    pub fn new(workload: WorkloadKind, duration_secs: i64, workers: i64, scale: i64) -> Self {
        Self {
            workload,
            duration_secs: if duration_secs <= 0 { 1 } else { duration_secs as u64 },
            workers: if workers <= 0 { 1 } else { workers as usize },
            scale: if scale < 0 { 1 } else { scale as u64 },
        }
    }

    pub fn workload(&self) -> WorkloadKind {
        self.workload
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// Barrier participants: every worker plus the controller
    pub fn participants(&self) -> usize {
        self.workers + 1
    }

    /// Reject values that coercion keeps but the host cannot run
    pub fn validate(&self) -> Result<()> {
        if self.workers > MAX_WORKERS {
            return Err(BenchError::Config(format!(
                "{} worker threads requested, at most {} allowed",
                self.workers, MAX_WORKERS
            )));
        }
        if Instant::now().checked_add(self.duration()).is_none() {
            return Err(BenchError::Config(format!(
                "work duration of {} seconds is out of range",
                self.duration_secs
            )));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(WorkloadKind::default(), 1, 1, 1)
    }
}

/// Host locations the harness touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Directory for per-worker temp files and pre-warm entries
    pub work_dir: PathBuf,
    /// Source bytes for the ReadFile workload
    pub reference_file: PathBuf,
    /// Root of the procfs mount used for telemetry and tuning
    pub procfs_root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            reference_file: PathBuf::from("/bin/cat"),
            procfs_root: PathBuf::from("/proc"),
        }
    }
}

/// Optional TOML file with run defaults; command-line flags win over it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<i64>,
    /// Setup-phase escape hatch; 0 disables it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prewarm_rewinds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procfs_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_report: Option<PathBuf>,
}

impl BenchFileConfig {
    /// Overlay the file's host paths on top of `base`
    pub fn host_paths(&self, base: HostPaths) -> HostPaths {
        HostPaths {
            work_dir: self.work_dir.clone().unwrap_or(base.work_dir),
            reference_file: self.reference_file.clone().unwrap_or(base.reference_file),
            procfs_root: self.procfs_root.clone().unwrap_or(base.procfs_root),
        }
    }
}

/// Load a bench config file
pub fn load_file_config(path: &Path) -> Result<BenchFileConfig> {
    if !path.exists() {
        return Err(BenchError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let config: BenchFileConfig = toml::from_str(&content)?;
    Ok(config)
}
