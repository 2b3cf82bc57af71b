use std::path::PathBuf;

use clap::{ArgAction, Parser};

use libgcbench_core::{BenchFileConfig, HostPaths, WorkloadKind};

/// Escape-hatch rewinds requested by `-d`
const PREWARM_REWINDS: u32 = 4;

#[derive(Parser, Debug)]
#[command(name = "gcbench")]
#[command(about = "Drive the kernel's memory reclaim with concurrent synthetic load")]
#[command(version, disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,

    /// Use mmap busy work instead of readfile
    #[arg(short = 'm', long = "mmap", conflicts_with = "vnodes")]
    pub mmap: bool,

    /// Use vnode busy work instead of readfile
    #[arg(short = 'v', long = "vnodes")]
    pub vnodes: bool,

    /// Scale factor: pre-warm creates 1000 x scale entries
    #[arg(short = 's', long = "scale", allow_negative_numbers = true)]
    pub scale: Option<i64>,

    /// Work factor: seconds of timed work
    #[arg(short = 'w', long = "work", allow_negative_numbers = true)]
    pub work: Option<i64>,

    /// Number of worker threads
    #[arg(short = 'n', long = "threads", allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Reset tuning and rewind the pre-warm loop on its last entry, up to 4 times
    #[arg(short = 'd', long = "prewarm-rewind")]
    pub prewarm_rewind: bool,

    /// Sleep forever instead of exiting
    #[arg(short = 'S', long = "sleep")]
    pub sleep_forever: bool,

    /// Force a kernel collection, print heap use, then exit
    #[arg(short = 'g', long = "gc")]
    pub force_gc: bool,

    /// Set the kernel heap minimum to this many MB, then exit
    #[arg(short = 'h', long = "heap-min", allow_negative_numbers = true)]
    pub heap_min_mb: Option<i64>,

    /// Set the kernel heap growth factor, then exit
    #[arg(short = 'H', long = "heap-growth", allow_negative_numbers = true)]
    pub heap_growth: Option<i64>,

    /// TOML file with run defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a JSON report to this file
    #[arg(long)]
    pub json_report: Option<PathBuf>,

    /// Directory for temp files and pre-warm entries
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// File copied and re-read by the readfile workload
    #[arg(long)]
    pub reference_file: Option<PathBuf>,

    /// procfs mount used for telemetry and tuning
    #[arg(long)]
    pub procfs_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn workload(&self, file: &BenchFileConfig) -> WorkloadKind {
        if self.mmap {
            WorkloadKind::MemoryMap
        } else if self.vnodes {
            WorkloadKind::VnodeChurn
        } else {
            file.workload.unwrap_or_default()
        }
    }

    pub fn prewarm_rewinds(&self, file: &BenchFileConfig) -> u32 {
        if self.prewarm_rewind {
            PREWARM_REWINDS
        } else {
            file.prewarm_rewinds.unwrap_or(0)
        }
    }

    /// Host paths: defaults, then the config file, then flags
    pub fn host_paths(&self, file: &BenchFileConfig) -> HostPaths {
        let paths = file.host_paths(HostPaths::default());
        HostPaths {
            work_dir: self.work_dir.clone().unwrap_or(paths.work_dir),
            reference_file: self.reference_file.clone().unwrap_or(paths.reference_file),
            procfs_root: self.procfs_root.clone().unwrap_or(paths.procfs_root),
        }
    }

    /// Heap minimum to apply; 0 means unset
    pub fn heap_min(&self) -> Option<i64> {
        self.heap_min_mb.filter(|mb| *mb != 0)
    }

    /// Growth factor to apply; 0 means unset
    pub fn growth(&self) -> Option<i64> {
        self.heap_growth.filter(|f| *f != 0)
    }
}
