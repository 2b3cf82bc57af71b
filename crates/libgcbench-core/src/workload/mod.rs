//! Workload bodies: the unit of repeated work each worker runs

mod mmap;
mod readfile;
mod vnode;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{HostPaths, WorkloadKind};
use crate::error::Result;
use crate::fs::HostFs;

pub use mmap::{MemoryMap, REGION_LEN};
pub use readfile::ReadFile;
pub use vnode::VnodeChurn;

/// A kind of work, shared by the whole worker pool
pub trait Workload: Send + Sync {
    fn kind(&self) -> WorkloadKind;

    /// Per-worker setup, paid before the start barrier and outside the timed window
    fn prepare(&self, worker_id: usize) -> Result<Box<dyn WorkerBody>>;
}

/// One worker's private instance of a workload
pub trait WorkerBody {
    /// Perform exactly one unit of work
    fn iterate(&mut self) -> Result<()>;

    /// Release per-worker resources once the deadline has passed
    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Build the workload for `kind`
pub fn build(kind: WorkloadKind, paths: &HostPaths, fs: Arc<dyn HostFs>) -> Arc<dyn Workload> {
    match kind {
        WorkloadKind::ReadFile => Arc::new(ReadFile::new(
            paths.reference_file.clone(),
            paths.work_dir.clone(),
            fs,
        )),
        WorkloadKind::MemoryMap => Arc::new(MemoryMap),
        WorkloadKind::VnodeChurn => Arc::new(VnodeChurn::new(paths.work_dir.clone(), fs)),
    }
}

/// Per-worker entry name, unique across workers and concurrent processes
fn private_name(dir: &std::path::Path, tag: &str, worker_id: usize) -> PathBuf {
    dir.join(format!("gcbench.{}.{}.{}", tag, std::process::id(), worker_id))
}
