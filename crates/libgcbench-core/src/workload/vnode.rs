use std::path::PathBuf;
use std::sync::Arc;

use super::{private_name, WorkerBody, Workload};
use crate::config::WorkloadKind;
use crate::error::{BenchError, Result};
use crate::fs::HostFs;

/// Create, close and delete a per-worker directory entry every iteration
pub struct VnodeChurn {
    work_dir: PathBuf,
    fs: Arc<dyn HostFs>,
}

impl VnodeChurn {
    pub fn new(work_dir: PathBuf, fs: Arc<dyn HostFs>) -> Self {
        Self { work_dir, fs }
    }
}

impl Workload for VnodeChurn {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::VnodeChurn
    }

    fn prepare(&self, worker_id: usize) -> Result<Box<dyn WorkerBody>> {
        Ok(Box::new(VnodeBody {
            path: private_name(&self.work_dir, "vnode", worker_id),
            fs: Arc::clone(&self.fs),
        }))
    }
}

struct VnodeBody {
    path: PathBuf,
    fs: Arc<dyn HostFs>,
}

impl WorkerBody for VnodeBody {
    fn iterate(&mut self) -> Result<()> {
        let file = self
            .fs
            .create_new(&self.path)
            .map_err(|e| BenchError::workload("open", e))?;
        drop(file);
        self.fs
            .remove_file(&self.path)
            .map_err(|e| BenchError::workload("unlink", e))
    }
}
