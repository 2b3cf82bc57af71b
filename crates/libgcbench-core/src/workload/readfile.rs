use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::{private_name, WorkerBody, Workload};
use crate::config::WorkloadKind;
use crate::error::{BenchError, Result};
use crate::fs::HostFs;

const CHUNK: usize = 512;

/// Re-read a private copy of a reference file, front to back, every iteration.
///
/// Allocates very little per iteration; most of the cost is file and buffer
/// bookkeeping in the host.
pub struct ReadFile {
    reference: PathBuf,
    work_dir: PathBuf,
    fs: Arc<dyn HostFs>,
}

impl ReadFile {
    pub fn new(reference: PathBuf, work_dir: PathBuf, fs: Arc<dyn HostFs>) -> Self {
        Self {
            reference,
            work_dir,
            fs,
        }
    }
}

impl Workload for ReadFile {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::ReadFile
    }

    fn prepare(&self, worker_id: usize) -> Result<Box<dyn WorkerBody>> {
        let mut source = self
            .fs
            .open(&self.reference)
            .map_err(|e| BenchError::setup("open reference", e))?;

        let path = private_name(&self.work_dir, "readfile", worker_id);
        let mut file = self
            .fs
            .create_new(&path)
            .map_err(|e| BenchError::setup("create temp file", e))?;

        if let Err(e) = copy_chunked(&mut source, &mut file) {
            let _ = self.fs.remove_file(&path);
            return Err(e);
        }
        debug!(worker_id, path = %path.display(), "temp file ready");

        Ok(Box::new(ReadFileBody {
            file,
            path,
            fs: Arc::clone(&self.fs),
            buf: [0; CHUNK],
        }))
    }
}

fn copy_chunked(source: &mut File, dest: &mut File) -> Result<()> {
    let mut buf = [0u8; CHUNK];
    loop {
        let n = source
            .read(&mut buf)
            .map_err(|e| BenchError::setup("read reference", e))?;
        if n == 0 {
            return Ok(());
        }
        dest.write_all(&buf[..n])
            .map_err(|e| BenchError::setup("write temp file", e))?;
    }
}

struct ReadFileBody {
    file: File,
    path: PathBuf,
    fs: Arc<dyn HostFs>,
    buf: [u8; CHUNK],
}

impl WorkerBody for ReadFileBody {
    fn iterate(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| BenchError::workload("lseek", e))?;
        loop {
            let n = self
                .file
                .read(&mut self.buf)
                .map_err(|e| BenchError::workload("read", e))?;
            if n == 0 {
                return Ok(());
            }
        }
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ReadFileBody { file, path, fs, .. } = *self;
        drop(file);
        fs.remove_file(&path)
            .map_err(|e| BenchError::workload("unlink", e))
    }
}
