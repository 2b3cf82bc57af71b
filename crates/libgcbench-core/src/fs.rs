//! Filesystem service used by the file-backed workloads and the pre-warm phase

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// The handful of filesystem calls the harness makes.
///
/// Reads, writes and seeks go through the returned `File`; entry creation and
/// removal go through this trait so tests can inject failures.
pub trait HostFs: Send + Sync {
    /// Create a new read/write file, failing if the path already exists
    fn create_new(&self, path: &Path) -> io::Result<File>;

    /// Open an existing file read-only
    fn open(&self, path: &Path) -> io::Result<File>;

    /// Delete a directory entry
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Straight passthrough to `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl HostFs for StdFs {
    fn create_new(&self, path: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(path)
    }

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}
