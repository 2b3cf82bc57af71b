//! One-shot tuning calls against the host collector

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::info;

use crate::error::{BenchError, Result};

/// Administrative requests; each either succeeds or fails, with no payload
pub trait AdminControl {
    /// Run a full collection cycle now
    fn force_collection(&self) -> Result<()>;

    /// Keep at least this many megabytes free before reclaim kicks in
    fn set_min_heap_mb(&self, mb: i64) -> Result<()>;

    /// Scale the distance between reclaim watermarks
    fn set_heap_growth_factor(&self, factor: i64) -> Result<()>;

    /// Drop reclaimable metadata; issued by the pre-warm escape hatch
    fn reset_tuning(&self) -> Result<()>;

    /// Directory entries the kernel currently holds in its caches
    fn cached_entry_count(&self) -> Result<u64>;
}

/// Tuning through the `vm` sysctls under a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsAdmin {
    root: PathBuf,
}

impl ProcfsAdmin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_sysctl(&self, name: &str, value: &str, op: &'static str) -> Result<()> {
        let path = self.root.join("sys/vm").join(name);
        fs::write(&path, value).map_err(|source| BenchError::Admin { op, source })?;
        info!(sysctl = name, value, "tuned");
        Ok(())
    }
}

impl AdminControl for ProcfsAdmin {
    fn force_collection(&self) -> Result<()> {
        self.write_sysctl("drop_caches", "3", "force_collection")
    }

    fn set_min_heap_mb(&self, mb: i64) -> Result<()> {
        if mb <= 0 {
            return Err(BenchError::Config(format!(
                "minimum heap must be positive, got {} MB",
                mb
            )));
        }
        let kb = mb.saturating_mul(1024);
        self.write_sysctl("min_free_kbytes", &kb.to_string(), "set_min_heap")
    }

    fn set_heap_growth_factor(&self, factor: i64) -> Result<()> {
        if factor < 0 {
            return Err(BenchError::Config(format!(
                "heap growth factor must not be negative, got {}",
                factor
            )));
        }
        self.write_sysctl(
            "watermark_scale_factor",
            &factor.to_string(),
            "set_heap_growth",
        )
    }

    fn reset_tuning(&self) -> Result<()> {
        self.write_sysctl("drop_caches", "2", "reset_tuning")
    }

    fn cached_entry_count(&self) -> Result<u64> {
        let op = "cached_entry_count";
        let state = fs::read_to_string(self.root.join("sys/fs/dentry-state"))
            .map_err(|source| BenchError::Admin { op, source })?;
        // First field is nr_dentry
        state
            .split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| BenchError::Admin {
                op,
                source: io::Error::new(io::ErrorKind::InvalidData, "malformed dentry-state"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_sysctls() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sys/vm")).unwrap();
        dir
    }

    fn sysctl(dir: &tempfile::TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join("sys/vm").join(name)).unwrap()
    }

    #[test]
    fn test_set_min_heap_writes_kilobytes() {
        let dir = fake_sysctls();
        ProcfsAdmin::new(dir.path()).set_min_heap_mb(64).unwrap();
        assert_eq!(sysctl(&dir, "min_free_kbytes"), "65536");
    }

    #[test]
    fn test_negative_growth_factor_rejected() {
        let dir = fake_sysctls();
        let err = ProcfsAdmin::new(dir.path())
            .set_heap_growth_factor(-1)
            .unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(!dir.path().join("sys/vm/watermark_scale_factor").exists());
    }

    #[test]
    fn test_force_collection_and_reset() {
        let dir = fake_sysctls();
        let admin = ProcfsAdmin::new(dir.path());
        admin.force_collection().unwrap();
        assert_eq!(sysctl(&dir, "drop_caches"), "3");
        admin.reset_tuning().unwrap();
        assert_eq!(sysctl(&dir, "drop_caches"), "2");
    }

    #[test]
    fn test_missing_sysctl_dir_names_operation() {
        let dir = tempdir().unwrap();
        let err = ProcfsAdmin::new(dir.path()).force_collection().unwrap_err();
        assert_eq!(err.operation(), Some("force_collection"));
    }

    #[test]
    fn test_cached_entry_count_reads_dentry_state() {
        let dir = tempdir().unwrap();
        let admin = ProcfsAdmin::new(dir.path());
        let err = admin.cached_entry_count().unwrap_err();
        assert_eq!(err.operation(), Some("cached_entry_count"));

        fs::create_dir_all(dir.path().join("sys/fs")).unwrap();
        let dentry_state = dir.path().join("sys/fs/dentry-state");
        fs::write(&dentry_state, "84213\t61002\t45\t0\t1377\t0\n").unwrap();
        assert_eq!(admin.cached_entry_count().unwrap(), 84213);

        fs::write(&dentry_state, "garbage\n").unwrap();
        assert!(matches!(
            admin.cached_entry_count(),
            Err(BenchError::Admin { op: "cached_entry_count", .. })
        ));
    }
}
