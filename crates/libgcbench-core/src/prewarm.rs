//! Setup phase: churn directory entries to warm the host's metadata caches

use std::path::PathBuf;

use tracing::{debug, info};

use crate::admin::AdminControl;
use crate::error::{BenchError, Result};
use crate::fs::HostFs;

/// Entries created per unit of scale
pub const ENTRIES_PER_SCALE: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrewarmConfig {
    /// Directory the entries are created in
    pub dir: PathBuf,
    pub scale: u64,
    /// Escape hatch: how many times to reset tuning and rewind halfway on
    /// reaching the last entry. 0 disables it.
    pub rewinds: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmStats {
    pub planned: u64,
    pub created: u64,
    pub rewinds_used: u32,
    /// Kernel's cached entry count once the loop finished, when available
    pub cached_entries: Option<u64>,
}

/// Create and delete `1000 * scale` entries one after another.
///
/// `on_progress` receives the percentage each time another tenth of the plan
/// is crossed.
pub fn run_prewarm(
    config: &PrewarmConfig,
    fs: &dyn HostFs,
    admin: &dyn AdminControl,
    mut on_progress: impl FnMut(u64),
) -> Result<PrewarmStats> {
    let planned = ENTRIES_PER_SCALE.saturating_mul(config.scale);
    let mut stats = PrewarmStats {
        planned,
        ..PrewarmStats::default()
    };
    if planned == 0 {
        return Ok(stats);
    }
    info!(entries = planned, dir = %config.dir.display(), "creating vnodes");

    let path = config
        .dir
        .join(format!("gcbench.prewarm.{}", std::process::id()));
    let tenth = planned / 10;
    let mut rewinds_left = config.rewinds;
    let mut next_mark = 1;
    let mut n = 0u64;

    while n < planned {
        let file = fs
            .create_new(&path)
            .map_err(|e| BenchError::setup("open", e))?;
        drop(file);
        fs.remove_file(&path)
            .map_err(|e| BenchError::setup("unlink", e))?;
        stats.created += 1;

        if rewinds_left > 0 && n == planned - 1 {
            admin.reset_tuning()?;
            n -= planned / 2;
            rewinds_left -= 1;
            stats.rewinds_used += 1;
            debug!(rewinds_left, "prewarm rewound");
        }

        let mark = n / tenth;
        if mark >= next_mark {
            on_progress(mark * 10);
            next_mark = mark + 1;
        }
        n += 1;
    }

    // Informational only; a host without the counter still ran the phase
    match admin.cached_entry_count() {
        Ok(count) => stats.cached_entries = Some(count),
        Err(e) => debug!(error = %e, "cached entry count unavailable"),
    }
    Ok(stats)
}
