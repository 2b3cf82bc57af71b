//! The per-worker timed loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::workload::WorkerBody;

/// What one worker hands back to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: usize,
    /// Longest single iteration, in whole milliseconds
    pub max_latency_ms: u64,
    pub iterations: u64,
}

/// Run `body` until `duration` has elapsed, then publish the iteration count.
///
/// The clock is checked before every iteration, so the loop overshoots the
/// deadline by at most one iteration's cost. Only the slowest iteration is
/// kept.
pub fn run_timed(
    worker_id: usize,
    body: &mut dyn WorkerBody,
    duration: Duration,
    total: &AtomicU64,
) -> Result<WorkerResult> {
    let deadline = Instant::now().checked_add(duration).ok_or_else(|| {
        BenchError::Config(format!("deadline {:?} from now is out of range", duration))
    })?;
    let mut longest = Duration::ZERO;
    let mut count = 0u64;

    loop {
        let started = Instant::now();
        if started > deadline {
            break;
        }
        body.iterate()?;
        let took = started.elapsed();
        if took > longest {
            longest = took;
        }
        count += 1;
    }

    total.fetch_add(count, Ordering::Release);

    Ok(WorkerResult {
        worker_id,
        max_latency_ms: longest.as_millis() as u64,
        iterations: count,
    })
}
