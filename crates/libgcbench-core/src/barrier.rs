//! Start-line barrier for the worker pool
//!
//! A counting rendezvous like `std::sync::Barrier`, except that misuse is an
//! error instead of a hang or a silent no-op: waiting on a destroyed barrier
//! and destroying a barrier while a generation is half-filled both fail.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{BenchError, Result};

/// Reusable rendezvous for a fixed number of participants
#[derive(Debug)]
pub struct StartBarrier {
    participants: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    destroyed: bool,
}

/// Outcome of one `wait` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// True for exactly one participant per generation: the last to arrive
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Generation this wait completed (1 for the first use)
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl StartBarrier {
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 {
            return Err(BenchError::Coordination(
                "barrier needs at least one participant".to_string(),
            ));
        }
        Ok(Self {
            participants,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Number of completed rendezvous so far
    pub fn generation(&self) -> Result<u64> {
        Ok(self.lock()?.generation)
    }

    /// Block until all participants of the current generation have arrived
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let mut state = self.lock()?;
        if state.destroyed {
            return Err(BenchError::Coordination(
                "wait on a destroyed barrier".to_string(),
            ));
        }

        state.arrived += 1;
        if state.arrived == self.participants {
            state.arrived = 0;
            state.generation += 1;
            let generation = state.generation;
            drop(state);
            self.released.notify_all();
            return Ok(BarrierWaitResult {
                leader: true,
                generation,
            });
        }

        let target = state.generation + 1;
        while state.generation < target && !state.destroyed {
            state = self
                .released
                .wait(state)
                .map_err(|_| poisoned())?;
        }
        if state.generation < target {
            return Err(BenchError::Coordination(
                "barrier destroyed while waiting".to_string(),
            ));
        }

        Ok(BarrierWaitResult {
            leader: false,
            generation: target,
        })
    }

    /// Retire the barrier. Fails if any participant is parked in `wait`.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.destroyed {
            return Err(BenchError::Coordination(
                "barrier destroyed twice".to_string(),
            ));
        }
        if state.arrived != 0 {
            return Err(BenchError::Coordination(format!(
                "barrier destroyed with {} of {} participants waiting",
                state.arrived, self.participants
            )));
        }
        state.destroyed = true;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BarrierState>> {
        self.state.lock().map_err(|_| poisoned())
    }
}

fn poisoned() -> BenchError {
    BenchError::Coordination("barrier state poisoned".to_string())
}
