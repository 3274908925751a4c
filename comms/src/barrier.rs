use parking_lot::{Condvar, Mutex};

use crate::{CommsErr, Result};

/// The outcome of a successful `AbortableBarrier::wait`.
#[derive(Debug, Clone, Copy)]
pub struct BarrierWaitResult {
    leader: bool,
}

impl BarrierWaitResult {
    /// Returns true for exactly one of the members released by a generation:
    /// the last one to arrive.
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// A reusable barrier that can be torn down.
///
/// Behaves like `std::sync::Barrier` but `abort` releases every blocked member
/// with an error, so a failing replica cannot leave its peers waiting forever.
#[derive(Debug)]
pub struct AbortableBarrier {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl AbortableBarrier {
    /// Creates a new `AbortableBarrier`.
    ///
    /// # Arguments
    /// * `size` - The amount of members to wait on before releasing them.
    ///
    /// # Returns
    /// A new `AbortableBarrier` instance.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Blocks until `size` members have called `wait` in the current generation.
    ///
    /// # Returns
    /// The wait result, or `CommsErr::Aborted` if the barrier was torn down.
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(CommsErr::Aborted);
        }

        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return Ok(BarrierWaitResult { leader: true });
        }

        let generation = state.generation;
        while generation == state.generation && !state.aborted {
            self.cvar.wait(&mut state);
        }

        if generation == state.generation {
            return Err(CommsErr::Aborted);
        }

        Ok(BarrierWaitResult { leader: false })
    }

    /// Tears the barrier down, waking every blocked member with an error.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.cvar.notify_all();
    }

    /// Returns true once `abort` was called.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn exactly_one_leader_per_generation() {
        let barrier = Arc::new(AbortableBarrier::new(4));

        let leaders: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    s.spawn(move || {
                        (0..3)
                            .filter(|_| barrier.wait().unwrap().is_leader())
                            .count()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(leaders, 3);
    }

    #[test]
    fn abort_releases_blocked_members() {
        let barrier = Arc::new(AbortableBarrier::new(2));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };

        barrier.abort();

        assert_eq!(waiter.join().unwrap().unwrap_err(), CommsErr::Aborted);
        assert_eq!(barrier.wait().unwrap_err(), CommsErr::Aborted);
    }
}
