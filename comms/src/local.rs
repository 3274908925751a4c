use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::{AbortableBarrier, Collective, CommsErr, ReduceOp, Result};

#[derive(Debug)]
struct Shared {
    world_size: usize,
    barrier: AbortableBarrier,
    slots: Mutex<Vec<Vec<f32>>>,
    outcome: Mutex<Result<Vec<f32>>>,
}

/// A group of replicas living in the same process, one per thread.
///
/// The group handle itself is not a member; it only lets its owner tear the
/// group down through `abort`.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates a new group of `world_size` members.
    ///
    /// # Arguments
    /// * `world_size` - The amount of replicas in the group, at least one.
    ///
    /// # Returns
    /// The group handle and its members, ordered by rank.
    pub fn new(world_size: usize) -> (Self, Vec<LocalMember>) {
        let world_size = world_size.max(1);
        let shared = Arc::new(Shared {
            world_size,
            barrier: AbortableBarrier::new(world_size),
            slots: Mutex::new(vec![Vec::new(); world_size]),
            outcome: Mutex::new(Ok(Vec::new())),
        });

        let members = (0..world_size)
            .map(|rank| LocalMember {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect();

        (Self { shared }, members)
    }

    /// Aborts every pending and future collective of this group.
    pub fn abort(&self) {
        debug!(world_size = self.shared.world_size; "aborting local group");
        self.shared.barrier.abort();
    }

    /// Returns the amount of members in the group.
    pub fn world_size(&self) -> usize {
        self.shared.world_size
    }
}

/// A single member of a `LocalGroup`.
#[derive(Debug)]
pub struct LocalMember {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalMember {
    /// Publishes `buf`, lets the generation's leader combine every slot with
    /// `combine` and copies the combined outcome back into `buf`.
    fn exchange<F>(&self, buf: &mut [f32], combine: F) -> Result<()>
    where
        F: FnOnce(&[Vec<f32>]) -> Result<Vec<f32>>,
    {
        let Shared {
            barrier,
            slots,
            outcome,
            ..
        } = &*self.shared;

        {
            let mut slots = slots.lock();
            let slot = &mut slots[self.rank];
            slot.clear();
            slot.extend_from_slice(buf);
        }

        if barrier.wait()?.is_leader() {
            let slots = slots.lock();
            *outcome.lock() = combine(slots.as_slice());
        }

        barrier.wait()?;

        let ret = match &*outcome.lock() {
            Ok(values) if values.len() == buf.len() => {
                buf.copy_from_slice(values);
                Ok(())
            }
            Ok(values) => Err(CommsErr::LengthMismatch {
                got: buf.len(),
                expected: values.len(),
            }),
            Err(e) => Err(e.clone()),
        };

        // The outcome is overwritten by the next collective's leader.
        barrier.wait()?;
        ret
    }
}

fn check_lengths(slots: &[Vec<f32>], expected: usize) -> Result<()> {
    match slots.iter().find(|slot| slot.len() != expected) {
        Some(slot) => Err(CommsErr::LengthMismatch {
            got: slot.len(),
            expected,
        }),
        None => Ok(()),
    }
}

impl Collective for LocalMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait().map(|_| ())
    }

    fn all_reduce(&self, buf: &mut [f32], op: ReduceOp) -> Result<()> {
        self.exchange(buf, |slots| {
            let (first, rest) = slots.split_first().ok_or(CommsErr::Aborted)?;
            check_lengths(rest, first.len())?;

            let mut acc = first.clone();
            for slot in rest {
                for (a, v) in acc.iter_mut().zip(slot) {
                    op.combine(a, *v);
                }
            }

            for a in acc.iter_mut() {
                op.finish(a, slots.len());
            }

            Ok(acc)
        })
    }

    fn broadcast(&self, buf: &mut [f32], root: usize) -> Result<()> {
        let world_size = self.shared.world_size;
        if root >= world_size {
            return Err(CommsErr::InvalidRoot { root, world_size });
        }

        self.exchange(buf, |slots| {
            let values = &slots[root];
            check_lengths(slots, values.len())?;
            Ok(values.clone())
        })
    }
}
