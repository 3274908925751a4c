use crate::Result;

/// The reduction applied by `Collective::all_reduce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
}

impl ReduceOp {
    /// Folds `value` into `acc` following this operation.
    ///
    /// `Mean` accumulates like `Sum`, the division happens once in `finish`.
    #[inline]
    pub fn combine(&self, acc: &mut f32, value: f32) {
        match self {
            ReduceOp::Sum | ReduceOp::Mean => *acc += value,
            ReduceOp::Max => *acc = acc.max(value),
        }
    }

    /// Finishes a reduction over `n` contributions.
    #[inline]
    pub fn finish(&self, acc: &mut f32, n: usize) {
        if let ReduceOp::Mean = self {
            *acc /= n as f32;
        }
    }
}

/// The distributed compute backend as seen by a single replica.
///
/// Implementations must deliver bitwise identical results to every member, that
/// is what lets replicas branch on reduced values without disagreeing.
pub trait Collective: Send + Sync {
    /// Returns this member's rank, in `0..world_size()`.
    fn rank(&self) -> usize;

    /// Returns the amount of members in the group.
    fn world_size(&self) -> usize;

    /// Blocks until every member of the group reaches this point.
    ///
    /// # Returns
    /// `CommsErr::Aborted` if the group was torn down while waiting.
    fn barrier(&self) -> Result<()>;

    /// Reduces `buf` element-wise across all members, in place.
    ///
    /// # Arguments
    /// * `buf` - This member's contribution, overwritten with the reduced values.
    /// * `op` - The reduction to apply.
    ///
    /// # Returns
    /// An error if the members contributed different lengths or the group was aborted.
    fn all_reduce(&self, buf: &mut [f32], op: ReduceOp) -> Result<()>;

    /// Overwrites `buf` on every member with the contents of `root`'s `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to send (on `root`) or to receive into (elsewhere).
    /// * `root` - The rank whose buffer is replicated.
    fn broadcast(&self, buf: &mut [f32], root: usize) -> Result<()>;
}

impl<C: Collective + ?Sized> Collective for Box<C> {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn barrier(&self) -> Result<()> {
        (**self).barrier()
    }

    fn all_reduce(&self, buf: &mut [f32], op: ReduceOp) -> Result<()> {
        (**self).all_reduce(buf, op)
    }

    fn broadcast(&self, buf: &mut [f32], root: usize) -> Result<()> {
        (**self).broadcast(buf, root)
    }
}
