//! Collective communication between cooperating training replicas.
//!
//! Every operation in this crate is a *collective*: all members of a group must
//! call the same operations in the same order, otherwise the group deadlocks.

mod barrier;
mod collective;
mod error;
mod local;
mod solo;

pub use barrier::{AbortableBarrier, BarrierWaitResult};
pub use collective::{Collective, ReduceOp};
pub use error::{CommsErr, Result};
pub use local::{LocalGroup, LocalMember};
pub use solo::Solo;
