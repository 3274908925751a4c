use std::{error::Error, fmt};

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, CommsErr>;

/// Failures of a collective operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommsErr {
    /// The group was torn down while this member was blocked in a collective.
    Aborted,
    /// The members contributed buffers of different lengths.
    LengthMismatch { got: usize, expected: usize },
    /// The requested root is not a member of the group.
    InvalidRoot { root: usize, world_size: usize },
}

impl fmt::Display for CommsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsErr::Aborted => write!(f, "collective aborted, a peer left the group"),
            CommsErr::LengthMismatch { got, expected } => write!(
                f,
                "collective buffer length mismatch: got {got}, expected {expected}"
            ),
            CommsErr::InvalidRoot { root, world_size } => {
                write!(f, "invalid root {root} for a group of {world_size}")
            }
        }
    }
}

impl Error for CommsErr {}
