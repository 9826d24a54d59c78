// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
use std::fmt;

mod multitry_fm;
mod refinement_core;
mod statistics;

pub use multitry_fm::MultitryKwayFm;
pub use statistics::RefinementStatistics;

/// Common errors thrown by algorithms.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Input sets don't have matching lengths.
    InputLenMismatch { expected: usize, actual: usize },

    /// A partition refers to a block id outside `[0, k)`.
    BlockOutOfRange { block: usize, num_blocks: usize },

    /// The worker pool could not be constructed.
    ThreadPoolBuild(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InputLenMismatch { expected, actual } => write!(
                f,
                "input sets don't have the same length (expected {expected} items, got {actual})",
            ),
            Error::BlockOutOfRange { block, num_blocks } => write!(
                f,
                "partition refers to block {block} but the configuration has only {num_blocks} blocks",
            ),
            Error::ThreadPoolBuild(reason) => write!(f, "failed to build worker pool: {reason}"),
        }
    }
}

impl std::error::Error for Error {}
