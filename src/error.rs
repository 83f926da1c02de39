//! Errors returned by the PPRF protocols.
use thiserror::Error;

use crate::channel;

/// Any error a protocol invocation can fail with.
///
/// Errors are returned to the caller of the operation that failed. No partial
/// outputs are produced and nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameters, detected before any message is exchanged.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The base COT does not hold enough precomputed correlations.
    #[error("insufficient precomputed OT material: {required} required, {available} available")]
    PrecomputeInsufficient {
        /// Number of correlations the invocation consumes.
        required: usize,
        /// Number of correlations the base COT holds.
        available: usize,
    },
    /// The protocol was aborted.
    #[error(transparent)]
    Abort(#[from] Abort),
}

/// Invalid parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The bound `N` must be at least 1.
    #[error("bound must be at least 1")]
    InvalidBound,
    /// The tree for the bound would exceed the maximal height.
    #[error("bound {bound} exceeds 2^{max_height}")]
    BoundTooLarge {
        /// The requested bound.
        bound: usize,
        /// The maximal supported tree height.
        max_height: u32,
    },
    /// The punctured index is not in `[0, bound)`.
    #[error("punctured index {alpha} is out of range for bound {bound}")]
    AlphaOutOfRange {
        /// The punctured index.
        alpha: usize,
        /// The bound of the instance.
        bound: usize,
    },
    /// The base COT uses a different Δ than the sender.
    #[error("base COT uses a different delta than the sender")]
    DeltaMismatch,
    /// A batch must contain at least one instance.
    #[error("batch must contain at least one instance")]
    EmptyBatch,
    /// A multi-point position lies outside of its bin.
    #[error("position {position} is not in bin {bin} of size {bin_size}")]
    IrregularNoise {
        /// The offending position.
        position: usize,
        /// The bin it should lie in.
        bin: usize,
        /// Size of every bin.
        bin_size: usize,
    },
}

/// Reasons for aborting a protocol run.
#[derive(Debug, Error)]
pub enum Abort {
    /// Transport failure, malformed payload, unexpected header or wrong length.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The consistency check of an instance failed.
    #[error("consistency check failed for instance {instance}")]
    ConsistencyCheckFailed {
        /// Index of the failing instance in the batch.
        instance: usize,
    },
    /// The base OT received invalid data from the other party.
    #[error("base OT received invalid data")]
    InvalidOtData,
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Error::Abort(Abort::Channel(e))
    }
}
