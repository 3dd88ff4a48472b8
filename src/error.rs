//! Error taxonomy shared by all containers.

use thiserror::Error;

/// Failure reported by a container operation.
///
/// A failed operation leaves the container exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Backing storage could not be obtained.
    #[error("allocation failed: requested {requested} slots")]
    AllocationFailure {
        /// Number of slots (buckets or elements) that were requested
        requested: usize,
    },

    /// The key is not present.
    #[error("key not found")]
    NotFound,

    /// The index does not address a live element.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The rejected index
        index: usize,
        /// Length of the container at the time of the call
        len: usize,
    },

    /// A construction parameter was rejected; no container was produced.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A sorted-only operation was attempted on unsorted data.
    #[error("container is not sorted")]
    NotSorted,
}

impl ContainerError {
    pub(crate) fn allocation(requested: usize) -> Self {
        log::warn!("allocation of {} slots failed", requested);
        Self::AllocationFailure { requested }
    }

    pub(crate) fn out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContainerError>;
