//! Error kinds surfaced at the collector's API boundary.

use thiserror::Error;

/// Errors returned by the fallible operations on [`Collector`](crate::collector::Collector).
///
/// Unknown-address removals (`free`) are not modeled here — they are
/// silently ignored, not reported as errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// The system allocator returned null, and either the collector is
    /// paused or a fallback collection-and-retry also failed.
    #[error("allocation failed")]
    AllocationFailed,

    /// `resize` was called with a non-null address this collector does not
    /// track.
    #[error("invalid argument: address {0:#x} is not managed by this collector")]
    InvalidArgument(usize),
}

impl GcError {
    /// Build an [`InvalidArgument`](GcError::InvalidArgument) error for an
    /// untracked address.
    pub fn invalid_argument(address: *mut u8) -> Self {
        GcError::InvalidArgument(address as usize)
    }
}

/// Convenience alias used throughout the public API.
pub type GcResult<T> = Result<T, GcError>;
