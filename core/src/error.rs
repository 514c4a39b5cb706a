//! Error types for the localization filter.

use thiserror::Error;

/// Errors raised by filter operations.
///
/// Every error is surfaced to the caller of the failing operation; the filter
/// performs no internal retry or recovery. Reinitializing after divergence is
/// caller policy, not filter policy.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// A filter operation other than `initialize` was invoked before the
    /// particle set was initialized.
    #[error("particle filter has not been initialized")]
    NotInitialized,

    /// `update_weights` was invoked with a map containing no landmarks;
    /// nearest-neighbor association is undefined without candidates.
    #[error("landmark map contains no landmarks")]
    EmptyLandmarkMap,

    /// `resample` was invoked while every particle weight is zero, or while
    /// some weight is negative or non-finite; the multinomial draw is
    /// undefined over such a weight vector.
    #[error("particle weights are degenerate (all zero, negative, or non-finite)")]
    DegenerateWeights,
}

pub type Result<T> = std::result::Result<T, FilterError>;
