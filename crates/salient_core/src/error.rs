//! Error types for salient_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in salient_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Device string with an unknown category prefix or a malformed index.
    #[error("Invalid device `{0}`: expected `cpu` or `gpu[:N]`")]
    InvalidDevice(String),

    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Dimension error.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// Label count does not line up with the batch.
    #[error("Label mismatch: {labels} labels for a batch of {batch}")]
    LabelMismatch {
        /// Number of labels supplied.
        labels: usize,
        /// Batch size.
        batch: usize,
    },

    /// Label outside the model's class range.
    #[error("Label {label} out of range for {n_classes} classes")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// Number of classes produced by the model.
        n_classes: usize,
    },

    /// Tensor data could not be read back to the host.
    #[error("Tensor data error: {0}")]
    DataError(String),
}
