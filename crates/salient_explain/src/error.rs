//! Error types for salient_explain.

use salient_core::CoreError;
use thiserror::Error;

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while building or running an interpreter.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// The interpreter does not provide this operation.
    #[error("{0} is not implemented by this interpreter")]
    NotImplemented(&'static str),

    /// The predict function was called before it was built.
    #[error("predict function has not been built")]
    NotBuilt,

    /// An option value is outside its allowed set or range.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A required option was not given.
    #[error("`{0}` has to be given")]
    MissingOption(&'static str),

    /// The target layer is not one of the model's named layers.
    #[error("target layer `{name}` does not exist in the model, available layers: {available:?}")]
    UnknownLayer {
        /// Requested name.
        name: String,
        /// Names the model reports.
        available: Vec<String>,
    },

    /// The model declared the layer but never reported its output.
    #[error("layer `{0}` produced no output during the forward pass")]
    LayerNotObserved(String),

    /// Save paths do not line up with the batch.
    #[error("Got {paths} save paths for a batch of {batch} images")]
    SavePathMismatch {
        /// Number of paths given.
        paths: usize,
        /// Batch size.
        batch: usize,
    },

    /// Core error (shapes, labels, devices).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failed to read a `.npy` file.
    #[error("Failed to read npy: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// Failed to write a `.npy` file.
    #[error("Failed to write npy: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
