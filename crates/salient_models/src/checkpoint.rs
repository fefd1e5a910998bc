//! Saving and loading model weights with Burn's record system.
//!
//! Weights are stored as named MessagePack (`*.mpk`) at full precision.
//!
//! # Example
//!
//! ```rust,ignore
//! use salient_models::checkpoint::ModelCheckpoint;
//! use salient_models::SaliencyCnnConfig;
//!
//! let model = SaliencyCnnConfig::new(3, 10).init::<NdArray>(&device);
//! model.save_checkpoint("model.mpk")?;
//!
//! let fresh = SaliencyCnnConfig::new(3, 10).init::<NdArray>(&device);
//! let restored = fresh.load_checkpoint("model.mpk", &device)?;
//! ```

use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),
}

/// Save a model's weights to `path`.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), path.to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))?;

    tracing::debug!(path = %path.display(), "saved checkpoint");
    Ok(())
}

/// Load a record saved with [`save_model`].
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    // The recorder always reads `<stem>.mpk`.
    let file = path.with_extension("mpk");
    if !file.exists() {
        return Err(CheckpointError::Load(format!(
            "{} does not exist",
            file.display()
        )));
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load weights from a checkpoint into a copy of this model.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(path, device)?;
        Ok(self.clone().load_record(record))
    }
}

impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SaliencyCnnConfig;
    use burn_ndarray::NdArray;
    use salient_core::ImageClassifier;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_roundtrip_preserves_outputs() {
        let device = Default::default();
        let config = SaliencyCnnConfig::new(3, 4).with_filters(2).with_dropout(0.0);
        let model = config.init::<TestBackend>(&device);

        let path = std::env::temp_dir().join(format!(
            "salient_checkpoint_{}.mpk",
            std::process::id()
        ));
        model.save_checkpoint(&path).unwrap();

        let restored = config
            .init::<TestBackend>(&device)
            .load_checkpoint(&path, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::ones([1, 4, 4, 3], &device);
        let before: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = restored.forward(x).into_data().to_vec().unwrap();
        assert_eq!(before, after);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let device = Default::default();
        let model = SaliencyCnnConfig::default()
            .with_filters(2)
            .init::<TestBackend>(&device);
        let err = model
            .load_checkpoint("/nonexistent/salient/model.mpk", &device)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Load(_)));
    }
}
