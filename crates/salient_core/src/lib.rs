//! # salient_core
//!
//! Core types and traits for salient, gradient-based saliency for image
//! classifiers.
//!
//! This crate provides:
//! - [`DeviceSpec`] and [`AcceleratorRuntime`] for device selection with cpu
//!   fallback
//! - [`ImageClassifier`] and [`Neutralize`], the model collaborator contract
//! - [`ImageShape`] / [`BatchShape`] shape metadata
//! - [`Seed`] for reproducible perturbation noise
//! - Host array ⇄ Burn tensor conversions
//! - Error types
//!
//! ## Layout Convention
//!
//! Image batches are channel-last, `(B, H, W, C)`:
//! - `B`: Batch size
//! - `H`, `W`: Image height and width
//! - `C`: Channels (3 for RGB)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod model_trait;
mod seed;
mod shape;
pub mod tensor;

pub use device::{AcceleratorRuntime, DeviceKind, DeviceSpec};
pub use error::{CoreError, Result};
pub use model_trait::{ImageClassifier, LayerObserver, ModelMode, Neutralize, NoopObserver};
pub use seed::{noise_rng, NoiseRng, Seed};
pub use shape::{BatchShape, ImageShape};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;

    pub use burn_autodiff::Autodiff;
}
