//! # salient
//!
//! Gradient-based saliency explanations for image classifiers, built on burn.
//!
//! salient answers "which pixels drove this prediction?":
//!
//! - **Core**: device descriptors, shapes, seeds and the [`ImageClassifier`](core::ImageClassifier) contract
//! - **Models**: a reference convolutional classifier with neutralizable batch norm and dropout
//! - **Explain**: input-gradient, input-output and intermediate-layer interpreters, and Smooth Gradients
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salient::prelude::*;
//! use burn_autodiff::Autodiff;
//! use burn_ndarray::NdArray;
//!
//! type B = Autodiff<NdArray>;
//!
//! let device = Default::default();
//! let model = SaliencyCnnConfig::new(3, 10).init::<B>(&device);
//!
//! let mut interpreter = SmoothGradInterpreter::new(model, false, ImageShape::default())?;
//! let config = SmoothGradConfig::default().with_n_samples(20).with_seed(7);
//! let map = interpreter.interpret(SmoothGradArgs::new(image).with_config(config))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU; enables `gpu` devices

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use salient_core as core;
pub use salient_explain as explain;
pub use salient_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use salient::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use salient_core::{
        DeviceKind, DeviceSpec, ImageClassifier, ImageShape, ModelMode, Seed,
    };

    // Models
    pub use salient_models::{ModelCheckpoint, SaliencyCnn, SaliencyCnnConfig};

    // Interpreters
    pub use salient_explain::{
        AttributionMap, AttributionMethod, GradientOf, ImageInput, InputGradientInterpreter,
        InputOutputInterpreter, IntermediateLayerInterpreter, Interpreter, OutputKind, SavePath,
        SmoothGradArgs, SmoothGradConfig, SmoothGradInterpreter,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use salient_core::{backend, AcceleratorRuntime, BatchShape, LayerObserver, Neutralize};
    pub use salient_explain::{
        predict_fn, ExplainError, GradientPrediction, HookRegistry, InputReader, InterpreterCore,
        LayerPrediction, Normalization, NpyReader, OutputPrediction, OverlayVisualizer,
        PredictFn, VisStyle, Visualizer,
    };
    pub use salient_models::{NeutralBatchNorm, NeutralDropout};
}
