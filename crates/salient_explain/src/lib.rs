//! # salient_explain
//!
//! Gradient-based explanations for image classifiers.
//!
//! This crate provides:
//! - The [`Interpreter`] contract and its shared state, [`InterpreterCore`]
//! - Base interpreters: [`InputGradientInterpreter`], [`InputOutputInterpreter`]
//!   and [`IntermediateLayerInterpreter`]
//! - [`SmoothGradInterpreter`], averaging input gradients over noisy inputs
//! - Scoped forward hooks ([`HookRegistry`])
//! - Input readers, save-path resolution and a visualizer

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod attribution;
mod error;
mod input_gradient;
mod input_output;
mod intermediate;
mod interpreter;
pub mod readers;
mod smooth_grad;
pub mod visualizer;

#[cfg(test)]
mod test_models;

pub use activation::{ActivationCapture, HookHandle, HookRegistry};
pub use attribution::{min_max_normalize, AttributionMap, AttributionMethod};
pub use error::{ExplainError, Result};
pub use input_gradient::{
    gradient_predict_fn, GradientOf, GradientPrediction, InputGradientInterpreter,
};
pub use input_output::{InputOutputInterpreter, OutputKind, OutputPrediction};
pub use intermediate::{IntermediateLayerInterpreter, LayerPrediction};
pub use interpreter::{predict_fn, Interpreter, InterpreterCore, PredictFn};
pub use readers::{ImageInput, InputReader, Normalization, NpyReader, PreparedInputs, SavePath};
pub use smooth_grad::{noise_stds, SmoothGradArgs, SmoothGradConfig, SmoothGradInterpreter};
pub use visualizer::{OverlayVisualizer, VisStyle, Visualizer};
