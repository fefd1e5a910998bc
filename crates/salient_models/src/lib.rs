//! # salient_models
//!
//! Image classifiers for salient.
//!
//! - [`SaliencyCnn`] - a small conv net with batch norm and dropout
//! - [`NeutralBatchNorm`] / [`NeutralDropout`] - layers that implement
//!   [`salient_core::Neutralize`]
//! - [`checkpoint`] - weight save/load

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
pub mod layers;

pub use checkpoint::{load_record, save_model, CheckpointError, ModelCheckpoint};
pub use cnn::*;
pub use layers::{NeutralBatchNorm, NeutralDropout};
