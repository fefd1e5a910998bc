//! Convolutional image classifiers.

mod saliency;

pub use saliency::{ConvBlock, SaliencyCnn, SaliencyCnnConfig};
