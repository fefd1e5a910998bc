//! A compact convolutional image classifier.
//!
//! Small enough to run gradient attribution on the CPU in tests, yet it has
//! the layers that make naive input gradients non-deterministic (batch norm
//! and dropout), so it exercises neutralization end to end.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use salient_core::{ImageClassifier, LayerObserver, ModelMode, Neutralize};
use serde::{Deserialize, Serialize};

use crate::layers::{NeutralBatchNorm, NeutralDropout};

/// Configuration for [`SaliencyCnn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyCnnConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Filters in the first block; the second block doubles it.
    pub n_filters: usize,
    /// Square kernel size (odd, padding keeps the spatial size).
    pub kernel_size: usize,
    /// Dropout probability before the classifier head.
    pub dropout: f64,
}

impl Default for SaliencyCnnConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            n_classes: 10,
            n_filters: 16,
            kernel_size: 3,
            dropout: 0.25,
        }
    }
}

impl SaliencyCnnConfig {
    /// Create a new config with specified dimensions.
    pub fn new(in_channels: usize, n_classes: usize) -> Self {
        Self {
            in_channels,
            n_classes,
            ..Default::default()
        }
    }

    /// Set the number of filters of the first block.
    #[must_use]
    pub fn with_filters(mut self, n_filters: usize) -> Self {
        self.n_filters = n_filters;
        self
    }

    /// Set the dropout probability.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SaliencyCnn<B> {
        SaliencyCnn::new(self.clone(), device)
    }
}

/// Conv2d -> BatchNorm -> ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: NeutralBatchNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .with_bias(false)
            .init(device);
        let bn = NeutralBatchNorm::new(out_channels, device);

        Self { conv, bn }
    }

    /// Forward pass on `(batch, channels, height, width)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(x);
        let out = self.bn.forward(out);
        Relu::new().forward(out)
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.bn.set_mode(mode);
    }

    /// The block's normalization layer.
    pub fn norm(&self) -> &NeutralBatchNorm<B> {
        &self.bn
    }
}

impl<B: Backend> Neutralize for ConvBlock<B> {
    fn neutralize(&mut self) {
        self.bn.neutralize();
    }
}

/// Two conv blocks, global average pooling, dropout and a linear head.
///
/// Inputs are channel-last `(batch, height, width, channels)`; the model
/// permutes them to channel-first internally. The outputs of `block1` and
/// `block2` are reported to layer observers.
///
/// # Example
///
/// ```rust,ignore
/// use salient_models::SaliencyCnnConfig;
///
/// let model = SaliencyCnnConfig::new(3, 10).init::<Autodiff<NdArray>>(&device);
/// let logits = model.forward(Tensor::zeros([2, 32, 32, 3], &device));
/// // logits shape: [2, 10]
/// ```
#[derive(Module, Debug)]
pub struct SaliencyCnn<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    gap: AdaptiveAvgPool2d,
    dropout: NeutralDropout,
    fc: Linear<B>,
}

impl<B: Backend> SaliencyCnn<B> {
    /// Layer names reported through [`ImageClassifier::forward_observed`].
    pub const LAYERS: [&'static str; 2] = ["block1", "block2"];

    /// Create a new model.
    pub fn new(config: SaliencyCnnConfig, device: &B::Device) -> Self {
        let wide = config.n_filters * 2;
        Self {
            block1: ConvBlock::new(config.in_channels, config.n_filters, config.kernel_size, device),
            block2: ConvBlock::new(config.n_filters, wide, config.kernel_size, device),
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: NeutralDropout::new(config.dropout),
            fc: LinearConfig::new(wide, config.n_classes).init(device),
        }
    }

    /// The conv blocks, in forward order.
    pub fn blocks(&self) -> [&ConvBlock<B>; 2] {
        [&self.block1, &self.block2]
    }

    /// The dropout layer in front of the head.
    pub fn dropout(&self) -> &NeutralDropout {
        &self.dropout
    }
}

impl<B: Backend> ImageClassifier<B> for SaliencyCnn<B> {
    fn forward_observed(&self, x: Tensor<B, 4>, observer: &dyn LayerObserver<B>) -> Tensor<B, 2> {
        let x = x.permute([0, 3, 1, 2]);

        let out = self.block1.forward(x);
        observer.observe("block1", &out);
        let out = self.block2.forward(out);
        observer.observe("block2", &out);

        let out = self.gap.forward(out);
        let [batch, channels, _, _] = out.dims();
        let out = out.reshape([batch, channels]);
        let out = self.dropout.forward(out);
        self.fc.forward(out)
    }

    fn layer_names(&self) -> Vec<String> {
        Self::LAYERS.iter().map(|name| name.to_string()).collect()
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.block1.set_mode(mode);
        self.block2.set_mode(mode);
        self.dropout.set_mode(mode);
    }

    fn mode(&self) -> ModelMode {
        if self.dropout.is_training() {
            ModelMode::Train
        } else {
            ModelMode::Eval
        }
    }

    fn neutralize(&mut self) {
        self.block1.neutralize();
        self.block2.neutralize();
        self.dropout.neutralize();
    }

    fn freeze(&mut self) {
        *self = self.clone().no_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_saliency_cnn_forward_shape() {
        let device = Default::default();
        let model = SaliencyCnnConfig::new(3, 5)
            .with_filters(4)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::random(
            [2, 8, 8, 3],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let logits = model.forward(x);
        assert_eq!(logits.dims(), [2, 5]);
    }

    #[test]
    fn test_neutralize_reaches_every_layer() {
        let device = Default::default();
        let mut model = SaliencyCnnConfig::new(3, 4)
            .with_filters(2)
            .init::<TestBackend>(&device);

        assert_eq!(model.mode(), ModelMode::Train);
        model.neutralize();

        assert!(model.blocks().iter().all(|b| b.norm().uses_running_stats()));
        assert_eq!(model.dropout().prob(), 0.0);
        assert_eq!(model.mode(), ModelMode::Train);
    }

    #[test]
    fn test_eval_mode() {
        let device = Default::default();
        let mut model = SaliencyCnnConfig::default()
            .with_filters(2)
            .init::<TestBackend>(&device);
        model.set_mode(ModelMode::Eval);
        assert_eq!(model.mode(), ModelMode::Eval);
        assert!(model.blocks().iter().all(|b| b.norm().uses_running_stats()));
    }

    #[test]
    fn test_freeze_stops_parameter_tracking() {
        let device = Default::default();
        let mut model = SaliencyCnnConfig::new(3, 4)
            .with_filters(2)
            .init::<TestBackend>(&device);
        assert!(model.fc.weight.val().is_require_grad());

        model.freeze();
        assert!(!model.fc.weight.val().is_require_grad());
        assert!(!model.block1.conv.weight.val().is_require_grad());

        let logits = model.forward(Tensor::zeros([1, 4, 4, 3], &device));
        assert_eq!(logits.dims(), [1, 4]);
    }

    #[test]
    fn test_layer_names() {
        let device = Default::default();
        let model = SaliencyCnnConfig::default()
            .with_filters(2)
            .init::<TestBackend>(&device);
        assert_eq!(model.layer_names(), vec!["block1", "block2"]);
    }
}
