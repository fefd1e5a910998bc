//! Layers with an explicit deterministic switch.
//!
//! Burn's [`BatchNorm`] and [`Dropout`] pick their behaviour from whether the
//! backend tracks gradients. Saliency needs gradients *and* inference
//! behaviour, so these wrappers carry the switch themselves and implement
//! [`Neutralize`].

use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig};
use burn::prelude::*;
use salient_core::{ModelMode, Neutralize};

/// 2D batch normalization that can be pinned to its running statistics.
#[derive(Module, Debug)]
pub struct NeutralBatchNorm<B: Backend> {
    inner: BatchNorm<B, 2>,
    epsilon: f64,
    training: bool,
    neutralized: bool,
}

impl<B: Backend> NeutralBatchNorm<B> {
    /// Create a batch norm over `num_features` channels.
    pub fn new(num_features: usize, device: &B::Device) -> Self {
        let config = BatchNormConfig::new(num_features);
        let epsilon = config.epsilon;
        Self {
            inner: config.init(device),
            epsilon,
            training: true,
            neutralized: false,
        }
    }

    /// Whether the forward pass normalizes with the running statistics.
    pub fn uses_running_stats(&self) -> bool {
        self.neutralized || !self.training
    }

    /// Follow the model mode.
    pub fn set_mode(&mut self, mode: ModelMode) {
        self.training = mode == ModelMode::Train;
    }

    /// Forward pass on `(batch, channels, height, width)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if !self.uses_running_stats() {
            return self.inner.forward(x);
        }

        let [_, channels, _, _] = x.dims();
        let mean = self.inner.running_mean.value().reshape([1, channels, 1, 1]);
        let var = self.inner.running_var.value().reshape([1, channels, 1, 1]);
        let gamma = self.inner.gamma.val().reshape([1, channels, 1, 1]);
        let beta = self.inner.beta.val().reshape([1, channels, 1, 1]);

        (x - mean) / (var + self.epsilon).sqrt() * gamma + beta
    }
}

impl<B: Backend> Neutralize for NeutralBatchNorm<B> {
    fn neutralize(&mut self) {
        self.neutralized = true;
    }
}

/// Dropout whose drop probability can be forced to zero.
#[derive(Module, Clone, Debug)]
pub struct NeutralDropout {
    inner: Dropout,
    prob: f64,
    training: bool,
}

impl NeutralDropout {
    /// Create a dropout layer with drop probability `prob`.
    pub fn new(prob: f64) -> Self {
        Self {
            inner: DropoutConfig::new(prob).init(),
            prob,
            training: true,
        }
    }

    /// Effective drop probability.
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Follow the model mode.
    pub fn set_mode(&mut self, mode: ModelMode) {
        self.training = mode == ModelMode::Train;
    }

    /// Whether the layer is in training mode.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Forward pass. Identity outside training or at zero probability.
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if !self.training || self.prob == 0.0 {
            return x;
        }
        self.inner.forward(x)
    }
}

impl Neutralize for NeutralDropout {
    fn neutralize(&mut self) {
        self.prob = 0.0;
        self.inner = DropoutConfig::new(0.0).init();
    }
}
