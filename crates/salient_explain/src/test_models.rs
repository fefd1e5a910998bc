//! Small classifiers with known gradients for unit tests.

use burn::prelude::*;
use salient_core::{ImageClassifier, LayerObserver, ModelMode};

/// Dyadic weight for flat input index `d` and class `k`; sums of these are
/// exact in f32.
pub fn weight(d: usize, k: usize) -> f32 {
    ((d + 3 * k) % 8) as f32 * 0.25 - 1.0
}

/// `logits = flatten(x) @ W`, so the logit gradient for class `k` is
/// column `k` of `W` reshaped to the image.
pub struct AffineModel<B: Backend> {
    weights: Tensor<B, 2>,
    mode: ModelMode,
    pub neutralized: bool,
    pub frozen: bool,
}

impl<B: Backend> AffineModel<B> {
    pub fn new(features: usize, n_classes: usize, device: &B::Device) -> Self {
        let mut values = Vec::with_capacity(features * n_classes);
        for d in 0..features {
            for k in 0..n_classes {
                values.push(weight(d, k));
            }
        }
        Self {
            weights: Tensor::from_data(TensorData::new(values, [features, n_classes]), device),
            mode: ModelMode::Train,
            neutralized: false,
            frozen: false,
        }
    }
}

impl<B: Backend> ImageClassifier<B> for AffineModel<B> {
    fn forward_observed(&self, x: Tensor<B, 4>, observer: &dyn LayerObserver<B>) -> Tensor<B, 2> {
        observer.observe("input", &x);
        let [batch, height, width, channels] = x.dims();
        let flat = x.reshape([batch, height * width * channels]);
        flat.matmul(self.weights.clone())
    }

    fn layer_names(&self) -> Vec<String> {
        vec!["input".to_string()]
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn neutralize(&mut self) {
        self.neutralized = true;
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }
}

/// Ignores its input and always predicts the same logits.
pub struct ConstantModel {
    pub logits: Vec<f32>,
}

impl<B: Backend> ImageClassifier<B> for ConstantModel {
    fn forward_observed(&self, x: Tensor<B, 4>, _observer: &dyn LayerObserver<B>) -> Tensor<B, 2> {
        let [batch, _, _, _] = x.dims();
        let n_classes = self.logits.len();
        let values: Vec<f32> = (0..batch).flat_map(|_| self.logits.iter().copied()).collect();
        Tensor::from_data(TensorData::new(values, [batch, n_classes]), &x.device())
    }
}
