//! The image classifier contract interpreters are written against.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Execution mode of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelMode {
    /// Training behaviour: batch statistics, active dropout.
    #[default]
    Train,
    /// Inference behaviour: running statistics, no dropout.
    Eval,
}

/// Capability to switch off training-time stochastic or batch-adaptive
/// behaviour while keeping the gradient path intact.
///
/// Batch norms switch to their running statistics and dropouts to a zero
/// drop probability. Layers without such behaviour keep the default no-op.
pub trait Neutralize {
    /// Make the layer behave deterministically.
    fn neutralize(&mut self) {}
}

/// Receives the outputs of named layers during a forward pass.
pub trait LayerObserver<B: Backend> {
    /// Called with the output of layer `name`.
    fn observe(&self, name: &str, output: &Tensor<B, 4>);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<B: Backend> LayerObserver<B> for NoopObserver {
    fn observe(&self, _name: &str, _output: &Tensor<B, 4>) {}
}

/// Trait for image classification models.
///
/// Inputs are channel-last batches `[batch, height, width, channels]` and the
/// output is the logits tensor `[batch, n_classes]`. Gradients with respect to
/// the input come from running the model on an autodiff backend.
pub trait ImageClassifier<B: Backend> {
    /// Forward pass returning logits.
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_observed(x, &NoopObserver)
    }

    /// Forward pass that reports the output of every named layer to
    /// `observer`.
    fn forward_observed(&self, x: Tensor<B, 4>, observer: &dyn LayerObserver<B>) -> Tensor<B, 2>;

    /// Names of the layers reported by [`ImageClassifier::forward_observed`].
    fn layer_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Switch between training and inference behaviour.
    fn set_mode(&mut self, _mode: ModelMode) {}

    /// Current mode.
    fn mode(&self) -> ModelMode {
        ModelMode::Train
    }

    /// Neutralize every layer that supports it.
    fn neutralize(&mut self) {}

    /// Stop tracking parameter gradients.
    ///
    /// On an autodiff backend a forward pass then records only the operations
    /// that depend on a tracked input, so gradient-free passes build no graph.
    fn freeze(&mut self) {}
}
