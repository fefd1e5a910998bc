//! Interpreters driven by gradients of a class score with respect to the
//! input batch.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array4;
use salient_core::tensor::{argmax_labels, batch_to_tensor, one_hot, tensor_to_batch};
use salient_core::{AcceleratorRuntime, BatchShape, DeviceSpec, ImageClassifier, ModelMode};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::interpreter::{predict_fn, Interpreter, InterpreterCore, PredictFn};

/// Scalar whose input gradient is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientOf {
    /// Cross-entropy against the labels, summed over the batch.
    Loss,
    /// Logit of the label class.
    Logit,
    /// Softmax probability of the label class.
    #[default]
    Probability,
}

impl fmt::Display for GradientOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradientOf::Loss => write!(f, "loss"),
            GradientOf::Logit => write!(f, "logit"),
            GradientOf::Probability => write!(f, "probability"),
        }
    }
}

impl FromStr for GradientOf {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "loss" => Ok(GradientOf::Loss),
            "logit" => Ok(GradientOf::Logit),
            "probability" => Ok(GradientOf::Probability),
            other => Err(ExplainError::InvalidOption(format!(
                "gradient_of must be one of loss, logit, probability; got `{other}`"
            ))),
        }
    }
}

/// Output of a gradient predict function.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientPrediction {
    /// Gradient of the target with respect to the input, shaped like it.
    pub gradients: Array4<f32>,
    /// Labels the gradient was taken for.
    pub labels: Vec<usize>,
}

/// Base interpreter for input-gradient algorithms.
///
/// Building keeps the model in training mode, so the backward pass is
/// recorded, and neutralizes it so batch norms use their running statistics
/// and dropouts drop nothing.
pub struct InputGradientInterpreter<B, M> {
    core: InterpreterCore<M, GradientPrediction>,
    _backend: PhantomData<B>,
}

impl<B, M> InputGradientInterpreter<B, M>
where
    B: AutodiffBackend + AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    /// Bind `model` to `device` (`cpu`, `gpu` or `gpu:N`).
    ///
    /// See [`InterpreterCore::new`] for the legacy `use_cuda` switch.
    pub fn new(model: M, device: &str, use_cuda: Option<bool>) -> Result<Self> {
        Ok(Self {
            core: InterpreterCore::new(model, device, use_cuda)?,
            _backend: PhantomData,
        })
    }

    /// Use `predict_fn` instead of building one.
    #[must_use]
    pub fn with_predict_fn(mut self, predict_fn: PredictFn<M, GradientPrediction>) -> Self {
        self.core.set_predict_fn(predict_fn);
        self
    }

    /// Replace the cached predict function.
    pub fn set_predict_fn(&mut self, predict_fn: PredictFn<M, GradientPrediction>) {
        self.core.set_predict_fn(predict_fn);
    }

    /// Run the cached predict function.
    pub fn predict(
        &mut self,
        data: &Array4<f32>,
        labels: Option<&[usize]>,
    ) -> Result<GradientPrediction> {
        self.core.predict(data, labels)
    }

    /// Current device descriptor.
    pub fn device(&self) -> DeviceSpec {
        self.core.device()
    }

    /// Whether a predict function is cached.
    pub fn is_built(&self) -> bool {
        self.core.is_built()
    }

    /// The bound model.
    pub fn model(&self) -> &M {
        self.core.model()
    }

    /// Release the model.
    pub fn into_model(self) -> M {
        self.core.into_model()
    }
}

impl<B, M> Interpreter for InputGradientInterpreter<B, M>
where
    B: AutodiffBackend + AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    type BuildOptions = GradientOf;
    type Args = ();
    type Output = ();

    fn build_predict_fn(&mut self, rebuild: bool, gradient_of: GradientOf) -> Result<bool> {
        self.core.build_with(rebuild, |model, device| {
            device.fallback_for::<B>();
            let placed = B::place(device);

            model.set_mode(ModelMode::Train);
            model.neutralize();

            Ok(gradient_predict_fn::<B, M>(placed, gradient_of))
        })
    }
}

/// Predict function differentiating `gradient_of` with respect to the input.
pub fn gradient_predict_fn<B, M>(
    device: B::Device,
    gradient_of: GradientOf,
) -> PredictFn<M, GradientPrediction>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + 'static,
{
    predict_fn(
        move |model: &M, data: &Array4<f32>, labels: Option<&[usize]>| {
            let shape = BatchShape::from_dims(data.shape())?;
            shape.ensure_non_empty()?;
            if let Some(labels) = labels {
                shape.check_labels(labels)?;
            }

            let x = batch_to_tensor::<B>(data, &device).require_grad();
            let logits = model.forward(x.clone());
            let [_, n_classes] = logits.dims();
            let probas = softmax(logits.clone(), 1);

            let labels = match labels {
                Some(labels) => labels.to_vec(),
                None => argmax_labels(probas.clone())?,
            };
            let onehot = one_hot::<B>(&labels, n_classes, &device)?;

            let target = match gradient_of {
                GradientOf::Loss => -(log_softmax(logits, 1) * onehot).sum(),
                GradientOf::Logit => (logits * onehot).sum(),
                GradientOf::Probability => (probas * onehot).sum(),
            };

            let grads = target.backward();
            let gradients = match x.grad(&grads) {
                Some(grad) => tensor_to_batch(grad)?,
                None => Array4::zeros(data.raw_dim()),
            };

            Ok(GradientPrediction { gradients, labels })
        },
    )
}
