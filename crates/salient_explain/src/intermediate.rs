//! Interpreter base for algorithms that read an intermediate feature map.

use std::marker::PhantomData;

use burn::tensor::activation::softmax;
use ndarray::{Array2, Array4};
use salient_core::tensor::{argmax_labels, batch_to_tensor, tensor_to_batch, tensor_to_matrix};
use salient_core::{AcceleratorRuntime, BatchShape, DeviceSpec, ImageClassifier, ModelMode};

use crate::activation::HookRegistry;
use crate::error::{ExplainError, Result};
use crate::interpreter::{predict_fn, Interpreter, InterpreterCore};

/// Output of an intermediate-layer predict function.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPrediction {
    /// Output of the target layer, in the layout the model reports it.
    pub feature_map: Array4<f32>,
    /// Softmax probabilities, `[B, n_classes]`.
    pub probabilities: Array2<f32>,
    /// Given labels, or the predicted class per image.
    pub labels: Vec<usize>,
}

/// Base interpreter for feature-map algorithms such as Score-CAM.
pub struct IntermediateLayerInterpreter<B, M> {
    core: InterpreterCore<M, LayerPrediction>,
    _backend: PhantomData<B>,
}

impl<B, M> IntermediateLayerInterpreter<B, M>
where
    B: AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    /// Bind `model` to `device`.
    pub fn new(model: M, device: &str, use_cuda: Option<bool>) -> Result<Self> {
        Ok(Self {
            core: InterpreterCore::new(model, device, use_cuda)?,
            _backend: PhantomData,
        })
    }

    /// Run the cached predict function.
    pub fn predict(
        &mut self,
        data: &Array4<f32>,
        labels: Option<&[usize]>,
    ) -> Result<LayerPrediction> {
        self.core.predict(data, labels)
    }

    /// Current device descriptor.
    pub fn device(&self) -> DeviceSpec {
        self.core.device()
    }

    /// The bound model.
    pub fn model(&self) -> &M {
        self.core.model()
    }
}

impl<B, M> Interpreter for IntermediateLayerInterpreter<B, M>
where
    B: AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    /// Name of the target layer.
    type BuildOptions = Option<String>;
    type Args = ();
    type Output = ();

    fn build_predict_fn(&mut self, rebuild: bool, target_layer: Option<String>) -> Result<bool> {
        self.core.build_with(rebuild, |model, device| {
            let target_layer = target_layer.ok_or(ExplainError::MissingOption("target_layer"))?;

            device.fallback_for::<B>();
            let placed = B::place(device);
            model.set_mode(ModelMode::Eval);
            model.freeze();

            Ok(predict_fn(
                move |model: &M, data: &Array4<f32>, labels: Option<&[usize]>| {
                    let shape = BatchShape::from_dims(data.shape())?;
                    shape.ensure_non_empty()?;
                    if let Some(labels) = labels {
                        shape.check_labels(labels)?;
                    }

                    let registry = HookRegistry::new(model.layer_names());
                    let handle = registry.register(&target_layer)?;
                    let x = batch_to_tensor::<B>(data, &placed);
                    let logits = model.forward_observed(x, &registry);
                    handle.remove();

                    let feature_map = registry
                        .take(&target_layer)
                        .ok_or_else(|| ExplainError::LayerNotObserved(target_layer.clone()))?;

                    let probas = softmax(logits, 1);
                    let labels = match labels {
                        Some(labels) => labels.to_vec(),
                        None => argmax_labels(probas.clone())?,
                    };

                    Ok(LayerPrediction {
                        feature_map: tensor_to_batch(feature_map.detach())?,
                        probabilities: tensor_to_matrix(probas)?,
                        labels,
                    })
                },
            ))
        })
    }
}
