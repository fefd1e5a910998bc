//! Interpreter base for algorithms that only look at model outputs.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use ndarray::{Array2, Array4};
use salient_core::tensor::{argmax_labels, batch_to_tensor, tensor_to_matrix};
use salient_core::{AcceleratorRuntime, BatchShape, DeviceSpec, ImageClassifier, ModelMode};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::interpreter::{predict_fn, Interpreter, InterpreterCore, PredictFn};

/// Which model output the predict function returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Raw logits.
    Logit,
    /// Softmax probabilities.
    #[default]
    Probability,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Logit => write!(f, "logit"),
            OutputKind::Probability => write!(f, "probability"),
        }
    }
}

impl FromStr for OutputKind {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "logit" => Ok(OutputKind::Logit),
            "probability" => Ok(OutputKind::Probability),
            other => Err(ExplainError::InvalidOption(format!(
                "output must be logit or probability; got `{other}`"
            ))),
        }
    }
}

/// Output of an input-output predict function.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPrediction {
    /// Logits or probabilities, `[B, n_classes]`.
    pub outputs: Array2<f32>,
    /// Given labels, or the predicted class per image.
    pub labels: Vec<usize>,
}

/// Base interpreter for perturbation algorithms that compare outputs.
pub struct InputOutputInterpreter<B, M> {
    core: InterpreterCore<M, OutputPrediction>,
    _backend: PhantomData<B>,
}

impl<B, M> InputOutputInterpreter<B, M>
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
    ) -> Result<OutputPrediction> {
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

impl<B, M> Interpreter for InputOutputInterpreter<B, M>
where
    B: AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    type BuildOptions = OutputKind;
    type Args = ();
    type Output = ();

    fn build_predict_fn(&mut self, rebuild: bool, output: OutputKind) -> Result<bool> {
        self.core.build_with(rebuild, |model, device| {
            device.fallback_for::<B>();
            let placed = B::place(device);
            model.set_mode(ModelMode::Eval);
            model.freeze();
            Ok(output_predict_fn::<B, M>(placed, output))
        })
    }
}

fn output_predict_fn<B, M>(device: B::Device, output: OutputKind) -> PredictFn<M, OutputPrediction>
where
    B: Backend,
    M: ImageClassifier<B> + 'static,
{
    predict_fn(
        move |model: &M, data: &Array4<f32>, labels: Option<&[usize]>| {
            let shape = BatchShape::from_dims(data.shape())?;
            shape.ensure_non_empty()?;
            if let Some(labels) = labels {
                shape.check_labels(labels)?;
            }

            let logits = model.forward(batch_to_tensor::<B>(data, &device));
            let probas = softmax(logits.clone(), 1);
            let labels = match labels {
                Some(labels) => labels.to_vec(),
                None => argmax_labels(probas.clone())?,
            };

            let outputs = match output {
                OutputKind::Logit => tensor_to_matrix(logits)?,
                OutputKind::Probability => tensor_to_matrix(probas)?,
            };
            Ok(OutputPrediction { outputs, labels })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::{AffineModel, ConstantModel};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn interpreter(logits: Vec<f32>) -> InputOutputInterpreter<TestBackend, ConstantModel> {
        InputOutputInterpreter::new(ConstantModel { logits }, "cpu", None).unwrap()
    }

    #[test]
    fn test_output_kind_parsing() {
        assert_eq!("logit".parse::<OutputKind>().unwrap(), OutputKind::Logit);
        assert!(matches!(
            "loss".parse::<OutputKind>(),
            Err(ExplainError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_logits_and_predicted_labels() {
        let mut interpreter = interpreter(vec![1.0, 3.0, 2.0]);
        interpreter.build_predict_fn(false, OutputKind::Logit).unwrap();

        let data = Array4::<f32>::zeros((2, 2, 2, 3));
        let out = interpreter.predict(&data, None).unwrap();
        assert_eq!(out.outputs.dim(), (2, 3));
        assert_eq!(out.outputs.row(1).to_vec(), vec![1.0, 3.0, 2.0]);
        assert_eq!(out.labels, vec![1, 1]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let mut interpreter = interpreter(vec![0.5, -1.0, 2.0, 0.0]);
        interpreter
            .build_predict_fn(false, OutputKind::Probability)
            .unwrap();

        let data = Array4::<f32>::zeros((1, 1, 1, 3));
        let out = interpreter.predict(&data, Some(&[0])).unwrap();
        let total: f32 = out.outputs.sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert_eq!(out.labels, vec![0]);
    }

    #[test]
    fn test_build_switches_to_eval() {
        let model = AffineModel::<TestBackend>::new(3, 2, &Default::default());
        let mut interpreter =
            InputOutputInterpreter::<TestBackend, _>::new(model, "gpu", Some(true)).unwrap();
        interpreter.build_predict_fn(false, OutputKind::default()).unwrap();
        assert_eq!(interpreter.model().mode(), ModelMode::Eval);
        assert!(interpreter.model().frozen);
        assert_eq!(interpreter.device(), DeviceSpec::cpu());
    }
}
