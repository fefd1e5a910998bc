//! Smooth Gradients.
//!
//! Input gradients are noisy: small local variations in the partial
//! derivatives dominate the map. SmoothGrad adds Gaussian noise to the input
//! many times and averages the gradients of the noisy copies.
//!
//! Reference: Smilkov et al., "SmoothGrad: removing noise by adding noise",
//! 2017. <http://arxiv.org/abs/1706.03825>

use burn::tensor::backend::AutodiffBackend;
use ndarray::{Array4, Axis};
use rand_distr::{Distribution, Normal};
use salient_core::{
    noise_rng, AcceleratorRuntime, BatchShape, CoreError, DeviceSpec, ImageClassifier,
    ImageShape, Seed,
};
use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionMap, AttributionMethod};
use crate::error::{ExplainError, Result};
use crate::input_gradient::{GradientOf, GradientPrediction, InputGradientInterpreter};
use crate::interpreter::{Interpreter, PredictFn};
use crate::readers::{ImageInput, InputReader, NpyReader, SavePath};
use crate::visualizer::{OverlayVisualizer, VisStyle, Visualizer};

/// Sampling options for [`SmoothGradInterpreter::interpret`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothGradConfig {
    /// Noise level. The noise std of an image is
    /// `noise_amount * (max(image) - min(image))`.
    pub noise_amount: f32,
    /// Number of noisy copies per image.
    pub n_samples: usize,
    /// Show each rendered explanation.
    pub visual: bool,
    /// Seed for the noise; `None` draws from OS entropy.
    pub seed: Option<Seed>,
}

impl Default for SmoothGradConfig {
    fn default() -> Self {
        Self {
            noise_amount: 0.1,
            n_samples: 50,
            visual: true,
            seed: None,
        }
    }
}

impl SmoothGradConfig {
    /// Set the noise level.
    #[must_use]
    pub fn with_noise_amount(mut self, noise_amount: f32) -> Self {
        self.noise_amount = noise_amount;
        self
    }

    /// Set the number of noisy samples.
    #[must_use]
    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Enable or disable showing explanations.
    #[must_use]
    pub fn with_visual(mut self, visual: bool) -> Self {
        self.visual = visual;
        self
    }

    /// Fix the noise seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(Seed::new(seed));
        self
    }

    /// Check option ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 {
            return Err(ExplainError::InvalidOption(
                "n_samples must be at least 1".to_string(),
            ));
        }
        if !self.noise_amount.is_finite() || self.noise_amount < 0.0 {
            return Err(ExplainError::InvalidOption(format!(
                "noise_amount must be a finite non-negative number, got {}",
                self.noise_amount
            )));
        }
        Ok(())
    }
}

/// Arguments of [`SmoothGradInterpreter::interpret`].
#[derive(Debug, Clone)]
pub struct SmoothGradArgs {
    /// Images to explain.
    pub inputs: ImageInput,
    /// Labels to explain, one per image. `None` explains the predicted class.
    pub labels: Option<Vec<usize>>,
    /// Where to save the rendered explanations.
    pub save_path: SavePath,
    /// Sampling options.
    pub config: SmoothGradConfig,
}

impl SmoothGradArgs {
    /// Explain the predicted classes of `inputs` with the default options.
    pub fn new(inputs: impl Into<ImageInput>) -> Self {
        Self {
            inputs: inputs.into(),
            labels: None,
            save_path: SavePath::None,
            config: SmoothGradConfig::default(),
        }
    }

    /// Explain these labels.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<usize>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Save rendered explanations.
    #[must_use]
    pub fn with_save_path(mut self, save_path: impl Into<SavePath>) -> Self {
        self.save_path = save_path.into();
        self
    }

    /// Use these sampling options.
    #[must_use]
    pub fn with_config(mut self, config: SmoothGradConfig) -> Self {
        self.config = config;
        self
    }
}

/// Per-image noise std: `noise_amount * (max - min)` over all non-batch axes.
pub fn noise_stds(data: &Array4<f32>, noise_amount: f32) -> Vec<f32> {
    data.axis_iter(Axis(0))
        .map(|image| {
            let max = image.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let min = image.iter().copied().fold(f32::INFINITY, f32::min);
            noise_amount * (max - min)
        })
        .collect()
}

/// Smooth Gradients interpreter.
///
/// # Example
///
/// ```rust,ignore
/// use salient_explain::{Interpreter, SmoothGradArgs, SmoothGradConfig, SmoothGradInterpreter};
///
/// let mut interpreter = SmoothGradInterpreter::new(model, true, ImageShape::default())?;
/// let config = SmoothGradConfig::default().with_n_samples(20).with_seed(7);
/// let map = interpreter.interpret(SmoothGradArgs::new(path).with_config(config))?;
/// ```
pub struct SmoothGradInterpreter<B, M> {
    inner: InputGradientInterpreter<B, M>,
    use_cuda: bool,
    model_input_shape: ImageShape,
    gradient_of: GradientOf,
    reader: Box<dyn InputReader>,
    visualizer: Box<dyn Visualizer>,
}

impl<B, M> SmoothGradInterpreter<B, M>
where
    B: AutodiffBackend + AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    /// Bind `model`. Runs on `gpu:0` when `use_cuda` and the backend has
    /// accelerator support, otherwise on the cpu.
    pub fn new(model: M, use_cuda: bool, model_input_shape: ImageShape) -> Result<Self> {
        let accelerated = use_cuda && B::accelerator_compiled();
        if use_cuda && !accelerated {
            tracing::warn!("backend is not built with accelerator support, using cpu");
        }
        let device = if accelerated { "gpu:0" } else { "cpu" };

        Ok(Self {
            inner: InputGradientInterpreter::new(model, device, None)?,
            use_cuda: accelerated,
            model_input_shape,
            gradient_of: GradientOf::default(),
            reader: Box::new(NpyReader::default()),
            visualizer: Box::new(OverlayVisualizer::default()),
        })
    }

    /// Use a different input reader.
    #[must_use]
    pub fn with_reader(mut self, reader: impl InputReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    /// Use a different visualizer.
    #[must_use]
    pub fn with_visualizer(mut self, visualizer: impl Visualizer + 'static) -> Self {
        self.visualizer = Box::new(visualizer);
        self
    }

    /// Use `predict_fn` instead of the built gradient function.
    #[must_use]
    pub fn with_predict_fn(mut self, predict_fn: PredictFn<M, GradientPrediction>) -> Self {
        self.inner.set_predict_fn(predict_fn);
        self
    }

    /// Differentiate `gradient_of` instead of the label probability.
    #[must_use]
    pub fn with_gradient_of(mut self, gradient_of: GradientOf) -> Self {
        self.gradient_of = gradient_of;
        self
    }

    /// Whether the accelerator is used.
    pub fn use_cuda(&self) -> bool {
        self.use_cuda
    }

    /// Current device descriptor.
    pub fn device(&self) -> DeviceSpec {
        self.inner.device()
    }

    /// Expected model input shape.
    pub fn model_input_shape(&self) -> ImageShape {
        self.model_input_shape
    }

    /// Target whose gradient is averaged.
    pub fn gradient_of(&self) -> GradientOf {
        self.gradient_of
    }

    /// Whether a predict function is cached.
    pub fn is_built(&self) -> bool {
        self.inner.is_built()
    }

    /// The bound model.
    pub fn model(&self) -> &M {
        self.inner.model()
    }
}

impl<B, M> Interpreter for SmoothGradInterpreter<B, M>
where
    B: AutodiffBackend + AcceleratorRuntime,
    M: ImageClassifier<B> + 'static,
{
    type BuildOptions = GradientOf;
    type Args = SmoothGradArgs;
    type Output = AttributionMap;

    fn build_predict_fn(&mut self, rebuild: bool, gradient_of: GradientOf) -> Result<bool> {
        let built = self.inner.build_predict_fn(rebuild, gradient_of)?;
        // A skipped build keeps the cached function and its target.
        if built {
            self.gradient_of = gradient_of;
        }
        Ok(built)
    }

    fn interpret(&mut self, args: SmoothGradArgs) -> Result<AttributionMap> {
        let SmoothGradArgs {
            inputs,
            labels,
            save_path,
            config,
        } = args;
        config.validate()?;

        let prepared = self.reader.read(&inputs, &self.model_input_shape)?;
        let data = prepared.batch;
        let shape = BatchShape::from_dims(data.shape())?;
        shape.ensure_non_empty()?;
        if prepared.images.len() != shape.batch() {
            return Err(CoreError::InvalidShape {
                expected: format!("{} display images", shape.batch()),
                got: prepared.images.len().to_string(),
            }
            .into());
        }
        let save_paths = save_path.resolve(shape.batch())?;

        self.inner.build_predict_fn(false, self.gradient_of)?;

        let labels = match labels {
            Some(labels) => {
                shape.check_labels(&labels)?;
                labels
            }
            None => self.inner.predict(&data, None)?.labels,
        };

        let stds = noise_stds(&data, config.noise_amount);
        let noise = stds
            .iter()
            .map(|&std| Normal::new(0.0f32, std))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExplainError::InvalidOption(format!("noise std: {e}")))?;

        tracing::debug!(
            batch = shape.batch(),
            n_samples = config.n_samples,
            noise_amount = config.noise_amount,
            ?labels,
            "smoothing gradients"
        );

        let mut rng = noise_rng(config.seed);
        let mut total = Array4::<f32>::zeros(data.raw_dim());
        for round in 0..config.n_samples {
            let mut noised = data.clone();
            for (mut image, normal) in noised.axis_iter_mut(Axis(0)).zip(&noise) {
                image.mapv_inplace(|v| v + normal.sample(&mut rng));
            }

            let prediction = self.inner.predict(&noised, Some(&labels))?;
            if prediction.gradients.shape() != data.shape() {
                return Err(CoreError::InvalidShape {
                    expected: shape.to_string(),
                    got: format!("{:?}", prediction.gradients.shape()),
                }
                .into());
            }
            total += &prediction.gradients;
            tracing::trace!(round, "sampled gradients");
        }

        let map = AttributionMap::new(
            total / config.n_samples as f32,
            labels,
            AttributionMethod::SmoothGrad,
        );

        for (index, (image, path)) in prepared.images.iter().zip(&save_paths).enumerate() {
            let Some(magnitude) = map.channel_magnitude(index) else {
                continue;
            };
            let vis = self
                .visualizer
                .render(image, &magnitude, VisStyle::OverlayGrayscale)?;
            if config.visual {
                self.visualizer.show(index, &vis)?;
            }
            if let Some(path) = path {
                self.visualizer.save(path, &vis)?;
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use super::*;
    use crate::interpreter::predict_fn;
    use crate::readers::Normalization;
    use crate::test_models::{weight, AffineModel, ConstantModel};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use ndarray::{Array, Array3};

    type TestBackend = Autodiff<NdArray>;

    fn shape() -> ImageShape {
        ImageShape::new(3, 2, 2)
    }

    fn images() -> Array4<f32> {
        Array::from_shape_fn((2, 2, 2, 3), |(b, h, w, c)| {
            (b * 50 + h * 20 + w * 7 + c * 3) as f32
        })
    }

    fn quiet(n_samples: usize, noise_amount: f32) -> SmoothGradConfig {
        SmoothGradConfig::default()
            .with_n_samples(n_samples)
            .with_noise_amount(noise_amount)
            .with_visual(false)
            .with_seed(11)
    }

    fn constant_interpreter(
        gradient: f32,
        calls: Rc<RefCell<Vec<(Array4<f32>, Option<Vec<usize>>)>>>,
    ) -> SmoothGradInterpreter<TestBackend, ConstantModel> {
        let model = ConstantModel {
            logits: vec![0.0, 1.0, 0.5],
        };
        SmoothGradInterpreter::new(model, false, shape())
            .unwrap()
            .with_reader(NpyReader::new(Normalization::Identity))
            .with_predict_fn(predict_fn(move |_model, data, labels| {
                calls
                    .borrow_mut()
                    .push((data.clone(), labels.map(|l| l.to_vec())));
                Ok(GradientPrediction {
                    gradients: Array4::from_elem(data.raw_dim(), gradient),
                    labels: labels.map_or_else(|| vec![2; data.dim().0], |l| l.to_vec()),
                })
            }))
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = SmoothGradConfig::default();
        assert_eq!(config.noise_amount, 0.1);
        assert_eq!(config.n_samples, 50);
        assert!(config.visual);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());

        assert!(matches!(
            config.clone().with_n_samples(0).validate(),
            Err(ExplainError::InvalidOption(_))
        ));
        assert!(matches!(
            config.clone().with_noise_amount(-0.1).validate(),
            Err(ExplainError::InvalidOption(_))
        ));
        assert!(matches!(
            config.with_noise_amount(f32::NAN).validate(),
            Err(ExplainError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_config_serde_fills_defaults() {
        let config: SmoothGradConfig =
            serde_json::from_str(r#"{"n_samples": 8, "seed": 3}"#).unwrap();
        assert_eq!(config.n_samples, 8);
        assert_eq!(config.seed, Some(Seed::new(3)));
        assert_eq!(config.noise_amount, 0.1);
        assert!(config.visual);
    }

    #[test]
    fn test_noise_stds() {
        let mut data = Array4::<f32>::zeros((2, 2, 2, 1));
        data[[0, 1, 1, 0]] = 10.0;
        data[[1, 0, 0, 0]] = -5.0;
        data[[1, 1, 0, 0]] = 5.0;
        assert_eq!(noise_stds(&data, 0.1), vec![1.0, 1.0]);
        assert_eq!(noise_stds(&data, 0.0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_gpu_request_falls_back_on_cpu_backend() {
        let model = AffineModel::<TestBackend>::new(12, 3, &Default::default());
        let interpreter =
            SmoothGradInterpreter::<TestBackend, _>::new(model, true, shape()).unwrap();
        assert!(!interpreter.use_cuda());
        assert_eq!(interpreter.device(), DeviceSpec::cpu());
        assert_eq!(interpreter.gradient_of(), GradientOf::Probability);
    }

    #[test]
    fn test_average_is_invariant_to_sample_count() {
        for n_samples in [1, 5, 50] {
            let calls = Rc::new(RefCell::new(Vec::new()));
            let mut interpreter = constant_interpreter(0.375, calls.clone());
            let map = interpreter
                .interpret(SmoothGradArgs::new(images()).with_config(quiet(n_samples, 0.0)))
                .unwrap();

            assert_eq!(map.shape(), [2, 2, 2, 3]);
            assert!(map.values.iter().all(|&v| v == 0.375), "n_samples={n_samples}");
            assert_eq!(calls.borrow().len(), n_samples + 1);
        }
    }

    #[test]
    fn test_predicted_labels_are_fixed_for_every_round() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(1.0, calls.clone());
        let map = interpreter
            .interpret(SmoothGradArgs::new(images()).with_config(quiet(6, 0.2)))
            .unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 7);
        assert_eq!(calls[0].0, images());
        assert_eq!(calls[0].1, None);
        assert!(calls[1..].iter().all(|(_, l)| l.as_deref() == Some(&[2, 2][..])));
        assert_eq!(map.labels, vec![2, 2]);
    }

    #[test]
    fn test_given_labels_skip_prediction() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(1.0, calls.clone());
        interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_labels(vec![0, 1])
                    .with_config(quiet(4, 0.1)),
            )
            .unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|(_, l)| l.as_deref() == Some(&[0, 1][..])));
    }

    #[test]
    fn test_label_count_mismatch() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(1.0, calls.clone());
        let err = interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_labels(vec![0])
                    .with_config(quiet(4, 0.1)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExplainError::Core(CoreError::LabelMismatch { labels: 1, batch: 2 })
        ));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_noise_is_drawn_around_clean_data() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(1.0, calls.clone());
        let config = quiet(3, 0.25);
        interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_labels(vec![1, 1])
                    .with_config(config.clone()),
            )
            .unwrap();

        let clean = images();
        let normals: Vec<_> = noise_stds(&clean, config.noise_amount)
            .into_iter()
            .map(|std| Normal::new(0.0f32, std).unwrap())
            .collect();
        let mut rng = noise_rng(config.seed);

        for (noised, _) in calls.borrow().iter() {
            let mut expected = clean.clone();
            for (mut image, normal) in expected.axis_iter_mut(Axis(0)).zip(&normals) {
                image.mapv_inplace(|v| v + normal.sample(&mut rng));
            }
            assert_eq!(noised, &expected);
        }
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(1.0, calls.clone());
        let err = interpreter
            .interpret(SmoothGradArgs::new(images()).with_config(quiet(0, 0.1)))
            .unwrap_err();
        assert!(matches!(err, ExplainError::InvalidOption(_)));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_logit_gradients_of_affine_model() {
        let model = AffineModel::<TestBackend>::new(12, 4, &Default::default());
        let mut interpreter = SmoothGradInterpreter::<TestBackend, _>::new(model, false, shape())
            .unwrap()
            .with_reader(NpyReader::new(Normalization::Identity))
            .with_gradient_of(GradientOf::Logit);

        let map = interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_labels(vec![3, 0])
                    .with_config(quiet(10, 0.0)),
            )
            .unwrap();

        assert!(interpreter.is_built());
        assert!(interpreter.model().neutralized);
        for ((b, h, w, c), value) in map.values.indexed_iter() {
            let d = (h * 2 + w) * 3 + c;
            assert_eq!(*value, weight(d, map.labels[b]));
        }
    }

    #[test]
    fn test_skipped_build_keeps_cached_target() {
        let model = AffineModel::<TestBackend>::new(12, 4, &Default::default());
        let mut interpreter =
            SmoothGradInterpreter::<TestBackend, _>::new(model, false, shape()).unwrap();

        assert!(interpreter.build_predict_fn(false, GradientOf::Logit).unwrap());
        assert_eq!(interpreter.gradient_of(), GradientOf::Logit);

        assert!(!interpreter.build_predict_fn(false, GradientOf::Loss).unwrap());
        assert_eq!(interpreter.gradient_of(), GradientOf::Logit);

        // The cached function still differentiates the logit.
        let data = Array::from_shape_fn((1, 2, 2, 3), |(_, h, w, c)| (h + w + c) as f32);
        let out = interpreter.inner.predict(&data, Some(&[2])).unwrap();
        for ((_, h, w, c), value) in out.gradients.indexed_iter() {
            assert_eq!(*value, weight((h * 2 + w) * 3 + c, 2));
        }

        assert!(interpreter.build_predict_fn(true, GradientOf::Loss).unwrap());
        assert_eq!(interpreter.gradient_of(), GradientOf::Loss);
    }

    #[test]
    fn test_seeded_runs_match() {
        let run = || {
            let model = AffineModel::<TestBackend>::new(12, 3, &Default::default());
            let mut interpreter =
                SmoothGradInterpreter::<TestBackend, _>::new(model, false, shape())
                    .unwrap()
                    .with_reader(NpyReader::new(Normalization::Identity));
            interpreter
                .interpret(SmoothGradArgs::new(images()).with_config(quiet(5, 0.3)))
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_saves_one_rendering_per_image() {
        let dir = std::env::temp_dir().join(format!("salient_smoothgrad_{}", std::process::id()));
        let paths: Vec<PathBuf> = (0..2).map(|i| dir.join(format!("vis_{i}.npy"))).collect();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(0.5, calls);
        interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_save_path(paths.clone())
                    .with_config(quiet(2, 0.1).with_visual(true)),
            )
            .unwrap();

        for path in &paths {
            let vis: Array3<u8> = ndarray_npy::read_npy(path).unwrap();
            assert_eq!(vis.dim(), (2, 2, 3));
        }
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_single_save_path_for_batch_is_rejected() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = constant_interpreter(0.5, calls);
        let err = interpreter
            .interpret(
                SmoothGradArgs::new(images())
                    .with_save_path(PathBuf::from("one.npy"))
                    .with_config(quiet(2, 0.1)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExplainError::SavePathMismatch { paths: 1, batch: 2 }
        ));
    }
}
