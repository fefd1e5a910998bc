//! The interpreter contract.
//!
//! Every interpreter owns a model, a device descriptor and at most one built
//! predict function. Algorithm families differ only in how that function is
//! built; [`InterpreterCore`] holds the shared state and build bookkeeping.

use ndarray::Array4;
use salient_core::DeviceSpec;

use crate::error::{ExplainError, Result};

/// A built prediction routine.
///
/// Called with the bound model, a channel-last batch `[B, H, W, C]` and
/// optional labels (one per image). The first dimension of whatever it
/// returns matches `B`.
pub type PredictFn<M, O> = Box<dyn FnMut(&M, &Array4<f32>, Option<&[usize]>) -> Result<O>>;

/// Box a closure as a [`PredictFn`].
pub fn predict_fn<M, O, F>(f: F) -> PredictFn<M, O>
where
    F: FnMut(&M, &Array4<f32>, Option<&[usize]>) -> Result<O> + 'static,
{
    Box::new(f)
}

/// Shared state behind every interpreter.
pub struct InterpreterCore<M, O> {
    model: M,
    device: DeviceSpec,
    predict_fn: Option<PredictFn<M, O>>,
}

impl<M, O> InterpreterCore<M, O> {
    /// Bind `model` to `device`.
    ///
    /// `use_cuda` is the legacy device switch. When given, it is honoured
    /// with a deprecation warning: the device stays an accelerator only if
    /// the flag is `true` and `device` already names one; otherwise it
    /// becomes `cpu`.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` is not `cpu`, `gpu` or `gpu:N`.
    pub fn new(model: M, device: &str, use_cuda: Option<bool>) -> Result<Self> {
        let mut device = DeviceSpec::parse(device)?;

        if let Some(use_cuda) = use_cuda {
            tracing::warn!("`use_cuda` will be deprecated soon, pass the device directly");
            if !(use_cuda && device.is_gpu()) {
                device = DeviceSpec::cpu();
            }
        }

        Ok(Self {
            model,
            device,
            predict_fn: None,
        })
    }

    /// The bound model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the bound model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Release the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// The current device descriptor.
    pub fn device(&self) -> DeviceSpec {
        self.device
    }

    /// Whether a predict function is cached.
    pub fn is_built(&self) -> bool {
        self.predict_fn.is_some()
    }

    /// Run `build` unless a predict function is already cached and `rebuild`
    /// is false.
    ///
    /// `build` receives the model and the device descriptor, both mutable so
    /// it can switch modes and apply the cpu fallback. Returns whether a
    /// build happened. On error the previous predict function is kept.
    pub fn build_with<F>(&mut self, rebuild: bool, build: F) -> Result<bool>
    where
        F: FnOnce(&mut M, &mut DeviceSpec) -> Result<PredictFn<M, O>>,
    {
        if self.predict_fn.is_some() && !rebuild {
            return Ok(false);
        }

        let predict_fn = build(&mut self.model, &mut self.device)?;
        self.predict_fn = Some(predict_fn);
        tracing::debug!(device = %self.device, "built predict function");
        Ok(true)
    }

    /// Install a user-supplied predict function, replacing any cached one.
    pub fn set_predict_fn(&mut self, predict_fn: PredictFn<M, O>) {
        self.predict_fn = Some(predict_fn);
    }

    /// Call the cached predict function.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::NotBuilt`] before the first build, otherwise
    /// whatever the predict function returns.
    pub fn predict(&mut self, data: &Array4<f32>, labels: Option<&[usize]>) -> Result<O> {
        let Self {
            model, predict_fn, ..
        } = self;
        let predict_fn = predict_fn.as_mut().ok_or(ExplainError::NotBuilt)?;
        predict_fn(&*model, data, labels)
    }
}

impl<M, O> std::fmt::Debug for InterpreterCore<M, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterCore")
            .field("device", &self.device)
            .field("built", &self.is_built())
            .finish_non_exhaustive()
    }
}

/// Interface of every interpretation algorithm.
///
/// `build_predict_fn` prepares the model and caches a predict function;
/// `interpret` runs the algorithm. Base interpreters only know how to build,
/// so the default `interpret` reports [`ExplainError::NotImplemented`].
pub trait Interpreter {
    /// Options that select the predict function variant.
    type BuildOptions;
    /// Arguments of [`Interpreter::interpret`].
    type Args;
    /// Result of [`Interpreter::interpret`].
    type Output;

    /// Build and cache the predict function. Idempotent unless `rebuild`.
    ///
    /// Returns whether a build happened.
    fn build_predict_fn(&mut self, rebuild: bool, options: Self::BuildOptions) -> Result<bool>;

    /// Run the interpretation.
    fn interpret(&mut self, _args: Self::Args) -> Result<Self::Output> {
        Err(ExplainError::NotImplemented("interpret"))
    }
}
