//! Device descriptors and accelerator placement.
//!
//! Interpreters take a device string such as `"cpu"` or `"gpu:1"`. The string
//! is validated once into a [`DeviceSpec`]; the only later mutation is the
//! fallback to `cpu` when the backend was built without accelerator support.

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Host CPU.
    Cpu,
    /// Accelerator (GPU) device.
    Gpu,
}

impl DeviceKind {
    /// Check if this is an accelerator category.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, DeviceKind::Gpu)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// A validated device descriptor.
///
/// # Example
///
/// ```rust
/// use salient_core::{DeviceKind, DeviceSpec};
///
/// let device: DeviceSpec = "gpu:1".parse().unwrap();
/// assert_eq!(device.kind(), DeviceKind::Gpu);
/// assert_eq!(device.index(), 1);
/// assert_eq!(device.to_string(), "gpu:1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceSpec {
    kind: DeviceKind,
    index: usize,
}

impl DeviceSpec {
    /// The host CPU.
    #[must_use]
    pub const fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index: 0,
        }
    }

    /// The accelerator with the given ordinal.
    #[must_use]
    pub const fn gpu(index: usize) -> Self {
        Self {
            kind: DeviceKind::Gpu,
            index,
        }
    }

    /// Parse a device string.
    ///
    /// Accepts `cpu`, `gpu` and `gpu:N`. A `cpu:N` suffix is tolerated and
    /// dropped, there is only one host device.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDevice`] when the category prefix is neither
    /// `cpu` nor `gpu`, or when the index is not an unsigned integer.
    pub fn parse(device: &str) -> Result<Self> {
        let (category, index) = match device.split_once(':') {
            Some((category, index)) => (category, Some(index)),
            None => (device, None),
        };

        let index = match index {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| CoreError::InvalidDevice(device.to_string()))?,
            None => 0,
        };

        match category {
            "cpu" => Ok(Self::cpu()),
            "gpu" => Ok(Self::gpu(index)),
            _ => Err(CoreError::InvalidDevice(device.to_string())),
        }
    }

    /// Get the device category.
    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Get the device ordinal (always 0 for the cpu).
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Check if this descriptor names an accelerator.
    #[must_use]
    pub fn is_gpu(&self) -> bool {
        self.kind.is_accelerator()
    }

    /// Fall back to the cpu when an accelerator is requested but backend `R`
    /// was built without accelerator support.
    ///
    /// Returns `true` when the descriptor was changed.
    pub fn fallback_for<R: AcceleratorRuntime>(&mut self) -> bool {
        if self.is_gpu() && !R::accelerator_compiled() {
            tracing::warn!(
                requested = %self,
                "backend is not built with accelerator support, switching to cpu"
            );
            *self = Self::cpu();
            return true;
        }
        false
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu:{}", self.index),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

/// Accelerator runtime queries for a Burn backend.
///
/// Reports whether the backend was compiled with accelerator support and maps
/// a [`DeviceSpec`] onto the backend's own device type.
pub trait AcceleratorRuntime: Backend {
    /// Whether this backend can run on an accelerator at all.
    fn accelerator_compiled() -> bool;

    /// Place computation on the device named by `spec`.
    fn place(spec: &DeviceSpec) -> Self::Device;
}

#[cfg(feature = "backend-ndarray")]
impl AcceleratorRuntime for burn_ndarray::NdArray {
    fn accelerator_compiled() -> bool {
        false
    }

    fn place(_spec: &DeviceSpec) -> Self::Device {
        burn_ndarray::NdArrayDevice::Cpu
    }
}

#[cfg(feature = "backend-wgpu")]
impl AcceleratorRuntime for burn_wgpu::Wgpu {
    fn accelerator_compiled() -> bool {
        true
    }

    fn place(spec: &DeviceSpec) -> Self::Device {
        match spec.kind() {
            DeviceKind::Cpu => burn_wgpu::WgpuDevice::Cpu,
            DeviceKind::Gpu => burn_wgpu::WgpuDevice::DiscreteGpu(spec.index()),
        }
    }
}

impl<B: AcceleratorRuntime> AcceleratorRuntime for burn_autodiff::Autodiff<B> {
    fn accelerator_compiled() -> bool {
        B::accelerator_compiled()
    }

    fn place(spec: &DeviceSpec) -> Self::Device {
        B::place(spec)
    }
}
