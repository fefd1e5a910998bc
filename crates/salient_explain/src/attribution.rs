//! Attribution maps.

use ndarray::{Array2, Array4, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Method that produced an attribution map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributionMethod {
    /// Input gradients averaged over noisy copies of the input.
    SmoothGrad,
}

/// Per-pixel attributions for a batch of images.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionMap {
    /// Attribution values, shaped like the input batch `[B, H, W, C]`.
    pub values: Array4<f32>,
    /// Label explained for each image.
    pub labels: Vec<usize>,
    /// The method used.
    pub method: AttributionMethod,
}

impl AttributionMap {
    /// Create a new attribution map.
    pub fn new(values: Array4<f32>, labels: Vec<usize>, method: AttributionMethod) -> Self {
        Self {
            values,
            labels,
            method,
        }
    }

    /// Shape `[B, H, W, C]`.
    pub fn shape(&self) -> [usize; 4] {
        let (b, h, w, c) = self.values.dim();
        [b, h, w, c]
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    /// Check if the map covers no images.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attributions of image `index`, `[H, W, C]`.
    pub fn image(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        (index < self.len()).then(|| self.values.index_axis(Axis(0), index))
    }

    /// `|attribution|` summed over channels for image `index`, `[H, W]`.
    pub fn channel_magnitude(&self, index: usize) -> Option<Array2<f32>> {
        self.image(index)
            .map(|image| image.mapv(f32::abs).sum_axis(Axis(2)))
    }

    /// Rescale all values to `[0, 1]`. A constant map becomes all zeros.
    pub fn normalize(&self) -> Self {
        Self {
            values: min_max_normalize(&self.values),
            labels: self.labels.clone(),
            method: self.method,
        }
    }

    /// Take the attribution values.
    pub fn into_values(self) -> Array4<f32> {
        self.values
    }
}

/// Rescale `values` to `[0, 1]` using their global min and max.
///
/// Any positive range is stretched to full scale, however small. A constant
/// input maps to zeros.
pub fn min_max_normalize<D: ndarray::Dimension>(
    values: &ndarray::Array<f32, D>,
) -> ndarray::Array<f32, D> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range > 0.0 && range.is_finite() {
        values.mapv(|v| (v - min) / range)
    } else {
        values.mapv(|_| 0.0)
    }
}
