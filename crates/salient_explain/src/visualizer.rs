//! Rendering explanations over the input image.

use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use salient_core::CoreError;
use serde::{Deserialize, Serialize};

use crate::attribution::min_max_normalize;
use crate::error::Result;

/// How an explanation is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisStyle {
    /// The normalized explanation alone, as a gray image.
    Grayscale,
    /// The gray explanation blended over the input image.
    #[default]
    OverlayGrayscale,
}

/// Renders, shows and saves explanations.
pub trait Visualizer {
    /// Render `explanation` (`[H, W]`) for `image` (`[H, W, C]`) as an RGB
    /// image `[H, W, 3]`.
    fn render(
        &self,
        image: &Array3<u8>,
        explanation: &Array2<f32>,
        style: VisStyle,
    ) -> Result<Array3<u8>>;

    /// Present a rendered explanation.
    fn show(&self, index: usize, vis: &Array3<u8>) -> Result<()>;

    /// Persist a rendered explanation to `path`.
    fn save(&self, path: &Path, vis: &Array3<u8>) -> Result<()>;
}

/// Default [`Visualizer`].
///
/// `show` logs a summary of the rendering; `save` writes it as a `u8`
/// `.npy` array.
#[derive(Debug, Clone)]
pub struct OverlayVisualizer {
    alpha: f32,
}

impl Default for OverlayVisualizer {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl OverlayVisualizer {
    /// Create a visualizer giving the explanation weight `alpha` in overlays.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Overlay weight of the explanation.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl Visualizer for OverlayVisualizer {
    fn render(
        &self,
        image: &Array3<u8>,
        explanation: &Array2<f32>,
        style: VisStyle,
    ) -> Result<Array3<u8>> {
        let (height, width, channels) = image.dim();
        if channels == 0 || explanation.dim() != (height, width) {
            return Err(CoreError::InvalidShape {
                expected: format!("[{height}, {width}] explanation for a non-empty image"),
                got: format!("{:?}", explanation.shape()),
            }
            .into());
        }

        let gray = min_max_normalize(explanation).mapv(|v| v * 255.0);
        let vis = Array3::from_shape_fn((height, width, 3), |(h, w, c)| {
            let explained = gray[[h, w]];
            let value = match style {
                VisStyle::Grayscale => explained,
                VisStyle::OverlayGrayscale => {
                    // Gray inputs are broadcast over RGB.
                    let pixel = f32::from(image[[h, w, c.min(channels - 1)]]);
                    (1.0 - self.alpha) * pixel + self.alpha * explained
                }
            };
            value.round().clamp(0.0, 255.0) as u8
        });
        Ok(vis)
    }

    fn show(&self, index: usize, vis: &Array3<u8>) -> Result<()> {
        let (height, width, _) = vis.dim();
        let mean = vis.mapv(f32::from).mean().unwrap_or(0.0);
        let peak = vis
            .map_axis(Axis(2), |rgb| rgb.iter().map(|&v| u32::from(v)).sum::<u32>())
            .indexed_iter()
            .max_by_key(|(_, v)| **v)
            .map(|(idx, _)| idx);
        tracing::info!(index, height, width, mean, ?peak, "explanation");
        Ok(())
    }

    fn save(&self, path: &Path, vis: &Array3<u8>) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        ndarray_npy::write_npy(path, vis)?;
        tracing::debug!(path = %path.display(), "saved explanation");
        Ok(())
    }
}
