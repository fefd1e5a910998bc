//! Input and save-path preprocessing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, ArrayD, Axis, Ix3, Ix4};
use ndarray_npy::ReadNpyExt;
use salient_core::{CoreError, ImageShape};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Images to explain.
///
/// Pixel values are expected in `[0, 255]`, channel-last. A single image is
/// `[H, W, C]`; a batch is `[N, H, W, C]`.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// One `.npy` file.
    Path(PathBuf),
    /// Several `.npy` files, one image (or batch) each.
    Paths(Vec<PathBuf>),
    /// Images already in memory.
    Array(ArrayD<f32>),
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<Vec<PathBuf>> for ImageInput {
    fn from(paths: Vec<PathBuf>) -> Self {
        ImageInput::Paths(paths)
    }
}

impl From<Array3<f32>> for ImageInput {
    fn from(image: Array3<f32>) -> Self {
        ImageInput::Array(image.into_dyn())
    }
}

impl From<Array4<f32>> for ImageInput {
    fn from(batch: Array4<f32>) -> Self {
        ImageInput::Array(batch.into_dyn())
    }
}

/// Images ready for display and for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInputs {
    /// Display copies, `[H, W, C]` each.
    pub images: Vec<Array3<u8>>,
    /// Normalized model input `[B, H, W, C]`.
    pub batch: Array4<f32>,
}

/// Turns [`ImageInput`] into display images and a model batch.
pub trait InputReader {
    /// Read and normalize `inputs` for a model expecting `shape`.
    fn read(&self, inputs: &ImageInput, shape: &ImageShape) -> Result<PreparedInputs>;
}

/// Pixel normalization applied to the model batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Scale to `[0, 1]`, then standardize with the ImageNet channel
    /// statistics. Needs three channels.
    #[default]
    ImageNet,
    /// Feed pixel values unchanged.
    Identity,
}

/// Reads `.npy` images.
///
/// Files may hold `f32`, `u8` or `f64` data. Images are not resized: every
/// image must have the channel count of the model input shape, and all
/// images must share one height and width.
#[derive(Debug, Clone, Default)]
pub struct NpyReader {
    normalization: Normalization,
}

impl NpyReader {
    /// Create a reader.
    pub fn new(normalization: Normalization) -> Self {
        Self { normalization }
    }

    /// The normalization applied.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn normalize(&self, batch: Array4<f32>) -> Result<Array4<f32>> {
        match self.normalization {
            Normalization::Identity => Ok(batch),
            Normalization::ImageNet => {
                let channels = batch.len_of(Axis(3));
                if channels != 3 {
                    return Err(CoreError::InvalidShape {
                        expected: "3 channels for ImageNet normalization".to_string(),
                        got: format!("{channels} channels"),
                    }
                    .into());
                }
                let mut batch = batch / 255.0;
                for (c, mut lane) in batch.axis_iter_mut(Axis(3)).enumerate() {
                    lane.mapv_inplace(|v| (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c]);
                }
                Ok(batch)
            }
        }
    }
}

impl InputReader for NpyReader {
    fn read(&self, inputs: &ImageInput, shape: &ImageShape) -> Result<PreparedInputs> {
        let raw = match inputs {
            ImageInput::Path(path) => as_batch(read_npy(path)?)?,
            ImageInput::Paths(paths) => {
                let batches = paths
                    .iter()
                    .map(|path| as_batch(read_npy(path)?))
                    .collect::<Result<Vec<_>>>()?;
                concatenate(batches)?
            }
            ImageInput::Array(array) => as_batch(array.clone())?,
        };

        let (batch, height, width, channels) = raw.dim();
        if batch == 0 {
            return Err(CoreError::InvalidShape {
                expected: "at least one image".to_string(),
                got: "an empty batch".to_string(),
            }
            .into());
        }
        if channels != shape.channels() {
            return Err(CoreError::InvalidShape {
                expected: format!("{} channels", shape.channels()),
                got: format!("{channels} channels"),
            }
            .into());
        }
        tracing::debug!(batch, height, width, channels, "read input images");

        let images = raw
            .axis_iter(Axis(0))
            .map(|image| image.mapv(|v| v.round().clamp(0.0, 255.0) as u8))
            .collect();
        let batch = self.normalize(raw)?;

        Ok(PreparedInputs { images, batch })
    }
}

/// Read a `.npy` file of any rank as `f32`.
pub fn read_npy(path: impl AsRef<Path>) -> Result<ArrayD<f32>> {
    let path = path.as_ref();
    let open = || -> Result<BufReader<File>> { Ok(BufReader::new(File::open(path)?)) };

    match ArrayD::<f32>::read_npy(open()?) {
        Ok(array) => Ok(array),
        Err(first) => {
            if let Ok(array) = ArrayD::<u8>::read_npy(open()?) {
                return Ok(array.mapv(f32::from));
            }
            ArrayD::<f64>::read_npy(open()?)
                .map(|array| array.mapv(|v| v as f32))
                .map_err(|_| first.into())
        }
    }
}

fn as_batch(array: ArrayD<f32>) -> Result<Array4<f32>> {
    match array.ndim() {
        3 => {
            let image = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| CoreError::DataError(e.to_string()))?;
            Ok(image.insert_axis(Axis(0)))
        }
        4 => array
            .into_dimensionality::<Ix4>()
            .map_err(|e| CoreError::DataError(e.to_string()).into()),
        got => Err(CoreError::DimensionError { expected: 4, got }.into()),
    }
}

fn concatenate(batches: Vec<Array4<f32>>) -> Result<Array4<f32>> {
    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    if views.is_empty() {
        return Ok(Array4::zeros((0, 0, 0, 0)));
    }
    ndarray::concatenate(Axis(0), &views).map_err(|_| {
        let shapes: Vec<_> = batches.iter().map(|b| format!("{:?}", b.shape())).collect();
        CoreError::InvalidShape {
            expected: "images with one height, width and channel count".to_string(),
            got: shapes.join(", "),
        }
        .into()
    })
}

/// Where to save rendered explanations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SavePath {
    /// Do not save.
    #[default]
    None,
    /// One file, for a single image.
    Single(PathBuf),
    /// One file per image.
    Many(Vec<PathBuf>),
}

impl From<PathBuf> for SavePath {
    fn from(path: PathBuf) -> Self {
        SavePath::Single(path)
    }
}

impl From<Vec<PathBuf>> for SavePath {
    fn from(paths: Vec<PathBuf>) -> Self {
        SavePath::Many(paths)
    }
}

impl From<Option<PathBuf>> for SavePath {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(SavePath::None, SavePath::Single)
    }
}

impl SavePath {
    /// One optional path per image of a batch of `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::SavePathMismatch`] when the number of paths
    /// differs from `batch`.
    pub fn resolve(&self, batch: usize) -> Result<Vec<Option<PathBuf>>> {
        match self {
            SavePath::None => Ok(vec![None; batch]),
            SavePath::Single(path) if batch == 1 => Ok(vec![Some(path.clone())]),
            SavePath::Single(_) => Err(ExplainError::SavePathMismatch { paths: 1, batch }),
            SavePath::Many(paths) if paths.len() == batch => {
                Ok(paths.iter().cloned().map(Some).collect())
            }
            SavePath::Many(paths) => Err(ExplainError::SavePathMismatch {
                paths: paths.len(),
                batch,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn shape() -> ImageShape {
        ImageShape::new(3, 2, 2)
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("salient_{}_{}.npy", name, std::process::id()))
    }

    #[test]
    fn test_identity_reader_keeps_values() {
        let batch = Array::from_shape_fn((2, 2, 2, 3), |(b, h, w, c)| {
            (b * 100 + h * 10 + w + c) as f32
        });
        let reader = NpyReader::new(Normalization::Identity);
        let prepared = reader.read(&batch.clone().into(), &shape()).unwrap();

        assert_eq!(prepared.batch, batch);
        assert_eq!(prepared.images.len(), 2);
        assert_eq!(prepared.images[1][[1, 1, 2]], 113);
    }

    #[test]
    fn test_imagenet_normalization() {
        let image = Array3::from_elem((2, 2, 3), 255.0f32);
        let prepared = NpyReader::default().read(&image.into(), &shape()).unwrap();

        assert_eq!(prepared.batch.dim(), (1, 2, 2, 3));
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((prepared.batch[[0, 1, 0, c]] - expected).abs() < 1e-6);
        }
        assert!(prepared.images[0].iter().all(|&p| p == 255));
    }

    #[test]
    fn test_rank_and_channel_checks() {
        let reader = NpyReader::new(Normalization::Identity);

        let flat = ImageInput::Array(ArrayD::zeros(vec![2, 3]));
        assert!(matches!(
            reader.read(&flat, &shape()),
            Err(ExplainError::Core(CoreError::DimensionError { expected: 4, got: 2 }))
        ));

        let gray = Array4::<f32>::zeros((1, 2, 2, 1));
        assert!(matches!(
            reader.read(&gray.into(), &shape()),
            Err(ExplainError::Core(CoreError::InvalidShape { .. }))
        ));

        let empty = Array4::<f32>::zeros((0, 2, 2, 3));
        assert!(matches!(
            reader.read(&empty.into(), &shape()),
            Err(ExplainError::Core(CoreError::InvalidShape { .. }))
        ));
    }

    #[test]
    fn test_reads_npy_files() {
        use ndarray_npy::write_npy;

        let first = temp_path("reader_a");
        let second = temp_path("reader_b");
        write_npy(&first, &Array3::<u8>::from_elem((2, 2, 3), 7)).unwrap();
        write_npy(&second, &Array3::<f64>::from_elem((2, 2, 3), 9.0)).unwrap();

        let reader = NpyReader::new(Normalization::Identity);
        let prepared = reader
            .read(&ImageInput::Paths(vec![first.clone(), second.clone()]), &shape())
            .unwrap();

        assert_eq!(prepared.batch.dim(), (2, 2, 2, 3));
        assert_eq!(prepared.batch[[0, 0, 0, 0]], 7.0);
        assert_eq!(prepared.batch[[1, 1, 1, 2]], 9.0);

        let _ = std::fs::remove_file(first);
        let _ = std::fs::remove_file(second);
    }

    #[test]
    fn test_save_path_resolution() {
        assert_eq!(SavePath::None.resolve(3).unwrap(), vec![None, None, None]);

        let single = SavePath::from(PathBuf::from("out.npy"));
        assert_eq!(
            single.resolve(1).unwrap(),
            vec![Some(PathBuf::from("out.npy"))]
        );
        assert!(matches!(
            single.resolve(2),
            Err(ExplainError::SavePathMismatch { paths: 1, batch: 2 })
        ));

        let many = SavePath::from(vec![PathBuf::from("a.npy"), PathBuf::from("b.npy")]);
        assert_eq!(many.resolve(2).unwrap().len(), 2);
        assert!(matches!(
            many.resolve(3),
            Err(ExplainError::SavePathMismatch { paths: 2, batch: 3 })
        ));
    }
}
