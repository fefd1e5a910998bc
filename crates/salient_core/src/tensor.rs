//! Conversions between host arrays and Burn tensors.
//!
//! Batches live on the host as channel-last `ndarray` arrays. They are copied
//! onto the backend device for a forward/backward pass and the results are
//! copied back, so callers never hold device tensors across sampling rounds.

use burn::prelude::*;
use ndarray::{Array2, Array4};

use crate::error::{CoreError, Result};

/// Copy a host batch `[B, H, W, C]` onto `device`.
pub fn batch_to_tensor<B: Backend>(batch: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let shape = batch.shape().to_vec();
    let values: Vec<f32> = batch.iter().copied().collect();
    Tensor::<B, 4>::from_data(TensorData::new(values, shape), device)
}

/// Copy a 4D tensor back to the host.
///
/// # Errors
///
/// Returns [`CoreError::DataError`] if the tensor data cannot be read as `f32`.
pub fn tensor_to_batch<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>> {
    let [batch, height, width, channels] = tensor.dims();
    let values = read_floats(tensor.into_data())?;
    Array4::from_shape_vec((batch, height, width, channels), values)
        .map_err(|e| CoreError::DataError(e.to_string()))
}

/// Copy a 2D tensor (e.g. logits `[B, n_classes]`) back to the host.
///
/// # Errors
///
/// Returns [`CoreError::DataError`] if the tensor data cannot be read as `f32`.
pub fn tensor_to_matrix<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let values = read_floats(tensor.into_data())?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| CoreError::DataError(e.to_string()))
}

/// Predicted class per row of a `[B, n_classes]` score tensor.
///
/// # Errors
///
/// Returns [`CoreError::DataError`] if the indices cannot be read back.
pub fn argmax_labels<B: Backend>(scores: Tensor<B, 2>) -> Result<Vec<usize>> {
    let indices = scores.argmax(1).into_data().convert::<i64>();
    let indices = indices
        .to_vec::<i64>()
        .map_err(|e| CoreError::DataError(format!("{e:?}")))?;
    Ok(indices.into_iter().map(|i| i as usize).collect())
}

/// One-hot encode `labels` into a `[labels.len(), n_classes]` float tensor.
///
/// # Errors
///
/// Returns [`CoreError::LabelOutOfRange`] if a label is not below `n_classes`.
pub fn one_hot<B: Backend>(
    labels: &[usize],
    n_classes: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let mut values = vec![0.0f32; labels.len() * n_classes];
    for (row, &label) in labels.iter().enumerate() {
        if label >= n_classes {
            return Err(CoreError::LabelOutOfRange { label, n_classes });
        }
        values[row * n_classes + label] = 1.0;
    }
    Ok(Tensor::<B, 2>::from_data(
        TensorData::new(values, [labels.len(), n_classes]),
        device,
    ))
}

fn read_floats(data: TensorData) -> Result<Vec<f32>> {
    data.convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::DataError(format!("{e:?}")))
}
