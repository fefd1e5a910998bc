//! Image and batch shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Expected model input shape, channel-first `(C, H, W)`.
///
/// Only used as validation context: interpreters check ranks and channel
/// counts against it but never resize inputs to match.
///
/// # Example
///
/// ```rust
/// use salient_core::ImageShape;
///
/// let shape = ImageShape::default();
/// assert_eq!(shape.as_array(), [3, 224, 224]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageShape {
    /// Create a new image shape.
    #[must_use]
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Image height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Image width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Convert to `[C, H, W]`.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::new(3, 224, 224)
    }
}

impl From<[usize; 3]> for ImageShape {
    fn from([channels, height, width]: [usize; 3]) -> Self {
        Self::new(channels, height, width)
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(C={}, H={}, W={})", self.channels, self.height, self.width)
    }
}

/// Shape of a channel-last image batch `[B, H, W, C]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchShape {
    batch: usize,
    height: usize,
    width: usize,
    channels: usize,
}

impl BatchShape {
    /// Create a new batch shape.
    #[must_use]
    pub const fn new(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            batch,
            height,
            width,
            channels,
        }
    }

    /// Create a batch shape from a slice of exactly four dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DimensionError`] when `dims` is not rank 4.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [batch, height, width, channels] => Ok(Self::new(*batch, *height, *width, *channels)),
            _ => Err(CoreError::DimensionError {
                expected: 4,
                got: dims.len(),
            }),
        }
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Image height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Image width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Convert to `[B, H, W, C]`.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.height, self.width, self.channels]
    }

    /// Reject empty batches.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] when any dimension is zero.
    pub fn ensure_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(CoreError::InvalidShape {
                expected: "non-empty [B, H, W, C] batch".to_string(),
                got: self.to_string(),
            });
        }
        Ok(())
    }

    /// Check that `labels` has one entry per image.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LabelMismatch`] otherwise.
    pub fn check_labels(&self, labels: &[usize]) -> Result<()> {
        if labels.len() != self.batch {
            return Err(CoreError::LabelMismatch {
                labels: labels.len(),
                batch: self.batch,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for BatchShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(B={}, H={}, W={}, C={})",
            self.batch, self.height, self.width, self.channels
        )
    }
}
