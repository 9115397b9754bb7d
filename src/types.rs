//! Core types, error definitions, and data structures for downscale_dataset.

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unrecognized model family `{0}` (expected resnet_spc, resnet_rec, resnet_int or resnet_mup)")]
    UnknownModel(String),
    #[error("unrecognized interpolation `{0}` (expected nearest, bilinear or bicubic)")]
    UnknownInterpolation(String),
    #[error("scale must be at least 1, got {scale}")]
    InvalidScale { scale: usize },
    #[error("patch_size {patch_size} is not divisible by scale {scale}")]
    PatchNotDivisible { patch_size: usize, scale: usize },
    #[error("resnet_mup requires a patch_size")]
    MissingPatchSize,
    #[error("{family} does not support {what}")]
    UnsupportedAuxiliary {
        family: &'static str,
        what: &'static str,
    },
    #[error("crop of {size} px exceeds the {height}x{width} field extent")]
    CropOutOfBounds {
        size: usize,
        height: usize,
        width: usize,
    },
    #[error("anchor ({row}, {col}) places a {size} px crop outside the {height}x{width} field")]
    AnchorOutOfBounds {
        row: usize,
        col: usize,
        size: usize,
        height: usize,
        width: usize,
    },
    #[error("batch index {index} out of range for {len} batches per epoch")]
    BatchOutOfRange { index: usize, len: usize },
    #[error("batch_size {batch_size} exceeds the {samples} available samples")]
    BatchTooLarge { batch_size: usize, samples: usize },
    #[error("{what} has extent {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("{0}")]
    Other(String),
}

/// Interpolation kernel used when resampling a field between resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
}

impl Interpolation {
    pub fn parse(name: &str) -> DatasetResult<Self> {
        match name {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" => Ok(Interpolation::Bicubic),
            other => Err(DatasetError::UnknownInterpolation(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic => "bicubic",
        }
    }
}

impl FromStr for Interpolation {
    type Err = DatasetError;

    fn from_str(s: &str) -> DatasetResult<Self> {
        Self::parse(s)
    }
}

/// Pairing recipe variant. Dictates when downsampling happens, whether the LR
/// view is round-tripped back to full resolution, and which auxiliary inputs
/// are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Post-upsampling with sub-pixel convolution output: LR stays small.
    ResnetSpc,
    /// Post-upsampling with resize convolution output: LR stays small.
    ResnetRec,
    /// Pre-upsampling via interpolation: LR is round-tripped to HR size.
    ResnetInt,
    /// Continuous/arbitrary-scale variant: per-batch random scale plus a
    /// coordinate-mapping grid. No auxiliary channel support.
    ResnetMup,
}

impl ModelFamily {
    pub fn parse(name: &str) -> DatasetResult<Self> {
        match name {
            "resnet_spc" => Ok(ModelFamily::ResnetSpc),
            "resnet_rec" => Ok(ModelFamily::ResnetRec),
            "resnet_int" => Ok(ModelFamily::ResnetInt),
            "resnet_mup" => Ok(ModelFamily::ResnetMup),
            other => Err(DatasetError::UnknownModel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::ResnetSpc => "resnet_spc",
            ModelFamily::ResnetRec => "resnet_rec",
            ModelFamily::ResnetInt => "resnet_int",
            ModelFamily::ResnetMup => "resnet_mup",
        }
    }

    /// Families that downsample a crop by an exact integer ratio need
    /// `patch_size % scale == 0`.
    pub fn requires_integral_scale(&self) -> bool {
        matches!(self, ModelFamily::ResnetSpc | ModelFamily::ResnetRec)
    }

    /// Whether topography, land/ocean masks and predictors may be attached.
    pub fn supports_auxiliary(&self) -> bool {
        !matches!(self, ModelFamily::ResnetMup)
    }
}

impl FromStr for ModelFamily {
    type Err = DatasetError;

    fn from_str(s: &str) -> DatasetResult<Self> {
        Self::parse(s)
    }
}

/// Top-left pixel coordinate of a square crop, in the coordinate space of the
/// field it was drawn on. One anchor registers the HR field, the auxiliary
/// fields, and (scaled) any LR-native predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub row: usize,
    pub col: usize,
}

impl Anchor {
    pub const ORIGIN: Anchor = Anchor { row: 0, col: 0 };

    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Map an LR-native anchor into HR pixel space.
    pub fn scaled(self, factor: usize) -> Anchor {
        Anchor {
            row: self.row * factor,
            col: self.col * factor,
        }
    }
}

/// One aligned training sample: an HR patch `(size, size, 1)` and an LR patch
/// `(lr_h, lr_w, 1 + predictors + topography? + landocean?)`, co-registered
/// via `anchor` (HR pixel coordinates).
#[derive(Debug, Clone)]
pub struct SamplePair {
    pub hr: Array3<f32>,
    pub lr: Array3<f32>,
    pub anchor: Anchor,
}

/// A stacked mini-batch. `coords` is populated only for `resnet_mup`: one
/// coordinate grid per batch, replicated across samples. `scale` is the ratio
/// the batch was actually built with (randomly drawn for `resnet_mup`).
#[derive(Debug, Clone)]
pub struct Batch {
    pub hr: Array4<f32>,
    pub lr: Array4<f32>,
    pub coords: Option<Array4<f32>>,
    pub scale: f32,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.hr.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Engine configuration. Auxiliary arrays (topography, land/ocean mask,
/// predictors) are attached separately since they are data, not settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Pairing recipe to apply.
    pub model: ModelFamily,
    /// Integer downsampling ratio between HR and LR. For `resnet_mup` this is
    /// the upper bound of the per-batch random scale.
    pub scale: usize,
    /// Side length of the square HR crop. `None` uses the full field.
    pub patch_size: Option<usize>,
    /// Kernel for the main field and topography. Land/ocean masks are always
    /// resampled with nearest-neighbor regardless of this setting.
    pub interpolation: Interpolation,
    /// Samples per produced batch.
    pub batch_size: usize,
    /// Seed for reproducible shuffling, cropping and scale draws. `None`
    /// seeds from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            model: ModelFamily::ResnetSpc,
            scale: 4,
            patch_size: Some(40),
            interpolation: Interpolation::Nearest,
            batch_size: 32,
            seed: None,
        }
    }
}
