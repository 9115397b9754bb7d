//! Paired HR/LR patch sampling and batching for super-resolution training on
//! 2D gridded fields (e.g. climate data).
//!
//! This crate provides utilities for:
//! - Resampling `f32` fields between resolutions (nearest/bilinear/bicubic)
//! - Registered square crops at fixed or random anchors
//! - Per-model-family HR/LR pair construction with auxiliary channels
//!   (topography, land/ocean mask, predictor fields)
//! - Shuffled mini-batch assembly with epoch-bounded or open-ended iteration
//!
//! Input arrays are caller-owned and read by view; batches are freshly
//! allocated `ndarray` stacks handed back to the training loop.

pub mod batch;
pub mod crop;
pub mod pair;
pub mod resize;
pub mod types;

// Re-export public API
pub use batch::{DataSource, EpochSampler, ProduceBatch, RandomSampler};
pub use crop::{crop_at, crop_random, random_anchor};
pub use pair::{coord_grid, PairBuilder, PairTrace};
pub use resize::resize;
pub use types::*;
