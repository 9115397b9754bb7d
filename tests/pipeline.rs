//! Integration tests for end-to-end pairing and batching workflows.
//!
//! These tests verify that the major workflows work correctly together:
//! 1. Field stack → PairBuilder → registered (HR, LR) pairs
//! 2. Field stack → EpochSampler / RandomSampler → stacked batches
//! 3. Auxiliary channels (topography, mask, predictors) riding along in
//!    registration with the main field

use downscale_dataset::{
    coord_grid, DataSource, DatasetConfig, DatasetError, EpochSampler, Interpolation, ModelFamily,
    PairBuilder, ProduceBatch, RandomSampler,
};
use ndarray::{Array2, Array3, Axis};
use std::collections::HashSet;

/// Synthetic stack of `n` fields where every pixel of field `i` carries its
/// own row index, so crops reveal their anchor.
fn row_ramp_stack(n: usize, h: usize, w: usize) -> Array3<f32> {
    Array3::from_shape_fn((n, h, w), |(_, r, _)| r as f32)
}

fn base_cfg() -> DatasetConfig {
    DatasetConfig {
        model: ModelFamily::ResnetSpc,
        scale: 4,
        patch_size: Some(16),
        interpolation: Interpolation::Nearest,
        batch_size: 4,
        seed: Some(7),
    }
}

#[test]
fn workflow_spc_row_ramp_shapes_and_values() -> anyhow::Result<()> {
    let fields = row_ramp_stack(12, 64, 64);
    let cfg = base_cfg();
    let builder = PairBuilder::new(&cfg)?;
    let mut epoch = EpochSampler::new(DataSource::new(fields.view()), builder, &cfg)?;

    let batch = epoch.get_batch(0)?;
    assert_eq!(batch.hr.shape(), &[4, 16, 16, 1]);
    assert_eq!(batch.lr.shape(), &[4, 4, 4, 1]);
    assert!(batch.coords.is_none());

    // Every LR pixel must sit inside the HR block it was downsampled from:
    // the HR patch rows span [anchor, anchor + 16), so LR row i holds a row
    // index from [hr_row_0 + 4i, hr_row_0 + 4i + 4).
    for s in 0..batch.len() {
        let hr_row_0 = batch.hr[[s, 0, 0, 0]];
        for i in 0..4 {
            let v = batch.lr[[s, i, 0, 0]];
            let lo = hr_row_0 + 4.0 * i as f32;
            assert!(v >= lo && v < lo + 4.0, "lr value {v} outside block [{lo}, {})", lo + 4.0);
        }
    }
    Ok(())
}

#[test]
fn workflow_epoch_traversal_covers_each_index_once() -> anyhow::Result<()> {
    // Constant-valued fields encode their sample index.
    let fields = Array3::from_shape_fn((10, 8, 8), |(i, _, _)| i as f32);
    let cfg = DatasetConfig {
        patch_size: None,
        batch_size: 3,
        ..base_cfg()
    };
    let builder = PairBuilder::new(&cfg)?;
    let mut epoch = EpochSampler::new(DataSource::new(fields.view()), builder, &cfg)?;

    assert_eq!(epoch.len(), 3);
    let mut visited = HashSet::new();
    for i in 0..epoch.len() {
        let batch = epoch.get_batch(i)?;
        for s in 0..batch.len() {
            assert!(visited.insert(batch.hr[[s, 0, 0, 0]] as usize));
        }
    }
    assert_eq!(visited.len(), 9);

    epoch.end_of_epoch();
    let batch = epoch.get_batch(0)?;
    assert_eq!(batch.len(), 3);
    Ok(())
}

#[test]
fn workflow_auxiliary_channels_ride_along() -> anyhow::Result<()> {
    let fields = row_ramp_stack(6, 32, 32);
    let topography = Array2::from_shape_fn((32, 32), |(r, c)| (r * 32 + c) as f32);
    let landocean = Array2::from_shape_fn((32, 32), |(r, c)| ((r + c) % 2) as f32);
    let predictors = Array3::from_shape_fn((6, 8, 8), |(i, _, _)| (100 * i) as f32);

    let cfg = DatasetConfig {
        batch_size: 2,
        interpolation: Interpolation::Bicubic,
        ..base_cfg()
    };
    let builder = PairBuilder::new(&cfg)?
        .with_topography(topography.view())?
        .with_landocean(landocean.view())?;
    let source = DataSource::new(fields.view()).with_predictors(vec![predictors.view()])?;
    let mut epoch = EpochSampler::new(source, builder, &cfg)?;

    let batch = epoch.get_batch(0)?;
    // main + 1 predictor + topography + mask
    assert_eq!(batch.lr.shape(), &[2, 4, 4, 4]);
    assert_eq!(batch.hr.shape(), &[2, 16, 16, 1]);

    // The mask channel is always resampled nearest, so it keeps {0, 1}.
    for s in 0..batch.len() {
        for v in batch.lr.index_axis(Axis(0), s).index_axis(Axis(2), 3).iter() {
            assert!(*v == 0.0 || *v == 1.0);
        }
    }
    Ok(())
}

#[test]
fn workflow_random_sampler_streams_indefinitely() -> anyhow::Result<()> {
    let fields = Array3::from_shape_fn((5, 16, 16), |(i, _, _)| i as f32);
    let cfg = DatasetConfig {
        batch_size: 5,
        patch_size: Some(8),
        ..base_cfg()
    };
    let builder = PairBuilder::new(&cfg)?;
    let mut random = RandomSampler::new(DataSource::new(fields.view()), builder, &cfg)?;

    // More draws than one epoch could hold: indices recur across batches.
    for _ in 0..4 {
        let batch = random.produce_batch()?;
        assert_eq!(batch.hr.shape(), &[5, 8, 8, 1]);
        assert_eq!(batch.lr.shape(), &[5, 2, 2, 1]);
    }
    Ok(())
}

#[test]
fn workflow_mup_batches_share_scale_and_coords() -> anyhow::Result<()> {
    let fields = row_ramp_stack(8, 64, 64);
    let cfg = DatasetConfig {
        model: ModelFamily::ResnetMup,
        batch_size: 4,
        ..base_cfg()
    };
    let builder = PairBuilder::new(&cfg)?;
    let mut epoch = EpochSampler::new(DataSource::new(fields.view()), builder, &cfg)?;

    let batch = epoch.produce_batch()?;
    assert!(batch.scale >= 1.0 && batch.scale <= 4.0);
    let coords = batch.coords.expect("mup batches carry a coordinate grid");
    assert_eq!(coords.shape()[0], 4);
    let expected = coord_grid((16, 16), batch.scale);
    for sample in coords.outer_iter() {
        assert_eq!(sample, expected.view());
    }
    Ok(())
}

#[test]
fn workflow_misconfiguration_fails_fast() {
    let fields = row_ramp_stack(4, 64, 64);

    // patch_size not divisible by scale: rejected at construction.
    let cfg = DatasetConfig {
        patch_size: Some(15),
        ..base_cfg()
    };
    assert!(matches!(
        PairBuilder::new(&cfg),
        Err(DatasetError::PatchNotDivisible { .. })
    ));

    // Unrecognized wire names: rejected at the string boundary.
    assert!(matches!(
        "resnet_gan".parse::<ModelFamily>(),
        Err(DatasetError::UnknownModel(_))
    ));
    assert!(matches!(
        "lanczos".parse::<Interpolation>(),
        Err(DatasetError::UnknownInterpolation(_))
    ));

    // Oversized crop: rejected when the batch is built.
    let cfg = DatasetConfig {
        patch_size: Some(128),
        batch_size: 2,
        ..base_cfg()
    };
    let builder = PairBuilder::new(&cfg).unwrap();
    let mut epoch =
        EpochSampler::new(DataSource::new(fields.view()), builder, &cfg).unwrap();
    assert!(matches!(
        epoch.get_batch(0),
        Err(DatasetError::CropOutOfBounds { .. })
    ));
}
