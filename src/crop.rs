//! Square patch extraction at fixed or random anchors.
//!
//! The random variant draws the anchor uniformly over the inclusive range
//! `[0, dim - size]` on each axis; an oversized request is a bounds error,
//! never a silent clamp. The anchored variant is deterministic and is what
//! keeps multiple fields sharing an extent in spatial registration.

use crate::types::{Anchor, DatasetError, DatasetResult};
use ndarray::{s, Array2, ArrayView2};
use rand::{Rng, RngCore};

/// Draw a uniformly random anchor for a `size` px square crop inside a
/// `height` x `width` field.
pub fn random_anchor(
    height: usize,
    width: usize,
    size: usize,
    rng: &mut dyn RngCore,
) -> DatasetResult<Anchor> {
    if size == 0 || size > height || size > width {
        return Err(DatasetError::CropOutOfBounds {
            size,
            height,
            width,
        });
    }
    let row = rng.random_range(0..=height - size);
    let col = rng.random_range(0..=width - size);
    Ok(Anchor { row, col })
}

/// Crop at a random valid anchor, returning the patch together with the
/// anchor used so that further fields can be cropped in registration.
pub fn crop_random(
    field: ArrayView2<'_, f32>,
    size: usize,
    rng: &mut dyn RngCore,
) -> DatasetResult<(Array2<f32>, Anchor)> {
    let (height, width) = field.dim();
    let anchor = random_anchor(height, width, size, rng)?;
    let patch = crop_at(field, size, anchor)?;
    Ok((patch, anchor))
}

/// Crop a `size` px square at a given anchor. Deterministic; identical calls
/// return identical patches.
pub fn crop_at(
    field: ArrayView2<'_, f32>,
    size: usize,
    anchor: Anchor,
) -> DatasetResult<Array2<f32>> {
    let (height, width) = field.dim();
    if anchor.row + size > height || anchor.col + size > width {
        return Err(DatasetError::AnchorOutOfBounds {
            row: anchor.row,
            col: anchor.col,
            size,
            height,
            width,
        });
    }
    Ok(field
        .slice(s![
            anchor.row..anchor.row + size,
            anchor.col..anchor.col + size
        ])
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn coord_field(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| (r * 1000 + c) as f32)
    }

    #[test]
    fn anchored_crop_is_deterministic() {
        let field = coord_field(16, 16);
        let anchor = Anchor::new(3, 5);
        let a = crop_at(field.view(), 4, anchor).unwrap();
        let b = crop_at(field.view(), 4, anchor).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[[0, 0]], 3005.0);
        assert_eq!(a[[3, 3]], 6008.0);
    }

    #[test]
    fn random_crop_stays_inside_and_reports_its_anchor() {
        let field = coord_field(20, 14);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (patch, anchor) = crop_random(field.view(), 6, &mut rng).unwrap();
            assert!(anchor.row <= 14 && anchor.col <= 8);
            assert_eq!(patch.dim(), (6, 6));
            assert_eq!(patch[[0, 0]], (anchor.row * 1000 + anchor.col) as f32);
        }
    }

    #[test]
    fn exact_fit_yields_the_origin() {
        let field = coord_field(5, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let (_, anchor) = crop_random(field.view(), 5, &mut rng).unwrap();
        assert_eq!(anchor, Anchor::ORIGIN);
    }

    #[test]
    fn oversized_crop_is_a_bounds_error() {
        let field = coord_field(8, 12);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            crop_random(field.view(), 9, &mut rng),
            Err(DatasetError::CropOutOfBounds { size: 9, .. })
        ));
    }

    #[test]
    fn overrunning_anchor_is_a_bounds_error() {
        let field = coord_field(8, 8);
        assert!(matches!(
            crop_at(field.view(), 4, Anchor::new(6, 0)),
            Err(DatasetError::AnchorOutOfBounds { row: 6, .. })
        ));
    }
}
