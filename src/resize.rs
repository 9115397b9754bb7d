//! Resampling of 2D `f32` fields between resolutions.
//!
//! One primitive covers both downsampling and upsampling; the
//! downsample-then-upsample round trip used by the pre-upsampling family is
//! two successive calls. All kernels map output pixel centers to input
//! coordinates with the half-pixel convention and clamp at the edges, so no
//! padding value ever leaks into the result.

use crate::types::Interpolation;
use ndarray::{Array2, ArrayView2};

/// Resample `field` to `(out_h, out_w)` with the given kernel.
pub fn resize(
    field: ArrayView2<'_, f32>,
    out_h: usize,
    out_w: usize,
    method: Interpolation,
) -> Array2<f32> {
    let (in_h, in_w) = field.dim();
    if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
        return Array2::zeros((out_h, out_w));
    }
    if in_h == out_h && in_w == out_w {
        return field.to_owned();
    }
    match method {
        Interpolation::Nearest => resize_nearest(field, out_h, out_w),
        Interpolation::Bilinear => resize_bilinear(field, out_h, out_w),
        Interpolation::Bicubic => resize_bicubic(field, out_h, out_w),
    }
}

fn resize_nearest(field: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = field.dim();
    let ry = in_h as f32 / out_h as f32;
    let rx = in_w as f32 / out_w as f32;
    Array2::from_shape_fn((out_h, out_w), |(r, c)| {
        let sr = (((r as f32 + 0.5) * ry) as usize).min(in_h - 1);
        let sc = (((c as f32 + 0.5) * rx) as usize).min(in_w - 1);
        field[[sr, sc]]
    })
}

fn resize_bilinear(field: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = field.dim();
    let ry = in_h as f32 / out_h as f32;
    let rx = in_w as f32 / out_w as f32;
    Array2::from_shape_fn((out_h, out_w), |(r, c)| {
        let sy = ((r as f32 + 0.5) * ry - 0.5).clamp(0.0, (in_h - 1) as f32);
        let sx = ((c as f32 + 0.5) * rx - 0.5).clamp(0.0, (in_w - 1) as f32);
        let y0 = sy.floor() as usize;
        let x0 = sx.floor() as usize;
        let y1 = (y0 + 1).min(in_h - 1);
        let x1 = (x0 + 1).min(in_w - 1);
        let fy = sy - y0 as f32;
        let fx = sx - x0 as f32;
        let top = field[[y0, x0]] * (1.0 - fx) + field[[y0, x1]] * fx;
        let bottom = field[[y1, x0]] * (1.0 - fx) + field[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// Catmull-Rom cubic kernel (a = -0.5). Weights over the 4-tap window sum to
/// one, so constant fields are preserved exactly.
#[inline]
fn cubic_weight(x: f32) -> f32 {
    const A: f32 = -0.5;
    let x = x.abs();
    if x < 1.0 {
        (A + 2.0) * x * x * x - (A + 3.0) * x * x + 1.0
    } else if x < 2.0 {
        A * x * x * x - 5.0 * A * x * x + 8.0 * A * x - 4.0 * A
    } else {
        0.0
    }
}

fn resize_bicubic(field: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = field.dim();
    let ry = in_h as f32 / out_h as f32;
    let rx = in_w as f32 / out_w as f32;
    Array2::from_shape_fn((out_h, out_w), |(r, c)| {
        let sy = (r as f32 + 0.5) * ry - 0.5;
        let sx = (c as f32 + 0.5) * rx - 0.5;
        let iy = sy.floor();
        let ix = sx.floor();
        let mut acc = 0.0f32;
        for ky in -1..=2i32 {
            let wy = cubic_weight(sy - (iy + ky as f32));
            let row = (iy as i64 + ky as i64).clamp(0, in_h as i64 - 1) as usize;
            for kx in -1..=2i32 {
                let wx = cubic_weight(sx - (ix + kx as f32));
                let col = (ix as i64 + kx as i64).clamp(0, in_w as i64 - 1) as usize;
                acc += wy * wx * field[[row, col]];
            }
        }
        acc
    })
}
