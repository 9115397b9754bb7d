//! Construction of one aligned (HR, LR) sample per model family.
//!
//! The family string from the configuration is resolved once, at builder
//! construction, into a tagged [`Recipe`]; each build call then dispatches to
//! one pure recipe function. Family-specific invariants (divisibility for the
//! post-upsampling families, no auxiliary channels under `resnet_mup`) are
//! enforced structurally instead of being re-checked per sample.
//!
//! Channel order of the LR output is fixed: main field, then predictors,
//! then topography, then land/ocean mask. Downstream models address channels
//! by position.

use crate::crop::{crop_at, random_anchor};
use crate::resize::resize;
use crate::types::{
    Anchor, DatasetConfig, DatasetError, DatasetResult, Interpolation, ModelFamily, SamplePair,
};
use log::debug;
use ndarray::{concatenate, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::{Rng, RngCore};

/// Pairing recipe, resolved once from the configured [`ModelFamily`].
#[derive(Debug, Clone, Copy)]
enum Recipe {
    /// `resnet_spc` / `resnet_rec`: LR is a pure downsample of the HR crop.
    PostUpsampling { scale: usize },
    /// `resnet_int`: the whole field is round-tripped down and back up before
    /// cropping, so HR and LR share the anchor at full resolution.
    PreUpsampling { scale: usize },
    /// `resnet_mup`: per-batch random scale in `[1, max_scale]`, bicubic
    /// downsample of the crop only.
    MultiScale { max_scale: f32 },
}

/// Intermediate data handed to an injected inspection callback after each
/// pair is built. Debug-only collaborator; core correctness never depends on
/// it.
#[derive(Debug)]
pub struct PairTrace<'t> {
    pub anchor: Anchor,
    pub scale: f32,
    pub hr: ArrayView3<'t, f32>,
    pub lr: ArrayView3<'t, f32>,
}

/// Builds spatially registered (HR, LR) sample pairs for one model family.
///
/// Auxiliary fields are attached once and reused for every sample; predictor
/// fields vary per sample and are passed to [`PairBuilder::build_pair`].
pub struct PairBuilder<'a> {
    model: ModelFamily,
    recipe: Recipe,
    patch_size: Option<usize>,
    interpolation: Interpolation,
    topography: Option<ArrayView2<'a, f32>>,
    landocean: Option<ArrayView2<'a, f32>>,
    inspect: Option<Box<dyn FnMut(PairTrace<'_>) + 'a>>,
}

impl std::fmt::Debug for PairBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairBuilder")
            .field("model", &self.model)
            .field("recipe", &self.recipe)
            .field("patch_size", &self.patch_size)
            .field("interpolation", &self.interpolation)
            .field("topography", &self.topography)
            .field("landocean", &self.landocean)
            .field("inspect", &self.inspect.as_ref().map(|_| "FnMut"))
            .finish()
    }
}

impl<'a> PairBuilder<'a> {
    pub fn new(cfg: &DatasetConfig) -> DatasetResult<Self> {
        Self::with_options(cfg.model, cfg.scale, cfg.patch_size, cfg.interpolation)
    }

    pub fn with_options(
        model: ModelFamily,
        scale: usize,
        patch_size: Option<usize>,
        interpolation: Interpolation,
    ) -> DatasetResult<Self> {
        if scale == 0 {
            return Err(DatasetError::InvalidScale { scale });
        }
        if model.requires_integral_scale() {
            if let Some(p) = patch_size {
                if p % scale != 0 {
                    return Err(DatasetError::PatchNotDivisible {
                        patch_size: p,
                        scale,
                    });
                }
            }
        }
        let recipe = match model {
            ModelFamily::ResnetSpc | ModelFamily::ResnetRec => Recipe::PostUpsampling { scale },
            ModelFamily::ResnetInt => Recipe::PreUpsampling { scale },
            ModelFamily::ResnetMup => {
                if patch_size.is_none() {
                    return Err(DatasetError::MissingPatchSize);
                }
                Recipe::MultiScale {
                    max_scale: scale as f32,
                }
            }
        };
        Ok(Self {
            model,
            recipe,
            patch_size,
            interpolation,
            topography: None,
            landocean: None,
            inspect: None,
        })
    }

    /// Attach a static HR-resolution topography field, appended to every LR
    /// patch as a trailing channel.
    pub fn with_topography(mut self, topography: ArrayView2<'a, f32>) -> DatasetResult<Self> {
        if !self.model.supports_auxiliary() {
            return Err(DatasetError::UnsupportedAuxiliary {
                family: self.model.as_str(),
                what: "topography",
            });
        }
        self.topography = Some(topography);
        Ok(self)
    }

    /// Attach a static HR-resolution land/ocean mask. Mask values are
    /// integer-coded, so any resampling of this channel uses nearest-neighbor
    /// regardless of the configured interpolation.
    pub fn with_landocean(mut self, landocean: ArrayView2<'a, f32>) -> DatasetResult<Self> {
        if !self.model.supports_auxiliary() {
            return Err(DatasetError::UnsupportedAuxiliary {
                family: self.model.as_str(),
                what: "a land/ocean mask",
            });
        }
        self.landocean = Some(landocean);
        Ok(self)
    }

    /// Inject a callback receiving every built pair (crops, anchor, scale).
    pub fn with_inspect(mut self, inspect: impl FnMut(PairTrace<'_>) + 'a) -> Self {
        self.inspect = Some(Box::new(inspect));
        self
    }

    pub fn model(&self) -> ModelFamily {
        self.model
    }

    pub fn patch_size(&self) -> Option<usize> {
        self.patch_size
    }

    pub(crate) fn is_multi_scale(&self) -> bool {
        matches!(self.recipe, Recipe::MultiScale { .. })
    }

    /// The scale the next pair will be built with: the configured ratio for
    /// the fixed-scale families, a fresh uniform draw from `[1, max_scale]`
    /// for `resnet_mup`.
    pub fn draw_scale(&self, rng: &mut dyn RngCore) -> f32 {
        match self.recipe {
            Recipe::PostUpsampling { scale } | Recipe::PreUpsampling { scale } => scale as f32,
            Recipe::MultiScale { max_scale } => rng.random_range(1.0..=max_scale),
        }
    }

    /// Build one registered sample pair from an HR field and optional
    /// per-sample predictor fields (LR-native, one per variable).
    pub fn build_pair(
        &mut self,
        field: ArrayView2<'_, f32>,
        predictors: Option<&[ArrayView2<'_, f32>]>,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<SamplePair> {
        let (pair, scale) = match self.recipe {
            Recipe::PostUpsampling { scale } => {
                (self.build_post(field, predictors, scale, rng)?, scale as f32)
            }
            Recipe::PreUpsampling { scale } => {
                (self.build_pre(field, predictors, scale, rng)?, scale as f32)
            }
            Recipe::MultiScale { max_scale } => {
                if predictors.is_some_and(|p| !p.is_empty()) {
                    return Err(DatasetError::UnsupportedAuxiliary {
                        family: self.model.as_str(),
                        what: "predictors",
                    });
                }
                let scale = rng.random_range(1.0..=max_scale);
                (self.build_multi_scale(field, scale, rng)?, scale)
            }
        };
        self.emit_trace(&pair, scale);
        Ok(pair)
    }

    /// `resnet_mup` only: build a pair at an externally drawn scale, so a
    /// whole batch can share one scale and one coordinate grid.
    pub fn build_pair_at_scale(
        &mut self,
        field: ArrayView2<'_, f32>,
        scale: f32,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<SamplePair> {
        match self.recipe {
            Recipe::MultiScale { .. } => {
                let pair = self.build_multi_scale(field, scale, rng)?;
                self.emit_trace(&pair, scale);
                Ok(pair)
            }
            _ => Err(DatasetError::Other(format!(
                "per-batch scales only apply to resnet_mup, not {}",
                self.model.as_str()
            ))),
        }
    }

    /// Post-upsampling recipe (`resnet_spc` / `resnet_rec`): crop HR, then
    /// downsample the crop. When predictors are present the anchor is chosen
    /// on their LR grid first and lifted into HR space by the scale factor,
    /// which keeps both crops registered.
    fn build_post(
        &self,
        field: ArrayView2<'_, f32>,
        predictors: Option<&[ArrayView2<'_, f32>]>,
        scale: usize,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<SamplePair> {
        let (h, w) = field.dim();
        self.check_aux_extent(h, w)?;
        let preds = predictors.filter(|p| !p.is_empty());

        let (hr_patch, anchor, lr_h, lr_w, mut channels) = match self.patch_size {
            Some(p) => {
                let lr_size = p / scale;
                if let Some(preds) = preds {
                    let (ph, pw) = predictor_extent(preds)?;
                    let lr_anchor = random_anchor(ph, pw, lr_size, rng)?;
                    let anchor = lr_anchor.scaled(scale);
                    let hr = crop_at(field, p, anchor)?;
                    let mut channels =
                        vec![resize(hr.view(), lr_size, lr_size, self.interpolation)];
                    for pr in preds {
                        channels.push(crop_at(*pr, lr_size, lr_anchor)?);
                    }
                    (hr, anchor, lr_size, lr_size, channels)
                } else {
                    let anchor = random_anchor(h, w, p, rng)?;
                    let hr = crop_at(field, p, anchor)?;
                    let channels = vec![resize(hr.view(), lr_size, lr_size, self.interpolation)];
                    (hr, anchor, lr_size, lr_size, channels)
                }
            }
            None => {
                let (lr_h, lr_w) = (h / scale, w / scale);
                let mut channels = vec![resize(field, lr_h, lr_w, self.interpolation)];
                if let Some(preds) = preds {
                    for pr in preds {
                        if pr.dim() != (lr_h, lr_w) {
                            return Err(DatasetError::ShapeMismatch {
                                what: "predictor field",
                                expected: (lr_h, lr_w),
                                actual: pr.dim(),
                            });
                        }
                        channels.push(pr.to_owned());
                    }
                }
                (field.to_owned(), Anchor::ORIGIN, lr_h, lr_w, channels)
            }
        };

        if let Some(topo) = self.topography {
            let patch = self.crop_aux(topo, anchor)?;
            channels.push(resize(patch.view(), lr_h, lr_w, self.interpolation));
        }
        if let Some(mask) = self.landocean {
            let patch = self.crop_aux(mask, anchor)?;
            channels.push(resize(patch.view(), lr_h, lr_w, Interpolation::Nearest));
        }

        Ok(SamplePair {
            hr: hr_patch.insert_axis(Axis(2)),
            lr: stack_channels(channels)?,
            anchor,
        })
    }

    /// Pre-upsampling recipe (`resnet_int`): round-trip the whole field down
    /// and back up, then crop HR and the resized LR at the identical anchor.
    /// Predictors are upsampled to HR resolution before cropping.
    fn build_pre(
        &self,
        field: ArrayView2<'_, f32>,
        predictors: Option<&[ArrayView2<'_, f32>]>,
        scale: usize,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<SamplePair> {
        let (h, w) = field.dim();
        self.check_aux_extent(h, w)?;
        let preds = predictors.filter(|p| !p.is_empty());

        let down = resize(field, h / scale, w / scale, self.interpolation);
        let up = resize(down.view(), h, w, self.interpolation);

        let (hr_patch, lr_main, anchor) = match self.patch_size {
            Some(p) => {
                let anchor = random_anchor(h, w, p, rng)?;
                (
                    crop_at(field, p, anchor)?,
                    crop_at(up.view(), p, anchor)?,
                    anchor,
                )
            }
            None => (field.to_owned(), up, Anchor::ORIGIN),
        };

        let mut channels = vec![lr_main];
        if let Some(preds) = preds {
            for pr in preds {
                let hr_pred = resize(*pr, h, w, self.interpolation);
                channels.push(match self.patch_size {
                    Some(p) => crop_at(hr_pred.view(), p, anchor)?,
                    None => hr_pred,
                });
            }
        }
        if let Some(topo) = self.topography {
            channels.push(self.crop_aux(topo, anchor)?);
        }
        if let Some(mask) = self.landocean {
            channels.push(self.crop_aux(mask, anchor)?);
        }

        Ok(SamplePair {
            hr: hr_patch.insert_axis(Axis(2)),
            lr: stack_channels(channels)?,
            anchor,
        })
    }

    /// Multi-scale recipe (`resnet_mup`): random crop, bicubic downsample of
    /// the crop only. Auxiliary channels are rejected upstream.
    fn build_multi_scale(
        &self,
        field: ArrayView2<'_, f32>,
        scale: f32,
        rng: &mut dyn RngCore,
    ) -> DatasetResult<SamplePair> {
        let (h, w) = field.dim();
        let p = self.patch_size.ok_or(DatasetError::MissingPatchSize)?;
        let anchor = random_anchor(h, w, p, rng)?;
        let hr = crop_at(field, p, anchor)?;
        let lr_size = ((p as f32 / scale) as usize).max(1);
        let lr = resize(hr.view(), lr_size, lr_size, Interpolation::Bicubic);
        Ok(SamplePair {
            hr: hr.insert_axis(Axis(2)),
            lr: lr.insert_axis(Axis(2)),
            anchor,
        })
    }

    /// Crop an auxiliary field at the shared HR anchor, or pass it through
    /// whole when the pair is built unpatched.
    fn crop_aux(&self, aux: ArrayView2<'_, f32>, anchor: Anchor) -> DatasetResult<Array2<f32>> {
        match self.patch_size {
            Some(p) => crop_at(aux, p, anchor),
            None => Ok(aux.to_owned()),
        }
    }

    fn check_aux_extent(&self, h: usize, w: usize) -> DatasetResult<()> {
        if let Some(topo) = self.topography {
            if topo.dim() != (h, w) {
                return Err(DatasetError::ShapeMismatch {
                    what: "topography",
                    expected: (h, w),
                    actual: topo.dim(),
                });
            }
        }
        if let Some(mask) = self.landocean {
            if mask.dim() != (h, w) {
                return Err(DatasetError::ShapeMismatch {
                    what: "land/ocean mask",
                    expected: (h, w),
                    actual: mask.dim(),
                });
            }
        }
        Ok(())
    }

    fn emit_trace(&mut self, pair: &SamplePair, scale: f32) {
        debug!(
            "{} pair: hr {:?} lr {:?} anchor ({}, {}) scale {scale}",
            self.model.as_str(),
            pair.hr.shape(),
            pair.lr.shape(),
            pair.anchor.row,
            pair.anchor.col,
        );
        if let Some(inspect) = self.inspect.as_mut() {
            inspect(PairTrace {
                anchor: pair.anchor,
                scale,
                hr: pair.hr.view(),
                lr: pair.lr.view(),
            });
        }
    }
}

/// Per-pixel coordinate grid for the multi-scale family: for every HR pixel,
/// the fractional part of its position on the implied LR grid plus the
/// inverse scale. Depends only on extents and scale, so one grid per batch
/// suffices.
pub fn coord_grid(hr_size: (usize, usize), scale: f32) -> Array3<f32> {
    let (h, w) = hr_size;
    Array3::from_shape_fn((h, w, 3), |(r, c, ch)| match ch {
        0 => (r as f32 / scale).fract(),
        1 => (c as f32 / scale).fract(),
        _ => 1.0 / scale,
    })
}

fn predictor_extent(preds: &[ArrayView2<'_, f32>]) -> DatasetResult<(usize, usize)> {
    let extent = preds[0].dim();
    for pr in preds {
        if pr.dim() != extent {
            return Err(DatasetError::ShapeMismatch {
                what: "predictor field",
                expected: extent,
                actual: pr.dim(),
            });
        }
    }
    Ok(extent)
}

fn stack_channels(channels: Vec<Array2<f32>>) -> DatasetResult<Array3<f32>> {
    let layers: Vec<Array3<f32>> = channels
        .into_iter()
        .map(|c| c.insert_axis(Axis(2)))
        .collect();
    let views: Vec<_> = layers.iter().map(|l| l.view()).collect();
    concatenate(Axis(2), &views)
        .map_err(|e| DatasetError::Other(format!("channel concatenation failed: {e}")))
}
