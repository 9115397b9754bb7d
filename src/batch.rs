//! Mini-batch assembly over a collection of in-memory sample fields.
//!
//! Two iteration strategies are exposed behind the [`ProduceBatch`]
//! capability trait and must not be conflated:
//!
//! - [`EpochSampler`] is bounded: a per-epoch permutation visited without
//!   replacement, sliced into `len()` batches, reshuffled only by an explicit
//!   (or wrap-around) [`EpochSampler::end_of_epoch`].
//! - [`RandomSampler`] is unbounded: every batch is an independent uniform
//!   draw, with replacement across batches, for open-ended streaming use.
//!
//! Both read the caller's arrays immutably and mutate nothing but their own
//! RNG and permutation state.

use crate::pair::{coord_grid, PairBuilder};
use crate::types::{Batch, DatasetConfig, DatasetError, DatasetResult};
use log::debug;
use ndarray::{stack, Array4, ArrayView2, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Capability interface consumed by a training loop: one call, one batch.
pub trait ProduceBatch {
    fn produce_batch(&mut self) -> DatasetResult<Batch>;
}

/// Caller-owned input arrays for one dataset: the sample-major HR field stack
/// `[n, h, w]` and optional predictor stacks (one per variable, each
/// `[n, ph, pw]`, LR-native). Never mutated by the engine.
#[derive(Debug, Clone)]
pub struct DataSource<'a> {
    fields: ArrayView3<'a, f32>,
    predictors: Vec<ArrayView3<'a, f32>>,
}

impl<'a> DataSource<'a> {
    pub fn new(fields: ArrayView3<'a, f32>) -> Self {
        Self {
            fields,
            predictors: Vec::new(),
        }
    }

    /// Attach per-sample predictor stacks. Each must carry one 2D field per
    /// sample index.
    pub fn with_predictors(
        mut self,
        predictors: Vec<ArrayView3<'a, f32>>,
    ) -> DatasetResult<Self> {
        let n = self.len();
        for pred in &predictors {
            if pred.shape()[0] != n {
                return Err(DatasetError::ShapeMismatch {
                    what: "predictor stack",
                    expected: (n, pred.shape()[1]),
                    actual: (pred.shape()[0], pred.shape()[1]),
                });
            }
        }
        self.predictors = predictors;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fields.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_predictors(&self) -> usize {
        self.predictors.len()
    }

    fn field(&self, index: usize) -> ArrayView2<'_, f32> {
        self.fields.index_axis(Axis(0), index)
    }

    fn predictors_for(&self, index: usize) -> Option<Vec<ArrayView2<'_, f32>>> {
        if self.predictors.is_empty() {
            return None;
        }
        Some(
            self.predictors
                .iter()
                .map(|pred| pred.index_axis(Axis(0), index))
                .collect(),
        )
    }
}

/// Epoch-bounded batch iteration: a fixed permutation of all sample indices,
/// sliced without replacement. Indices beyond `len() * batch_size` are
/// dropped for the epoch, not wrapped.
pub struct EpochSampler<'a> {
    source: DataSource<'a>,
    builder: PairBuilder<'a>,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl<'a> EpochSampler<'a> {
    pub fn new(
        source: DataSource<'a>,
        builder: PairBuilder<'a>,
        cfg: &DatasetConfig,
    ) -> DatasetResult<Self> {
        check_capacity(&source, &builder, cfg.batch_size)?;
        let mut rng = seed_rng(cfg.seed);
        let mut order: Vec<usize> = (0..source.len()).collect();
        order.shuffle(&mut rng);
        Ok(Self {
            source,
            builder,
            batch_size: cfg.batch_size,
            order,
            cursor: 0,
            rng,
        })
    }

    /// Number of full batches per epoch.
    pub fn len(&self) -> usize {
        self.source.len() / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the `index`-th batch of the current epoch's permutation.
    pub fn get_batch(&mut self, index: usize) -> DatasetResult<Batch> {
        let len = self.len();
        if index >= len {
            return Err(DatasetError::BatchOutOfRange { index, len });
        }
        let start = index * self.batch_size;
        let indices: Vec<usize> = self.order[start..start + self.batch_size].to_vec();
        assemble_batch(&self.source, &mut self.builder, &indices, &mut self.rng)
    }

    /// Reshuffle the permutation for the next epoch.
    pub fn end_of_epoch(&mut self) {
        self.order.shuffle(&mut self.rng);
        debug!("epoch finished, permutation reshuffled ({} samples)", self.order.len());
    }
}

impl ProduceBatch for EpochSampler<'_> {
    /// Walks the epoch in order; at the boundary the permutation is
    /// reshuffled and iteration wraps to batch 0.
    fn produce_batch(&mut self) -> DatasetResult<Batch> {
        if self.cursor >= self.len() {
            self.end_of_epoch();
            self.cursor = 0;
        }
        let batch = self.get_batch(self.cursor)?;
        self.cursor += 1;
        Ok(batch)
    }
}

/// Open-ended batch sampling: each batch is an independent uniform draw of
/// `batch_size` distinct indices, with replacement across batches and no
/// permutation state. Intended for streaming-style training loops.
#[derive(Debug)]
pub struct RandomSampler<'a> {
    source: DataSource<'a>,
    builder: PairBuilder<'a>,
    batch_size: usize,
    rng: StdRng,
}

impl<'a> RandomSampler<'a> {
    pub fn new(
        source: DataSource<'a>,
        builder: PairBuilder<'a>,
        cfg: &DatasetConfig,
    ) -> DatasetResult<Self> {
        check_capacity(&source, &builder, cfg.batch_size)?;
        Ok(Self {
            source,
            builder,
            batch_size: cfg.batch_size,
            rng: seed_rng(cfg.seed),
        })
    }
}

impl ProduceBatch for RandomSampler<'_> {
    fn produce_batch(&mut self) -> DatasetResult<Batch> {
        let indices: Vec<usize> = rand::seq::index::sample(
            &mut self.rng,
            self.source.len(),
            self.batch_size,
        )
        .into_vec();
        assemble_batch(&self.source, &mut self.builder, &indices, &mut self.rng)
    }
}

fn seed_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

fn check_capacity(
    source: &DataSource<'_>,
    builder: &PairBuilder<'_>,
    batch_size: usize,
) -> DatasetResult<()> {
    if batch_size == 0 || batch_size > source.len() {
        return Err(DatasetError::BatchTooLarge {
            batch_size,
            samples: source.len(),
        });
    }
    if builder.is_multi_scale() && source.n_predictors() > 0 {
        return Err(DatasetError::UnsupportedAuxiliary {
            family: builder.model().as_str(),
            what: "predictors",
        });
    }
    Ok(())
}

/// Build one pair per index and stack the results. For the multi-scale
/// family a single scale is drawn here and shared by every sample in the
/// batch, together with one replicated coordinate grid.
fn assemble_batch(
    source: &DataSource<'_>,
    builder: &mut PairBuilder<'_>,
    indices: &[usize],
    rng: &mut StdRng,
) -> DatasetResult<Batch> {
    let scale = builder.draw_scale(rng);
    let multi_scale = builder.is_multi_scale();

    let mut pairs = Vec::with_capacity(indices.len());
    for &index in indices {
        let pair = if multi_scale {
            builder.build_pair_at_scale(source.field(index), scale, rng)?
        } else {
            let predictors = source.predictors_for(index);
            builder.build_pair(source.field(index), predictors.as_deref(), rng)?
        };
        pairs.push(pair);
    }

    let hr_views: Vec<_> = pairs.iter().map(|p| p.hr.view()).collect();
    let lr_views: Vec<_> = pairs.iter().map(|p| p.lr.view()).collect();
    let hr = stack(Axis(0), &hr_views)
        .map_err(|e| DatasetError::Other(format!("batch stacking failed: {e}")))?;
    let lr = stack(Axis(0), &lr_views)
        .map_err(|e| DatasetError::Other(format!("batch stacking failed: {e}")))?;

    let coords = if multi_scale {
        let patch = builder.patch_size().ok_or(DatasetError::MissingPatchSize)?;
        let grid = coord_grid((patch, patch), scale);
        let mut coords = Array4::zeros((indices.len(), patch, patch, 3));
        for mut sample in coords.outer_iter_mut() {
            sample.assign(&grid);
        }
        Some(coords)
    } else {
        None
    };

    debug!(
        "assembled batch: {} samples, hr {:?}, lr {:?}, scale {scale}",
        indices.len(),
        hr.shape(),
        lr.shape(),
    );
    Ok(Batch {
        hr,
        lr,
        coords,
        scale,
    })
}
