//! Train/test partitioning and mini-batch loading over window indices

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{PipelineError, PipelineResult};
use super::windows::WindowedSeries;

/// Disjoint window index subsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `total` window indices into train and test subsets.
///
/// `test_count = floor(total * test_size)`; the train subset is the first
/// `total - test_count` indices of the (optionally shuffled) order.
pub fn train_test_split(
    total: usize,
    test_size: f64,
    shuffle: bool,
    rng: Option<&mut StdRng>,
) -> PipelineResult<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test_size must be between 0 and 1, got {}",
            test_size
        )));
    }

    let test_count = (total as f64 * test_size).floor() as usize;
    let train_count = total - test_count;

    let mut indices: Vec<usize> = (0..total).collect();
    if shuffle {
        match rng {
            Some(rng) => indices.shuffle(rng),
            None => indices.shuffle(&mut rand::thread_rng()),
        }
    }

    let test = indices.split_off(train_count);

    Ok(TrainTestSplit { train: indices, test })
}

/// Mini-batches of windows drawn from one subset of a series
pub struct DataLoader<'a> {
    series: &'a WindowedSeries,
    indices: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl<'a> DataLoader<'a> {
    pub fn new(
        series: &'a WindowedSeries,
        indices: Vec<usize>,
        batch_size: usize,
        shuffle: bool,
        rng: StdRng,
    ) -> Self {
        Self {
            series,
            indices,
            batch_size: batch_size.max(1),
            shuffle,
            rng,
        }
    }

    /// Windows covered by this loader
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Batches per epoch, last one may be partial
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Index batches for the next epoch, reshuffled when shuffling is on
    pub fn next_epoch(&mut self) -> Vec<Vec<usize>> {
        let mut order = self.indices.clone();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        order.chunks(self.batch_size).map(|c| c.to_vec()).collect()
    }

    /// Materialize one batch as a `(batch, sequence_length, 1)` tensor
    pub fn load(&self, batch: &[usize]) -> PipelineResult<Array3<f32>> {
        self.series.batch(batch)
    }
}
