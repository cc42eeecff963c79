//! Batch iteration for training.

use crate::kitti::{index_training, load_sample};
use crate::types::{DatasetResult, ImageShape, SampleIndex, ROAD_CLASSES};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Every image and label is resized to this shape.
    pub image_shape: ImageShape,
    /// Shuffle sample order at the start of every epoch.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_shape: ImageShape::default(),
            shuffle: true,
            seed: None,
        }
    }
}

pub struct SegmentationBatch<B: Backend> {
    /// `[batch, 3, H, W]`, values in [0, 255].
    pub images: Tensor<B, 4>,
    /// One-hot `[batch, 2, H, W]`.
    pub labels: Tensor<B, 4>,
}

pub struct BatchIter {
    indices: Vec<SampleIndex>,
    cursor: usize,
    cfg: DatasetConfig,
    rng: StdRng,
    epoch: usize,
    processed_samples: usize,
    processed_batches: usize,
    total_load_time: Duration,
}

impl BatchIter {
    pub fn from_root(root: &Path, cfg: DatasetConfig) -> DatasetResult<Self> {
        let indices = index_training(root)?;
        Ok(Self::from_indices(indices, cfg))
    }

    pub fn from_indices(indices: Vec<SampleIndex>, cfg: DatasetConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut iter = Self {
            indices,
            cursor: 0,
            cfg,
            rng,
            epoch: 1,
            processed_samples: 0,
            processed_batches: 0,
            total_load_time: Duration::ZERO,
        };
        iter.shuffle();
        iter
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn image_shape(&self) -> ImageShape {
        self.cfg.image_shape
    }

    /// Samples in the order the current epoch visits them.
    pub fn indices(&self) -> &[SampleIndex] {
        &self.indices
    }

    /// 1-based epoch the iterator is serving; a new iterator is already in epoch 1.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Start the next epoch: rewind to the first sample, reshuffling when configured.
    pub fn reset_epoch(&mut self) {
        self.shuffle();
        self.cursor = 0;
        self.epoch += 1;
    }

    fn shuffle(&mut self) {
        if self.cfg.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Next batch of up to `batch_size` samples; the final partial batch is yielded.
    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<SegmentationBatch<B>>> {
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let batch_size = batch_size.max(1);
        let end = (self.cursor + batch_size).min(self.indices.len());
        let shape = self.cfg.image_shape;
        let slice = &self.indices[self.cursor..end];
        self.cursor = end;

        let t_load = Instant::now();
        let loaded: Vec<_> = slice
            .par_iter()
            .map(|idx| load_sample(idx, shape))
            .collect::<DatasetResult<Vec<_>>>()?;
        self.total_load_time += t_load.elapsed();

        let batch_len = loaded.len();
        let mut images_buf = Vec::with_capacity(batch_len * 3 * shape.pixels());
        let mut labels_buf = Vec::with_capacity(batch_len * ROAD_CLASSES * shape.pixels());
        for sample in &loaded {
            images_buf.extend_from_slice(&sample.image_chw);
            labels_buf.extend_from_slice(&sample.label_chw);
        }

        let (h, w) = (shape.height as usize, shape.width as usize);
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_buf, [batch_len, 3, h, w]),
            device,
        );
        let labels = Tensor::<B, 4>::from_data(
            TensorData::new(labels_buf, [batch_len, ROAD_CLASSES, h, w]),
            device,
        );

        self.processed_samples += batch_len;
        self.processed_batches += 1;
        log::debug!(
            "[dataset] epoch={} batches={} samples={} avg_load_ms={:.2}",
            self.epoch,
            self.processed_batches,
            self.processed_samples,
            self.total_load_time.as_secs_f64() * 1000.0 / self.processed_batches as f64
        );

        Ok(Some(SegmentationBatch { images, labels }))
    }
}
