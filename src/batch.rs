//! Batch iteration for training and evaluation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::augment::AugmentPipeline;
use crate::dataset::{load_sample, SampleIndex};
use crate::error::{DatasetError, DatasetResult};

pub struct SegBatch<B: burn::tensor::backend::Backend> {
    /// `[B, in_channels, H, W]` images in `[0, 1]`.
    pub images: burn::tensor::Tensor<B, 4>,
    /// `[B, H, W]` class indices.
    pub labels: burn::tensor::Tensor<B, 3, burn::tensor::Int>,
    /// `[B, H, W]` per-pixel loss weights.
    pub weights: burn::tensor::Tensor<B, 3>,
}

pub struct BatchIter {
    indices: Vec<SampleIndex>,
    cursor: usize,
    in_channels: usize,
    n_classes: usize,
    pipeline: Option<AugmentPipeline>,
    seed: Option<u64>,
    images_buf: Vec<f32>,
    labels_buf: Vec<i64>,
    weights_buf: Vec<f32>,
}

impl BatchIter {
    pub fn new(
        mut indices: Vec<SampleIndex>,
        in_channels: usize,
        n_classes: usize,
        pipeline: Option<AugmentPipeline>,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        if shuffle {
            indices.shuffle(&mut rng);
        }
        Self {
            indices,
            cursor: 0,
            in_channels,
            n_classes,
            pipeline: pipeline.filter(|p| !p.is_empty()),
            seed,
            images_buf: Vec::new(),
            labels_buf: Vec::new(),
            weights_buf: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Load and collate the next batch, or `None` once exhausted. All
    /// images in a batch must share dimensions.
    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<SegBatch<B>>> {
        if self.cursor >= self.indices.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size.max(1)).min(self.indices.len());
        let slice = &self.indices[self.cursor..end];
        let base = self.cursor;
        self.cursor = end;

        self.images_buf.clear();
        self.labels_buf.clear();
        self.weights_buf.clear();

        let in_channels = self.in_channels;
        let n_classes = self.n_classes;
        let pipeline = self.pipeline.as_ref();
        let seed = self.seed;
        let mut loaded: Vec<_> = slice
            .par_iter()
            .enumerate()
            .map(|(i, idx)| {
                // Mix the position in so augmentation differs per sample.
                let sample_seed = seed.map(|s| s ^ (base + i) as u64);
                (i, load_sample(idx, in_channels, n_classes, pipeline, sample_seed))
            })
            .collect();
        loaded.sort_by_key(|(i, _)| *i);

        let mut expected_size: Option<(u32, u32)> = None;
        for (_i, res) in loaded {
            let sample = res?;
            let size = (sample.width, sample.height);
            match expected_size {
                None => expected_size = Some(size),
                Some(sz) if sz != size => {
                    return Err(DatasetError::Other(
                        "batch contains varying image sizes; all samples in a batch must share dimensions"
                            .to_string(),
                    ));
                }
                _ => {}
            }
            self.images_buf.extend_from_slice(&sample.image_chw);
            self.labels_buf.extend_from_slice(&sample.labels);
            self.weights_buf.extend_from_slice(&sample.weights);
        }

        let (width, height) = expected_size.expect("non-empty slice sets the batch size");
        let (width, height) = (width as usize, height as usize);
        let batch_len = self.labels_buf.len() / (width * height);

        let images = burn::tensor::Tensor::<B, 1>::from_floats(self.images_buf.as_slice(), device)
            .reshape([batch_len, self.in_channels, height, width]);
        let labels = burn::tensor::Tensor::<B, 1, burn::tensor::Int>::from_data(
            burn::tensor::TensorData::new(self.labels_buf.clone(), [self.labels_buf.len()]),
            device,
        )
        .reshape([batch_len, height, width]);
        let weights =
            burn::tensor::Tensor::<B, 1>::from_floats(self.weights_buf.as_slice(), device)
                .reshape([batch_len, height, width]);

        Ok(Some(SegBatch {
            images,
            labels,
            weights,
        }))
    }
}
