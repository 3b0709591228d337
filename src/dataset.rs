//! Indexing and loading of segmentation samples.
//!
//! A split directory holds `images/`, `labels/`, and optionally `weights/`.
//! Label maps are grayscale with pixel value = class index; weight maps are
//! grayscale scaled to `[0, 1]` at load time (all-ones when absent). Files
//! pair by identical file names.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::augment::AugmentPipeline;
use crate::error::{ConfigError, DatasetError, DatasetResult};

/// Registered dataset layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// DRIVE-style layout with `training/` and `test/` splits.
    Drive,
    /// Generic layout with `train/` and `test/` splits.
    Folder,
}

impl DatasetKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "drive" => Ok(Self::Drive),
            "folder" => Ok(Self::Folder),
            _ => Err(ConfigError::UnknownName {
                kind: "dataset",
                name: name.to_string(),
            }),
        }
    }

    fn split_dir(&self, split: Split) -> &'static str {
        match (self, split) {
            (Self::Drive, Split::Train) => "training",
            (Self::Drive, Split::Test) => "test",
            (Self::Folder, Split::Train) => "train",
            (Self::Folder, Split::Test) => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

#[derive(Debug, Clone)]
pub struct SampleIndex {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
    pub weight_path: Option<PathBuf>,
}

/// A decoded sample ready for collation.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    /// CHW image data in `[0, 1]`; channel count follows `in_channels`.
    pub image_chw: Vec<f32>,
    /// Row-major class indices.
    pub labels: Vec<i64>,
    /// Row-major per-pixel loss weights.
    pub weights: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

/// Scan a split directory and index all image/label/weight triples, sorted
/// by file name. Every image must have a matching label file.
pub fn index_split(root: &Path, kind: DatasetKind, split: Split) -> DatasetResult<Vec<SampleIndex>> {
    let split_dir = root.join(kind.split_dir(split));
    let images_dir = split_dir.join("images");
    let labels_dir = split_dir.join("labels");
    let weights_dir = split_dir.join("weights");

    let entries = fs::read_dir(&images_dir).map_err(|e| DatasetError::Io {
        path: images_dir.clone(),
        source: e,
    })?;
    let mut indices = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let image_path = entry.path();
        if !image_path.is_file() || image_path.extension().is_none() {
            continue;
        }
        let Some(file_name) = image_path.file_name() else {
            continue;
        };
        let label_path = labels_dir.join(file_name);
        if !label_path.exists() {
            return Err(DatasetError::MissingLabel { path: image_path });
        }
        let weight_path = weights_dir.join(file_name);
        let weight_path = weight_path.exists().then_some(weight_path);
        indices.push(SampleIndex {
            image_path,
            label_path,
            weight_path,
        });
    }
    indices.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    Ok(indices)
}

/// Decode one sample, apply augmentation, and convert to host buffers.
/// Label pixels outside `[0, n_classes)` are validation errors.
pub fn load_sample(
    idx: &SampleIndex,
    in_channels: usize,
    n_classes: usize,
    pipeline: Option<&AugmentPipeline>,
    seed: Option<u64>,
) -> DatasetResult<DatasetSample> {
    let mut image = image::open(&idx.image_path)
        .map_err(|e| DatasetError::Image {
            path: idx.image_path.clone(),
            source: e,
        })?
        .to_rgb8();
    let mut label = image::open(&idx.label_path)
        .map_err(|e| DatasetError::Image {
            path: idx.label_path.clone(),
            source: e,
        })?
        .to_luma8();
    if label.dimensions() != image.dimensions() {
        return Err(DatasetError::Validation {
            path: idx.label_path.clone(),
            msg: format!(
                "label dimensions {:?} do not match image {:?}",
                label.dimensions(),
                image.dimensions()
            ),
        });
    }
    let mut weight = match &idx.weight_path {
        Some(path) => {
            let w = image::open(path)
                .map_err(|e| DatasetError::Image {
                    path: path.clone(),
                    source: e,
                })?
                .to_luma8();
            if w.dimensions() != image.dimensions() {
                return Err(DatasetError::Validation {
                    path: path.clone(),
                    msg: format!(
                        "weight dimensions {:?} do not match image {:?}",
                        w.dimensions(),
                        image.dimensions()
                    ),
                });
            }
            Some(w)
        }
        None => None,
    };

    if let Some(pipeline) = pipeline {
        // Seeded if provided (per-sample deterministic), else thread-local.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = seed {
            seeded_rng = StdRng::seed_from_u64(seed);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };
        pipeline.apply(&mut image, &mut label, weight.as_mut(), rng);
    }

    let (width, height) = image.dimensions();
    let pixels = (width * height) as usize;

    let mut image_chw = vec![0.0f32; in_channels * pixels];
    for (i, px) in image.pixels().enumerate() {
        match in_channels {
            1 => {
                let [r, g, b] = px.0;
                image_chw[i] = (r as f32 + g as f32 + b as f32) / (3.0 * 255.0);
            }
            _ => {
                for c in 0..in_channels.min(3) {
                    image_chw[c * pixels + i] = px.0[c] as f32 / 255.0;
                }
            }
        }
    }

    let mut labels = Vec::with_capacity(pixels);
    for (i, px) in label.pixels().enumerate() {
        let class = px.0[0] as usize;
        if class >= n_classes {
            let x = i as u32 % width;
            let y = i as u32 / width;
            return Err(DatasetError::Validation {
                path: idx.label_path.clone(),
                msg: format!("label value {class} at ({x}, {y}) exceeds n_classes {n_classes}"),
            });
        }
        labels.push(class as i64);
    }

    let weights = match &weight {
        Some(w) => w.pixels().map(|px| px.0[0] as f32 / 255.0).collect(),
        None => vec![1.0f32; pixels],
    };

    Ok(DatasetSample {
        image_chw,
        labels,
        weights,
        width,
        height,
    })
}
