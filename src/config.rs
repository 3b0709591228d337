//! Training configuration: YAML document plus registry resolution.
//!
//! All registry names (dataset, loss, optimizer, scheduler, augmentations)
//! are resolved to enumerated tags while loading, so an unknown name fails
//! here instead of deep inside the epoch loop.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::augment::{build_ops, AugParam, AugmentOp};
use crate::dataset::DatasetKind;
use crate::error::ConfigError;
use crate::loss::LossKind;
use crate::model::{MergeMode, UnetConfig};
use crate::optim::{OptimizerSpec, SchedulerSpec};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data: DataSection,
    model: ModelSection,
    training: TrainingSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataSection {
    dataset: String,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    n_classes: usize,
    in_channels: usize,
    depth: usize,
    n_start_filters: usize,
    filter_num_scale: usize,
    merge_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    batch_size: usize,
    n_epochs: usize,
    loss: LossSection,
    optimizer: OptimizerSection,
    lr_scheduler: Option<SchedulerSection>,
    augmentations: Option<BTreeMap<String, AugParam>>,
    seed: Option<u64>,
    checkpoint_out: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LossSection {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptimizerSection {
    name: String,
    lr: Option<f64>,
    momentum: Option<f64>,
    weight_decay: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerSection {
    name: String,
    lr_start: Option<f64>,
    lr_end: Option<f64>,
}

/// Fully resolved training configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub dataset: DatasetKind,
    pub data_root: PathBuf,
    pub model: UnetConfig,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub loss: LossKind,
    pub optimizer: OptimizerSpec,
    pub scheduler: Option<SchedulerSpec>,
    pub augmentations: Vec<AugmentOp>,
    pub seed: Option<u64>,
    pub checkpoint_out: Option<PathBuf>,
}

impl TrainConfig {
    /// Load and resolve a YAML config. A missing file is an error before
    /// any model or data construction happens.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
        let dataset = DatasetKind::from_name(&file.data.dataset)?;
        let model = UnetConfig {
            n_classes: file.model.n_classes,
            in_channels: file.model.in_channels,
            depth: file.model.depth,
            n_start_filters: file.model.n_start_filters,
            filter_num_scale: file.model.filter_num_scale,
            merge_mode: MergeMode::from_name(&file.model.merge_mode)?,
        };
        validate_model(&model)?;

        let training = file.training;
        if training.batch_size == 0 {
            return Err(ConfigError::Invalid {
                msg: "training.batch_size must be at least 1".to_string(),
            });
        }
        if training.n_epochs == 0 {
            return Err(ConfigError::Invalid {
                msg: "training.n_epochs must be at least 1".to_string(),
            });
        }
        let loss = LossKind::from_name(&training.loss.name)?;
        let optimizer = OptimizerSpec::from_config(
            &training.optimizer.name,
            training.optimizer.lr,
            training.optimizer.momentum,
            training.optimizer.weight_decay,
        )?;
        let scheduler = match &training.lr_scheduler {
            Some(section) => Some(SchedulerSpec::from_config(
                &section.name,
                section.lr_start,
                section.lr_end,
            )?),
            None => None,
        };
        let augmentations = match &training.augmentations {
            Some(map) => build_ops(map)?,
            None => Vec::new(),
        };

        Ok(Self {
            dataset,
            data_root: file.data.path,
            model,
            batch_size: training.batch_size,
            n_epochs: training.n_epochs,
            loss,
            optimizer,
            scheduler,
            augmentations,
            seed: training.seed,
            checkpoint_out: training.checkpoint_out,
        })
    }
}

fn validate_model(model: &UnetConfig) -> Result<(), ConfigError> {
    if model.n_classes < 2 {
        return Err(ConfigError::Invalid {
            msg: "model.n_classes must be at least 2".to_string(),
        });
    }
    if model.in_channels != 1 && model.in_channels != 3 {
        return Err(ConfigError::Invalid {
            msg: format!(
                "model.in_channels must be 1 or 3, got {}",
                model.in_channels
            ),
        });
    }
    if model.depth == 0 {
        return Err(ConfigError::Invalid {
            msg: "model.depth must be at least 1".to_string(),
        });
    }
    if model.n_start_filters == 0 || model.filter_num_scale == 0 {
        return Err(ConfigError::Invalid {
            msg: "model.n_start_filters and model.filter_num_scale must be positive".to_string(),
        });
    }
    Ok(())
}
