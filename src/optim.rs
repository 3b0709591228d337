//! Optimizer and learning-rate schedule factories.

use burn::lr_scheduler::{
    cosine::{CosineAnnealingLrScheduler, CosineAnnealingLrSchedulerConfig},
    linear::{LinearLrScheduler, LinearLrSchedulerConfig},
    LrScheduler,
};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    Adam, AdamConfig, AdamW, AdamWConfig, GradientsParams, Optimizer, Sgd, SgdConfig,
};
use burn::tensor::backend::AutodiffBackend;

use crate::error::ConfigError;
use crate::model::Unet;
use crate::ADBackend;

const DEFAULT_LR: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adam,
    AdamW,
}

/// Resolved `training.optimizer` section.
#[derive(Debug, Clone)]
pub struct OptimizerSpec {
    pub kind: OptimizerKind,
    pub lr: f64,
    pub momentum: Option<f64>,
    pub weight_decay: Option<f64>,
}

impl OptimizerSpec {
    pub fn from_config(
        name: &str,
        lr: Option<f64>,
        momentum: Option<f64>,
        weight_decay: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let kind = match name {
            "sgd" => OptimizerKind::Sgd,
            "adam" => OptimizerKind::Adam,
            "adamw" => OptimizerKind::AdamW,
            _ => {
                return Err(ConfigError::UnknownName {
                    kind: "optimizer",
                    name: name.to_string(),
                })
            }
        };
        Ok(Self {
            kind,
            lr: lr.unwrap_or(DEFAULT_LR),
            momentum,
            weight_decay,
        })
    }

    pub fn init(&self) -> UnetOptimizer {
        match self.kind {
            OptimizerKind::Sgd => {
                let mut cfg = SgdConfig::new();
                if let Some(m) = self.momentum {
                    cfg = cfg.with_momentum(Some(MomentumConfig::new().with_momentum(m)));
                }
                if let Some(wd) = self.weight_decay {
                    cfg = cfg.with_weight_decay(Some(WeightDecayConfig::new(wd as f32)));
                }
                UnetOptimizer::Sgd(cfg.init())
            }
            OptimizerKind::Adam => {
                let mut cfg = AdamConfig::new();
                if let Some(wd) = self.weight_decay {
                    cfg = cfg.with_weight_decay(Some(WeightDecayConfig::new(wd as f32)));
                }
                UnetOptimizer::Adam(cfg.init())
            }
            OptimizerKind::AdamW => {
                let mut cfg = AdamWConfig::new();
                if let Some(wd) = self.weight_decay {
                    cfg = cfg.with_weight_decay(wd as f32);
                }
                UnetOptimizer::AdamW(cfg.init())
            }
        }
    }
}

type Inner = <ADBackend as AutodiffBackend>::InnerBackend;
type SgdOptim = OptimizerAdaptor<Sgd<Inner>, Unet<ADBackend>, ADBackend>;
type AdamOptim = OptimizerAdaptor<Adam, Unet<ADBackend>, ADBackend>;
type AdamWOptim = OptimizerAdaptor<AdamW, Unet<ADBackend>, ADBackend>;

/// Dispatch over the registered optimizers.
pub enum UnetOptimizer {
    Sgd(SgdOptim),
    Adam(AdamOptim),
    AdamW(AdamWOptim),
}

impl UnetOptimizer {
    pub fn step(
        &mut self,
        lr: f64,
        model: Unet<ADBackend>,
        grads: GradientsParams,
    ) -> Unet<ADBackend> {
        match self {
            Self::Sgd(optim) => optim.step(lr, model, grads),
            Self::Adam(optim) => optim.step(lr, model, grads),
            Self::AdamW(optim) => optim.step(lr, model, grads),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Linear,
    Cosine,
}

/// Resolved `training.lr_scheduler` section.
#[derive(Debug, Clone)]
pub struct SchedulerSpec {
    pub kind: SchedulerKind,
    pub lr_start: Option<f64>,
    pub lr_end: Option<f64>,
}

impl SchedulerSpec {
    pub fn from_config(
        name: &str,
        lr_start: Option<f64>,
        lr_end: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let kind = match name {
            "linear" => SchedulerKind::Linear,
            "cosine" => SchedulerKind::Cosine,
            _ => {
                return Err(ConfigError::UnknownName {
                    kind: "lr_scheduler",
                    name: name.to_string(),
                })
            }
        };
        Ok(Self {
            kind,
            lr_start,
            lr_end,
        })
    }
}

pub enum LrSchedule {
    Constant(f64),
    Linear(LinearLrScheduler),
    Cosine(CosineAnnealingLrScheduler),
}

/// Build the schedule; its horizon is `n_epochs` since it advances once
/// per epoch. No scheduler section means a constant rate.
pub fn build_schedule(spec: Option<&SchedulerSpec>, base_lr: f64, n_epochs: usize) -> LrSchedule {
    let Some(spec) = spec else {
        return LrSchedule::Constant(base_lr);
    };
    let lr_start = spec.lr_start.unwrap_or(base_lr);
    let lr_end = spec.lr_end.unwrap_or(lr_start * 0.1);
    match spec.kind {
        SchedulerKind::Linear => LrSchedule::Linear(
            LinearLrSchedulerConfig::new(lr_start, lr_end, n_epochs.max(1))
                .init()
                .expect("valid linear lr scheduler config"),
        ),
        SchedulerKind::Cosine => LrSchedule::Cosine(
            CosineAnnealingLrSchedulerConfig::new(lr_start, n_epochs.max(1))
                .with_min_lr(lr_end)
                .init()
                .expect("valid cosine lr scheduler config"),
        ),
    }
}

impl LrSchedule {
    /// Advance one epoch and return the learning rate for that epoch.
    pub fn step(&mut self) -> f64 {
        match self {
            Self::Constant(lr) => *lr,
            Self::Linear(inner) => LrScheduler::step(inner),
            Self::Cosine(inner) => LrScheduler::step(inner),
        }
    }
}
