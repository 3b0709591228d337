//! Segmentation losses: weighted cross-entropy and soft Dice.

use burn::tensor::activation::{log_softmax, softmax};
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::error::ConfigError;

const EPS: f32 = 1e-6;

/// Registered loss functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    Dice,
    DiceCe,
}

impl LossKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "cross_entropy" => Ok(Self::CrossEntropy),
            "dice" => Ok(Self::Dice),
            "dice_ce" => Ok(Self::DiceCe),
            _ => Err(ConfigError::UnknownName {
                kind: "loss",
                name: name.to_string(),
            }),
        }
    }
}

/// Loss components; the unused one is a zero tensor so the orchestrator's
/// bookkeeping stays uniform across kinds.
pub struct LossOutput<B: Backend> {
    pub total: Tensor<B, 1>,
    pub dice: Tensor<B, 1>,
    pub ce: Tensor<B, 1>,
}

impl LossKind {
    /// `logits: [B, C, H, W]`, `labels: [B, H, W]`, `weights: [B, H, W]`.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 4>,
        labels: Tensor<B, 3, Int>,
        weights: Tensor<B, 3>,
        device: &B::Device,
    ) -> LossOutput<B> {
        let n_classes = logits.dims()[1];
        let one_hot = one_hot_labels(labels, n_classes);
        match self {
            Self::CrossEntropy => {
                let ce = weighted_cross_entropy(logits, one_hot, weights);
                LossOutput {
                    total: ce.clone(),
                    dice: Tensor::zeros([1], device),
                    ce,
                }
            }
            Self::Dice => {
                let dice = soft_dice(logits, one_hot);
                LossOutput {
                    total: dice.clone(),
                    dice,
                    ce: Tensor::zeros([1], device),
                }
            }
            Self::DiceCe => {
                let ce = weighted_cross_entropy(logits.clone(), one_hot.clone(), weights);
                let dice = soft_dice(logits, one_hot);
                LossOutput {
                    total: dice.clone() + ce.clone(),
                    dice,
                    ce,
                }
            }
        }
    }
}

/// One-hot encode `[B, H, W]` class indices to `[B, C, H, W]` floats.
fn one_hot_labels<B: Backend>(labels: Tensor<B, 3, Int>, n_classes: usize) -> Tensor<B, 4> {
    let planes: Vec<Tensor<B, 3>> = (0..n_classes)
        .map(|class| labels.clone().equal_elem(class as i64).float())
        .collect();
    Tensor::stack::<4>(planes, 1)
}

/// Per-pixel NLL weighted by the weight map, normalized by the weight sum.
fn weighted_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    one_hot: Tensor<B, 4>,
    weights: Tensor<B, 3>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    let nll = (log_probs * one_hot).sum_dim(1).neg().squeeze::<3>(1);
    (nll * weights.clone()).sum() / weights.sum().add_scalar(EPS)
}

/// 1 minus the class-mean soft Dice coefficient on softmax probabilities.
fn soft_dice<B: Backend>(logits: Tensor<B, 4>, one_hot: Tensor<B, 4>) -> Tensor<B, 1> {
    let n_classes = logits.dims()[1];
    let probs = softmax(logits, 1);
    let intersection = per_class_sum(probs.clone() * one_hot.clone(), n_classes);
    let denom = per_class_sum(probs, n_classes) + per_class_sum(one_hot, n_classes);
    let dice = intersection.mul_scalar(2.0).add_scalar(EPS) / denom.add_scalar(EPS);
    dice.mean().neg().add_scalar(1.0)
}

/// Reduce `[B, C, H, W]` over batch and spatial dims to `[C]`.
fn per_class_sum<B: Backend>(t: Tensor<B, 4>, n_classes: usize) -> Tensor<B, 1> {
    t.sum_dim(0).sum_dim(2).sum_dim(3).reshape([n_classes])
}
