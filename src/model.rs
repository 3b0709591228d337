//! Configurable UNet for semantic segmentation.
//!
//! Shapes:
//! - Input images: `[B, in_channels, H, W]`
//! - Output logits: `[B, n_classes, H, W]`
//!
//! H and W must be divisible by `2^(depth - 1)` so that the decoder
//! upsamples back to the input resolution.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::{activation::relu, backend::Backend, Tensor};

use crate::error::ConfigError;

/// How decoder stages merge upsampled features with encoder skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Channel concatenation; doubles the decoder conv input channels.
    Concat,
    /// Elementwise addition; requires equal channel counts.
    Add,
}

impl MergeMode {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "concat" => Ok(Self::Concat),
            "add" => Ok(Self::Add),
            _ => Err(ConfigError::UnknownName {
                kind: "merge_mode",
                name: name.to_string(),
            }),
        }
    }
}

/// Architecture hyperparameters.
#[derive(Debug, Clone)]
pub struct UnetConfig {
    pub n_classes: usize,
    pub in_channels: usize,
    /// Number of encoder stages; the decoder has `depth - 1` stages.
    pub depth: usize,
    /// Channels emitted by the first encoder stage.
    pub n_start_filters: usize,
    /// Channel multiplier between encoder stages.
    pub filter_num_scale: usize,
    pub merge_mode: MergeMode,
}

impl Default for UnetConfig {
    fn default() -> Self {
        Self {
            n_classes: 2,
            in_channels: 3,
            depth: 4,
            n_start_filters: 32,
            filter_num_scale: 2,
            merge_mode: MergeMode::Concat,
        }
    }
}

impl UnetConfig {
    fn stage_channels(&self, stage: usize) -> usize {
        self.n_start_filters * self.filter_num_scale.pow(stage as u32)
    }
}

/// Two 3x3 same-padded convolutions, each followed by ReLU.
#[derive(Module, Debug)]
struct ConvPair<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> ConvPair<B> {
    fn new(ins: usize, outs: usize, device: &B::Device) -> Self {
        let conv = |i: usize, o: usize| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        Self {
            conv1: conv(ins, outs),
            conv2: conv(outs, outs),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

/// Decoder stage: 2x2 transposed-conv upsample, skip merge, then convs.
#[derive(Module, Debug)]
struct UpBlock<B: Backend> {
    upconv: ConvTranspose2d<B>,
    convs: ConvPair<B>,
    merge: Ignored<MergeMode>,
}

impl<B: Backend> UpBlock<B> {
    fn new(ins: usize, outs: usize, merge: MergeMode, device: &B::Device) -> Self {
        let upconv = ConvTranspose2dConfig::new([ins, outs], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let conv_ins = match merge {
            MergeMode::Concat => outs * 2,
            MergeMode::Add => outs,
        };
        Self {
            upconv,
            convs: ConvPair::new(conv_ins, outs, device),
            merge: Ignored(merge),
        }
    }

    fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let up = self.upconv.forward(x);
        let merged = match self.merge.0 {
            MergeMode::Concat => Tensor::cat(vec![up, skip], 1),
            MergeMode::Add => up + skip,
        };
        self.convs.forward(merged)
    }
}

#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    down: Vec<ConvPair<B>>,
    pool: MaxPool2d,
    up: Vec<UpBlock<B>>,
    head: Conv2d<B>,
    pub config: Ignored<UnetConfig>,
}

impl<B: Backend> Unet<B> {
    pub fn new(config: UnetConfig, device: &B::Device) -> Self {
        let mut down = Vec::with_capacity(config.depth);
        let mut ins = config.in_channels;
        for stage in 0..config.depth {
            let outs = config.stage_channels(stage);
            down.push(ConvPair::new(ins, outs, device));
            ins = outs;
        }

        let mut up = Vec::with_capacity(config.depth.saturating_sub(1));
        for stage in (1..config.depth).rev() {
            up.push(UpBlock::new(
                config.stage_channels(stage),
                config.stage_channels(stage - 1),
                config.merge_mode,
                device,
            ));
        }

        let head = Conv2dConfig::new([config.n_start_filters, config.n_classes], [1, 1])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        Self {
            down,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            up,
            head,
            config: Ignored(config),
        }
    }

    /// Forward pass returning per-pixel class logits.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips: Vec<Tensor<B, 4>> = Vec::with_capacity(self.up.len());
        let mut x = input;
        for (stage, block) in self.down.iter().enumerate() {
            x = block.forward(x);
            if stage + 1 < self.down.len() {
                skips.push(x.clone());
                x = self.pool.forward(x);
            }
        }
        for block in self.up.iter() {
            let skip = skips.pop().expect("one encoder skip per decoder stage");
            x = block.forward(x, skip);
        }
        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrainBackend;

    fn device() -> <TrainBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn forward_preserves_spatial_dims() {
        let config = UnetConfig {
            n_classes: 3,
            in_channels: 3,
            depth: 3,
            n_start_filters: 4,
            filter_num_scale: 2,
            merge_mode: MergeMode::Concat,
        };
        let model = Unet::<TrainBackend>::new(config, &device());
        let input = Tensor::<TrainBackend, 4>::zeros([1, 3, 32, 32], &device());
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [1, 3, 32, 32]);
    }

    #[test]
    fn add_merge_matches_concat_shapes() {
        let config = UnetConfig {
            n_classes: 2,
            in_channels: 1,
            depth: 2,
            n_start_filters: 4,
            filter_num_scale: 2,
            merge_mode: MergeMode::Add,
        };
        let model = Unet::<TrainBackend>::new(config, &device());
        let input = Tensor::<TrainBackend, 4>::zeros([2, 1, 16, 16], &device());
        assert_eq!(model.forward(input).dims(), [2, 2, 16, 16]);
    }

    #[test]
    fn merge_mode_names_resolve() {
        assert_eq!(MergeMode::from_name("concat").unwrap(), MergeMode::Concat);
        assert_eq!(MergeMode::from_name("add").unwrap(), MergeMode::Add);
        assert!(MergeMode::from_name("stack").is_err());
    }
}
