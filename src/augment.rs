//! Sample augmentation applied before tensor collation.
//!
//! Geometric ops (flips) transform the label and weight maps together with
//! the image; photometric ops (jitter, noise, blur) touch the image only.

use std::collections::BTreeMap;

use image::{imageops, GrayImage, RgbImage};
use rand::{Rng, RngCore};
use serde::Deserialize;

use crate::error::ConfigError;

/// Value side of an `augmentations:` config entry. A bare number is the
/// application probability; a mapping may add op-specific parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AugParam {
    Prob(f32),
    Detailed {
        p: f32,
        strength: Option<f32>,
        sigma: Option<f32>,
    },
}

impl AugParam {
    fn prob(&self) -> f32 {
        match self {
            Self::Prob(p) => *p,
            Self::Detailed { p, .. } => *p,
        }
    }

    fn strength(&self, default: f32) -> f32 {
        match self {
            Self::Detailed {
                strength: Some(s), ..
            } => *s,
            _ => default,
        }
    }

    fn sigma(&self, default: f32) -> f32 {
        match self {
            Self::Detailed { sigma: Some(s), .. } => *s,
            _ => default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AugmentOp {
    HFlip { p: f32 },
    VFlip { p: f32 },
    ColorJitter { p: f32, strength: f32 },
    Noise { p: f32, strength: f32 },
    Blur { p: f32, sigma: f32 },
}

/// Resolve the config map to augmentation ops, failing on unknown names.
pub fn build_ops(map: &BTreeMap<String, AugParam>) -> Result<Vec<AugmentOp>, ConfigError> {
    let mut ops = Vec::with_capacity(map.len());
    for (name, param) in map {
        let op = match name.as_str() {
            "hflip" => AugmentOp::HFlip { p: param.prob() },
            "vflip" => AugmentOp::VFlip { p: param.prob() },
            "color_jitter" => AugmentOp::ColorJitter {
                p: param.prob(),
                strength: param.strength(0.1),
            },
            "noise" => AugmentOp::Noise {
                p: param.prob(),
                strength: param.strength(0.02),
            },
            "blur" => AugmentOp::Blur {
                p: param.prob(),
                sigma: param.sigma(1.0),
            },
            _ => {
                return Err(ConfigError::UnknownName {
                    kind: "augmentation",
                    name: name.clone(),
                })
            }
        };
        ops.push(op);
    }
    Ok(ops)
}

#[derive(Debug, Clone)]
pub struct AugmentPipeline {
    ops: Vec<AugmentOp>,
}

impl AugmentPipeline {
    pub fn new(ops: Vec<AugmentOp>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn apply(
        &self,
        image: &mut RgbImage,
        label: &mut GrayImage,
        mut weight: Option<&mut GrayImage>,
        rng: &mut dyn RngCore,
    ) {
        for op in &self.ops {
            match *op {
                AugmentOp::HFlip { p } => {
                    if roll(rng, p) {
                        imageops::flip_horizontal_in_place(image);
                        imageops::flip_horizontal_in_place(label);
                        if let Some(w) = weight.as_deref_mut() {
                            imageops::flip_horizontal_in_place(w);
                        }
                    }
                }
                AugmentOp::VFlip { p } => {
                    if roll(rng, p) {
                        imageops::flip_vertical_in_place(image);
                        imageops::flip_vertical_in_place(label);
                        if let Some(w) = weight.as_deref_mut() {
                            imageops::flip_vertical_in_place(w);
                        }
                    }
                }
                AugmentOp::ColorJitter { p, strength } => {
                    maybe_jitter(image, p, strength, rng);
                }
                AugmentOp::Noise { p, strength } => {
                    maybe_noise(image, p, strength, rng);
                }
                AugmentOp::Blur { p, sigma } => {
                    if roll(rng, p) && sigma > 0.0 {
                        *image = imageops::blur(image, sigma);
                    }
                }
            }
        }
    }
}

fn roll(rng: &mut dyn RngCore, prob: f32) -> bool {
    prob > 0.0 && rng.random_range(0.0..1.0) < prob
}

fn maybe_jitter(img: &mut RgbImage, prob: f32, strength: f32, rng: &mut dyn RngCore) {
    if !roll(rng, prob) || strength <= 0.0 {
        return;
    }
    let scale = 1.0 + rng.random_range(-strength..=strength);
    let shift = rng.random_range(-strength..=strength) * 255.0;
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            let v = *c as f32 * scale + shift;
            *c = v.clamp(0.0, 255.0) as u8;
        }
    }
}

fn maybe_noise(img: &mut RgbImage, prob: f32, strength: f32, rng: &mut dyn RngCore) {
    if !roll(rng, prob) || strength <= 0.0 {
        return;
    }
    let amp = strength * 255.0;
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            let v = *c as f32 + rng.random_range(-amp..=amp);
            *c = v.clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod aug_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture() -> (RgbImage, GrayImage, GrayImage) {
        let mut image = RgbImage::new(4, 2);
        let mut label = GrayImage::new(4, 2);
        let mut weight = GrayImage::new(4, 2);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        label.put_pixel(0, 0, image::Luma([1]));
        weight.put_pixel(0, 0, image::Luma([255]));
        (image, label, weight)
    }

    #[test]
    fn hflip_moves_image_and_targets_together() {
        let (mut image, mut label, mut weight) = fixture();
        let pipeline = AugmentPipeline::new(vec![AugmentOp::HFlip { p: 1.0 }]);
        let mut rng = StdRng::seed_from_u64(7);
        pipeline.apply(&mut image, &mut label, Some(&mut weight), &mut rng);
        assert_eq!(image.get_pixel(3, 0).0, [255, 0, 0]);
        assert_eq!(label.get_pixel(3, 0).0, [1]);
        assert_eq!(weight.get_pixel(3, 0).0, [255]);
        assert_eq!(label.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn zero_probability_is_identity() {
        let (mut image, mut label, mut weight) = fixture();
        let pipeline = AugmentPipeline::new(vec![
            AugmentOp::HFlip { p: 0.0 },
            AugmentOp::VFlip { p: 0.0 },
            AugmentOp::Noise {
                p: 0.0,
                strength: 0.5,
            },
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        pipeline.apply(&mut image, &mut label, Some(&mut weight), &mut rng);
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(label.get_pixel(0, 0).0, [1]);
    }

    #[test]
    fn photometric_ops_leave_label_untouched() {
        let (mut image, mut label, mut weight) = fixture();
        let pipeline = AugmentPipeline::new(vec![
            AugmentOp::ColorJitter {
                p: 1.0,
                strength: 0.3,
            },
            AugmentOp::Noise {
                p: 1.0,
                strength: 0.1,
            },
            AugmentOp::Blur { p: 1.0, sigma: 0.8 },
        ]);
        let mut rng = StdRng::seed_from_u64(11);
        pipeline.apply(&mut image, &mut label, Some(&mut weight), &mut rng);
        assert_eq!(label.get_pixel(0, 0).0, [1]);
        assert_eq!(weight.get_pixel(0, 0).0, [255]);
    }

    #[test]
    fn unknown_op_name_is_rejected() {
        let mut map = BTreeMap::new();
        map.insert("rotate".to_string(), AugParam::Prob(0.5));
        assert!(build_ops(&map).is_err());
    }

    #[test]
    fn detailed_params_pass_through() {
        let mut map = BTreeMap::new();
        map.insert(
            "blur".to_string(),
            AugParam::Detailed {
                p: 0.25,
                strength: None,
                sigma: Some(2.0),
            },
        );
        let ops = build_ops(&map).unwrap();
        assert_eq!(ops, vec![AugmentOp::Blur { p: 0.25, sigma: 2.0 }]);
    }
}
