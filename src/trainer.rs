//! The training orchestrator: epoch loop, evaluation, and reporting.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::optim::GradientsParams;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::augment::AugmentPipeline;
use crate::batch::BatchIter;
use crate::config::TrainConfig;
use crate::dataset::{index_split, Split};
use crate::logger::ScalarSink;
use crate::metrics::{ConfusionMatrix, EpochTrace};
use crate::model::Unet;
use crate::optim::build_schedule;
use crate::viz::save_label_vs_pred;
use crate::{backend_name, ADBackend, TrainBackend};

/// Output locations for per-epoch artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub samples_dir: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            samples_dir: PathBuf::from("samples"),
        }
    }
}

/// Per-epoch report returned to the caller after training.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub lr: f64,
    pub avg_loss: f32,
    pub avg_dice_loss: f32,
    pub avg_ce_loss: f32,
    pub dice_score: f64,
    pub mean_iou: f64,
    pub global_step: usize,
    pub sample_path: Option<PathBuf>,
}

/// Run the full training loop described by the config and return one
/// summary per epoch.
pub fn run_train(
    cfg: &TrainConfig,
    paths: &RunPaths,
    sink: &mut dyn ScalarSink,
) -> Result<Vec<EpochSummary>> {
    let device = <ADBackend as Backend>::Device::default();
    println!("Using {} backend, seed {:?}", backend_name(), cfg.seed);
    if cfg!(not(feature = "backend-wgpu")) {
        eprintln!("Warning: no GPU backend compiled in; training on the CPU ndarray backend");
    }

    let train_idx = index_split(&cfg.data_root, cfg.dataset, Split::Train)
        .map_err(|e| anyhow::anyhow!("failed to index training split: {e}"))?;
    if train_idx.is_empty() {
        bail!(
            "no training samples found under {}",
            cfg.data_root.display()
        );
    }
    let test_idx = index_split(&cfg.data_root, cfg.dataset, Split::Test)
        .map_err(|e| anyhow::anyhow!("failed to index test split: {e}"))?;
    let pipeline = (!cfg.augmentations.is_empty())
        .then(|| AugmentPipeline::new(cfg.augmentations.clone()));

    fs::create_dir_all(&paths.samples_dir)
        .with_context(|| format!("failed to create {}", paths.samples_dir.display()))?;

    let mut model = Unet::<ADBackend>::new(cfg.model.clone(), &device);
    let mut optim = cfg.optimizer.init();
    let mut schedule = build_schedule(cfg.scheduler.as_ref(), cfg.optimizer.lr, cfg.n_epochs);
    let mut choose_rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let mut global_step = 0usize;
    let mut summaries = Vec::with_capacity(cfg.n_epochs);
    for epoch in 1..=cfg.n_epochs {
        // One scheduler step per epoch: the rate holds for every batch.
        let lr = schedule.step();

        let mut train = BatchIter::new(
            train_idx.clone(),
            cfg.model.in_channels,
            cfg.model.n_classes,
            pipeline.clone(),
            true,
            cfg.seed.map(|s| s.wrapping_add(epoch as u64)),
        );
        let mut loss_trace = EpochTrace::default();
        let mut dice_trace = EpochTrace::default();
        let mut ce_trace = EpochTrace::default();

        while let Some(batch) = train
            .next_batch::<ADBackend>(cfg.batch_size, &device)
            .map_err(|e| anyhow::anyhow!("failed to load training batch: {e}"))?
        {
            let logits = model.forward(batch.images);
            let out = cfg
                .loss
                .forward(logits, batch.labels, batch.weights, &device);
            let grads = GradientsParams::from_grads(out.total.backward(), &model);
            model = optim.step(lr, model, grads);
            global_step += 1;

            let loss_val = scalar(&out.total);
            let dice_val = scalar(&out.dice);
            let ce_val = scalar(&out.ce);
            sink.record("loss", loss_val, global_step);
            sink.record("dice_loss", dice_val, global_step);
            sink.record("ce_loss", ce_val, global_step);
            loss_trace.push(loss_val);
            dice_trace.push(dice_val);
            ce_trace.push(ce_val);
        }

        // Eval phase runs on the inner backend, so no autodiff tape.
        let eval_model = model.valid();
        let mut eval = BatchIter::new(
            test_idx.clone(),
            cfg.model.in_channels,
            cfg.model.n_classes,
            None,
            false,
            cfg.seed,
        );
        let mut matrix = ConfusionMatrix::new(cfg.model.n_classes);
        let mut retained: Vec<(Vec<i64>, Vec<i64>, u32, u32)> = Vec::new();
        while let Some(batch) = eval
            .next_batch::<TrainBackend>(cfg.batch_size, &device)
            .map_err(|e| anyhow::anyhow!("failed to load eval batch: {e}"))?
        {
            let logits = eval_model.forward(batch.images);
            let dims = logits.dims();
            let (height, width) = (dims[2], dims[3]);
            let preds = logits.argmax(1).squeeze::<3>(1);
            let preds_host = host_indices(&preds);
            let labels_host = host_indices(&batch.labels);
            matrix.record(&labels_host, &preds_host);

            // Keep the first item of the batch as a visualization candidate.
            let per_image = height * width;
            if labels_host.len() >= per_image {
                retained.push((
                    labels_host[..per_image].to_vec(),
                    preds_host[..per_image].to_vec(),
                    width as u32,
                    height as u32,
                ));
            }
        }

        let dice_score = matrix.mean_dice();
        let mean_iou = matrix.mean_iou();

        let sample_path = if retained.is_empty() {
            println!("No eval batches found under {}", cfg.data_root.display());
            None
        } else {
            let (label, pred, width, height) =
                &retained[choose_rng.random_range(0..retained.len())];
            let path = paths
                .samples_dir
                .join(format!("{global_step}_lbl_vs_Pred.png"));
            save_label_vs_pred(label, pred, *width, *height, &path)?;
            Some(path)
        };

        let avg_loss = loss_trace.mean();
        let avg_dice_loss = dice_trace.mean();
        let avg_ce_loss = ce_trace.mean();
        println!(
            "[ Epoch {}/{} ] [ Total Loss: {:.4} ] [Dice Loss: {:.4}] [CE Loss: {:.4}] [Avg Dice Score: {:.4}] [ Mean IoU: {:.4} ]",
            epoch, cfg.n_epochs, avg_loss, avg_dice_loss, avg_ce_loss, dice_score, mean_iou
        );

        summaries.push(EpochSummary {
            epoch,
            lr,
            avg_loss,
            avg_dice_loss,
            avg_ce_loss,
            dice_score,
            mean_iou,
            global_step,
            sample_path,
        });
    }

    if let Some(out) = &cfg.checkpoint_out {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        if let Some(parent) = out.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match recorder.record(model.into_record(), out.clone()) {
            Ok(()) => println!("Saved checkpoint to {}", out.display()),
            Err(err) => eprintln!("Failed to save checkpoint: {:?}", err),
        }
    }

    Ok(summaries)
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.to_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(0.0)
}

/// Transfer an integer tensor to host class indices. Goes through the
/// float representation so the element type is backend-independent.
fn host_indices<B: Backend>(t: &Tensor<B, 3, Int>) -> Vec<i64> {
    t.clone()
        .float()
        .to_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.round() as i64)
        .collect()
}
