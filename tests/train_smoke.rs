use std::fs;
use std::path::Path;

use image::{GrayImage, RgbImage};

use vessel_unet::augment::AugmentOp;
use vessel_unet::dataset::DatasetKind;
use vessel_unet::logger::ScalarSink;
use vessel_unet::loss::LossKind;
use vessel_unet::model::{MergeMode, UnetConfig};
use vessel_unet::optim::{OptimizerSpec, SchedulerSpec};
use vessel_unet::trainer::{run_train, RunPaths};
use vessel_unet::TrainConfig;

#[derive(Default)]
struct MemorySink {
    records: Vec<(String, f32, usize)>,
}

impl ScalarSink for MemorySink {
    fn record(&mut self, tag: &str, value: f32, step: usize) {
        self.records.push((tag.to_string(), value, step));
    }
}

fn write_sample(split_dir: &Path, name: &str, size: u32) {
    let images = split_dir.join("images");
    let labels = split_dir.join("labels");
    fs::create_dir_all(&images).expect("create images dir");
    fs::create_dir_all(&labels).expect("create labels dir");
    let mut image = RgbImage::new(size, size);
    let mut label = GrayImage::new(size, size);
    for y in 0..size {
        for x in 0..size {
            if x >= size / 2 {
                image.put_pixel(x, y, image::Rgb([220, 220, 220]));
                label.put_pixel(x, y, image::Luma([1]));
            } else {
                image.put_pixel(x, y, image::Rgb([30, 30, 30]));
                label.put_pixel(x, y, image::Luma([0]));
            }
        }
    }
    image.save(images.join(name)).expect("write image");
    label.save(labels.join(name)).expect("write label");
}

fn smoke_config(root: &Path, checkpoint: Option<&Path>) -> TrainConfig {
    TrainConfig {
        dataset: DatasetKind::Folder,
        data_root: root.to_path_buf(),
        model: UnetConfig {
            n_classes: 2,
            in_channels: 3,
            depth: 2,
            n_start_filters: 4,
            filter_num_scale: 2,
            merge_mode: MergeMode::Concat,
        },
        batch_size: 2,
        n_epochs: 2,
        loss: LossKind::DiceCe,
        optimizer: OptimizerSpec::from_config("sgd", Some(1e-2), Some(0.9), None)
            .expect("optimizer spec"),
        scheduler: Some(
            SchedulerSpec::from_config("linear", Some(1e-2), Some(1e-3)).expect("scheduler spec"),
        ),
        augmentations: vec![AugmentOp::HFlip { p: 0.5 }],
        seed: Some(42),
        checkpoint_out: checkpoint.map(Path::to_path_buf),
    }
}

#[test]
fn trains_end_to_end_and_writes_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("dataset");
    for name in ["a.png", "b.png", "c.png", "d.png"] {
        write_sample(&root.join("train"), name, 16);
    }
    for name in ["e.png", "f.png"] {
        write_sample(&root.join("test"), name, 16);
    }

    let ckpt = dir.path().join("checkpoints").join("unet");
    let cfg = smoke_config(&root, Some(&ckpt));
    let paths = RunPaths {
        samples_dir: dir.path().join("samples"),
    };
    let mut sink = MemorySink::default();
    let summaries = run_train(&cfg, &paths, &mut sink).expect("training run");

    assert_eq!(summaries.len(), 2);
    // 4 train samples, batch size 2: two optimizer steps per epoch.
    assert_eq!(summaries[0].global_step, 2);
    assert_eq!(summaries[1].global_step, 4);

    // One snapshot per epoch, named by strictly increasing global step.
    for summary in &summaries {
        let path = summary.sample_path.as_ref().expect("sample path");
        assert!(path.exists(), "missing {}", path.display());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name")
            .ends_with("_lbl_vs_Pred.png"));
    }
    assert!(paths.samples_dir.join("2_lbl_vs_Pred.png").exists());
    assert!(paths.samples_dir.join("4_lbl_vs_Pred.png").exists());

    // Metrics derived from the eval confusion matrix stay in range.
    for summary in &summaries {
        assert!((0.0..=1.0).contains(&summary.dice_score));
        assert!((0.0..=1.0).contains(&summary.mean_iou));
        assert!(summary.avg_loss.is_finite());
    }

    // The scheduler advances once per epoch and decays.
    assert!(summaries[0].lr > summaries[1].lr);

    // Final checkpoint written by the bin recorder.
    assert!(ckpt.with_extension("bin").exists());
}

#[test]
fn epoch_average_matches_recorded_step_losses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("dataset");
    for name in ["a.png", "b.png", "c.png", "d.png"] {
        write_sample(&root.join("train"), name, 16);
    }
    write_sample(&root.join("test"), "e.png", 16);

    let cfg = smoke_config(&root, None);
    let paths = RunPaths {
        samples_dir: dir.path().join("samples"),
    };
    let mut sink = MemorySink::default();
    let summaries = run_train(&cfg, &paths, &mut sink).expect("training run");

    for (i, summary) in summaries.iter().enumerate() {
        let lo = i * 2 + 1;
        let hi = (i + 1) * 2;
        let losses: Vec<f32> = sink
            .records
            .iter()
            .filter(|(tag, _, step)| tag == "loss" && (lo..=hi).contains(step))
            .map(|(_, value, _)| *value)
            .collect();
        assert_eq!(losses.len(), 2);
        let mean = losses.iter().sum::<f32>() / losses.len() as f32;
        assert!(
            (summary.avg_loss - mean).abs() < 1e-5,
            "epoch {} avg {} vs recorded mean {}",
            summary.epoch,
            summary.avg_loss,
            mean
        );
    }

    // Every step records all three tags.
    for step in 1..=4usize {
        for tag in ["loss", "dice_loss", "ce_loss"] {
            assert!(sink
                .records
                .iter()
                .any(|(t, _, s)| t == tag && *s == step));
        }
    }
}

#[test]
fn empty_training_split_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("dataset");
    fs::create_dir_all(root.join("train").join("images")).expect("create empty split");
    write_sample(&root.join("test"), "e.png", 16);

    let cfg = smoke_config(&root, None);
    let paths = RunPaths {
        samples_dir: dir.path().join("samples"),
    };
    let mut sink = MemorySink::default();
    assert!(run_train(&cfg, &paths, &mut sink).is_err());
}
