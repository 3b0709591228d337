//! Configurable UNet training harness for semantic segmentation.
//!
//! A YAML config selects the dataset, model shape, loss, optimizer, and
//! optional scheduler/augmentations; [`trainer::run_train`] drives the
//! epoch loop and writes per-epoch metrics and sample visualizations.

pub mod augment;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logger;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod trainer;
pub mod viz;

pub use config::TrainConfig;
pub use error::{ConfigError, DatasetError};
pub use trainer::{run_train, EpochSummary, RunPaths};

#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn::backend::ndarray::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;

pub fn backend_name() -> &'static str {
    if cfg!(feature = "backend-wgpu") {
        "wgpu"
    } else {
        "ndarray"
    }
}
