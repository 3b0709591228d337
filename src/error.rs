//! Error types shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or resolving the training configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown {kind} name {name:?}")]
    UnknownName { kind: &'static str, name: String },
    #[error("invalid configuration: {msg}")]
    Invalid { msg: String },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors raised while indexing or loading dataset samples.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no label file found for image {path}")]
    MissingLabel { path: PathBuf },
    #[error("validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("{0}")]
    Other(String),
}
