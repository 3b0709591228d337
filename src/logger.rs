//! Scalar time-series logging.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sink for per-step training scalars keyed by tag and global step.
pub trait ScalarSink {
    fn record(&mut self, tag: &str, value: f32, step: usize);
}

/// Appends one JSON object per datapoint to `scalars.jsonl` under the log
/// directory. Write failures are reported but never abort training.
pub struct JsonlLogger {
    file: fs::File,
    path: PathBuf,
}

impl JsonlLogger {
    pub fn create(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("scalars.jsonl");
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for JsonlLogger {
    fn record(&mut self, tag: &str, value: f32, step: usize) {
        let record = serde_json::json!({
            "tag": tag,
            "value": value,
            "step": step,
        });
        if let Err(e) = writeln!(self.file, "{}", record) {
            eprintln!(
                "Failed to append scalar record to {}: {e}",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = JsonlLogger::create(dir.path()).expect("create logger");
        logger.record("loss", 0.5, 1);
        logger.record("ce_loss", 0.25, 2);
        drop(logger);

        let raw = fs::read_to_string(dir.path().join("scalars.jsonl")).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("parse line");
        assert_eq!(first["tag"], "loss");
        assert_eq!(first["step"], 1);
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut logger = JsonlLogger::create(dir.path()).expect("create logger");
            logger.record("loss", 1.0, 1);
        }
        {
            let mut logger = JsonlLogger::create(dir.path()).expect("reopen logger");
            logger.record("loss", 0.9, 2);
        }
        let raw = fs::read_to_string(dir.path().join("scalars.jsonl")).expect("read log");
        assert_eq!(raw.lines().count(), 2);
    }
}
