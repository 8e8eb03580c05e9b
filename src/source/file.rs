//! File-based instrument source.
//!
//! Reads a JSON array of observations on every poll. Useful for
//! air-gapped deployments where the status database exports a file,
//! and for local testing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{InstrumentSource, SourceError};
use crate::model::Observation;

/// An instrument source backed by a JSON file.
///
/// The file holds the full fleet snapshot; the reconciler does its own
/// change detection, so the file is re-read on every poll rather than
/// tracking modification times.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self { path, description }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InstrumentSource for FileSource {
    async fn fetch_all(&mut self) -> Result<Vec<Observation>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| SourceError::Parse(e.to_string()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}
