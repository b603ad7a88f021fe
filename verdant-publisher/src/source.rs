//! Reading sources.
//!
//! One consumption contract for every way readings reach the node. Poll mode
//! scans a shared volume where sensor containers drop their latest values;
//! push mode arrives pre-parsed through the HTTP boundary and never goes
//! through a source.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::PipelineError;
use crate::reading::Reading;

/// Produces the raw readings for one collection cycle.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Lists and parses all currently available readings.
    ///
    /// Fails only when the source itself cannot be listed; individual bad
    /// readings are dropped with a warning and the rest are returned.
    async fn discover(&self) -> Result<Vec<Reading>, PipelineError>;
}

/// Scans a directory for `*.json` drop files, one reading per file.
///
/// Files are sensor-owned latest-value drops, re-read every cycle and never
/// consumed; the dedup cache is what keeps unchanged values from re-sending.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl MeasurementSource for FileSource {
    async fn discover(&self) -> Result<Vec<Reading>, PipelineError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {e}", self.dir.display()))
        })?;

        let mut paths = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Scan of {} stopped early: {e}", self.dir.display());
                    break;
                }
            }
        }
        // Directory order is arbitrary; keep cycles deterministic.
        paths.sort();

        let mut readings = Vec::new();
        for path in paths {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping unreadable drop file {}: {e}", path.display());
                    continue;
                }
            };
            match Reading::from_text(&text) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    warn!("Skipping drop file {}: {e}", path.display());
                }
            }
        }
        Ok(readings)
    }
}
