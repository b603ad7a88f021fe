use thiserror::Error;

/// Failure classes for the publisher pipeline.
///
/// The collector loop logs these and keeps running. Only push-mode ingestion
/// surfaces a verdict to its HTTP caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed reading: {0}")]
    MalformedReading(String),

    #[error("enrichment failed: {0}")]
    EnrichmentFailure(String),

    #[error("sink write failed on {sink}: {detail}")]
    SinkWriteFailure { sink: String, detail: String },

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}
