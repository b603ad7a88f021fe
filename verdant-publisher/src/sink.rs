//! Sink trait and fanout.
//!
//! A sink is one independent write target. The fanout delivers a point pair to
//! every configured sink in configuration order, isolating failures: one sink
//! rejecting a write never stops the others from being attempted, and nothing
//! is rolled back or retried.

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;
use crate::point::{Point, PointPair};

/// Which half of a point pair a sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkRole {
    Tenant,
    Lake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Failed,
}

/// Per-attempt accounting record. Transient; used for logs and the push-mode
/// verdict only.
#[derive(Debug, Clone)]
pub struct SinkResult {
    pub sink: String,
    pub outcome: WriteOutcome,
    pub error_detail: Option<String>,
}

/// One independent time-series write target.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Sink identity for logs and results.
    fn name(&self) -> &str;

    fn role(&self) -> SinkRole;

    async fn write(&self, point: &Point) -> Result<(), PipelineError>;
}

/// Delivers each built point pair to all configured sinks.
pub struct SinkFanout {
    sinks: Vec<Box<dyn PointSink>>,
}

impl SinkFanout {
    pub fn new(sinks: Vec<Box<dyn PointSink>>) -> Self {
        Self { sinks }
    }

    /// Writes the pair to every sink, in configuration order, one result per
    /// sink. Tenant-role sinks receive the tenant point, lake-role sinks the
    /// lake point.
    pub async fn write_all(&self, pair: &PointPair) -> Vec<SinkResult> {
        let mut results = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let point = match sink.role() {
                SinkRole::Tenant => &pair.tenant,
                SinkRole::Lake => &pair.lake,
            };
            match sink.write(point).await {
                Ok(()) => {
                    debug!("Wrote {} to sink {}", point.series_key(), sink.name());
                    results.push(SinkResult {
                        sink: sink.name().to_string(),
                        outcome: WriteOutcome::Written,
                        error_detail: None,
                    });
                }
                Err(e) => {
                    results.push(SinkResult {
                        sink: sink.name().to_string(),
                        outcome: WriteOutcome::Failed,
                        error_detail: Some(e.to_string()),
                    });
                }
            }
        }
        results
    }
}

/// Overall verdict for one reading field: success only when every configured
/// sink accepted the write.
pub fn fully_written(results: &[SinkResult]) -> bool {
    results.iter().all(|r| r.outcome == WriteOutcome::Written)
}
