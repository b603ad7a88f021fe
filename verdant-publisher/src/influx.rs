//! InfluxDB v2 binding.
//!
//! Thin write-only client over the HTTP API plus the `PointSink` impl that
//! binds it to one bucket. Nothing here retries; a rejected write is reported
//! upward as a per-sink failure and the pipeline moves on.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::PipelineError;
use crate::point::Point;
use crate::sink::{PointSink, SinkRole};

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared connection handle for all buckets on one InfluxDB instance.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: Client,
    base_url: String,
    org: String,
    token: String,
}

impl InfluxClient {
    pub fn new(base_url: &str, org: &str, token: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(WRITE_TIMEOUT)
            .build()
            .context("Failed to build InfluxDB HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            token: token.to_string(),
        })
    }

    /// Startup connectivity check. Failure means the node runs degraded, not
    /// that it refuses to start.
    pub async fn ping(&self) -> Result<(), PipelineError> {
        let url = format!("{}/ping", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| {
                PipelineError::DependencyUnavailable(format!(
                    "influxdb at {}: {e}",
                    self.base_url
                ))
            })?;
        Ok(())
    }

    /// Writes one line protocol record to a bucket with nanosecond precision.
    pub async fn write_line(&self, bucket: &str, line: &str) -> Result<(), PipelineError> {
        let url = format!("{}/api/v2/write", self.base_url);
        self.http
            .post(&url)
            .query(&[("org", self.org.as_str()), ("bucket", bucket), ("precision", "ns")])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line.to_string())
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| PipelineError::SinkWriteFailure {
                sink: bucket.to_string(),
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

/// One InfluxDB bucket as an independent fanout target.
pub struct InfluxSink {
    client: InfluxClient,
    role: SinkRole,
    bucket: String,
}

impl InfluxSink {
    pub fn new(client: InfluxClient, role: SinkRole, bucket: String) -> Self {
        Self { client, role, bucket }
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    fn name(&self) -> &str {
        &self.bucket
    }

    fn role(&self) -> SinkRole {
        self.role
    }

    async fn write(&self, point: &Point) -> Result<(), PipelineError> {
        self.client
            .write_line(&self.bucket, &point.to_line_protocol())
            .await
    }
}
