//! Container runtime binding.
//!
//! Minimal read-only HTTP client for the Docker Engine API over the local Unix
//! socket. HTTP/1.0 keeps the exchange one-shot: write the request, read to
//! EOF, split headers from body. Only the inventory queries the enricher needs
//! are exposed.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::PipelineError;

/// Container list entry (from GET /containers/json). Only the keys the
/// pipeline forwards are deserialized; `state` is the runtime's state word
/// ("running"), not the human uptime text.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerListing {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
}

impl ContainerListing {
    /// Container name with the leading '/' stripped.
    pub fn clean_name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or(&self.id)
    }
}

/// Subset of GET /containers/{id}/json the pipeline forwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDetail {
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub network_settings: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub hostname: String,
}

/// Process table (from GET /containers/{id}/top): header labels plus one row
/// of column values per process.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessTable {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub processes: Vec<Vec<String>>,
}

/// Read-only inventory queries the enricher runs each cycle. Seam for test
/// doubles; `DockerClient` is the production implementation.
#[async_trait]
pub trait RuntimeInventory: Send + Sync {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerListing>>;

    async fn inspect(&self, id: &str) -> Result<ContainerDetail>;

    async fn top(&self, id: &str) -> Result<ProcessTable>;
}

/// HTTP-over-Unix-socket client for the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
}

impl DockerClient {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
        }
    }

    /// Startup connectivity check. Failure means the node runs degraded.
    pub async fn ping(&self) -> Result<(), PipelineError> {
        self.get("/_ping").await.map_err(|e| {
            PipelineError::DependencyUnavailable(format!(
                "container runtime at {}: {e}",
                self.socket_path.display()
            ))
        })?;
        Ok(())
    }

    /// Sends one GET over the socket and returns the response body.
    async fn get(&self, path: &str) -> Result<String> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("Failed to connect to {}", self.socket_path.display()))?;

        let request = format!("GET {path} HTTP/1.0\r\nHost: localhost\r\n\r\n");
        stream
            .write_all(request.as_bytes())
            .await
            .context("Failed to write runtime request")?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .context("Failed to read runtime response")?;

        parse_response(&String::from_utf8_lossy(&response))
    }
}

/// Splits a raw HTTP/1.0 response into status and body, accepting 2xx only.
fn parse_response(raw: &str) -> Result<String> {
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow!("invalid HTTP response from runtime"))?;
    let status_line = head.lines().next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("missing status in response: {status_line}"))?;
    if !(200..300).contains(&status) {
        bail!("runtime returned {status}: {}", body.trim());
    }
    Ok(body.to_string())
}

#[async_trait]
impl RuntimeInventory for DockerClient {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerListing>> {
        let body = self.get(&format!("/containers/json?all={all}")).await?;
        serde_json::from_str(&body).context("Failed to parse container list")
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetail> {
        let body = self.get(&format!("/containers/{id}/json")).await?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse inspect of {id}"))
    }

    async fn top(&self, id: &str) -> Result<ProcessTable> {
        let body = self.get(&format!("/containers/{id}/top")).await?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse top of {id}"))
    }
}
