//! Environment-driven configuration.
//!
//! Loaded once at startup, after `dotenvy` has populated the environment from
//! an optional `.env`. Connection targets and node identity are required; the
//! operational knobs all have defaults tuned for a standard grow node.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::point::NodeIdentity;

#[derive(Debug, Clone)]
pub struct Config {
    // InfluxDB connection and the two fanout buckets.
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub tenant_bucket: String,
    pub lake_bucket: String,

    // Identity tags for tenant points.
    pub friendly_name: String,
    pub customer_id: String,
    pub node_id: String,

    // Poll-mode reading source.
    pub readings_dir: PathBuf,
    pub poll_interval_secs: u64,

    // HTTP surface.
    pub http_port: u16,

    // Container runtime and health probing.
    pub docker_socket: PathBuf,
    pub docker_all: bool,
    pub probe_port: u16,
    pub probe_path: String,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let config = Config {
            influx_url: required("INFLUXURL")?,
            influx_token: required("TOKEN")?,
            influx_org: required("ORG")?,
            tenant_bucket: required("BUCKET")?,
            lake_bucket: required("LAKE")?,
            friendly_name: required("FRIENDLY_NAME")?,
            customer_id: required("CUSTOMER_ID")?,
            node_id: node_id(),
            readings_dir: PathBuf::from(required("JSON_PATH")?),
            poll_interval_secs: parsed_or("POLL_INTERVAL_SECS", 1),
            http_port: parsed_or("HTTP_PORT", 8080),
            docker_socket: PathBuf::from(
                std::env::var("DOCKER_SOCKET").unwrap_or_else(|_| "/var/run/docker.sock".into()),
            ),
            docker_all: parsed_or("DOCKER_ALL", true),
            probe_port: parsed_or("HEALTH_PROBE_PORT", 8080),
            probe_path: std::env::var("HEALTH_PROBE_PATH").unwrap_or_else(|_| "/health".into()),
            probe_timeout_ms: parsed_or("HEALTH_PROBE_TIMEOUT_MS", 2000),
            probe_concurrency: parsed_or("HEALTH_PROBE_CONCURRENCY", 8),
        };

        if config.poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECS must be at least 1");
        }
        Ok(config)
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            friendly_name: self.friendly_name.clone(),
            customer_id: self.customer_id.clone(),
        }
    }
}

fn required(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .with_context(|| format!("Missing required environment variable {name}"))?;
    if value.trim().is_empty() {
        bail!("Environment variable {name} must not be empty");
    }
    Ok(value)
}

/// Parses an optional variable, keeping the default on absence or bad input.
fn parsed_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {name}={raw}, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Node id from NODE_UUID, or a fresh v4 for nodes provisioned without one.
fn node_id() -> String {
    match std::env::var("NODE_UUID") {
        Ok(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    }
}
