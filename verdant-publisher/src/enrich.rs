//! Container enrichment.
//!
//! Each cycle rebuilds the node's workload view from scratch: list containers,
//! attach each one's process table, then probe each container's own /health
//! endpoint. Listing failure aborts the cycle's enrichment; every failure past
//! the listing degrades that one container only.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::docker::RuntimeInventory;
use crate::error::PipelineError;

/// One workload's state for a single cycle, served as-is on the status
/// surface. Never diffed against previous cycles; `health_data` stays `None`
/// whenever the probe does not return 200.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub status: String,
    pub image_tags: Vec<String>,
    pub created_at: String,
    pub processes: Vec<BTreeMap<String, String>>,
    pub network_info: serde_json::Value,
    pub health_data: Option<serde_json::Value>,
}

/// Liveness probe against a workload's own network name. Seam for test
/// doubles; `HttpHealthProbe` is the production implementation.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, host: &str) -> Result<serde_json::Value>;
}

/// GET http://{container}:{port}{path}, expecting a 200 with a JSON body.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    port: u16,
    path: String,
}

impl HttpHealthProbe {
    pub fn new(port: u16, path: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build health probe client")?;
        Ok(Self { client, port, path })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, host: &str) -> Result<serde_json::Value> {
        let url = format!("http://{}:{}{}", host, self.port, self.path);
        let response = self.client.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            bail!("unexpected status {}", response.status());
        }
        Ok(response.json().await?)
    }
}

/// Rebuilds the container inventory with health verdicts each cycle.
pub struct ContainerEnricher {
    runtime: Arc<dyn RuntimeInventory>,
    probe: Arc<dyn HealthProbe>,
    all_containers: bool,
    probe_timeout: Duration,
    probe_concurrency: usize,
}

impl ContainerEnricher {
    pub fn new(
        runtime: Arc<dyn RuntimeInventory>,
        probe: Arc<dyn HealthProbe>,
        all_containers: bool,
        probe_timeout: Duration,
        probe_concurrency: usize,
    ) -> Self {
        Self {
            runtime,
            probe,
            all_containers,
            probe_timeout,
            probe_concurrency: probe_concurrency.max(1),
        }
    }

    /// Returns snapshots in the runtime's listing order.
    pub async fn enrich(&self) -> Result<Vec<ContainerSnapshot>, PipelineError> {
        let listings = self
            .runtime
            .list_containers(self.all_containers)
            .await
            .map_err(|e| PipelineError::EnrichmentFailure(format!("container listing: {e}")))?;

        let mut snapshots = Vec::with_capacity(listings.len());
        for listing in &listings {
            snapshots.push(self.snapshot_container(listing).await);
        }
        self.attach_health(&mut snapshots).await;

        debug!("Enriched {} containers", snapshots.len());
        Ok(snapshots)
    }

    /// Builds one snapshot; inspect/top failures degrade it instead of failing
    /// the cycle.
    async fn snapshot_container(&self, listing: &crate::docker::ContainerListing) -> ContainerSnapshot {
        let name = listing.clean_name().to_string();

        let (hostname, created_at, network_info) = match self.runtime.inspect(&listing.id).await {
            Ok(detail) => (detail.config.hostname, detail.created, detail.network_settings),
            Err(e) => {
                warn!("Inspect failed for {name}: {e}");
                (String::new(), String::new(), serde_json::Value::Null)
            }
        };

        let processes = match self.runtime.top(&listing.id).await {
            Ok(table) => zip_process_table(&table),
            Err(e) => {
                warn!("Process table failed for {name}: {e}");
                Vec::new()
            }
        };

        ContainerSnapshot {
            id: listing.id.clone(),
            name,
            hostname,
            status: listing.state.clone(),
            image_tags: vec![listing.image.clone()],
            created_at,
            processes,
            network_info,
            health_data: None,
        }
    }

    /// Probes all snapshots concurrently under a permit bound, each probe
    /// capped by the configured timeout. Snapshot order is untouched.
    async fn attach_health(&self, snapshots: &mut [ContainerSnapshot]) {
        let permits = Arc::new(Semaphore::new(self.probe_concurrency));
        let mut probes: JoinSet<(usize, Option<serde_json::Value>)> = JoinSet::new();

        for (index, snapshot) in snapshots.iter().enumerate() {
            let probe = self.probe.clone();
            let permits = permits.clone();
            let name = snapshot.name.clone();
            let timeout = self.probe_timeout;
            probes.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, None);
                };
                let health = match tokio::time::timeout(timeout, probe.probe(&name)).await {
                    Ok(Ok(body)) => Some(body),
                    Ok(Err(e)) => {
                        warn!("Health probe failed for {name}: {e}");
                        None
                    }
                    Err(_) => {
                        warn!("Health probe timed out for {name}");
                        None
                    }
                };
                (index, health)
            });
        }

        while let Some(joined) = probes.join_next().await {
            if let Ok((index, health)) = joined {
                snapshots[index].health_data = health;
            }
        }
    }
}

/// Zips header labels with each process row into structured records. Rows are
/// truncated to the shorter of the two, matching the runtime's own pairing.
fn zip_process_table(table: &crate::docker::ProcessTable) -> Vec<BTreeMap<String, String>> {
    table
        .processes
        .iter()
        .map(|row| {
            table
                .titles
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect()
        })
        .collect()
}

#[cfg(test)]
pub mod testing {
    //! Runtime and probe doubles for enrichment and pipeline tests.

    use super::*;
    use crate::docker::{ContainerConfig, ContainerDetail, ContainerListing, ProcessTable};
    use anyhow::anyhow;
    use std::collections::{HashMap, HashSet};

    /// Canned inventory. Containers are served in insertion order.
    #[derive(Default)]
    pub struct StaticRuntime {
        pub listings: Vec<ContainerListing>,
        pub details: HashMap<String, ContainerDetail>,
        pub tables: HashMap<String, ProcessTable>,
        pub fail_listing: bool,
        pub fail_top: HashSet<String>,
    }

    impl StaticRuntime {
        /// Runtime with no containers; listing succeeds.
        pub fn empty() -> Self {
            Self::default()
        }

        /// Runtime with one standard container per name.
        pub fn with_containers(names: &[&str]) -> Self {
            let mut runtime = Self::default();
            for (i, name) in names.iter().enumerate() {
                let id = format!("{name}-{i:02}");
                runtime.listings.push(ContainerListing {
                    id: id.clone(),
                    names: vec![format!("/{name}")],
                    image: format!("verdant/{name}:latest"),
                    state: "running".into(),
                });
                runtime.details.insert(
                    id.clone(),
                    ContainerDetail {
                        created: "2024-03-01T10:00:00Z".into(),
                        config: ContainerConfig {
                            hostname: id.clone(),
                        },
                        network_settings: serde_json::json!({"IPAddress": "172.17.0.2"}),
                    },
                );
                runtime.tables.insert(
                    id,
                    ProcessTable {
                        titles: vec!["PID".into(), "CMD".into()],
                        processes: vec![vec!["1".into(), "python app.py".into()]],
                    },
                );
            }
            runtime
        }
    }

    #[async_trait]
    impl RuntimeInventory for StaticRuntime {
        async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerListing>> {
            if self.fail_listing {
                return Err(anyhow!("socket gone"));
            }
            Ok(self.listings.clone())
        }

        async fn inspect(&self, id: &str) -> Result<ContainerDetail> {
            self.details
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow!("no such container {id}"))
        }

        async fn top(&self, id: &str) -> Result<ProcessTable> {
            if self.fail_top.contains(id) {
                return Err(anyhow!("container {id} not running"));
            }
            self.tables
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow!("no such container {id}"))
        }
    }

    pub enum ProbeBehavior {
        Respond(serde_json::Value),
        Hang,
    }

    /// Scripted per-container probe outcomes; unknown hosts fail.
    #[derive(Default)]
    pub struct StaticProbe {
        pub behaviors: HashMap<String, ProbeBehavior>,
    }

    impl StaticProbe {
        pub fn empty() -> Self {
            Self::default()
        }

        pub fn respond(mut self, host: &str, body: serde_json::Value) -> Self {
            self.behaviors.insert(host.into(), ProbeBehavior::Respond(body));
            self
        }

        pub fn hang(mut self, host: &str) -> Self {
            self.behaviors.insert(host.into(), ProbeBehavior::Hang);
            self
        }
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        async fn probe(&self, host: &str) -> Result<serde_json::Value> {
            match self.behaviors.get(host) {
                Some(ProbeBehavior::Respond(body)) => Ok(body.clone()),
                Some(ProbeBehavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(anyhow!("unreachable"))
                }
                None => Err(anyhow!("connection refused")),
            }
        }
    }
}
