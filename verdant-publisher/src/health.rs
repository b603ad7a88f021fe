//! Node status tracking.
//!
//! Shared counters and the JSON snapshot served on /publisher/status.
//! Operators watch this surface (and the logs) instead of process exits: the
//! publisher stays up through sink and runtime failures.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::enrich::ContainerSnapshot;
use crate::error::PipelineError;

#[derive(Debug, Serialize)]
pub struct PublisherStatus {
    pub node_id: String,
    pub status: String,
    pub uptime_seconds: u64,
    pub cycles_completed: u64,
    pub points_written: u64,
    pub points_failed: u64,
    pub dedup_entries: usize,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_enrichment_error: Option<String>,
    pub containers: Vec<ContainerSnapshot>,
}

#[derive(Default)]
struct EnrichmentView {
    containers: Vec<ContainerSnapshot>,
    last_error: Option<String>,
}

#[derive(Clone)]
pub struct StatusTracker {
    node_id: String,
    start_time: Instant,
    status: Arc<Mutex<String>>,
    cycles: Arc<AtomicU64>,
    points_written: Arc<AtomicU64>,
    points_failed: Arc<AtomicU64>,
    last_cycle: Arc<Mutex<Option<DateTime<Utc>>>>,
    enrichment: Arc<Mutex<EnrichmentView>>,
}

impl StatusTracker {
    pub fn new(node_id: String) -> Self {
        Self {
            node_id,
            start_time: Instant::now(),
            status: Arc::new(Mutex::new("ok".to_string())),
            cycles: Arc::new(AtomicU64::new(0)),
            points_written: Arc::new(AtomicU64::new(0)),
            points_failed: Arc::new(AtomicU64::new(0)),
            last_cycle: Arc::new(Mutex::new(None)),
            enrichment: Arc::new(Mutex::new(EnrichmentView::default())),
        }
    }

    /// Startup dependency check failed; the node runs anyway.
    pub fn mark_degraded(&self) {
        *self.status.lock() = "degraded".to_string();
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.lock() = Some(Utc::now());
    }

    pub fn record_writes(&self, written: u64, failed: u64) {
        self.points_written.fetch_add(written, Ordering::Relaxed);
        self.points_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Replaces the container view after a successful enrichment; a success
    /// also clears any prior enrichment error.
    pub fn set_containers(&self, snapshots: &[ContainerSnapshot]) {
        let mut view = self.enrichment.lock();
        view.containers = snapshots.to_vec();
        view.last_error = None;
    }

    pub fn set_enrichment_error(&self, error: &PipelineError) {
        self.enrichment.lock().last_error = Some(error.to_string());
    }

    pub fn get_status(&self, dedup_entries: usize) -> PublisherStatus {
        let enrichment = self.enrichment.lock();
        PublisherStatus {
            node_id: self.node_id.clone(),
            status: self.status.lock().clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycles_completed: self.cycles.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            points_failed: self.points_failed.load(Ordering::Relaxed),
            dedup_entries,
            last_cycle_at: *self.last_cycle.lock(),
            last_enrichment_error: enrichment.last_error.clone(),
            containers: enrichment.containers.clone(),
        }
    }
}
