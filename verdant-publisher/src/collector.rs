//! The collector loop.
//!
//! One component serves both publisher shapes:
//! - Poll mode: an interval ticker drives discover → enrich → process cycles
//!   until shutdown is signalled between ticks.
//! - Push mode: `ingest` runs a single enrich → process pass for one inbound
//!   reading and reports an aggregate verdict to the HTTP boundary.
//!
//! Failures stay local. A bad field, a rejected sink write or a downed runtime
//! never stops the loop; operators see them in logs and /publisher/status.

use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupCache;
use crate::enrich::ContainerEnricher;
use crate::health::StatusTracker;
use crate::point::PointBuilder;
use crate::reading::Reading;
use crate::sink::{SinkFanout, WriteOutcome};
use crate::source::MeasurementSource;

pub struct Collector {
    builder: PointBuilder,
    // Guards the whole dedup-check/build/fanout scope so concurrent push and
    // poll processing cannot lose dedup updates.
    dedup: Mutex<DedupCache>,
    fanout: SinkFanout,
    enricher: ContainerEnricher,
    source: Box<dyn MeasurementSource>,
    status: StatusTracker,
    poll_interval: Duration,
}

impl Collector {
    pub fn new(
        builder: PointBuilder,
        fanout: SinkFanout,
        enricher: ContainerEnricher,
        source: Box<dyn MeasurementSource>,
        status: StatusTracker,
        poll_interval: Duration,
    ) -> Self {
        Self {
            builder,
            dedup: Mutex::new(DedupCache::new()),
            fanout,
            enricher,
            source,
            status,
            poll_interval,
        }
    }

    /// Drives polling cycles until the shutdown flag flips. The running cycle
    /// always completes; shutdown is honored between ticks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Collector loop starting (interval {:?})", self.poll_interval);
        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Collector loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One poll-mode cycle: discover readings, rebuild the container view,
    /// process every reading.
    async fn run_cycle(&self) {
        let readings = match self.source.discover().await {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Reading discovery failed: {e}");
                Vec::new()
            }
        };

        match self.enricher.enrich().await {
            Ok(snapshots) => self.status.set_containers(&snapshots),
            Err(e) => {
                error!("{e}");
                self.status.set_enrichment_error(&e);
            }
        }

        for reading in &readings {
            self.process_reading(reading).await;
        }

        self.status.record_cycle();
        debug!("Cycle complete ({} readings)", readings.len());
    }

    /// One push-mode pass. Returns `true` only when every changed field was
    /// accepted by every configured sink; already-written fields are not
    /// rolled back on a later failure.
    pub async fn ingest(&self, reading: Reading) -> bool {
        debug!("Ingesting pushed {} reading", reading.kind);

        match self.enricher.enrich().await {
            Ok(snapshots) => self.status.set_containers(&snapshots),
            Err(e) => {
                error!("{e}");
                self.status.set_enrichment_error(&e);
            }
        }

        self.process_reading(&reading).await
    }

    /// Dedupes, builds and fans out each field of one reading, continuing past
    /// per-field failures.
    async fn process_reading(&self, reading: &Reading) -> bool {
        debug!(
            "Processing {} reading captured {}",
            reading.kind, reading.captured_at
        );
        let mut dedup = self.dedup.lock().await;
        let mut written = 0u64;
        let mut failed = 0u64;

        for (field_name, value) in &reading.fields {
            let key = reading.measurement_key(field_name);
            if !dedup.should_send(&key, value) {
                debug!("Unchanged value for {key}, suppressed");
                continue;
            }

            let pair = self.builder.build(&reading.kind, field_name, value.clone());
            for result in self.fanout.write_all(&pair).await {
                match result.outcome {
                    WriteOutcome::Written => written += 1,
                    WriteOutcome::Failed => {
                        failed += 1;
                        error!(
                            "Sink {} rejected {key}: {}",
                            result.sink,
                            result.error_detail.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
        }
        drop(dedup);

        self.status.record_writes(written, failed);
        failed == 0
    }

    /// Current dedup cache size, for the status surface.
    pub async fn dedup_entries(&self) -> usize {
        self.dedup.lock().await.len()
    }
}
