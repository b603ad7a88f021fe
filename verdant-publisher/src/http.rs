//! HTTP surface.
//!
//! Three routes: push-mode ingestion, a liveness probe for the fleet's own
//! monitoring, and an operator status snapshot. Ingestion is synchronous: the
//! response reports the aggregate fanout verdict for the one pushed reading.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::collector::Collector;
use crate::health::{PublisherStatus, StatusTracker};
use crate::reading::Reading;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub status: StatusTracker,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/node/update", post(node_update))
        .route("/publisher/health", get(|| async { "healthy" }))
        .route("/publisher/status", get(get_status))
        .with_state(state)
}

// POST /node/update (push-mode ingestion)
//
// 200 "Ack" only when every changed field reached every sink; 400 for bodies
// that fail the parse boundary; 500 when any sink write failed. The Json
// extractor itself rejects non-JSON content types before the handler runs.
async fn node_update(
    State(app): State<AppState>,
    Json(body): Json<Value>,
) -> Result<&'static str, (StatusCode, Json<Value>)> {
    let reading = Reading::from_json(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;

    if app.collector.ingest(reading).await {
        Ok("Ack")
    } else {
        Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "one or more sink writes failed" })),
        ))
    }
}

// GET /publisher/status (operator snapshot)
async fn get_status(State(app): State<AppState>) -> Json<PublisherStatus> {
    let dedup_entries = app.collector.dedup_entries().await;
    Json(app.status.get_status(dedup_entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::{StaticProbe, StaticRuntime};
    use crate::enrich::ContainerEnricher;
    use crate::point::{NodeIdentity, PointBuilder};
    use crate::sink::testing::{FailingSink, RecordingSink};
    use crate::sink::{PointSink, SinkFanout, SinkRole};
    use crate::source::FileSource;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Publisher wired with sink doubles, served on a random local port.
    async fn spawn_app(sinks: Vec<Box<dyn PointSink>>) -> (String, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let builder = PointBuilder::new(NodeIdentity {
            friendly_name: "Room A".into(),
            customer_id: "T1".into(),
        });
        let enricher = ContainerEnricher::new(
            Arc::new(StaticRuntime::empty()),
            Arc::new(StaticProbe::empty()),
            true,
            Duration::from_millis(50),
            4,
        );
        let status = StatusTracker::new("node-test".into());
        let collector = Arc::new(Collector::new(
            builder,
            SinkFanout::new(sinks),
            enricher,
            Box::new(FileSource::new(dir.path())),
            status.clone(),
            Duration::from_secs(1),
        ));
        let app = build_router(AppState {
            collector: collector.clone(),
            status,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), dir)
    }

    #[tokio::test]
    async fn post_update_acks_on_full_success() {
        let tenant = RecordingSink::new("tenant", SinkRole::Tenant);
        let lake = RecordingSink::new("lake", SinkRole::Lake);
        let tenant_written = tenant.written_handle();
        let lake_written = lake.written_handle();
        let (base, _dir) = spawn_app(vec![Box::new(tenant), Box::new(lake)]).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/node/update"))
            .json(&json!({"sensor_type": "bme680", "temperature_c": 21.5}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "Ack");
        assert_eq!(tenant_written.lock().unwrap().len(), 1);
        assert_eq!(lake_written.lock().unwrap().len(), 1);
        assert_eq!(
            tenant_written.lock().unwrap()[0].field_name,
            "temperature_c"
        );
    }

    #[tokio::test]
    async fn post_update_reports_failure_when_tenant_sink_rejects() {
        let tenant = FailingSink::new("tenant", SinkRole::Tenant);
        let lake = RecordingSink::new("lake", SinkRole::Lake);
        let lake_written = lake.written_handle();
        let (base, _dir) = spawn_app(vec![Box::new(tenant), Box::new(lake)]).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/node/update"))
            .json(&json!({"sensor_type": "bme680", "temperature_c": 21.5}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("sink"));
        // The lake write happened even though the request failed overall.
        assert_eq!(lake_written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn post_update_rejects_malformed_reading() {
        let (base, _dir) =
            spawn_app(vec![Box::new(RecordingSink::new("tenant", SinkRole::Tenant))]).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/node/update"))
            .json(&json!({"temperature_c": 21.5}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("sensor_type"));
    }

    #[tokio::test]
    async fn post_update_requires_json_content_type() {
        let (base, _dir) =
            spawn_app(vec![Box::new(RecordingSink::new("tenant", SinkRole::Tenant))]).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/node/update"))
            .header("Content-Type", "text/plain")
            .body(r#"{"sensor_type": "bme680", "temperature_c": 21.5}"#)
            .send()
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (base, _dir) =
            spawn_app(vec![Box::new(RecordingSink::new("tenant", SinkRole::Tenant))]).await;

        let response = reqwest::Client::new()
            .get(format!("{base}/publisher/health"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "healthy");
    }

    #[tokio::test]
    async fn status_endpoint_reports_node_state() {
        let (base, _dir) =
            spawn_app(vec![Box::new(RecordingSink::new("tenant", SinkRole::Tenant))]).await;
        let client = reqwest::Client::new();

        client
            .post(format!("{base}/node/update"))
            .json(&json!({"sensor_type": "bme680", "temperature_c": 21.5}))
            .send()
            .await
            .unwrap();

        let status: Value = client
            .get(format!("{base}/publisher/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(status["node_id"], "node-test");
        assert_eq!(status["points_written"], 1);
        assert_eq!(status["dedup_entries"], 1);
        assert!(status["uptime_seconds"].is_u64());
    }
}
