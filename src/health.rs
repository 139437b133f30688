//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once every cache has synced)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::guard::{GuardedKind, TrackerOutcome};

/// Labels for admission request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RequestLabels {
    pub kind: String,
    pub operation: String,
    pub result: String,
}

impl EncodeLabelSet for RequestLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels keyed by kind only
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct KindLabels {
    pub kind: String,
}

impl EncodeLabelSet for KindLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for confirmed-by mutations
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct MutationLabels {
    pub kind: String,
    pub action: String,
}

impl EncodeLabelSet for MutationLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("action", self.action.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the deletion guard
pub struct Metrics {
    /// Admission requests by kind, operation and result
    pub admission_requests_total: Family<RequestLabels, Counter>,
    /// Duration of delete decisions
    pub decision_duration_seconds: Family<KindLabels, Histogram>,
    /// Live lookups caused by cache misses or stale cache entries
    pub live_lookups_total: Family<KindLabels, Counter>,
    /// Changes to the confirmed-by annotation
    pub confirmed_by_mutations_total: Family<MutationLabels, Counter>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "deletion_guard_admission_requests",
            "Total number of admission requests",
            admission_requests_total.clone(),
        );

        let decision_duration_seconds =
            Family::<KindLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 15))
            });
        registry.register(
            "deletion_guard_decision_duration_seconds",
            "Duration of deletion decisions in seconds",
            decision_duration_seconds.clone(),
        );

        let live_lookups_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "deletion_guard_live_lookups",
            "Total number of live lookups against the API server",
            live_lookups_total.clone(),
        );

        let confirmed_by_mutations_total = Family::<MutationLabels, Counter>::default();
        registry.register(
            "deletion_guard_confirmed_by_mutations",
            "Total number of confirmed-by annotation changes",
            confirmed_by_mutations_total.clone(),
        );

        Self {
            admission_requests_total,
            decision_duration_seconds,
            live_lookups_total,
            confirmed_by_mutations_total,
            registry,
        }
    }

    /// Record the outcome of an admission request
    pub fn record_request(&self, kind: &str, operation: &str, result: &str) {
        let labels = RequestLabels {
            kind: kind.to_string(),
            operation: operation.to_string(),
            result: result.to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).inc();
    }

    /// Record how long a delete decision took
    pub fn observe_decision(&self, kind: GuardedKind, duration_secs: f64) {
        let labels = KindLabels {
            kind: kind.to_string(),
        };
        self.decision_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a live lookup
    pub fn record_live_lookup(&self, kind: GuardedKind) {
        let labels = KindLabels {
            kind: kind.to_string(),
        };
        self.live_lookups_total.get_or_create(&labels).inc();
    }

    /// Record what the tracker did; unchanged outcomes are not counted
    pub fn record_tracker_outcome(&self, kind: GuardedKind, outcome: TrackerOutcome) {
        if outcome == TrackerOutcome::Unchanged {
            return;
        }
        let labels = MutationLabels {
            kind: kind.to_string(),
            action: outcome.as_str().to_string(),
        };
        self.confirmed_by_mutations_total
            .get_or_create(&labels)
            .inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether every cache has synced
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the guard as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the guard is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the caches have synced.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on the given port
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
