//! Admission webhook server.
//!
//! Provides HTTPS endpoints for Kubernetes admission webhooks:
//! - `/mutate`: maintains the confirmed-by annotation on create and update
//! - `/validate`: enforces deletion confirmation and dual approval on delete
//!
//! To enable webhooks:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a MutatingWebhookConfiguration for CREATE/UPDATE and a
//!    ValidatingWebhookConfiguration for DELETE on shoots, projects and shootstates
//! 3. Mount the TLS certificate secret to the pod at /etc/webhook/certs/

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info, warn};

use crate::config::GuardConfig;
use crate::guard::{
    AdmissionAttributes, DeletionGuard, GuardedKind, TrackerOutcome, UserIdentity,
};
use crate::health::HealthState;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub guard: Arc<DeletionGuard>,
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(guard: Arc<DeletionGuard>, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            guard,
            health_state,
        }
    }

    fn record(&self, attrs: &AdmissionAttributes, result: &str) {
        if let (Some(state), Some(kind)) = (&self.health_state, attrs.kind) {
            state
                .metrics
                .record_request(&kind.kind(), operation_name(&attrs.operation), result);
        }
    }
}

/// Upper-case operation name as it appears in admission reviews
pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Translate a kube-rs admission request into the guard's attributes
pub fn attributes_from_request(request: &AdmissionRequest<DynamicObject>) -> AdmissionAttributes {
    AdmissionAttributes {
        operation: request.operation.clone(),
        kind: GuardedKind::from_group_kind(&request.kind.group, &request.kind.kind),
        namespace: request.namespace.clone().filter(|ns| !ns.is_empty()),
        name: request.name.clone(),
        subresource: request.sub_resource.clone(),
        user: UserIdentity {
            username: request.user_info.username.clone().unwrap_or_default(),
            groups: request.user_info.groups.clone().unwrap_or_default(),
        },
        dry_run: request.dry_run,
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason(
    request: &AdmissionRequest<DynamicObject>,
    message: &str,
    reason: &str,
) -> AdmissionReview<DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// JSON patch turning `original` into `mutated`
pub fn confirmation_patch(
    original: &DynamicObject,
    mutated: &DynamicObject,
) -> Result<json_patch::Patch, serde_json::Error> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(mutated)?;
    Ok(json_patch::diff(&before, &after))
}

/// Run the mutating phase for one request. Always allows; a patch is
/// attached when the confirmed-by annotation changed.
pub fn mutate_request(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let attrs = attributes_from_request(request);
    let Some(original) = request.object.as_ref() else {
        return AdmissionResponse::from(request).into_review();
    };

    let mut mutated = original.clone();
    let old_meta = request.old_object.as_ref().map(|o| &o.metadata);
    let outcome = state.guard.admit(&attrs, &mut mutated.metadata, old_meta);
    if matches!(outcome, None | Some(TrackerOutcome::Unchanged)) {
        state.record(&attrs, "allowed");
        return AdmissionResponse::from(request).into_review();
    }

    let patched = confirmation_patch(original, &mutated).map_err(|e| e.to_string()).and_then(
        |patch| {
            AdmissionResponse::from(request)
                .with_patch(patch)
                .map_err(|e| e.to_string())
        },
    );
    match patched {
        Ok(response) => {
            info!(
                uid = %request.uid,
                kind = ?attrs.kind,
                namespace = ?attrs.namespace,
                name = %attrs.name,
                user = %attrs.user.username,
                outcome = ?outcome,
                "Patched confirmed-by annotation"
            );
            state.record(&attrs, "allowed");
            response.into_review()
        }
        Err(e) => {
            error!(
                uid = %request.uid,
                error = %e,
                "Failed to build confirmed-by patch, allowing unmodified"
            );
            state.record(&attrs, "error");
            AdmissionResponse::from(request).into_review()
        }
    }
}

/// Run the validating phase for one request
pub async fn validate_request(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let attrs = attributes_from_request(request);

    match state.guard.validate(&attrs).await {
        Ok(()) => {
            if attrs.kind.is_some() && attrs.operation == Operation::Delete {
                info!(
                    uid = %request.uid,
                    kind = ?attrs.kind,
                    namespace = ?attrs.namespace,
                    name = %attrs.name,
                    user = %attrs.user.username,
                    "Deletion allowed"
                );
            }
            state.record(&attrs, "allowed");
            AdmissionResponse::from(request).into_review()
        }
        Err(e) => {
            if e.is_forbidden() || e.is_not_found() {
                warn!(
                    uid = %request.uid,
                    namespace = ?attrs.namespace,
                    name = %attrs.name,
                    user = %attrs.user.username,
                    reason = e.reason(),
                    message = %e,
                    "Admission request denied"
                );
                state.record(&attrs, "denied");
            } else {
                error!(
                    uid = %request.uid,
                    namespace = ?attrs.namespace,
                    name = %attrs.name,
                    error = %e,
                    "Admission request failed"
                );
                state.record(&attrs, "error");
            }
            deny_with_reason(request, &e.to_string(), e.reason())
        }
    }
}

fn extract_request(
    review: AdmissionReview<DynamicObject>,
) -> Result<AdmissionRequest<DynamicObject>, (StatusCode, Json<AdmissionReview<DynamicObject>>)> {
    review.try_into().map_err(|e| {
        error!(error = %e, "Failed to extract admission request");
        (
            StatusCode::BAD_REQUEST,
            Json(
                AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                    .into_review(),
            ),
        )
    })
}

async fn mutate(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let request = match extract_request(review) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };
    debug!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing mutating admission request"
    );
    (StatusCode::OK, Json(mutate_request(&state, &request)))
}

async fn validate(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let request = match extract_request(review) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };
    debug!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing validating admission request"
    );
    (StatusCode::OK, Json(validate_request(&state, &request).await))
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate))
        .route("/validate", post(validate))
        .with_state(state)
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0 on the configured port and serves `/mutate` and `/validate`.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    config: &GuardConfig,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router(state);

    let tls = RustlsConfig::from_pem_file(
        PathBuf::from(&config.cert_path),
        PathBuf::from(&config.key_path),
    )
    .await
    .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    info!(port = config.webhook_port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
