//! Webhook module for deletion-confirmation admission requests.
//!
//! - Mutating (`/mutate`): CREATE and UPDATE, maintains the confirmed-by annotation
//! - Validating (`/validate`): DELETE and DELETECOLLECTION, enforces confirmation

mod server;

pub use server::{
    WebhookError, WebhookState, attributes_from_request, confirmation_patch,
    create_webhook_router, mutate_request, operation_name, run_webhook_server, validate_request,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
