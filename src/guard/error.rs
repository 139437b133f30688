//! Error types for the deletion guard.
//!
//! Admission errors are classified the way the API server classifies them:
//! `NotFound` means the delete is moot, `Forbidden` is a policy denial,
//! `Internal` signals misconfiguration, `NotReady` asks the client to retry.

use thiserror::Error;

use super::annotations::{CONFIRMATION_DELETION, SHOOT_IGNORE};
use super::kind::GuardedKind;

/// Message returned while the caches have not finished their initial sync.
pub const NOT_READY_MESSAGE: &str = "not yet ready to handle request";

/// Message returned when the surrounding request was cancelled.
pub const CONTEXT_CANCELED: &str = "context canceled";

/// Message returned when the admission timeout elapsed.
pub const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

/// Why a resolved object may not be deleted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("shoot cannot be deleted while annotation `{}` is set", SHOOT_IGNORE)]
    IgnoreAnnotationSet,

    #[error("`{}` annotation is not set to \"true\"", CONFIRMATION_DELETION)]
    NotConfirmed,

    #[error(
        "you are not allowed to both confirm the deletion and send the actual DELETE request - another subject must perform the deletion"
    )]
    SameSubject,
}

/// Failure of the per-object check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error(transparent)]
    Denied(#[from] Denial),

    /// The governing project could not be determined or a selector is malformed.
    #[error("{0}")]
    Internal(String),
}

/// Error type for admission decisions
#[derive(Error, Debug)]
pub enum Error {
    /// The object does not exist in the system of record
    #[error("{resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },

    /// The request violates the deletion policy
    #[error("{}", forbidden_message(.resource, .name, .reason))]
    Forbidden {
        resource: String,
        name: String,
        reason: String,
    },

    /// The caches have not synced yet; the client should retry
    #[error("{resource} is forbidden: {}", NOT_READY_MESSAGE)]
    NotReady { resource: String },

    /// Misconfiguration rather than a policy violation
    #[error("Internal error occurred: {0}")]
    Internal(String),

    /// The request was cancelled or timed out
    #[error("{0}")]
    Cancelled(&'static str),

    /// Kubernetes API error from a live lookup
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

fn forbidden_message(resource: &str, name: &str, reason: &str) -> String {
    if name.is_empty() {
        format!("{resource} is forbidden: {reason}")
    } else {
        format!("{resource} \"{name}\" is forbidden: {reason}")
    }
}

impl Error {
    /// Build a forbidden error for an object of `kind`.
    pub fn forbidden(kind: GuardedKind, name: &str, reason: impl Into<String>) -> Self {
        Error::Forbidden {
            resource: kind.qualified_resource(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a not-found error for an object of `kind`.
    pub fn not_found(kind: GuardedKind, name: &str) -> Self {
        Error::NotFound {
            resource: kind.qualified_resource(),
            name: name.to_string(),
        }
    }

    /// Build a not-ready error for requests against `kind`.
    pub fn not_ready(kind: GuardedKind) -> Self {
        Error::NotReady {
            resource: kind.qualified_resource(),
        }
    }

    /// Map a failed check to its admission error. Denials become forbidden,
    /// internal failures stay internal.
    pub fn from_check(kind: GuardedKind, name: &str, err: CheckError) -> Self {
        match err {
            CheckError::Denied(denial) => Error::forbidden(kind, name, denial.to_string()),
            CheckError::Internal(msg) => Error::Internal(msg),
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// Check if this error is a denial (including the transient not-ready denial)
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden { .. } | Error::NotReady { .. })
    }

    /// Check if the client should retry the whole request
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotReady { .. } | Error::Cancelled(_) => true,
            Error::Kube(e) => {
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            _ => false,
        }
    }

    /// Machine readable reason attached to admission responses
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::Forbidden { .. } => "Forbidden",
            Error::NotReady { .. } => "NotReady",
            Error::Internal(_) => "InternalError",
            Error::Cancelled(_) => "Timeout",
            Error::Kube(_) if self.is_not_found() => "NotFound",
            Error::Kube(_) => "InternalError",
        }
    }
}

/// Result type alias for admission decisions
pub type Result<T> = std::result::Result<T, Error>;
