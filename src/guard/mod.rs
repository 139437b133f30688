//! The deletion guard.
//!
//! Two admission entry points share one engine:
//! - [`DeletionGuard::admit`] (mutating): keeps the `confirmed-by` annotation
//!   in sync on create and update
//! - [`DeletionGuard::validate`] (validating): denies deletions that are not
//!   confirmed, violate dual approval, or target an ignored shoot
//!
//! Lookups go through one [`Resolver`] per kind; the engine itself is
//! kind-agnostic.

pub mod annotations;
mod decision;
pub mod error;
mod fanout;
pub mod kind;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod object;
pub mod readiness;
pub mod resolver;
pub mod tracker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::admission::Operation;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use error::{CheckError, Denial, Error, Result};
pub use kind::GuardedKind;
pub use object::GuardedObject;
pub use readiness::{ReadinessGate, ReadinessHandle};
pub use resolver::{KubeResolver, ProjectLookup, Resolver, StoreProjectLookup};
pub use tracker::TrackerOutcome;

use crate::health::HealthState;
use error::DEADLINE_EXCEEDED;

/// Default upper bound for a single validation.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(10);

/// The subject sending an admission request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub groups: Vec<String>,
}

impl UserIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
        }
    }
}

/// Transport-neutral view of an admission request.
#[derive(Clone, Debug)]
pub struct AdmissionAttributes {
    pub operation: Operation,
    /// `None` when the request targets a kind the guard does not handle.
    pub kind: Option<GuardedKind>,
    pub namespace: Option<String>,
    /// Empty for collection deletes.
    pub name: String,
    pub subresource: Option<String>,
    pub user: UserIdentity,
    pub dry_run: bool,
}

impl AdmissionAttributes {
    /// Attributes for a delete of a single object (or a collection when `name` is empty).
    pub fn delete(
        kind: GuardedKind,
        namespace: Option<&str>,
        name: &str,
        user: UserIdentity,
    ) -> Self {
        Self {
            operation: Operation::Delete,
            kind: Some(kind),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            subresource: None,
            user,
            dry_run: false,
        }
    }

    /// Whether this is a delete of every object of the kind in scope.
    pub fn is_collection(&self) -> bool {
        self.name.is_empty()
    }

    fn targets_subresource(&self) -> bool {
        self.subresource.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Deletion confirmation engine shared by both admission phases.
pub struct DeletionGuard {
    resolvers: HashMap<GuardedKind, Arc<dyn Resolver>>,
    projects: Arc<dyn ProjectLookup>,
    readiness: ReadinessGate,
    timeout: Duration,
    fanout_limit: Option<usize>,
    health_state: Option<Arc<HealthState>>,
}

impl DeletionGuard {
    /// Create an engine without resolvers. Kinds without a resolver pass
    /// through unchecked.
    pub fn new(projects: Arc<dyn ProjectLookup>, readiness: ReadinessGate) -> Self {
        Self {
            resolvers: HashMap::new(),
            projects,
            readiness,
            timeout: DEFAULT_ADMISSION_TIMEOUT,
            fanout_limit: None,
            health_state: None,
        }
    }

    /// Register the resolver for its kind, replacing any previous one.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolvers.insert(resolver.kind(), resolver);
        self
    }

    /// Upper bound for one validation including readiness wait and live lookups.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound the number of concurrent per-object checks of a collection delete.
    pub fn with_fanout_limit(mut self, limit: Option<usize>) -> Self {
        self.fanout_limit = limit.filter(|n| *n > 0);
        self
    }

    /// Record metrics into the given health state.
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Readiness of the underlying caches.
    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    /// Mutating phase. Updates `confirmed-by` on `object` in place and
    /// reports what changed. Returns `None` when the request is not handled.
    /// Never fails.
    pub fn admit(
        &self,
        attrs: &AdmissionAttributes,
        object: &mut ObjectMeta,
        old_object: Option<&ObjectMeta>,
    ) -> Option<TrackerOutcome> {
        let kind = attrs.kind?;
        if attrs.targets_subresource() {
            return None;
        }
        let old_object = match attrs.operation {
            Operation::Create => None,
            Operation::Update => old_object,
            _ => return None,
        };

        let outcome = tracker::track_confirmation(object, old_object, &attrs.user.username);
        debug!(
            kind = %kind,
            namespace = ?attrs.namespace,
            name = %attrs.name,
            user = %attrs.user.username,
            outcome = %outcome,
            "Tracked deletion confirmation"
        );
        if let Some(ref state) = self.health_state {
            state.metrics.record_tracker_outcome(kind, outcome);
        }
        Some(outcome)
    }

    /// Validating phase with the configured timeout.
    pub async fn validate(self: &Arc<Self>, attrs: &AdmissionAttributes) -> Result<()> {
        let cancel = CancellationToken::new();
        self.validate_with_cancel(attrs, cancel).await
    }

    /// Validating phase. Only deletes of guarded kinds are inspected;
    /// everything else passes silently. Cancelling `cancel` aborts readiness
    /// waits, live lookups and fan-out children.
    pub async fn validate_with_cancel(
        self: &Arc<Self>,
        attrs: &AdmissionAttributes,
        cancel: CancellationToken,
    ) -> Result<()> {
        if attrs.operation != Operation::Delete {
            return Ok(());
        }
        let Some(kind) = attrs.kind else {
            return Ok(());
        };
        let Some(resolver) = self.resolvers.get(&kind).cloned() else {
            return Ok(());
        };

        // Children observe the token; dropping this future cancels them too.
        let _cancel_on_drop = cancel.clone().drop_guard();
        let started = Instant::now();

        let decision = async {
            if attrs.is_collection() {
                self.decide_collection(
                    resolver,
                    attrs.namespace.clone(),
                    attrs.user.clone(),
                    cancel.clone(),
                )
                .await
            } else {
                self.decide_one(
                    resolver.as_ref(),
                    attrs.namespace.as_deref(),
                    &attrs.name,
                    &attrs.user,
                    &cancel,
                )
                .await
            }
        };

        let result = match tokio::time::timeout(self.timeout, decision).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                if self.readiness.is_ready() {
                    Err(Error::Cancelled(DEADLINE_EXCEEDED))
                } else {
                    Err(Error::not_ready(kind))
                }
            }
        };

        if let Some(ref state) = self.health_state {
            state
                .metrics
                .observe_decision(kind, started.elapsed().as_secs_f64());
        }
        result
    }

    fn record_live_lookup(&self, kind: GuardedKind) {
        if let Some(ref state) = self.health_state {
            state.metrics.record_live_lookup(kind);
        }
    }
}
