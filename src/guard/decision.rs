//! Per-object deletion decision.
//!
//! The cache is trusted on a positive result only. A cache miss or a failed
//! check falls back to a strongly consistent live read, since the cache may
//! not yet reflect a confirmation that was just added.

use kube::core::{Selector, SelectorExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::annotations::{
    CONFIRMED_BY, SHOOT_IGNORE, check_deletion_confirmed, has_true_annotation,
    is_service_account,
};
use super::error::{CONTEXT_CANCELED, CheckError, Denial, Error, Result};
use super::kind::GuardedKind;
use super::object::GuardedObject;
use super::resolver::Resolver;
use super::{DeletionGuard, UserIdentity};

impl DeletionGuard {
    /// Decide whether `user` may delete the object `namespace/name`.
    pub(crate) async fn decide_one(
        &self,
        resolver: &dyn Resolver,
        namespace: Option<&str>,
        name: &str,
        user: &UserIdentity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let kind = resolver.kind();
        self.readiness.wait(kind, cancel).await?;

        match resolver.cache_get(namespace, name) {
            Ok(Some(cached)) => {
                if self.check(&cached, user).is_ok() {
                    debug!(
                        kind = %kind,
                        namespace = ?namespace,
                        name = %name,
                        "Deletion admitted from cache"
                    );
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(Error::Internal(e.to_string())),
        }

        debug!(kind = %kind, namespace = ?namespace, name = %name, "Falling back to live lookup");
        self.record_live_lookup(kind);
        let live = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled(CONTEXT_CANCELED)),
            result = resolver.live_get(namespace, name) => result?,
        };

        self.check(&live, user)
            .map_err(|e| Error::from_check(kind, name, e))
    }

    /// Run every policy check against a resolved object.
    pub fn check(
        &self,
        object: &GuardedObject,
        user: &UserIdentity,
    ) -> std::result::Result<(), CheckError> {
        let ignored = object.kind == GuardedKind::Shoot
            && has_true_annotation(&object.annotations, SHOOT_IGNORE);
        if ignored {
            return Err(Denial::IgnoreAnnotationSet.into());
        }

        check_deletion_confirmed(&object.annotations)?;

        self.check_dual_approval(object, user)
    }

    fn check_dual_approval(
        &self,
        object: &GuardedObject,
        user: &UserIdentity,
    ) -> std::result::Result<(), CheckError> {
        // Projects govern namespaces; they have no project above them.
        if !object.kind.is_namespaced() {
            return Ok(());
        }
        let Some(namespace) = object.namespace.as_deref() else {
            return Ok(());
        };

        let project = self
            .projects
            .project_for_namespace(namespace)
            .map_err(|e| match e {
                Error::Internal(msg) => CheckError::Internal(msg),
                other => CheckError::Internal(other.to_string()),
            })?;

        let resource = object.kind.resource();
        let mut rule = None;
        for candidate in project.dual_approval_rules() {
            if candidate.resource != resource {
                continue;
            }
            let selector = Selector::try_from(candidate.selector.clone()).map_err(|e| {
                CheckError::Internal(format!(
                    "invalid dual approval selector for {resource}: {e}"
                ))
            })?;
            if selector.matches(&object.labels) {
                rule = Some(candidate);
                break;
            }
        }
        let Some(rule) = rule else {
            return Ok(());
        };

        if is_service_account(&user.username) && !rule.includes_service_accounts() {
            return Ok(());
        }

        if object.annotation(CONFIRMED_BY) == Some(user.username.as_str()) {
            return Err(Denial::SameSubject.into());
        }
        Ok(())
    }
}
