//! Collection deletes.
//!
//! A DELETECOLLECTION request arrives with an empty name. Every cached
//! object in scope is checked concurrently and all failures are reported
//! together, so a bulk delete shows every blocking object at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{CONTEXT_CANCELED, Error, Result};
use super::resolver::Resolver;
use super::{DeletionGuard, UserIdentity};

impl DeletionGuard {
    /// Decide a collection delete of every object of the resolver's kind in
    /// `namespace`.
    pub(crate) async fn decide_collection(
        self: &Arc<Self>,
        resolver: Arc<dyn Resolver>,
        namespace: Option<String>,
        user: UserIdentity,
        cancel: CancellationToken,
    ) -> Result<()> {
        let kind = resolver.kind();
        self.readiness.wait(kind, &cancel).await?;

        let objects = resolver.list(namespace.as_deref());
        debug!(
            kind = %kind,
            namespace = ?namespace,
            objects = objects.len(),
            "Checking collection delete"
        );

        let limiter = self.fanout_limit.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();
        for object in objects {
            let guard = Arc::clone(self);
            let resolver = Arc::clone(&resolver);
            let user = user.clone();
            let cancel = cancel.child_token();
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => Some(
                        limiter
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::Internal(e.to_string()))?,
                    ),
                    None => None,
                };
                guard
                    .decide_one(
                        resolver.as_ref(),
                        object.namespace.as_deref(),
                        &object.name,
                        &user,
                        &cancel,
                    )
                    .await
            });
        }

        let mut failures = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled(CONTEXT_CANCELED));
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => failures.push(e.to_string()),
                    Some(Err(e)) => failures.push(Error::Internal(e.to_string()).to_string()),
                },
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        Err(Error::forbidden(kind, "", format!("[{}]", failures.join(", "))))
    }
}
