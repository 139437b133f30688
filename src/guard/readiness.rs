//! Readiness gate over the reflector caches.
//!
//! Requests block until every cache has completed its initial list. The wait
//! respects cancellation so a request never hangs past its deadline.

use futures::future::{BoxFuture, try_join_all};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::error::{CONTEXT_CANCELED, Error, Result};
use super::kind::GuardedKind;

/// Sending half of a readiness gate.
#[derive(Debug)]
pub struct ReadinessHandle {
    synced: watch::Sender<bool>,
}

impl ReadinessHandle {
    /// Mark all caches as synced.
    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }
}

/// Composed "all caches synced" predicate.
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    synced: watch::Receiver<bool>,
}

impl ReadinessGate {
    /// A gate that is already open.
    pub fn ready() -> Self {
        let (tx, rx) = watch::channel(true);
        drop(tx);
        Self { synced: rx }
    }

    /// A closed gate and the handle that opens it.
    pub fn pending() -> (ReadinessHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (ReadinessHandle { synced: tx }, Self { synced: rx })
    }

    /// A gate that opens once every wait future resolves successfully.
    ///
    /// Must be called inside a tokio runtime. If any future fails (e.g. a
    /// reflector writer was dropped) the gate stays closed for good.
    pub fn from_waits<E>(waits: Vec<BoxFuture<'static, std::result::Result<(), E>>>) -> Self
    where
        E: std::fmt::Display + Send + 'static,
    {
        let (handle, gate) = Self::pending();
        let caches = waits.len();
        tokio::spawn(async move {
            match try_join_all(waits).await {
                Ok(_) => {
                    info!(caches, "All caches synced");
                    handle.mark_synced();
                }
                Err(e) => error!(error = %e, "Cache never became ready"),
            }
        });
        gate
    }

    /// Whether every cache has synced.
    pub fn is_ready(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resolve once the caches have synced. Returns `false` if the gate can
    /// never open.
    pub async fn synced(&self) -> bool {
        let mut synced = self.synced.clone();
        synced.wait_for(|ready| *ready).await.is_ok()
    }

    /// Block until the caches have synced, the request is cancelled, or the
    /// gate can never open.
    pub async fn wait(&self, kind: GuardedKind, cancel: &CancellationToken) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let mut synced = self.synced.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled(CONTEXT_CANCELED)),
            result = synced.wait_for(|ready| *ready) => match result {
                Ok(_) => Ok(()),
                Err(_) => Err(Error::not_ready(kind)),
            },
        }
    }
}
