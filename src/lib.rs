//! deletion-guard library crate
//!
//! This module exports the Gardener resource types, the deletion guard engine,
//! and the admission webhook and health servers.

pub mod config;
pub mod crd;
pub mod guard;
pub mod health;
pub mod webhooks;

pub use config::GuardConfig;
pub use guard::{AdmissionAttributes, DeletionGuard, GuardedKind, UserIdentity};
pub use health::HealthState;
pub use webhooks::{WebhookError, WebhookState, run_webhook_server};

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crd::{Project, Shoot, ShootState};
use guard::{KubeResolver, ReadinessGate, StoreProjectLookup};

/// Create the default watcher configuration for all caches.
///
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Spawn a reflector for `api` and return its store.
///
/// The reflector keeps the in-memory cache current and retries with
/// exponential backoff on watch errors. The store is ready once the initial
/// list has been applied.
pub fn spawn_reflector<K>(api: Api<K>) -> Store<K>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send + Sync,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, default_watcher_config())).default_backoff();

    tokio::spawn(async move {
        stream
            .for_each(|event| {
                if let Err(ref e) = event {
                    warn!(kind = %kind, error = %e, "Watch error, retrying");
                }
                futures::future::ready(())
            })
            .await;
        error!(kind = %kind, "Reflector stream ended unexpectedly");
    });

    reader
}

/// Build the deletion guard over live reflector caches.
///
/// Shoots and ShootStates are watched cluster-wide; Projects are
/// cluster-scoped. The returned guard blocks delete decisions until all three
/// caches have synced.
pub fn build_guard(
    client: Client,
    config: &GuardConfig,
    health_state: Option<Arc<HealthState>>,
) -> Arc<DeletionGuard> {
    let shoots = spawn_reflector(Api::<Shoot>::all(client.clone()));
    let shoot_states = spawn_reflector(Api::<ShootState>::all(client.clone()));
    let projects = spawn_reflector(Api::<Project>::all(client.clone()));

    let readiness = ReadinessGate::from_waits(vec![
        wait_until_ready(shoots.clone()),
        wait_until_ready(shoot_states.clone()),
        wait_until_ready(projects.clone()),
    ]);

    let mut guard = DeletionGuard::new(
        Arc::new(StoreProjectLookup::new(projects.clone())),
        readiness,
    )
    .with_resolver(Arc::new(KubeResolver::namespaced(
        GuardedKind::Shoot,
        shoots,
        client.clone(),
    )))
    .with_resolver(Arc::new(KubeResolver::namespaced(
        GuardedKind::ShootState,
        shoot_states,
        client.clone(),
    )))
    .with_resolver(Arc::new(KubeResolver::cluster(
        GuardedKind::Project,
        projects,
        client,
    )))
    .with_timeout(config.admission_timeout)
    .with_fanout_limit(config.fanout_max_concurrency);

    if let Some(state) = health_state {
        let gate = guard.readiness().clone();
        let readiness_state = state.clone();
        tokio::spawn(async move {
            if gate.synced().await {
                readiness_state.set_ready(true).await;
            }
        });
        guard = guard.with_health_state(state);
    }

    Arc::new(guard)
}

fn wait_until_ready<K>(
    store: Store<K>,
) -> futures::future::BoxFuture<'static, Result<(), reflector::store::WriterDropped>>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Eq + std::hash::Hash + Clone + Send + Sync,
{
    async move { store.wait_until_ready().await }.boxed()
}

/// Build the guard and serve admission requests until the server exits.
pub async fn run_guard(
    client: Client,
    config: GuardConfig,
    health_state: Option<Arc<HealthState>>,
) -> Result<(), WebhookError> {
    info!(
        port = config.webhook_port,
        timeout_secs = config.admission_timeout.as_secs(),
        fanout_limit = ?config.fanout_max_concurrency,
        "Starting deletion guard"
    );
    let guard = build_guard(client, &config, health_state.clone());
    let state = Arc::new(WebhookState::new(guard, health_state));
    run_webhook_server(state, &config).await
}
