//! Per-kind lookup plumbing.
//!
//! A [`Resolver`] gives the decision logic three views of one guarded kind:
//! every cached object, a single cached object, and a strongly consistent
//! live read. [`ProjectLookup`] maps a namespace to its governing project.
//! Neither holds any policy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use super::error::{Error, Result};
use super::kind::GuardedKind;
use super::object::GuardedObject;
use crate::crd::Project;

/// Lookup functions for one guarded kind.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The kind this resolver serves.
    fn kind(&self) -> GuardedKind;

    /// Every cached object of the kind. `namespace` is ignored for
    /// cluster-scoped kinds.
    fn list(&self, namespace: Option<&str>) -> Vec<GuardedObject>;

    /// Cached object, `Ok(None)` if the cache does not know it. Never
    /// performs network I/O.
    fn cache_get(&self, namespace: Option<&str>, name: &str) -> Result<Option<GuardedObject>>;

    /// Strongly consistent read against the API server.
    async fn live_get(&self, namespace: Option<&str>, name: &str) -> Result<GuardedObject>;
}

/// Resolves the project governing a namespace.
pub trait ProjectLookup: Send + Sync {
    /// The single project whose `spec.namespace` equals `namespace`.
    fn project_for_namespace(&self, namespace: &str) -> Result<Arc<Project>>;
}

/// Pick the single project owning `namespace` out of `projects`.
pub fn select_project<I>(projects: I, namespace: &str) -> Result<Arc<Project>>
where
    I: IntoIterator<Item = Arc<Project>>,
{
    let mut matching = projects
        .into_iter()
        .filter(|p| p.spec.namespace.as_deref() == Some(namespace));

    let Some(project) = matching.next() else {
        return Err(Error::Internal(format!(
            "no project found for namespace \"{namespace}\""
        )));
    };
    if matching.next().is_some() {
        return Err(Error::Internal(format!(
            "more than one project found for namespace \"{namespace}\""
        )));
    }
    Ok(project)
}

type ApiFactory<K> = Box<dyn Fn(Option<&str>) -> Api<K> + Send + Sync>;

/// Resolver backed by a reflector store (cache) and an `Api` (live reads).
pub struct KubeResolver<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: GuardedKind,
    store: Store<K>,
    api: ApiFactory<K>,
}

impl<K> KubeResolver<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    /// Resolver for a namespaced kind.
    pub fn namespaced(kind: GuardedKind, store: Store<K>, client: Client) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            kind,
            store,
            api: Box::new(move |namespace| {
                Api::namespaced(client.clone(), namespace.unwrap_or_default())
            }),
        }
    }

    /// Resolver for a cluster-scoped kind.
    pub fn cluster(kind: GuardedKind, store: Store<K>, client: Client) -> Self {
        Self {
            kind,
            store,
            api: Box::new(move |_| Api::all(client.clone())),
        }
    }

    fn object_ref(&self, namespace: Option<&str>, name: &str) -> ObjectRef<K> {
        match namespace {
            Some(ns) if self.kind.is_namespaced() => ObjectRef::new(name).within(ns),
            _ => ObjectRef::new(name),
        }
    }
}

#[async_trait]
impl<K> Resolver for KubeResolver<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    fn kind(&self) -> GuardedKind {
        self.kind
    }

    fn list(&self, namespace: Option<&str>) -> Vec<GuardedObject> {
        let scoped = namespace.filter(|_| self.kind.is_namespaced());
        self.store
            .state()
            .iter()
            .filter(|obj| match scoped {
                Some(ns) => obj.meta().namespace.as_deref() == Some(ns),
                None => true,
            })
            .map(|obj| GuardedObject::from_resource(self.kind, obj.as_ref()))
            .collect()
    }

    fn cache_get(&self, namespace: Option<&str>, name: &str) -> Result<Option<GuardedObject>> {
        Ok(self
            .store
            .get(&self.object_ref(namespace, name))
            .map(|obj| GuardedObject::from_resource(self.kind, obj.as_ref())))
    }

    async fn live_get(&self, namespace: Option<&str>, name: &str) -> Result<GuardedObject> {
        let api = (self.api)(namespace);
        match api.get(name).await {
            Ok(obj) => Ok(GuardedObject::from_resource(self.kind, &obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::not_found(self.kind, name)),
            Err(e) => Err(Error::Kube(e)),
        }
    }
}

/// Project lookup backed by the project reflector store.
#[derive(Clone)]
pub struct StoreProjectLookup {
    store: Store<Project>,
}

impl StoreProjectLookup {
    pub fn new(store: Store<Project>) -> Self {
        Self { store }
    }
}

impl ProjectLookup for StoreProjectLookup {
    fn project_for_namespace(&self, namespace: &str) -> Result<Arc<Project>> {
        select_project(self.store.state(), namespace)
    }
}
