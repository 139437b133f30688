//! In-memory resolvers for running the engine without a cluster.
//!
//! The cache and the live store are kept separately so stale-cache
//! situations can be reproduced: an object may be confirmed in the live
//! store while the cache still shows the old annotations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::error::{Error, Result};
use super::kind::GuardedKind;
use super::object::GuardedObject;
use super::resolver::{ProjectLookup, Resolver, select_project};
use crate::crd::Project;

type Key = (Option<String>, String);

fn key(namespace: Option<&str>, name: &str) -> Key {
    (namespace.map(str::to_string), name.to_string())
}

/// Resolver over two in-memory maps.
#[derive(Debug)]
pub struct MemoryResolver {
    kind: GuardedKind,
    cache: RwLock<BTreeMap<Key, GuardedObject>>,
    live: RwLock<BTreeMap<Key, GuardedObject>>,
    live_available: AtomicBool,
    live_reads: AtomicUsize,
}

impl MemoryResolver {
    pub fn new(kind: GuardedKind) -> Self {
        Self {
            kind,
            cache: RwLock::new(BTreeMap::new()),
            live: RwLock::new(BTreeMap::new()),
            live_available: AtomicBool::new(true),
            live_reads: AtomicUsize::new(0),
        }
    }

    /// Store an object in both the cache and the live store.
    pub fn insert(&self, object: GuardedObject) {
        self.insert_live(object.clone());
        self.insert_cached(object);
    }

    /// Store an object in the cache only.
    pub fn insert_cached(&self, object: GuardedObject) {
        let k = key(object.namespace.as_deref(), &object.name);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(k, object);
        }
    }

    /// Store an object in the live store only.
    pub fn insert_live(&self, object: GuardedObject) {
        let k = key(object.namespace.as_deref(), &object.name);
        if let Ok(mut live) = self.live.write() {
            live.insert(k, object);
        }
    }

    /// Remove an object from the live store, leaving the cache untouched.
    pub fn remove_live(&self, namespace: Option<&str>, name: &str) {
        if let Ok(mut live) = self.live.write() {
            live.remove(&key(namespace, name));
        }
    }

    /// Make live reads fail as if the API server were unreachable.
    pub fn set_live_available(&self, available: bool) {
        self.live_available.store(available, Ordering::SeqCst);
    }

    /// Number of live reads served so far.
    pub fn live_reads(&self) -> usize {
        self.live_reads.load(Ordering::SeqCst)
    }

    fn scoped<'a>(&self, namespace: Option<&'a str>) -> Option<&'a str> {
        namespace.filter(|_| self.kind.is_namespaced())
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    fn kind(&self) -> GuardedKind {
        self.kind
    }

    fn list(&self, namespace: Option<&str>) -> Vec<GuardedObject> {
        let scoped = self.scoped(namespace);
        let Ok(cache) = self.cache.read() else {
            return Vec::new();
        };
        cache
            .values()
            .filter(|obj| scoped.is_none() || obj.namespace.as_deref() == scoped)
            .cloned()
            .collect()
    }

    fn cache_get(&self, namespace: Option<&str>, name: &str) -> Result<Option<GuardedObject>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| Error::Internal("cache lock poisoned".to_string()))?;
        Ok(cache.get(&key(self.scoped(namespace), name)).cloned())
    }

    async fn live_get(&self, namespace: Option<&str>, name: &str) -> Result<GuardedObject> {
        self.live_reads.fetch_add(1, Ordering::SeqCst);
        if !self.live_available.load(Ordering::SeqCst) {
            return Err(Error::Internal("live store unavailable".to_string()));
        }
        let live = self
            .live
            .read()
            .map_err(|_| Error::Internal("live store lock poisoned".to_string()))?;
        live.get(&key(self.scoped(namespace), name))
            .cloned()
            .ok_or_else(|| Error::not_found(self.kind, name))
    }
}

/// Project lookup over a fixed set of projects.
#[derive(Debug, Default)]
pub struct MemoryProjects {
    projects: RwLock<Vec<Arc<Project>>>,
}

impl MemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a project (matched by name).
    pub fn upsert(&self, project: Project) {
        if let Ok(mut projects) = self.projects.write() {
            projects.retain(|p| p.metadata.name != project.metadata.name);
            projects.push(Arc::new(project));
        }
    }
}

impl ProjectLookup for MemoryProjects {
    fn project_for_namespace(&self, namespace: &str) -> Result<Arc<Project>> {
        let projects = self
            .projects
            .read()
            .map_err(|_| Error::Internal("project lock poisoned".to_string()))?;
        select_project(projects.iter().cloned(), namespace)
    }
}
