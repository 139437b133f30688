//! Mock infrastructure for simulating an API server in functional tests.
//!
//! `MockCluster` plays the part of the API server: writes go through the
//! real mutating phase (`DeletionGuard::admit`) before they are persisted,
//! deletes go through the real validating phase. The persisted state is
//! published to in-memory resolvers whose cache can be made to lag behind
//! the live store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use deletion_guard::crd::Project;
use deletion_guard::guard::memory::{MemoryProjects, MemoryResolver};
use deletion_guard::guard::{GuardedObject, ReadinessGate, Result, TrackerOutcome};
use deletion_guard::webhooks::Operation;
use deletion_guard::{AdmissionAttributes, DeletionGuard, GuardedKind, UserIdentity};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::common::fixtures::NAMESPACE;

type Key = (GuardedKind, Option<String>, String);

/// Whether a write should become visible in the cache right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSync {
    /// Cache and live store agree after the write.
    Immediate,
    /// Only the live store sees the write.
    Lagging,
}

/// Simulated API server backed by the real deletion guard.
pub struct MockCluster {
    pub guard: Arc<DeletionGuard>,
    resolvers: BTreeMap<&'static str, Arc<MemoryResolver>>,
    objects: Mutex<BTreeMap<Key, ObjectMeta>>,
}

impl MockCluster {
    /// A cluster where `project` governs its namespace.
    pub fn new(project: Project) -> Self {
        Self::with_fanout_limit(project, None)
    }

    /// Like [`MockCluster::new`] with a bound on collection-delete fan-out.
    pub fn with_fanout_limit(project: Project, limit: Option<usize>) -> Self {
        let projects = MemoryProjects::new();
        projects.upsert(project);

        let mut guard = DeletionGuard::new(Arc::new(projects), ReadinessGate::ready())
            .with_fanout_limit(limit);
        let mut resolvers = BTreeMap::new();
        for kind in GuardedKind::ALL {
            let resolver = Arc::new(MemoryResolver::new(kind));
            guard = guard.with_resolver(resolver.clone());
            resolvers.insert(kind_key(kind), resolver);
        }

        Self {
            guard: Arc::new(guard),
            resolvers,
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// The in-memory resolver serving `kind`.
    pub fn resolver(&self, kind: GuardedKind) -> Arc<MemoryResolver> {
        self.resolvers
            .get(kind_key(kind))
            .cloned()
            .expect("every kind has a resolver")
    }

    /// Create an object through the mutating phase.
    pub fn create(
        &self,
        kind: GuardedKind,
        name: &str,
        annotations: &[(&str, &str)],
        user: &str,
    ) -> Option<TrackerOutcome> {
        let namespace = kind.is_namespaced().then(|| NAMESPACE.to_string());
        let mut meta = ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.clone(),
            annotations: Some(to_map(annotations)),
            ..Default::default()
        };
        let attrs = attributes(Operation::Create, kind, namespace.as_deref(), name, user);
        let outcome = self.guard.admit(&attrs, &mut meta, None);
        self.persist(kind, meta, CacheSync::Immediate);
        outcome
    }

    /// Replace the annotations of an existing object through the mutating
    /// phase, as a client sending a full update would.
    pub fn update(
        &self,
        kind: GuardedKind,
        name: &str,
        annotations: &[(&str, &str)],
        user: &str,
        sync: CacheSync,
    ) -> Option<TrackerOutcome> {
        let namespace = kind.is_namespaced().then(|| NAMESPACE.to_string());
        let old = self.get(kind, name).expect("object exists");
        let mut meta = old.clone();
        meta.annotations = Some(to_map(annotations));

        let attrs = attributes(Operation::Update, kind, namespace.as_deref(), name, user);
        let outcome = self.guard.admit(&attrs, &mut meta, Some(&old));
        self.persist(kind, meta, sync);
        outcome
    }

    /// Set a label on an existing object. Label changes do not pass the
    /// mutating phase in these tests.
    pub fn label(&self, kind: GuardedKind, name: &str, key: &str, value: &str) {
        let mut meta = self.get(kind, name).expect("object exists");
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self.persist(kind, meta, CacheSync::Immediate);
    }

    /// Stored metadata of an object.
    pub fn get(&self, kind: GuardedKind, name: &str) -> Option<ObjectMeta> {
        let namespace = kind.is_namespaced().then(|| NAMESPACE.to_string());
        self.objects
            .lock()
            .expect("object lock")
            .get(&(kind, namespace, name.to_string()))
            .cloned()
    }

    /// Current `confirmed-by` annotation of an object.
    pub fn confirmed_by(&self, kind: GuardedKind, name: &str) -> Option<String> {
        self.get(kind, name)
            .and_then(|meta| meta.annotations)
            .and_then(|a| a.get(deletion_guard::guard::annotations::CONFIRMED_BY).cloned())
    }

    /// Delete a single object through the validating phase.
    pub async fn delete(&self, kind: GuardedKind, name: &str, user: &str) -> Result<()> {
        let namespace = kind.is_namespaced().then_some(NAMESPACE);
        let attrs = AdmissionAttributes::delete(kind, namespace, name, UserIdentity::new(user));
        self.guard.validate(&attrs).await
    }

    /// Delete every object of `kind` in the namespace through the validating phase.
    pub async fn delete_collection(&self, kind: GuardedKind, user: &str) -> Result<()> {
        self.delete(kind, "", user).await
    }

    fn persist(&self, kind: GuardedKind, meta: ObjectMeta, sync: CacheSync) {
        let object = GuardedObject {
            kind,
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
            annotations: meta.annotations.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
        };
        let key = (kind, object.namespace.clone(), object.name.clone());
        self.objects.lock().expect("object lock").insert(key, meta);

        let resolver = self.resolver(kind);
        match sync {
            CacheSync::Immediate => resolver.insert(object),
            CacheSync::Lagging => resolver.insert_live(object),
        }
    }
}

fn kind_key(kind: GuardedKind) -> &'static str {
    match kind {
        GuardedKind::Shoot => "shoots",
        GuardedKind::Project => "projects",
        GuardedKind::ShootState => "shootstates",
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn attributes(
    operation: Operation,
    kind: GuardedKind,
    namespace: Option<&str>,
    name: &str,
    user: &str,
) -> AdmissionAttributes {
    AdmissionAttributes {
        operation,
        kind: Some(kind),
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
        subresource: None,
        user: UserIdentity::new(user),
        dry_run: false,
    }
}
