//! Kind-agnostic view of a guarded object.

use std::collections::BTreeMap;

use kube::Resource;

use super::kind::GuardedKind;

/// The parts of a guarded object the decision logic reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardedObject {
    pub kind: GuardedKind,
    /// `None` for cluster-scoped kinds.
    pub namespace: Option<String>,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl GuardedObject {
    /// Snapshot the metadata of a typed resource.
    pub fn from_resource<K: Resource>(kind: GuardedKind, resource: &K) -> Self {
        let meta = resource.meta();
        Self {
            kind,
            namespace: meta.namespace.clone().filter(|ns| !ns.is_empty()),
            name: meta.name.clone().unwrap_or_default(),
            annotations: meta.annotations.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }

    /// Create an object without annotations or labels.
    pub fn new(kind: GuardedKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Value of an annotation, if set.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}
