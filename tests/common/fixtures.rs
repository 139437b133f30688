//! Test fixtures and builder patterns for guarded resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use deletion_guard::crd::{DualApprovalForDeletion, Project, ProjectSpec, Shoot, ShootSpec};
use deletion_guard::guard::annotations::{CONFIRMATION_DELETION, CONFIRMED_BY, SHOOT_IGNORE};
use deletion_guard::guard::memory::{MemoryProjects, MemoryResolver};
use deletion_guard::guard::{GuardedObject, ReadinessGate};
use deletion_guard::{AdmissionAttributes, DeletionGuard, GuardedKind, UserIdentity};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Namespace used by most fixtures.
pub const NAMESPACE: &str = "dummy";

/// Builder for creating Project test fixtures.
///
/// # Example
/// ```
/// let project = ProjectBuilder::new("dev")
///     .namespace("garden-dev")
///     .dual_approval("shoots")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ProjectBuilder {
    name: String,
    namespace: Option<String>,
    rules: Vec<DualApprovalForDeletion>,
}

impl ProjectBuilder {
    /// Create a new builder with the given project name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            rules: Vec::new(),
        }
    }

    /// Set the namespace owned by the project.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Require dual approval for every object of `resource`.
    pub fn dual_approval(self, resource: &str) -> Self {
        self.dual_approval_rule(resource, &[], None)
    }

    /// Require dual approval for objects of `resource` matching `labels`.
    pub fn dual_approval_rule(
        mut self,
        resource: &str,
        labels: &[(&str, &str)],
        include_service_accounts: Option<bool>,
    ) -> Self {
        let match_labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.rules.push(DualApprovalForDeletion {
            resource: resource.to_string(),
            selector: LabelSelector {
                match_labels: (!match_labels.is_empty()).then_some(match_labels),
                ..Default::default()
            },
            include_service_accounts,
        });
        self
    }

    /// Build the Project.
    pub fn build(self) -> Project {
        let mut project = Project::new(
            &self.name,
            ProjectSpec {
                namespace: self.namespace,
                dual_approval_for_deletion: self.rules,
                ..Default::default()
            },
        );
        project.metadata.uid = Some(format!("test-uid-{}", self.name));
        project
    }
}

/// Builder for creating Shoot test fixtures.
#[derive(Clone, Debug)]
pub struct ShootBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl ShootBuilder {
    /// Create a new builder for a shoot in [`NAMESPACE`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: NAMESPACE.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Set the namespace for the shoot.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Add a label to the shoot.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation to the shoot.
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Confirm the deletion.
    pub fn confirmed(self) -> Self {
        self.annotation(CONFIRMATION_DELETION, "true")
    }

    /// Record who confirmed the deletion.
    pub fn confirmed_by(self, user: &str) -> Self {
        self.annotation(CONFIRMED_BY, user)
    }

    /// Set the ignore annotation.
    pub fn ignored(self) -> Self {
        self.annotation(SHOOT_IGNORE, "true")
    }

    /// Build the Shoot.
    pub fn build(self) -> Shoot {
        let mut shoot = Shoot::new(&self.name, ShootSpec::default());
        shoot.metadata = ObjectMeta {
            name: Some(self.name),
            namespace: Some(self.namespace),
            labels: (!self.labels.is_empty()).then_some(self.labels),
            annotations: (!self.annotations.is_empty()).then_some(self.annotations),
            ..Default::default()
        };
        shoot
    }

    /// Build the kind-agnostic snapshot the guard works on.
    pub fn object(self) -> GuardedObject {
        GuardedObject::from_resource(GuardedKind::Shoot, &self.build())
    }
}

/// A guard over in-memory resolvers with a single project owning [`NAMESPACE`].
pub fn guard_with(project: Project, resolvers: &[Arc<MemoryResolver>]) -> Arc<DeletionGuard> {
    let projects = MemoryProjects::new();
    projects.upsert(project);
    let mut guard = DeletionGuard::new(Arc::new(projects), ReadinessGate::ready());
    for resolver in resolvers {
        guard = guard.with_resolver(resolver.clone());
    }
    Arc::new(guard)
}

/// A project owning [`NAMESPACE`] without dual-approval rules.
pub fn default_project() -> Project {
    ProjectBuilder::new("dummy").namespace(NAMESPACE).build()
}

/// Attributes for a single-object delete of a shoot in [`NAMESPACE`].
pub fn delete_shoot(name: &str, user: &str) -> AdmissionAttributes {
    AdmissionAttributes::delete(
        GuardedKind::Shoot,
        Some(NAMESPACE),
        name,
        UserIdentity::new(user),
    )
}

/// Attributes for a collection delete of shoots in [`NAMESPACE`].
pub fn delete_all_shoots(user: &str) -> AdmissionAttributes {
    delete_shoot("", user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_builder() {
        let project = ProjectBuilder::new("dev")
            .namespace("garden-dev")
            .dual_approval_rule("shoots", &[("stage", "production")], Some(false))
            .build();
        assert_eq!(project.spec.namespace.as_deref(), Some("garden-dev"));
        assert_eq!(project.dual_approval_rules().len(), 1);
        assert!(!project.dual_approval_rules()[0].includes_service_accounts());
    }

    #[test]
    fn test_shoot_builder_object() {
        let object = ShootBuilder::new("dev")
            .confirmed()
            .confirmed_by("alice")
            .label("stage", "production")
            .object();
        assert_eq!(object.namespace.as_deref(), Some(NAMESPACE));
        assert_eq!(object.annotation(CONFIRMED_BY), Some("alice"));
        assert_eq!(object.labels.get("stage").map(String::as_str), Some("production"));
    }
}
