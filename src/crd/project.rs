//! Project Custom Resource Definition.
//!
//! A Project owns exactly one namespace and carries the dual-approval rules
//! that apply to deletions of resources inside it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Project is a cluster-scoped tenant boundary.
///
/// Example:
/// ```yaml
/// apiVersion: core.gardener.cloud/v1beta1
/// kind: Project
/// metadata:
///   name: dev
/// spec:
///   namespace: garden-dev
///   dualApprovalForDeletion:
///   - resource: shoots
///     selector:
///       matchLabels:
///         stage: production
///     includeServiceAccounts: false
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Project",
    plural = "projects"
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Namespace owned by this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rules requiring a second subject to perform a confirmed deletion.
    /// The first rule matching a resource wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dual_approval_for_deletion: Vec<DualApprovalForDeletion>,
}

/// Dual-approval rule for one resource type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DualApprovalForDeletion {
    /// Plural resource name the rule applies to (e.g. `shoots`).
    pub resource: String,

    /// Only objects whose labels match are subject to the rule.
    /// An empty selector matches everything.
    #[serde(default)]
    pub selector: LabelSelector,

    /// Whether service accounts must obey the rule as well (default: true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_service_accounts: Option<bool>,
}

impl DualApprovalForDeletion {
    /// Effective value of `includeServiceAccounts`.
    pub fn includes_service_accounts(&self) -> bool {
        self.include_service_accounts.unwrap_or(true)
    }
}

impl Project {
    /// Dual-approval rules declared on this project, in declaration order.
    pub fn dual_approval_rules(&self) -> &[DualApprovalForDeletion] {
        &self.spec.dual_approval_for_deletion
    }
}
