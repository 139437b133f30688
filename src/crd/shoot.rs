//! Shoot Custom Resource Definition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Shoot is a Kubernetes cluster created and managed by Gardener.
///
/// Example:
/// ```yaml
/// apiVersion: core.gardener.cloud/v1beta1
/// kind: Shoot
/// metadata:
///   name: dev
///   namespace: garden-dev
///   annotations:
///     confirmation.gardener.cloud/deletion: "true"
/// spec:
///   cloudProfileName: aws
///   region: eu-west-1
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Name of the cloud profile the shoot is provisioned from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_profile_name: Option<String>,

    /// Region the shoot runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Purpose of the cluster (evaluation, testing, development, production).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}
