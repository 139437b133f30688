//! ShootState Custom Resource Definition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ShootState holds the persisted control plane state of a shoot so it can
/// be restored during a control plane migration.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "ShootState",
    plural = "shootstates",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ShootStateSpec {
    /// State data owned by gardenlet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gardener: Vec<GardenerResourceData>,
}

/// A single named blob of gardenlet state.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GardenerResourceData {
    /// Name of the state entry.
    pub name: String,

    /// Type of the state entry (e.g. `secret`).
    #[serde(rename = "type")]
    pub type_: String,

    /// Raw payload.
    #[serde(default)]
    pub data: serde_json::Value,
}
