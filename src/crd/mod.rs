//! Custom Resource Definitions for the guarded Gardener kinds.
//!
//! Only the fields the deletion guard reads are modelled; unknown fields are
//! ignored on deserialization so live objects from a real garden cluster
//! decode cleanly.
//!
//! - `Shoot`: Kubernetes cluster managed by Gardener (namespaced)
//! - `ShootState`: persisted state snapshot of a shoot (namespaced)
//! - `Project`: tenant boundary owning one namespace and its deletion policy (cluster-scoped)

mod project;
mod shoot;
mod shoot_state;

pub use project::*;
pub use shoot::*;
pub use shoot_state::*;

/// API group shared by every guarded kind.
pub const GARDENER_CORE_GROUP: &str = "core.gardener.cloud";
