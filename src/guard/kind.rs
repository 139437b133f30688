//! The resource kinds guarded against unconfirmed deletion.

use std::fmt;

use kube::Resource;

use crate::crd::{GARDENER_CORE_GROUP, Project, Shoot, ShootState};

/// A resource kind subject to deletion confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GuardedKind {
    Shoot,
    Project,
    ShootState,
}

impl GuardedKind {
    /// Every guarded kind.
    pub const ALL: [GuardedKind; 3] = [
        GuardedKind::Shoot,
        GuardedKind::Project,
        GuardedKind::ShootState,
    ];

    /// Resolve an admission request's group/kind. Returns `None` for
    /// anything the guard does not handle.
    pub fn from_group_kind(group: &str, kind: &str) -> Option<Self> {
        if group != GARDENER_CORE_GROUP {
            return None;
        }
        Self::ALL.into_iter().find(|k| k.kind() == kind)
    }

    /// Kind name as used in `TypeMeta`.
    pub fn kind(&self) -> String {
        match self {
            GuardedKind::Shoot => Shoot::kind(&()).into_owned(),
            GuardedKind::Project => Project::kind(&()).into_owned(),
            GuardedKind::ShootState => ShootState::kind(&()).into_owned(),
        }
    }

    /// Plural resource name, as referenced by dual-approval rules.
    pub fn resource(&self) -> String {
        match self {
            GuardedKind::Shoot => Shoot::plural(&()).into_owned(),
            GuardedKind::Project => Project::plural(&()).into_owned(),
            GuardedKind::ShootState => ShootState::plural(&()).into_owned(),
        }
    }

    /// Group-qualified resource name used in API error messages
    /// (e.g. `shoots.core.gardener.cloud`).
    pub fn qualified_resource(&self) -> String {
        format!("{}.{}", self.resource(), GARDENER_CORE_GROUP)
    }

    /// Whether objects of this kind live in a namespace.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, GuardedKind::Project)
    }
}

impl fmt::Display for GuardedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind())
    }
}
