//! Annotation tracker for the mutating phase.
//!
//! Keeps `deletion.gardener.cloud/confirmed-by` in sync with the deletion
//! confirmation on every create and update:
//!
//! | old confirmed | new confirmed | action |
//! |---|---|---|
//! | (create) | true | set to the requesting user |
//! | false | true | set to the requesting user |
//! | true | true | copy the value from the old object |
//! | any | false | remove |

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::annotations::{CONFIRMED_BY, is_deletion_confirmed};

/// What the tracker did to the `confirmed-by` annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// Stamped with the requesting user.
    Set,
    /// Carried over from the old object.
    Preserved,
    /// Removed because the deletion is not confirmed.
    Removed,
    /// Nothing to change.
    Unchanged,
}

impl TrackerOutcome {
    /// Label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerOutcome::Set => "set",
            TrackerOutcome::Preserved => "preserved",
            TrackerOutcome::Removed => "removed",
            TrackerOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for TrackerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronize `confirmed-by` on `new` given the previous state `old`
/// (`None` on create) and the requesting `username`.
pub fn track_confirmation(
    new: &mut ObjectMeta,
    old: Option<&ObjectMeta>,
    username: &str,
) -> TrackerOutcome {
    let confirmed_new = new
        .annotations
        .as_ref()
        .is_some_and(is_deletion_confirmed);

    if !confirmed_new {
        return remove_confirmed_by(new);
    }

    let old_annotations = old.and_then(|o| o.annotations.as_ref());
    let confirmed_old = old_annotations.is_some_and(is_deletion_confirmed);

    if !confirmed_old {
        return set_confirmed_by(new, username.to_string(), TrackerOutcome::Set);
    }

    // Already confirmed before this request: the old value is authoritative,
    // whatever the client sent.
    match old_annotations.and_then(|a| a.get(CONFIRMED_BY)) {
        Some(previous) => set_confirmed_by(new, previous.clone(), TrackerOutcome::Preserved),
        None => remove_confirmed_by(new),
    }
}

fn set_confirmed_by(
    new: &mut ObjectMeta,
    value: String,
    outcome: TrackerOutcome,
) -> TrackerOutcome {
    let annotations = new.annotations.get_or_insert_with(BTreeMap::new);
    if annotations.get(CONFIRMED_BY) == Some(&value) {
        return TrackerOutcome::Unchanged;
    }
    annotations.insert(CONFIRMED_BY.to_string(), value);
    outcome
}

fn remove_confirmed_by(new: &mut ObjectMeta) -> TrackerOutcome {
    match new
        .annotations
        .as_mut()
        .and_then(|annotations| annotations.remove(CONFIRMED_BY))
    {
        Some(_) => TrackerOutcome::Removed,
        None => TrackerOutcome::Unchanged,
    }
}
