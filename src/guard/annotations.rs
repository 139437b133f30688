//! Annotation keys and the confirmation primitive shared by the mutating
//! and validating phases.

use std::collections::BTreeMap;

use super::error::Denial;

/// Set by a user to declare the intent to delete a resource.
pub const CONFIRMATION_DELETION: &str = "confirmation.gardener.cloud/deletion";

/// Identity of the subject that confirmed the deletion. Maintained by the
/// mutating phase only.
pub const CONFIRMED_BY: &str = "deletion.gardener.cloud/confirmed-by";

/// Shoots carrying this annotation are skipped by gardenlet and must not be deleted.
pub const SHOOT_IGNORE: &str = "shoot.gardener.cloud/ignore";

/// Username prefix of Kubernetes service accounts.
pub const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Parse a boolean the way Go's `strconv.ParseBool` does.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Whether `key` is present and parses as `true`.
pub fn has_true_annotation(annotations: &BTreeMap<String, String>, key: &str) -> bool {
    annotations
        .get(key)
        .and_then(|value| parse_bool(value))
        .unwrap_or(false)
}

/// Whether the deletion confirmation annotation is set to a truthy value.
pub fn is_deletion_confirmed(annotations: &BTreeMap<String, String>) -> bool {
    has_true_annotation(annotations, CONFIRMATION_DELETION)
}

/// Fail with [`Denial::NotConfirmed`] unless the deletion is confirmed.
pub fn check_deletion_confirmed(annotations: &BTreeMap<String, String>) -> Result<(), Denial> {
    if is_deletion_confirmed(annotations) {
        Ok(())
    } else {
        Err(Denial::NotConfirmed)
    }
}

/// Whether the username belongs to a service account.
pub fn is_service_account(username: &str) -> bool {
    username.starts_with(SERVICE_ACCOUNT_PREFIX)
}
