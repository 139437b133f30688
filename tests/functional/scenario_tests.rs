//! Multi-step scenarios across both admission phases.

use std::sync::Arc;

use deletion_guard::guard::annotations::{CONFIRMATION_DELETION, CONFIRMED_BY, SHOOT_IGNORE};
use deletion_guard::guard::memory::{MemoryProjects, MemoryResolver};
use deletion_guard::guard::{Error, ReadinessGate, TrackerOutcome};
use deletion_guard::{DeletionGuard, GuardedKind};

use crate::common::fixtures::{ProjectBuilder, ShootBuilder, default_project, delete_shoot};
use crate::mock_cluster::{CacheSync, MockCluster};

// ============================================================================
// Walkthrough on a single shoot
// ============================================================================

/// Walk one shoot through every denial and back to an allowed delete.
#[tokio::test]
async fn test_dummy_shoot_walkthrough() {
    let projects = Arc::new(MemoryProjects::new());
    projects.upsert(default_project());
    let shoots = Arc::new(MemoryResolver::new(GuardedKind::Shoot));
    let guard = Arc::new(
        DeletionGuard::new(projects.clone(), ReadinessGate::ready()).with_resolver(shoots.clone()),
    );
    let delete = delete_shoot("dummy", "alice");

    // No annotations: denied, message names the confirmation annotation
    shoots.insert(ShootBuilder::new("dummy").object());
    let err = guard.validate(&delete).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(err.to_string().contains(CONFIRMATION_DELETION));

    // Confirmed: allowed
    shoots.insert(ShootBuilder::new("dummy").confirmed().object());
    guard.validate(&delete).await.unwrap();

    // Ignored: denied with a distinct message
    shoots.insert(ShootBuilder::new("dummy").confirmed().ignored().object());
    let err = guard.validate(&delete).await.unwrap_err();
    assert!(err.to_string().contains(SHOOT_IGNORE));
    assert!(!err.to_string().contains("annotation is not set"));

    // Dual approval, confirmed by the deleter: denied
    projects.upsert(
        ProjectBuilder::new("dummy")
            .namespace("dummy")
            .dual_approval("shoots")
            .build(),
    );
    shoots.insert(
        ShootBuilder::new("dummy")
            .confirmed()
            .confirmed_by("alice")
            .object(),
    );
    let err = guard.validate(&delete).await.unwrap_err();
    assert!(
        err.to_string()
            .contains("another subject must perform the deletion")
    );

    // Confirmed by someone else: allowed
    shoots.insert(
        ShootBuilder::new("dummy")
            .confirmed()
            .confirmed_by("bob")
            .object(),
    );
    guard.validate(&delete).await.unwrap();
}

// ============================================================================
// Confirmation lifecycle through the mutating phase
// ============================================================================

/// Confirming stamps the user, a second subject may delete.
#[tokio::test]
async fn test_confirm_then_delete_by_other_subject() {
    let cluster = MockCluster::new(
        ProjectBuilder::new("dummy")
            .namespace("dummy")
            .dual_approval("shoots")
            .build(),
    );
    cluster.create(GuardedKind::Shoot, "dev", &[], "alice");

    let outcome = cluster.update(
        GuardedKind::Shoot,
        "dev",
        &[(CONFIRMATION_DELETION, "true")],
        "alice",
        CacheSync::Immediate,
    );
    assert_eq!(outcome, Some(TrackerOutcome::Set));
    assert_eq!(
        cluster.confirmed_by(GuardedKind::Shoot, "dev").as_deref(),
        Some("alice")
    );

    let err = cluster
        .delete(GuardedKind::Shoot, "dev", "alice")
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    cluster
        .delete(GuardedKind::Shoot, "dev", "bob")
        .await
        .unwrap();
}

/// Re-confirming by another subject does not change who confirmed.
#[tokio::test]
async fn test_reconfirm_keeps_original_confirmer() {
    let cluster = MockCluster::new(default_project());
    cluster.create(
        GuardedKind::Shoot,
        "dev",
        &[(CONFIRMATION_DELETION, "true")],
        "alice",
    );

    let outcome = cluster.update(
        GuardedKind::Shoot,
        "dev",
        &[(CONFIRMATION_DELETION, "true"), (CONFIRMED_BY, "mallory")],
        "mallory",
        CacheSync::Immediate,
    );
    assert_eq!(outcome, Some(TrackerOutcome::Preserved));
    assert_eq!(
        cluster.confirmed_by(GuardedKind::Shoot, "dev").as_deref(),
        Some("alice")
    );
}

/// Withdrawing the confirmation clears the identity and blocks deletion again.
#[tokio::test]
async fn test_unconfirm_clears_identity() {
    let cluster = MockCluster::new(default_project());
    cluster.create(
        GuardedKind::Shoot,
        "dev",
        &[(CONFIRMATION_DELETION, "true")],
        "alice",
    );
    cluster
        .delete(GuardedKind::Shoot, "dev", "bob")
        .await
        .unwrap();

    let outcome = cluster.update(
        GuardedKind::Shoot,
        "dev",
        &[(CONFIRMATION_DELETION, "false"), (CONFIRMED_BY, "alice")],
        "alice",
        CacheSync::Immediate,
    );
    assert_eq!(outcome, Some(TrackerOutcome::Removed));
    assert_eq!(cluster.confirmed_by(GuardedKind::Shoot, "dev"), None);

    let err = cluster
        .delete(GuardedKind::Shoot, "dev", "bob")
        .await
        .unwrap_err();
    assert!(err.to_string().contains(CONFIRMATION_DELETION));
}

// ============================================================================
// Kinds
// ============================================================================

/// Every guarded kind requires confirmation.
#[tokio::test]
async fn test_every_kind_requires_confirmation() {
    let cluster = MockCluster::new(default_project());
    for kind in GuardedKind::ALL {
        cluster.create(kind, "unconfirmed", &[], "alice");
        let err = cluster
            .delete(kind, "unconfirmed", "bob")
            .await
            .unwrap_err();
        assert!(err.is_forbidden(), "{kind} deletion should be forbidden");
        assert!(err.to_string().starts_with(&kind.qualified_resource()));

        cluster.create(
            kind,
            "confirmed",
            &[(CONFIRMATION_DELETION, "true")],
            "alice",
        );
        cluster.delete(kind, "confirmed", "bob").await.unwrap();
    }
}

/// The ignore annotation only blocks shoots.
#[tokio::test]
async fn test_ignore_annotation_only_applies_to_shoots() {
    let cluster = MockCluster::new(default_project());
    let annotations = [(CONFIRMATION_DELETION, "true"), (SHOOT_IGNORE, "true")];

    cluster.create(GuardedKind::Shoot, "ignored", &annotations, "alice");
    let err = cluster
        .delete(GuardedKind::Shoot, "ignored", "bob")
        .await
        .unwrap_err();
    assert!(err.to_string().contains(SHOOT_IGNORE));

    cluster.create(GuardedKind::ShootState, "ignored", &annotations, "alice");
    cluster
        .delete(GuardedKind::ShootState, "ignored", "bob")
        .await
        .unwrap();
}

/// A delete of an object that exists nowhere reports NotFound.
#[tokio::test]
async fn test_delete_missing_object_is_not_found() {
    let cluster = MockCluster::new(default_project());
    let err = cluster
        .delete(GuardedKind::Shoot, "ghost", "alice")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(err.reason(), "NotFound");
}

/// Non-boolean confirmation values do not count as confirmed.
#[tokio::test]
async fn test_unparseable_confirmation_is_denied() {
    let cluster = MockCluster::new(default_project());
    for (i, value) in ["yes", "", "TrUe", "2"].into_iter().enumerate() {
        let name = format!("shoot-{i}");
        cluster.create(
            GuardedKind::Shoot,
            &name,
            &[(CONFIRMATION_DELETION, value)],
            "alice",
        );
        assert_eq!(cluster.confirmed_by(GuardedKind::Shoot, &name), None);
        let err = cluster
            .delete(GuardedKind::Shoot, &name, "bob")
            .await
            .unwrap_err();
        assert!(err.is_forbidden(), "value {value:?} should not confirm");
    }
}
