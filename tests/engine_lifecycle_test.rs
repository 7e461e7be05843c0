//! End-to-end lifecycle tests: creation seeds the audit trail, status
//! transitions are validated and audited, and every write advances the
//! version by exactly 1.

mod common;

use common::{harness, lenient_harness, order_table, Order};
use entity_engine::{
    EngineError, EntityId, Session, SessionHandle, StatusUpdate, Transition, TransitionTable,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_create_seeds_audit_trail() {
    let h = harness(order_table());
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), Some("user-1"), None)
        .await
        .unwrap();

    // Insert at version 0, then the guarded initial status write.
    assert_eq!(order.version, 1);
    assert_eq!(order.status, "pending");
    assert_eq!(order.audit_trail.len(), 1);

    let entry = &order.audit_trail[0];
    assert_eq!(entry.status, "pending");
    assert_eq!(entry.description, "Order created");
    assert_eq!(entry.user.as_deref(), Some("user-1"));
    assert_eq!(entry.iterations, 0);
}

#[tokio::test]
async fn test_create_rejects_preversioned_entities() {
    let h = harness(order_table());
    let mut order = Order::new("acme", 500, "pending");
    order.version = 3;

    let err = h.engine.create(order, None, None).await.unwrap_err();
    assert!(matches!(err, EngineError::DocumentValidation { .. }));
}

#[tokio::test]
async fn test_duplicate_create_is_conflict() {
    let h = harness(order_table());
    let order = Order::new("acme", 500, "pending");

    h.engine.create(order.clone(), None, None).await.unwrap();
    let err = h.engine.create(order, None, None).await.unwrap_err();
    assert_eq!(err, EngineError::conflict("Order"));
}

#[tokio::test]
async fn test_update_status_appends_entry_and_bumps_version() {
    let h = harness(order_table());
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();

    let updated = h
        .engine
        .update_status(order.id, StatusUpdate::new("active"), None)
        .await
        .unwrap();

    assert_eq!(updated.status, "active");
    assert_eq!(updated.version, 2);
    assert_eq!(updated.audit_trail.len(), 2);
    // The transition table's description template applies when the caller
    // supplies none.
    assert_eq!(updated.audit_trail[1].description, "Order activated");
    assert_eq!(updated.audit_trail.last().unwrap().status, updated.status);
}

#[tokio::test]
async fn test_strict_mode_rejects_unlisted_transition() {
    let h = harness(order_table());
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();

    let err = h
        .engine
        .update_status(order.id, StatusUpdate::new("shipped"), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidTransition {
            from: "pending".into(),
            to: "shipped".into()
        }
    );

    // Rejection leaves the entity untouched.
    let reread = h.engine.find_one(order.id, None).await.unwrap();
    assert_eq!(reread, order);
}

#[tokio::test]
async fn test_terminal_status_rejects_everything() {
    let h = harness(order_table());
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();

    h.engine
        .update_status(order.id, StatusUpdate::new("active"), None)
        .await
        .unwrap();
    h.engine
        .update_status(order.id, StatusUpdate::new("shipped"), None)
        .await
        .unwrap();

    let err = h
        .engine
        .update_status(order.id, StatusUpdate::new("pending"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FinalStateTransition { .. }));
}

#[tokio::test]
async fn test_lenient_mode_accepts_any_status() {
    let h = lenient_harness();
    let order = h
        .engine
        .create(Order::new("acme", 500, "draft"), None, None)
        .await
        .unwrap();

    for (n, status) in ["anything", "whatever", "done"].iter().enumerate() {
        let updated = h
            .engine
            .update_status(order.id, StatusUpdate::new(*status), None)
            .await
            .unwrap();
        assert_eq!(updated.status, *status);
        // Audit completeness: creation entry plus one per explicit update.
        assert_eq!(updated.audit_trail.len(), n + 2);
        assert_eq!(updated.version, n as i64 + 2);
        assert_eq!(updated.audit_trail.last().unwrap().status, updated.status);
    }
}

#[tokio::test]
async fn test_not_found_surfaces() {
    let h = harness(order_table());
    let missing = EntityId::new();

    assert_eq!(
        h.engine.find_one(missing, None).await.unwrap_err(),
        EngineError::not_found("Order")
    );
    assert_eq!(
        h.engine
            .update_status(missing, StatusUpdate::new("active"), None)
            .await
            .unwrap_err(),
        EngineError::not_found("Order")
    );
}

#[tokio::test]
async fn test_effect_runs_with_updated_entity() {
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen_in_effect = Arc::clone(&seen);

    let table = TransitionTable::new()
        .allow(
            "pending",
            Transition::to("active").with_effect(move |order: Order, _session: Session| {
                let seen = Arc::clone(&seen_in_effect);
                async move {
                    *seen.lock() = Some(format!("{}@{}", order.status, order.version));
                    Ok(())
                }
            }),
        )
        .terminal("active");

    let h = harness(table);
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();
    h.engine
        .update_status(order.id, StatusUpdate::new("active"), None)
        .await
        .unwrap();

    // The effect observed the post-write entity, inside the transaction.
    assert_eq!(seen.lock().as_deref(), Some("active@2"));
}

#[tokio::test]
async fn test_effect_failure_rolls_back_transition() {
    let table = TransitionTable::new()
        .allow(
            "pending",
            Transition::to("active").with_effect(|_order: Order, _session: Session| async {
                Err(EngineError::internal("effect exploded"))
            }),
        )
        .terminal("active");

    let h = harness(table);
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();

    let err = h
        .engine
        .update_status(order.id, StatusUpdate::new("active"), None)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::internal("effect exploded"));

    // The status/audit write of the same call was rolled back.
    let reread = h.engine.find_one(order.id, None).await.unwrap();
    assert_eq!(reread.status, "pending");
    assert_eq!(reread.version, 1);
    assert_eq!(reread.audit_trail.len(), 1);
}

#[tokio::test]
async fn test_force_update_patches_and_bumps_version() {
    let h = harness(order_table());
    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();

    let updated = h
        .engine
        .force_update(order.id, json!({ "customer": "globex" }), None, false)
        .await
        .unwrap();
    assert_eq!(updated.customer, "globex");
    assert_eq!(updated.version, 2);

    // Skipping the version check performs an unguarded write: no bump.
    let corrected = h
        .engine
        .force_update(order.id, json!({ "total_cents": 750 }), None, true)
        .await
        .unwrap();
    assert_eq!(corrected.total_cents, 750);
    assert_eq!(corrected.version, 2);
}

#[tokio::test]
async fn test_caller_level_transaction_composes_operations() {
    let h = harness(order_table());

    let session = h.engine.coordinator().start_session().await.unwrap();
    session.start_transaction().await.unwrap();

    let order = h
        .engine
        .create(
            Order::new("acme", 500, "pending"),
            None,
            Some(Arc::clone(&session)),
        )
        .await
        .unwrap();
    h.engine
        .update_status(
            order.id,
            StatusUpdate::new("active"),
            Some(Arc::clone(&session)),
        )
        .await
        .unwrap();

    // Nothing is visible before the owner commits.
    assert!(h.store.is_empty());
    session.commit_transaction().await.unwrap();
    session.end_session().await.unwrap();

    let reread = h.engine.find_one(order.id, None).await.unwrap();
    assert_eq!(reread.status, "active");
    assert_eq!(reread.audit_trail.len(), 2);
}

#[tokio::test]
async fn test_caller_abort_discards_composed_operations() {
    let h = harness(order_table());

    let session = h.engine.coordinator().start_session().await.unwrap();
    session.start_transaction().await.unwrap();
    let order = h
        .engine
        .create(
            Order::new("acme", 500, "pending"),
            None,
            Some(Arc::clone(&session)),
        )
        .await
        .unwrap();
    session.abort_transaction().await.unwrap();
    session.end_session().await.unwrap();

    assert_eq!(
        h.engine.find_one(order.id, None).await.unwrap_err(),
        EngineError::not_found("Order")
    );
}

/// The end-to-end scenario from the engine's contract: pending entity,
/// activation, then a rejected transition out of the terminal state.
#[tokio::test]
async fn test_pending_active_terminal_scenario() {
    let table = TransitionTable::new()
        .allow("pending", Transition::to("active"))
        .terminal("active");
    let h = harness(table);

    let order = h
        .engine
        .create(Order::new("acme", 500, "pending"), None, None)
        .await
        .unwrap();
    assert_eq!(order.audit_trail.len(), 1);
    assert_eq!(order.audit_trail[0].status, "pending");

    let active = h
        .engine
        .update_status(order.id, StatusUpdate::new("active"), None)
        .await
        .unwrap();
    assert_eq!(active.status, "active");
    assert_eq!(active.version, 2);

    let err = h
        .engine
        .update_status(order.id, StatusUpdate::new("pending"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FinalStateTransition { .. }));

    let reread = h.engine.find_one(order.id, None).await.unwrap();
    assert_eq!(reread, active);
}
