mod common;

use stockline_core::reconciliation::correction_reason;
use stockline_core::{
    AdjustRequest, ContingencyKind, CoreError, ReconciliationScope, ReconciliationState,
};
use stockline_db::DbError;

use common::TestDb;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn close_writes_one_correction_per_difference() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", Some("bebidas")).await;
    let b = t.product("SKU-B", Some("bebidas")).await;
    t.stock(&a.id, "L1", 10).await;
    t.stock(&b.id, "L1", 4).await;

    let workflow = t.db.reconciliation();
    let session = workflow
        .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
        .await
        .unwrap();
    workflow.record_count(&session.id, &a.id, 7).await.unwrap();
    workflow.record_count(&session.id, &b.id, 4).await.unwrap();

    let report = workflow.close(&session.id, "auditor").await.unwrap();
    assert!(report.is_resolved());
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].product_id, a.id);
    assert_eq!(report.applied[0].delta, -3);

    assert_eq!(t.quantity(&a.id, "L1").await, 7);
    assert_eq!(t.quantity(&b.id, "L1").await, 4);

    let corrections = t
        .db
        .movements()
        .list_by_reason(&correction_reason(&session.id))
        .await
        .unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].quantity, 3);

    let line = report.session.line(&a.id).unwrap();
    assert_eq!(line.applied_movement_id.as_deref(), Some(corrections[0].id.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_share_one_session() {
    let t = TestDb::new().await;
    t.product("SKU-A", None).await;

    let mut tasks = Vec::new();
    for i in 0..6 {
        let workflow = t.db.reconciliation();
        tasks.push(tokio::spawn(async move {
            workflow
                .open(ReconciliationScope::general("L1"), &format!("auditor-{}", i))
                .await
                .unwrap()
                .id
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all opens returned the same session");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_correction_keeps_session_open_until_retried() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", None).await;
    t.stock(&a.id, "L1", 10).await;

    let workflow = t.db.reconciliation();
    let session = workflow
        .open(ReconciliationScope::general("L1"), "auditor")
        .await
        .unwrap();
    workflow.record_count(&session.id, &a.id, 2).await.unwrap();

    // Sales after the snapshot leave too little stock for the -8 correction.
    t.db.ledger()
        .adjust(AdjustRequest::new(&a.id, "L1", -5, "sale", "pos"))
        .await
        .unwrap();

    let report = workflow.close(&session.id, "auditor").await.unwrap();
    assert!(!report.is_resolved());
    assert_eq!(report.session.state, ReconciliationState::EnProceso);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].difference, -8);
    assert_eq!(t.quantity(&a.id, "L1").await, 5);

    t.db.ledger()
        .adjust(AdjustRequest::new(&a.id, "L1", 10, "delivery", "dock"))
        .await
        .unwrap();

    let retried = workflow.close(&session.id, "auditor").await.unwrap();
    assert!(retried.is_resolved());
    assert_eq!(retried.applied.len(), 1);
    assert_eq!(t.quantity(&a.id, "L1").await, 7);

    let again = workflow.close(&session.id, "auditor").await.unwrap_err();
    assert!(matches!(again, DbError::Domain(CoreError::SessionClosed { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn general_contingency_leaves_category_scopes_open() {
    let t = TestDb::new().await;
    t.product("SKU-A", Some("bebidas")).await;

    t.db.contingencies()
        .insert(
            &ReconciliationScope::general("L1"),
            ContingencyKind::ConciliacionGeneral,
            "location-wide shrinkage",
        )
        .await
        .unwrap();
    t.db.contingencies()
        .insert(
            &ReconciliationScope::category("L1", "bebidas"),
            ContingencyKind::Otro,
            "damaged shelf",
        )
        .await
        .unwrap();

    let workflow = t.db.reconciliation();
    let err = workflow
        .open(ReconciliationScope::general("L1"), "auditor")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::ScopeBlocked { .. })));

    let scoped = workflow
        .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
        .await
        .unwrap();
    assert_eq!(scoped.state, ReconciliationState::Pendiente);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contingency_raised_mid_session_stops_counting() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", Some("bebidas")).await;
    let scope = ReconciliationScope::category("L1", "bebidas");

    let workflow = t.db.reconciliation();
    let session = workflow.open(scope.clone(), "auditor").await.unwrap();

    t.db.contingencies()
        .insert(&scope, ContingencyKind::Conciliacion, "recount requested")
        .await
        .unwrap();

    let err = workflow.record_count(&session.id, &a.id, 1).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::ScopeBlocked { .. })));

    let blocked = workflow.block(&session.id).await.unwrap();
    assert_eq!(blocked.state, ReconciliationState::Bloqueada);
    assert!(blocked.closed_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recount_racing_close_never_resolves_unsettled_lines() {
    let t = TestDb::new().await;
    let workflow = t.db.reconciliation();

    for round in 0..12 {
        let category = format!("round-{}", round);
        let product = t.product(&format!("SKU-{}", round), Some(&category)).await;
        t.stock(&product.id, "L1", 10).await;

        let session = workflow
            .open(ReconciliationScope::category("L1", &category), "auditor")
            .await
            .unwrap();
        workflow.record_count(&session.id, &product.id, 10).await.unwrap();

        let closer = t.db.reconciliation();
        let counter = t.db.reconciliation();
        let (sid_a, sid_b, pid) = (session.id.clone(), session.id.clone(), product.id.clone());
        let close = tokio::spawn(async move { closer.close(&sid_a, "auditor").await });
        let recount = tokio::spawn(async move { counter.record_count(&sid_b, &pid, 4).await });
        let report = close.await.unwrap().unwrap();
        let _ = recount.await.unwrap();

        let stored = workflow.get(&session.id).await.unwrap().unwrap();
        let line = stored.line(&product.id).unwrap();
        if stored.state == ReconciliationState::Resuelta {
            assert!(
                line.difference == Some(0) || line.applied_movement_id.is_some(),
                "resolved with an unapplied difference in round {}",
                round
            );
            let expected = line.physical_quantity.unwrap();
            assert_eq!(t.quantity(&product.id, "L1").await, expected);
        } else {
            assert!(!report.is_resolved());
            assert_eq!(line.difference, Some(-6));
            assert!(line.applied_movement_id.is_none());

            let retried = workflow.close(&session.id, "auditor").await.unwrap();
            assert!(retried.is_resolved());
            assert_eq!(t.quantity(&product.id, "L1").await, 4);
        }
    }
}
