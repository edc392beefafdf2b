mod common;

use std::time::Duration;

use stockline_core::{ImportMode, ImportRequest, ImportRow, RowError, RowStatus};
use stockline_db::ImportSettings;

use common::{SteppingStopwatch, TestDb};

fn request(mode: ImportMode, rows: Vec<ImportRow>) -> ImportRequest {
    ImportRequest {
        location_id: "L1".to_string(),
        actor_id: "uploader".to_string(),
        mode,
        rows,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn establecer_is_idempotent() {
    let t = TestDb::new().await;
    let mut rows = Vec::new();
    for i in 0..5 {
        let p = t.product(&format!("SKU-{}", i), None).await;
        if i % 2 == 0 {
            t.stock(&p.id, "L1", 3).await;
        }
        rows.push(ImportRow::new(p.sku.clone(), (i * 10) as i64));
    }

    let first = t
        .db
        .importer()
        .run(request(ImportMode::Establecer, rows.clone()))
        .await
        .unwrap();
    assert_eq!(first.processed, 5);
    assert_eq!(first.errored, 0);

    let second = t
        .db
        .importer()
        .run(request(ImportMode::Establecer, rows))
        .await
        .unwrap();
    assert_eq!(second.processed, 5);
    assert!(second
        .outcomes
        .iter()
        .all(|o| matches!(o.status, RowStatus::Unchanged { .. })));

    for i in 0..5 {
        let product = t
            .db
            .products()
            .get_by_sku(&format!("SKU-{}", i))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.quantity(&product.id, "L1").await, (i * 10) as i64);
        assert!(t.db.ledger().verify_balance(&product.id, "L1").await.unwrap().consistent);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn budget_exhaustion_reports_resume_point() {
    let t = TestDb::new().await;
    let mut rows = Vec::new();
    for i in 0..25 {
        let p = t.product(&format!("SKU-{:02}", i), None).await;
        rows.push(ImportRow::new(p.sku.clone(), 7i64));
    }

    let importer = t.db.importer_with(ImportSettings {
        batch_size: 20,
        budget: Duration::from_secs(25),
        ..ImportSettings::default()
    });

    // First check reads 0s, the second reads 30s: one batch runs.
    let stopwatch = SteppingStopwatch::new(Duration::from_secs(30));
    let report = importer
        .run_with_stopwatch(request(ImportMode::Establecer, rows.clone()), &stopwatch)
        .await
        .unwrap();

    assert!(report.timed_out);
    assert_eq!(report.total_rows, 25);
    assert_eq!(report.processed, 20);
    assert_eq!(report.errored, 0);
    assert_eq!(report.unprocessed_due_to_timeout, 5);
    assert_eq!(report.first_unprocessed_row, Some(20));
    assert_eq!(
        report.processed + report.errored + report.unprocessed_due_to_timeout,
        report.total_rows
    );

    let skipped = t.db.products().get_by_sku("SKU-20").await.unwrap().unwrap();
    assert_eq!(t.quantity(&skipped.id, "L1").await, 0);

    let rest = rows[20..].to_vec();
    let resumed = importer
        .run(request(ImportMode::Establecer, rest))
        .await
        .unwrap();
    assert!(!resumed.timed_out);
    assert_eq!(resumed.processed, 5);
    assert_eq!(t.quantity(&skipped.id, "L1").await, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_rows_build_on_each_other() {
    let t = TestDb::new().await;
    let p = t.product("SKU-1", None).await;

    let report = t
        .db
        .importer_with(ImportSettings {
            batch_size: 2,
            ..ImportSettings::default()
        })
        .run(request(
            ImportMode::Incrementar,
            vec![
                ImportRow::new("SKU-1", 4i64),
                ImportRow::new("SKU-1", 4i64),
                ImportRow::new("SKU-1", "4"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(t.quantity(&p.id, "L1").await, 12);
    assert_eq!(t.db.ledger().history(&p.id, "L1").await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bad_rows_do_not_block_good_rows() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", None).await;
    let b = t.product("SKU-B", None).await;
    t.stock(&b.id, "L1", 2).await;

    let report = t
        .db
        .importer()
        .run(request(
            ImportMode::Decrementar,
            vec![
                ImportRow::new("SKU-A", 1.5_f64.to_string().as_str()),
                ImportRow::new("SKU-B", 5i64),
                ImportRow::new("MISSING", 1i64),
                ImportRow::new("SKU-A", -1i64),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.errored, 3);
    assert!(matches!(
        report.outcomes[0].status,
        RowStatus::Failed {
            error: RowError::InvalidQuantity { .. }
        }
    ));
    assert!(matches!(
        report.outcomes[1].status,
        RowStatus::Applied {
            new_quantity: 0,
            clamped: true,
            shortfall: 3,
            ..
        }
    ));
    assert!(matches!(
        report.outcomes[2].status,
        RowStatus::Failed {
            error: RowError::ProductNotFound { .. }
        }
    ));
    assert_eq!(t.quantity(&a.id, "L1").await, 0);
    assert_eq!(t.quantity(&b.id, "L1").await, 0);
}

async fn exec(t: &TestDb, sql: &str) {
    sqlx::query(sql).execute(t.db.pool()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn row_failing_after_its_update_leaves_no_trace() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", None).await;
    let b = t.product("SKU-B", None).await;
    t.stock(&b.id, "L1", 5).await;

    // The stock UPDATE for B succeeds; its movement insert does not.
    exec(
        &t,
        &format!(
            "CREATE TRIGGER reject_movement_b BEFORE INSERT ON movements \
             WHEN NEW.product_id = '{}' BEGIN SELECT RAISE(ABORT, 'movement rejected'); END",
            b.id
        ),
    )
    .await;

    let report = t
        .db
        .importer()
        .run(request(
            ImportMode::Establecer,
            vec![ImportRow::new("SKU-A", 3i64), ImportRow::new("SKU-B", 9i64)],
        ))
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.errored, 1);
    assert!(matches!(
        report.outcomes[1].status,
        RowStatus::Failed {
            error: RowError::CommitFailed { .. }
        }
    ));

    assert_eq!(t.quantity(&a.id, "L1").await, 3);
    assert_eq!(t.quantity(&b.id, "L1").await, 5);
    let balance = t.db.ledger().verify_balance(&b.id, "L1").await.unwrap();
    assert!(balance.consistent);
    assert_eq!(balance.quantity, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_batch_commit_fails_applied_rows_and_restores_levels() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", None).await;
    let b = t.product("SKU-B", None).await;

    // A movement of exactly 5 for A leaves a deferred foreign key
    // violation behind, which only surfaces at COMMIT.
    exec(&t, "CREATE TABLE commit_guard_parent (id TEXT PRIMARY KEY)").await;
    exec(
        &t,
        "CREATE TABLE commit_guard (parent_id TEXT REFERENCES commit_guard_parent(id) \
         DEFERRABLE INITIALLY DEFERRED)",
    )
    .await;
    exec(
        &t,
        &format!(
            "CREATE TRIGGER fail_commit_a AFTER INSERT ON movements \
             WHEN NEW.product_id = '{}' AND NEW.quantity = 5 \
             BEGIN INSERT INTO commit_guard (parent_id) VALUES ('missing'); END",
            a.id
        ),
    )
    .await;

    let importer = t.db.importer_with(ImportSettings {
        batch_size: 2,
        ..ImportSettings::default()
    });
    let report = importer
        .run(request(
            ImportMode::Establecer,
            vec![
                ImportRow::new("SKU-A", 5i64),
                ImportRow::new("SKU-B", 7i64),
                ImportRow::new("SKU-A", 6i64),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(report.errored, 2);
    assert_eq!(report.processed, 1);
    for outcome in &report.outcomes[..2] {
        assert!(matches!(
            outcome.status,
            RowStatus::Failed {
                error: RowError::CommitFailed { .. }
            }
        ));
    }

    // The second batch plans from the restored level (absent), not from
    // the rolled-back 5.
    assert!(matches!(
        report.outcomes[2].status,
        RowStatus::Applied {
            previous_quantity: 0,
            new_quantity: 6,
            delta: 6,
            ..
        }
    ));
    assert_eq!(t.quantity(&a.id, "L1").await, 6);
    assert_eq!(t.quantity(&b.id, "L1").await, 0);
    assert!(t.db.ledger().history(&b.id, "L1").await.unwrap().is_empty());
    assert!(t.db.ledger().verify_balance(&a.id, "L1").await.unwrap().consistent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn version_conflict_fails_the_row_and_stales_the_product() {
    let t = TestDb::new().await;
    let a = t.product("SKU-A", None).await;
    let b = t.product("SKU-B", None).await;
    t.stock(&a.id, "L1", 10).await;

    // Another writer bumps A's version right after the first import row
    // writes it, so the working copy's version goes stale.
    exec(
        &t,
        &format!(
            "CREATE TRIGGER bump_version_a AFTER INSERT ON movements \
             WHEN NEW.product_id = '{}' \
             BEGIN UPDATE stock_records SET version = version + 5 \
             WHERE product_id = NEW.product_id AND location_id = NEW.location_id; END",
            a.id
        ),
    )
    .await;

    let report = t
        .db
        .importer()
        .run(request(
            ImportMode::Incrementar,
            vec![
                ImportRow::new("SKU-A", 3i64),
                ImportRow::new("SKU-A", 3i64),
                ImportRow::new("SKU-B", 4i64),
                ImportRow::new("SKU-A", 3i64),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.errored, 2);
    assert!(matches!(
        report.outcomes[0].status,
        RowStatus::Applied { new_quantity: 13, .. }
    ));
    for index in [1, 3] {
        assert!(matches!(
            report.outcomes[index].status,
            RowStatus::Failed {
                error: RowError::VersionConflict
            }
        ));
    }
    assert!(matches!(
        report.outcomes[2].status,
        RowStatus::Applied { new_quantity: 4, .. }
    ));

    assert_eq!(t.quantity(&a.id, "L1").await, 13);
    assert_eq!(t.quantity(&b.id, "L1").await, 4);
    assert_eq!(t.db.ledger().history(&a.id, "L1").await.unwrap().len(), 2);
}
