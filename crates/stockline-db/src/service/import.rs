//! # Bulk Import Orchestrator
//!
//! Applies a parsed spreadsheet of `{identifier, target_quantity}` rows to
//! one location, in batches, under a wall-clock budget.
//!
//! ## Run Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate request (location, actor, row cap)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pre-load: 1 query products by sku/barcode/id                           │
//! │            1 query stock records for (location, resolved products)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each batch of `batch_size` rows:                                   │
//! │    ├─ elapsed >= budget? ──► stop, remaining rows reported unprocessed  │
//! │    ├─ BEGIN                                                             │
//! │    │    per row: resolve → parse → plan (working copy) → CAS + movement │
//! │    ├─ COMMIT ── fails ──► every applied row in the batch: CommitFailed  │
//! │    └─ tally outcomes                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  re-evaluate alerts for every mutated product                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A timed-out run is a partial result, not an error: the report says where
//! to resume (`first_unprocessed_row`).

use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockRepository;
use crate::service::alerts::AlertMonitor;
use stockline_core::import::{
    check_row_count, parse_quantity, plan_row, ImportReport, ImportTally, RowError, RowOutcome,
    RowStatus,
};
use stockline_core::validation::validate_identifier;
use stockline_core::{
    AdjustRequest, ImportRequest, ImportRow, Movement, Product, StockLevel, StockRecord,
    DEFAULT_IMPORT_BATCH_SIZE, DEFAULT_IMPORT_BUDGET_SECS, DEFAULT_IMPORT_DETAIL_LIMIT,
    MAX_IMPORT_ROWS,
};

// =============================================================================
// Settings & Clock
// =============================================================================

/// Tunables for one importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub max_rows: usize,
    pub batch_size: usize,
    pub budget: Duration,
    /// Row outcomes kept in the report; counts stay exact beyond it.
    pub detail_limit: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            max_rows: MAX_IMPORT_ROWS,
            batch_size: DEFAULT_IMPORT_BATCH_SIZE,
            budget: Duration::from_secs(DEFAULT_IMPORT_BUDGET_SECS),
            detail_limit: DEFAULT_IMPORT_DETAIL_LIMIT,
        }
    }
}

/// Elapsed-time source for the budget check.
pub trait Stopwatch: Send + Sync {
    fn elapsed(&self) -> Duration;
}

/// Real monotonic clock started when the run starts.
#[derive(Debug, Clone, Copy)]
pub struct WallClock(Instant);

impl WallClock {
    pub fn start() -> Self {
        WallClock(Instant::now())
    }
}

impl Stopwatch for WallClock {
    fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

// =============================================================================
// Importer
// =============================================================================

/// Bulk import orchestrator.
#[derive(Debug, Clone)]
pub struct BulkImporter {
    pool: SqlitePool,
    settings: ImportSettings,
    products: ProductRepository,
    stock: StockRepository,
    alerts: AlertMonitor,
}

/// Per-run mutable state shared across batches.
#[derive(Debug, Default)]
struct RunState {
    /// Working copy of quantities/versions; reflects committed batches.
    levels: HashMap<String, StockLevel>,
    /// Products whose stored version moved under us; later rows skip them.
    stale: HashSet<String>,
    mutated: HashSet<String>,
}

impl BulkImporter {
    pub fn new(pool: SqlitePool, settings: ImportSettings) -> Self {
        BulkImporter {
            products: ProductRepository::new(pool.clone()),
            stock: StockRepository::new(pool.clone()),
            alerts: AlertMonitor::new(pool.clone()),
            pool,
            settings,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Runs an import against the real clock.
    pub async fn run(&self, request: ImportRequest) -> DbResult<ImportReport> {
        self.run_with_stopwatch(request, &WallClock::start()).await
    }

    /// Runs an import with an injected elapsed-time source.
    ///
    /// ## Errors
    /// Only request-level problems are errors (invalid location / actor,
    /// too many rows, failed pre-load). Row problems land in the report.
    pub async fn run_with_stopwatch(
        &self,
        request: ImportRequest,
        stopwatch: &dyn Stopwatch,
    ) -> DbResult<ImportReport> {
        validate_identifier("location_id", &request.location_id)?;
        validate_identifier("actor_id", &request.actor_id)?;
        check_row_count(request.rows.len(), self.settings.max_rows)?;

        if request.rows.is_empty() {
            return Ok(ImportReport::empty());
        }

        info!(
            location_id = %request.location_id,
            mode = %request.mode,
            rows = request.rows.len(),
            "Starting bulk import"
        );

        let resolved = self.resolve_products(&request.rows).await?;
        let mut state = self.preload_levels(&request.location_id, &resolved).await?;

        let mut tally = ImportTally::new(request.rows.len(), self.settings.detail_limit);
        let batch_size = self.settings.batch_size.max(1);
        let mut first_unprocessed = None;

        for (batch_index, batch) in request.rows.chunks(batch_size).enumerate() {
            let start = batch_index * batch_size;

            if stopwatch.elapsed() >= self.settings.budget {
                warn!(
                    location_id = %request.location_id,
                    first_unprocessed_row = start,
                    remaining = request.rows.len() - start,
                    "Import budget exhausted"
                );
                first_unprocessed = Some(start);
                break;
            }

            let outcomes = self
                .run_batch(&request, start, batch, &resolved, &mut state)
                .await;
            for outcome in outcomes {
                tally.record(outcome);
            }
        }

        for product_id in &state.mutated {
            if let Err(err) = self.alerts.reevaluate(product_id, &request.location_id).await {
                warn!(
                    product_id = %product_id,
                    location_id = %request.location_id,
                    error = %err,
                    "Alert refresh failed after import"
                );
            }
        }

        let report = tally.finish(first_unprocessed, stopwatch.elapsed());
        info!(
            location_id = %request.location_id,
            processed = report.processed,
            errored = report.errored,
            unprocessed = report.unprocessed_due_to_timeout,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed_ms,
            "Bulk import finished"
        );
        Ok(report)
    }

    /// Maps each distinct identifier to its product: sku, then barcode, then id.
    async fn resolve_products(&self, rows: &[ImportRow]) -> DbResult<HashMap<String, Product>> {
        let mut identifiers: Vec<String> = rows
            .iter()
            .map(|row| row.identifier.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        identifiers.sort();
        identifiers.dedup();

        let products = self.products.find_by_identifiers(&identifiers).await?;

        let mut resolved = HashMap::with_capacity(identifiers.len());
        for identifier in identifiers {
            let hit = products
                .iter()
                .find(|p| p.sku == identifier)
                .or_else(|| {
                    products
                        .iter()
                        .find(|p| p.barcode.as_deref() == Some(identifier.as_str()))
                })
                .or_else(|| products.iter().find(|p| p.id == identifier));

            if let Some(product) = hit {
                resolved.insert(identifier, product.clone());
            }
        }

        debug!(resolved = resolved.len(), "Import identifiers resolved");
        Ok(resolved)
    }

    async fn preload_levels(
        &self,
        location_id: &str,
        resolved: &HashMap<String, Product>,
    ) -> DbResult<RunState> {
        let mut product_ids: Vec<String> = resolved.values().map(|p| p.id.clone()).collect();
        product_ids.sort();
        product_ids.dedup();

        let records = self
            .stock
            .list_for_products(location_id, &product_ids)
            .await?;

        let levels = records
            .iter()
            .map(|record| (record.product_id.clone(), StockLevel::from(record)))
            .collect();

        Ok(RunState {
            levels,
            ..RunState::default()
        })
    }

    /// Runs one batch in one transaction and returns its settled outcomes.
    async fn run_batch(
        &self,
        request: &ImportRequest,
        start: usize,
        rows: &[ImportRow],
        resolved: &HashMap<String, Product>,
        state: &mut RunState,
    ) -> Vec<RowOutcome> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                let message = DbError::from(err).to_string();
                warn!(batch_start = start, error = %message, "Import batch could not start");
                return rows
                    .iter()
                    .enumerate()
                    .map(|(offset, row)| {
                        RowOutcome::failed(
                            start + offset,
                            row.identifier.trim(),
                            None,
                            RowError::CommitFailed {
                                message: message.clone(),
                            },
                        )
                    })
                    .collect();
            }
        };

        let reason = format!("import:{}", request.mode);
        let mut outcomes = Vec::with_capacity(rows.len());
        // Levels before this batch, to roll the working copy back on a failed commit.
        let mut before: HashMap<String, StockLevel> = HashMap::new();

        for (offset, row) in rows.iter().enumerate() {
            let index = start + offset;
            let identifier = row.identifier.trim();

            let Some(product) = resolved.get(identifier) else {
                outcomes.push(RowOutcome::failed(
                    index,
                    identifier,
                    None,
                    RowError::ProductNotFound {
                        identifier: identifier.to_string(),
                    },
                ));
                continue;
            };
            let product_id = Some(product.id.clone());

            if state.stale.contains(&product.id) {
                outcomes.push(RowOutcome::failed(
                    index,
                    identifier,
                    product_id,
                    RowError::VersionConflict,
                ));
                continue;
            }

            let plan = match parse_quantity(&row.target_quantity)
                .and_then(|target| {
                    let current = state
                        .levels
                        .get(&product.id)
                        .copied()
                        .unwrap_or_else(StockLevel::absent);
                    plan_row(request.mode, current.quantity, target).map(|plan| (current, plan))
                }) {
                Ok(planned) => planned,
                Err(error) => {
                    outcomes.push(RowOutcome::failed(index, identifier, product_id, error));
                    continue;
                }
            };
            let (current, plan) = plan;

            if plan.is_noop() {
                outcomes.push(RowOutcome {
                    row: index,
                    identifier: identifier.to_string(),
                    product_id,
                    status: RowStatus::Unchanged {
                        quantity: current.quantity,
                    },
                });
                continue;
            }

            let adjust = AdjustRequest::new(
                &product.id,
                &request.location_id,
                plan.delta,
                &reason,
                &request.actor_id,
            );

            match adjust_row(&mut tx, &adjust, current).await {
                Ok((record, movement)) => {
                    before.entry(product.id.clone()).or_insert(current);
                    state
                        .levels
                        .insert(product.id.clone(), StockLevel::from(&record));

                    if plan.clamped {
                        debug!(
                            row = index,
                            product_id = %product.id,
                            shortfall = plan.shortfall,
                            "Decrement clamped at zero"
                        );
                    }

                    outcomes.push(RowOutcome {
                        row: index,
                        identifier: identifier.to_string(),
                        product_id,
                        status: RowStatus::Applied {
                            previous_quantity: plan.previous_quantity,
                            new_quantity: record.quantity,
                            delta: plan.delta,
                            movement_id: movement.id,
                            clamped: plan.clamped,
                            shortfall: plan.shortfall,
                        },
                    });
                }
                Err(err) if err.is_version_conflict() => {
                    warn!(
                        row = index,
                        product_id = %product.id,
                        expected_version = current.version,
                        "Import row lost a version race"
                    );
                    state.stale.insert(product.id.clone());
                    outcomes.push(RowOutcome::failed(
                        index,
                        identifier,
                        product_id,
                        RowError::VersionConflict,
                    ));
                }
                Err(err) => {
                    warn!(row = index, product_id = %product.id, error = %err, "Import row failed");
                    outcomes.push(RowOutcome::failed(
                        index,
                        identifier,
                        product_id,
                        RowError::CommitFailed {
                            message: err.to_string(),
                        },
                    ));
                }
            }
        }

        match tx.commit().await {
            Ok(()) => {
                for outcome in outcomes.iter().filter(|o| o.is_applied()) {
                    if let Some(product_id) = &outcome.product_id {
                        state.mutated.insert(product_id.clone());
                    }
                }
                debug!(batch_start = start, rows = rows.len(), "Import batch committed");
                outcomes
            }
            Err(err) => {
                let message = DbError::from(err).to_string();
                warn!(batch_start = start, error = %message, "Import batch commit failed");

                for (product_id, level) in before {
                    state.levels.insert(product_id, level);
                }
                outcomes
                    .into_iter()
                    .map(|outcome| {
                        if outcome.is_applied() {
                            RowOutcome {
                                status: RowStatus::Failed {
                                    error: RowError::CommitFailed {
                                        message: message.clone(),
                                    },
                                },
                                ..outcome
                            }
                        } else {
                            outcome
                        }
                    })
                    .collect()
            }
        }
    }
}

/// One row's stock write inside a savepoint on the batch transaction.
///
/// A row that fails after its UPDATE (e.g. on the movement insert) rolls
/// back to the savepoint, so the batch never commits a balance without its
/// movement.
async fn adjust_row(
    conn: &mut SqliteConnection,
    request: &AdjustRequest,
    current: StockLevel,
) -> DbResult<(StockRecord, Movement)> {
    let mut savepoint = conn.begin().await?;
    let written = StockRepository::adjust_in(&mut savepoint, request, current).await?;
    savepoint.commit().await?;
    Ok(written)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stockline_core::{CoreError, ImportMode};

    fn request(mode: ImportMode, rows: Vec<ImportRow>) -> ImportRequest {
        ImportRequest {
            location_id: "L1".to_string(),
            actor_id: "importer".to_string(),
            mode,
            rows,
        }
    }

    #[tokio::test]
    async fn test_row_cap_rejects_whole_request() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let importer = db.importer_with(ImportSettings {
            max_rows: 2,
            ..ImportSettings::default()
        });

        let rows = (0..3).map(|i| ImportRow::new(format!("SKU-{}", i), 1i64)).collect();
        let err = importer
            .run(request(ImportMode::Establecer, rows))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::ImportTooLarge { rows: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_empty_request_returns_empty_report() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let report = db
            .importer()
            .run(request(ImportMode::Incrementar, Vec::new()))
            .await
            .unwrap();
        assert_eq!(report.total_rows, 0);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_modes_and_row_errors() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.products().create("A", Some("111"), "A", None).await.unwrap();
        db.products().create("B", None, "B", None).await.unwrap();

        let report = db
            .importer()
            .run(request(
                ImportMode::Incrementar,
                vec![
                    ImportRow::new("A", 5i64),
                    ImportRow::new("111", 3i64),
                    ImportRow::new("B", "abc"),
                    ImportRow::new("NOPE", 1i64),
                    ImportRow::new("B", 0i64),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.errored, 2);
        assert_eq!(db.ledger().get(&a.id, "L1").await.unwrap().unwrap().quantity, 8);
        assert!(matches!(
            report.outcomes[2].status,
            RowStatus::Failed {
                error: RowError::InvalidQuantity { .. }
            }
        ));
        assert!(matches!(
            report.outcomes[3].status,
            RowStatus::Failed {
                error: RowError::ProductNotFound { .. }
            }
        ));
        assert!(matches!(report.outcomes[4].status, RowStatus::Unchanged { quantity: 0 }));

        let report = db
            .importer()
            .run(request(ImportMode::Decrementar, vec![ImportRow::new("A", 10i64)]))
            .await
            .unwrap();
        match &report.outcomes[0].status {
            RowStatus::Applied {
                new_quantity,
                clamped,
                shortfall,
                ..
            } => {
                assert_eq!(*new_quantity, 0);
                assert!(*clamped);
                assert_eq!(*shortfall, 2);
            }
            other => panic!("expected applied row, got {:?}", other),
        }
    }
}
