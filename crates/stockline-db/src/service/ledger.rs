//! # Stock Ledger
//!
//! The single authority for stock quantities. Every change is one versioned
//! write plus exactly one movement, committed together.
//!
//! ## Adjust Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust(P, L, delta, reason, actor)                                     │
//! │       │                                                                 │
//! │       ├─ validate (delta != 0, reason, actor), product exists           │
//! │       ├─ read level (no transaction, no lock)                           │
//! │       ├─ quantity + delta < 0 ──────────────► InsufficientStock         │
//! │       │                                                                 │
//! │       ├─ BEGIN                                                          │
//! │       │    versioned write ── 0 rows / busy ─► VersionConflict          │
//! │       │    INSERT movement                                              │
//! │       ├─ COMMIT                                                         │
//! │       │                                                                 │
//! │       └─ re-evaluate alerts (failure logged, adjustment stands)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger never retries on its own. Callers that want to retry a
//! `VersionConflict` use [`StockLedger::adjust_with_retry`], which re-reads
//! and re-validates every attempt.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::movement::MovementRepository;
use crate::repository::product::ProductRepository;
use crate::repository::stock::StockRepository;
use crate::service::alerts::AlertMonitor;
use stockline_core::validation::{validate_adjust_request, validate_identifier};
use stockline_core::{AdjustRequest, CoreError, Movement, StockRecord};

/// Result of a committed adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub record: StockRecord,
    pub movement: Movement,
}

/// Quantity vs. movement-log comparison for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub quantity: i64,
    pub entradas: i64,
    pub salidas: i64,
    /// `quantity == entradas - salidas`
    pub consistent: bool,
}

/// Stock ledger service.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    products: ProductRepository,
    stock: StockRepository,
    movements: MovementRepository,
    alerts: AlertMonitor,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger {
            products: ProductRepository::new(pool.clone()),
            stock: StockRepository::new(pool.clone()),
            movements: MovementRepository::new(pool.clone()),
            alerts: AlertMonitor::new(pool.clone()),
            pool,
        }
    }

    /// Applies a signed delta to a (product, location) pair.
    ///
    /// ## Errors
    /// - `Validation` for a zero delta or empty reason / actor
    /// - `ProductNotFound`
    /// - `InsufficientStock` when the result would be negative
    /// - `VersionConflict` when another writer committed first
    pub async fn adjust(&self, request: AdjustRequest) -> DbResult<AdjustOutcome> {
        validate_adjust_request(&request)?;

        if self.products.get_by_id(&request.product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(request.product_id.clone()).into());
        }

        let level = self
            .stock
            .level(&request.product_id, &request.location_id)
            .await?;

        if level.quantity + request.delta < 0 {
            debug!(
                product_id = %request.product_id,
                location_id = %request.location_id,
                available = level.quantity,
                delta = request.delta,
                "Adjustment rejected, insufficient stock"
            );
            return Err(CoreError::InsufficientStock {
                product_id: request.product_id.clone(),
                location_id: request.location_id.clone(),
                available: level.quantity,
                requested: -request.delta,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let (record, movement) = match StockRepository::adjust_in(&mut tx, &request, level).await {
            Ok(written) => written,
            Err(err) => {
                if err.is_version_conflict() {
                    warn!(
                        product_id = %request.product_id,
                        location_id = %request.location_id,
                        expected_version = level.version,
                        "Version conflict on adjustment"
                    );
                }
                return Err(err);
            }
        };
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            product_id = %record.product_id,
            location_id = %record.location_id,
            delta = request.delta,
            quantity = record.quantity,
            version = record.version,
            "Stock adjusted"
        );

        self.refresh_alerts(&record.product_id, &record.location_id).await;

        Ok(AdjustOutcome { record, movement })
    }

    /// [`adjust`](Self::adjust), retrying only `VersionConflict`.
    ///
    /// Every attempt re-reads the level, so `InsufficientStock` can appear
    /// on a later attempt even if the first read had enough.
    pub async fn adjust_with_retry(
        &self,
        request: AdjustRequest,
        attempts: u32,
    ) -> DbResult<AdjustOutcome> {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.adjust(request.clone()).await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    debug!(
                        product_id = %request.product_id,
                        attempt,
                        "Retrying adjustment after version conflict"
                    );
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }

    /// Advisory availability check. Does not reserve anything.
    pub async fn check_available(
        &self,
        product_id: &str,
        location_id: &str,
        required: i64,
    ) -> DbResult<bool> {
        validate_identifier("product_id", product_id)?;
        validate_identifier("location_id", location_id)?;

        let level = self.stock.level(product_id, location_id).await?;
        Ok(level.quantity >= required)
    }

    /// Current stock record, if the pair was ever adjusted.
    pub async fn get(&self, product_id: &str, location_id: &str) -> DbResult<Option<StockRecord>> {
        self.stock.get(product_id, location_id).await
    }

    /// Movement history for a pair, oldest first.
    pub async fn history(&self, product_id: &str, location_id: &str) -> DbResult<Vec<Movement>> {
        self.movements.list_for_pair(product_id, location_id).await
    }

    /// Checks that the stored quantity equals the sum of its movements.
    pub async fn verify_balance(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<BalanceCheck> {
        let level = self.stock.level(product_id, location_id).await?;
        let totals = self.movements.totals(product_id, location_id).await?;

        let check = BalanceCheck {
            quantity: level.quantity,
            entradas: totals.entradas,
            salidas: totals.salidas,
            consistent: level.quantity == totals.net(),
        };

        if !check.consistent {
            warn!(
                product_id = %product_id,
                location_id = %location_id,
                quantity = check.quantity,
                net = totals.net(),
                "Stock record disagrees with movement log"
            );
        }
        Ok(check)
    }

    /// Re-evaluates alerts after a commit. Never fails the adjustment.
    pub(crate) async fn refresh_alerts(&self, product_id: &str, location_id: &str) {
        if let Err(err) = self.alerts.reevaluate(product_id, location_id).await {
            warn!(
                product_id = %product_id,
                location_id = %location_id,
                error = %err,
                "Alert refresh failed"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stockline_core::{MovementKind, ValidationError};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create("SKU-1", None, "One", None).await.unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_initial_entrada_creates_record() {
        let (db, pid) = setup().await;

        let outcome = db
            .ledger()
            .adjust(AdjustRequest::new(&pid, "L1", 10, "initial load", "user1"))
            .await
            .unwrap();

        assert_eq!(outcome.record.quantity, 10);
        assert_eq!(outcome.record.version, 1);
        assert_eq!(outcome.movement.kind, MovementKind::Entrada);
        assert_eq!(outcome.movement.quantity, 10);

        let history = db.ledger().history(&pid, "L1").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_overdraw_is_rejected_without_side_effects() {
        let (db, pid) = setup().await;
        let ledger = db.ledger();
        ledger
            .adjust(AdjustRequest::new(&pid, "L1", 10, "initial load", "user1"))
            .await
            .unwrap();

        let err = ledger
            .adjust(AdjustRequest::new(&pid, "L1", -15, "sale", "user1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 10,
                requested: 15,
                ..
            })
        ));

        let record = ledger.get(&pid, "L1").await.unwrap().unwrap();
        assert_eq!(record.quantity, 10);
        assert_eq!(record.version, 1);
        assert_eq!(ledger.history(&pid, "L1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (db, pid) = setup().await;
        let ledger = db.ledger();

        let zero = ledger
            .adjust(AdjustRequest::new(&pid, "L1", 0, "noop", "user1"))
            .await
            .unwrap_err();
        assert!(matches!(
            zero,
            DbError::Domain(CoreError::Validation(ValidationError::MustBeNonZero { .. }))
        ));

        let blank = ledger
            .adjust(AdjustRequest::new(&pid, "L1", 5, "   ", "user1"))
            .await
            .unwrap_err();
        assert!(matches!(blank, DbError::Domain(CoreError::Validation(_))));

        let unknown = ledger
            .adjust(AdjustRequest::new("missing", "L1", 5, "delivery", "user1"))
            .await
            .unwrap_err();
        assert!(matches!(unknown, DbError::Domain(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_check_available_and_balance() {
        let (db, pid) = setup().await;
        let ledger = db.ledger();

        assert!(!ledger.check_available(&pid, "L1", 1).await.unwrap());
        assert!(ledger.check_available(&pid, "L1", 0).await.unwrap());

        ledger
            .adjust(AdjustRequest::new(&pid, "L1", 10, "delivery", "user1"))
            .await
            .unwrap();
        ledger
            .adjust_with_retry(AdjustRequest::new(&pid, "L1", -4, "sale", "user1"), 3)
            .await
            .unwrap();

        assert!(ledger.check_available(&pid, "L1", 6).await.unwrap());
        assert!(!ledger.check_available(&pid, "L1", 7).await.unwrap());

        let balance = ledger.verify_balance(&pid, "L1").await.unwrap();
        assert_eq!(
            balance,
            BalanceCheck {
                quantity: 6,
                entradas: 10,
                salidas: 4,
                consistent: true
            }
        );
    }
}
