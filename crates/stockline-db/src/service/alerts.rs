//! # Alert Monitor
//!
//! Re-evaluates alerts for a (product, location) pair after its quantity
//! changes and persists the result. Reads the ledger, never writes it.
//!
//! ## Flow
//! ```text
//! ledger / import / reconciliation commit
//!        │
//!        ▼
//! AlertMonitor::reevaluate(P, L)
//!   ├─ thresholds(P, L)?  ── none ──► clear all alerts for (P, L)
//!   ├─ current quantity (absent → 0)
//!   ├─ stockline_core::alert::evaluate
//!   └─ one transaction: drop other tiers, upsert the current tier
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::alert::AlertRepository;
use crate::repository::stock::StockRepository;
use stockline_core::alert;
use stockline_core::validation::validate_thresholds;
use stockline_core::{AlertRecord, StockThresholds};

/// Threshold-based alert evaluation and persistence.
#[derive(Debug, Clone)]
pub struct AlertMonitor {
    pool: SqlitePool,
    alerts: AlertRepository,
    stock: StockRepository,
}

impl AlertMonitor {
    pub fn new(pool: SqlitePool) -> Self {
        AlertMonitor {
            alerts: AlertRepository::new(pool.clone()),
            stock: StockRepository::new(pool.clone()),
            pool,
        }
    }

    /// Validates and stores thresholds, then re-evaluates the pair.
    pub async fn set_thresholds(
        &self,
        thresholds: &StockThresholds,
    ) -> DbResult<Option<AlertRecord>> {
        validate_thresholds(thresholds)?;
        self.alerts.upsert_thresholds(thresholds).await?;
        self.reevaluate(&thresholds.product_id, &thresholds.location_id)
            .await
    }

    /// Removes thresholds for a pair, which clears its alerts.
    pub async fn clear_thresholds(&self, product_id: &str, location_id: &str) -> DbResult<()> {
        self.alerts.delete_thresholds(product_id, location_id).await?;
        self.reevaluate(product_id, location_id).await?;
        Ok(())
    }

    /// Recomputes and persists the alert for one pair.
    ///
    /// Returns the alert now active, if any.
    pub async fn reevaluate(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Option<AlertRecord>> {
        let thresholds = self.alerts.get_thresholds(product_id, location_id).await?;

        let alert = match &thresholds {
            Some(thresholds) => {
                let level = self.stock.level(product_id, location_id).await?;
                alert::evaluate(level.quantity, thresholds, Utc::now())
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        AlertRepository::replace_for_pair_in(&mut tx, product_id, location_id, alert.as_ref())
            .await?;
        tx.commit().await?;

        debug!(
            product_id = %product_id,
            location_id = %location_id,
            tier = ?alert.as_ref().map(|a| a.tier),
            "Alerts re-evaluated"
        );
        Ok(alert)
    }

    /// Active alerts at a location (outbound poll interface).
    pub async fn active(&self, location_id: &str) -> DbResult<Vec<AlertRecord>> {
        self.alerts.list_by_location(location_id).await
    }

    /// Active alerts for one pair.
    pub async fn active_for_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Vec<AlertRecord>> {
        self.alerts.list_for_pair(product_id, location_id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use stockline_core::{AdjustRequest, AlertTier, StockThresholds};

    fn thresholds(product_id: &str) -> StockThresholds {
        StockThresholds {
            product_id: product_id.to_string(),
            location_id: "L1".to_string(),
            minimo: 5,
            maximo: Some(100),
            punto_reposicion: Some(20),
        }
    }

    #[tokio::test]
    async fn test_thresholds_without_stock_are_critico() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = db.products().create("SKU-1", None, "One", None).await.unwrap();

        let alert = db.alerts().set_thresholds(&thresholds(&p.id)).await.unwrap();
        assert_eq!(alert.map(|a| a.tier), Some(AlertTier::Critico));
    }

    #[tokio::test]
    async fn test_invalid_thresholds_are_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = db.products().create("SKU-1", None, "One", None).await.unwrap();

        let mut bad = thresholds(&p.id);
        bad.maximo = Some(3);
        assert!(db.alerts().set_thresholds(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_clearing_thresholds_clears_alerts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = db.products().create("SKU-1", None, "One", None).await.unwrap();
        db.alerts().set_thresholds(&thresholds(&p.id)).await.unwrap();
        db.ledger()
            .adjust(AdjustRequest::new(&p.id, "L1", 3, "delivery", "user1"))
            .await
            .unwrap();
        assert_eq!(db.alerts().active("L1").await.unwrap().len(), 1);

        db.alerts().clear_thresholds(&p.id, "L1").await.unwrap();
        assert!(db.alerts().active("L1").await.unwrap().is_empty());
    }
}
