//! # Alert Repository
//!
//! Threshold configuration and the derived alert table.
//!
//! ## Supersession
//! ```text
//! (P, L) has: bajo                  re-evaluation says: critico
//!   DELETE tiers != critico   →     bajo removed
//!   UPSERT critico            →     critico stored (same tier just refreshes)
//!
//! re-evaluation says: nothing / no thresholds
//!   DELETE all tiers for (P, L)
//! ```

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use stockline_core::{AlertRecord, StockThresholds};

const ALERT_COLUMNS: &str =
    "product_id, location_id, tier, current_quantity, reference_quantity, detected_at";

/// Repository for thresholds and alerts.
#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    /// Creates a new AlertRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AlertRepository { pool }
    }

    /// Thresholds configured for a pair.
    pub async fn get_thresholds(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Option<StockThresholds>> {
        let thresholds = sqlx::query_as::<_, StockThresholds>(
            r#"
            SELECT product_id, location_id, minimo, maximo, punto_reposicion
            FROM stock_thresholds
            WHERE product_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(thresholds)
    }

    /// Inserts or replaces thresholds for a pair.
    pub async fn upsert_thresholds(&self, thresholds: &StockThresholds) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_thresholds (product_id, location_id, minimo, maximo, punto_reposicion)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (product_id, location_id) DO UPDATE SET
                minimo = excluded.minimo,
                maximo = excluded.maximo,
                punto_reposicion = excluded.punto_reposicion
            "#,
        )
        .bind(&thresholds.product_id)
        .bind(&thresholds.location_id)
        .bind(thresholds.minimo)
        .bind(thresholds.maximo)
        .bind(thresholds.punto_reposicion)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes thresholds for a pair.
    pub async fn delete_thresholds(&self, product_id: &str, location_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM stock_thresholds WHERE product_id = ?1 AND location_id = ?2")
            .bind(product_id)
            .bind(location_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replaces every alert of a pair with `alert` (or with nothing).
    pub async fn replace_for_pair_in(
        conn: &mut SqliteConnection,
        product_id: &str,
        location_id: &str,
        alert: Option<&AlertRecord>,
    ) -> DbResult<()> {
        let Some(alert) = alert else {
            sqlx::query("DELETE FROM stock_alerts WHERE product_id = ?1 AND location_id = ?2")
                .bind(product_id)
                .bind(location_id)
                .execute(&mut *conn)
                .await?;
            return Ok(());
        };

        sqlx::query(
            "DELETE FROM stock_alerts WHERE product_id = ?1 AND location_id = ?2 AND tier != ?3",
        )
        .bind(product_id)
        .bind(location_id)
        .bind(alert.tier)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO stock_alerts (
                product_id, location_id, tier, current_quantity, reference_quantity, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (product_id, location_id, tier) DO UPDATE SET
                current_quantity = excluded.current_quantity,
                reference_quantity = excluded.reference_quantity,
                detected_at = excluded.detected_at
            "#,
        )
        .bind(&alert.product_id)
        .bind(&alert.location_id)
        .bind(alert.tier)
        .bind(alert.current_quantity)
        .bind(alert.reference_quantity)
        .bind(alert.detected_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Current alerts at a location.
    pub async fn list_by_location(&self, location_id: &str) -> DbResult<Vec<AlertRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_alerts WHERE location_id = ?1 ORDER BY product_id, tier",
            ALERT_COLUMNS
        );
        let alerts = sqlx::query_as::<_, AlertRecord>(&sql)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(alerts)
    }

    /// Current alerts for a pair (at most one after any re-evaluation).
    pub async fn list_for_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Vec<AlertRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_alerts WHERE product_id = ?1 AND location_id = ?2",
            ALERT_COLUMNS
        );
        let alerts = sqlx::query_as::<_, AlertRecord>(&sql)
            .bind(product_id)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(alerts)
    }
}
