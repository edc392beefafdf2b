//! # Stock Repository
//!
//! Stock record reads and the versioned write primitive.
//!
//! ## Compare-And-Set Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Writer A                          Writer B                             │
//! │  read  (qty 5, v3)                 read  (qty 5, v3)                    │
//! │    │                                 │                                  │
//! │    ▼                                 │                                  │
//! │  UPDATE ... SET qty 2, v4            │                                  │
//! │  WHERE id = ? AND version = 3  ✔     │                                  │
//! │  INSERT movement (salida 3)          │                                  │
//! │  COMMIT                              ▼                                  │
//! │                                    UPDATE ... SET qty 1, v4             │
//! │                                    WHERE id = ? AND version = 3         │
//! │                                    0 rows → VersionConflict             │
//! │                                    (no movement, rolled back)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transaction Discipline
//! [`StockRepository::adjust_in`] runs inside a transaction owned by the
//! caller and never begins or commits one. The services own transactions.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::movement::MovementRepository;
use stockline_core::{
    AdjustRequest, CoreError, Movement, MovementKind, StockLevel, StockRecord, ValidationError,
    MAX_STOCK_QUANTITY,
};

const STOCK_COLUMNS: &str = "id, product_id, location_id, quantity, version, last_updated";

/// Repository for stock records.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the stock record for a (product, location) pair.
    pub async fn get(&self, product_id: &str, location_id: &str) -> DbResult<Option<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records WHERE product_id = ?1 AND location_id = ?2",
            STOCK_COLUMNS
        );
        let record = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(product_id)
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Quantity and version for a pair. Absent reads as `(0, 0)`.
    pub async fn level(&self, product_id: &str, location_id: &str) -> DbResult<StockLevel> {
        Ok(self
            .get(product_id, location_id)
            .await?
            .as_ref()
            .map(StockLevel::from)
            .unwrap_or_else(StockLevel::absent))
    }

    /// Stock records at a location for the given products, in one query.
    pub async fn list_for_products(
        &self,
        location_id: &str,
        product_ids: &[String],
    ) -> DbResult<Vec<StockRecord>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = serde_json::to_string(product_ids)
            .map_err(|e| DbError::Internal(format!("encode product ids: {}", e)))?;

        let sql = format!(
            r#"
            SELECT {}
            FROM stock_records
            WHERE location_id = ?1
            AND product_id IN (SELECT value FROM json_each(?2))
            "#,
            STOCK_COLUMNS
        );

        let records = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(location_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Every stock record at a location.
    pub async fn list_by_location(&self, location_id: &str) -> DbResult<Vec<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records WHERE location_id = ?1 ORDER BY product_id",
            STOCK_COLUMNS
        );
        let records = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Applies `request.delta` to the pair, conditional on `expected`.
    ///
    /// ## Steps (inside the caller's transaction)
    /// 1. Conditional write: `UPDATE ... WHERE version = expected.version`,
    ///    or `INSERT OR IGNORE` when the pair has no record yet
    /// 2. Read back the written record
    /// 3. Append exactly one movement
    ///
    /// ## Errors
    /// - `InsufficientStock` when the result would be negative
    /// - `VersionConflict` when zero rows were written or SQLite reported
    ///   the database busy for the write
    pub async fn adjust_in(
        conn: &mut SqliteConnection,
        request: &AdjustRequest,
        expected: StockLevel,
    ) -> DbResult<(StockRecord, Movement)> {
        let kind = MovementKind::from_delta(request.delta).ok_or_else(|| {
            CoreError::from(ValidationError::MustBeNonZero {
                field: "delta".to_string(),
            })
        })?;

        let new_quantity = expected.quantity + request.delta;
        if new_quantity < 0 {
            return Err(CoreError::InsufficientStock {
                product_id: request.product_id.clone(),
                location_id: request.location_id.clone(),
                available: expected.quantity,
                requested: -request.delta,
            }
            .into());
        }
        if new_quantity > MAX_STOCK_QUANTITY {
            return Err(CoreError::from(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: MAX_STOCK_QUANTITY,
            })
            .into());
        }

        let now = Utc::now();
        let conflict = || {
            DbError::Domain(CoreError::VersionConflict {
                product_id: request.product_id.clone(),
                location_id: request.location_id.clone(),
                expected_version: expected.version,
            })
        };

        let write = if expected.is_absent() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO stock_records (
                    id, product_id, location_id, quantity, version, last_updated
                ) VALUES (?1, ?2, ?3, ?4, 1, ?5)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&request.product_id)
            .bind(&request.location_id)
            .bind(new_quantity)
            .bind(now)
            .execute(&mut *conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE stock_records SET
                    quantity = ?1,
                    version = version + 1,
                    last_updated = ?2
                WHERE product_id = ?3 AND location_id = ?4 AND version = ?5
                "#,
            )
            .bind(new_quantity)
            .bind(now)
            .bind(&request.product_id)
            .bind(&request.location_id)
            .bind(expected.version)
            .execute(&mut *conn)
            .await
        };

        let rows = match write {
            Ok(result) => result.rows_affected(),
            Err(err) => match DbError::from(err) {
                DbError::Busy(msg) => {
                    debug!(product_id = %request.product_id, %msg, "Write lock busy");
                    return Err(conflict());
                }
                other => return Err(other),
            },
        };

        if rows == 0 {
            debug!(
                product_id = %request.product_id,
                location_id = %request.location_id,
                expected_version = expected.version,
                "Versioned write missed"
            );
            return Err(conflict());
        }

        let sql = format!(
            "SELECT {} FROM stock_records WHERE product_id = ?1 AND location_id = ?2",
            STOCK_COLUMNS
        );
        let record = sqlx::query_as::<_, StockRecord>(&sql)
            .bind(&request.product_id)
            .bind(&request.location_id)
            .fetch_one(&mut *conn)
            .await?;

        let movement = Movement {
            id: Uuid::new_v4().to_string(),
            stock_record_id: record.id.clone(),
            product_id: request.product_id.clone(),
            location_id: request.location_id.clone(),
            kind,
            quantity: request.delta.abs(),
            reason: request.reason.trim().to_string(),
            actor_id: request.actor_id.clone(),
            created_at: now,
        };
        MovementRepository::insert_in(&mut *conn, &movement).await?;

        debug!(
            product_id = %record.product_id,
            location_id = %record.location_id,
            delta = request.delta,
            version = record.version,
            "Stock record written"
        );

        Ok((record, movement))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create("SKU-1", None, "One", None).await.unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_first_write_creates_record_at_version_one() {
        let (db, pid) = setup().await;
        let request = AdjustRequest::new(&pid, "L1", 10, "initial load", "user1");

        let mut tx = db.pool().begin().await.unwrap();
        let (record, movement) = StockRepository::adjust_in(&mut tx, &request, StockLevel::absent())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(record.quantity, 10);
        assert_eq!(record.version, 1);
        assert_eq!(movement.kind, MovementKind::Entrada);
        assert_eq!(movement.quantity, 10);
        assert_eq!(movement.stock_record_id, record.id);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let (db, pid) = setup().await;
        let request = AdjustRequest::new(&pid, "L1", 10, "initial load", "user1");

        let mut tx = db.pool().begin().await.unwrap();
        StockRepository::adjust_in(&mut tx, &request, StockLevel::absent())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // A second "first write" finds the row already there.
        let mut tx = db.pool().begin().await.unwrap();
        let err = StockRepository::adjust_in(&mut tx, &request, StockLevel::absent())
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
        drop(tx);

        let stale = StockLevel {
            quantity: 10,
            version: 7,
        };
        let mut tx = db.pool().begin().await.unwrap();
        let err = StockRepository::adjust_in(&mut tx, &request, stale)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
        drop(tx);

        let level = db.stock().level(&pid, "L1").await.unwrap();
        assert_eq!(level, StockLevel { quantity: 10, version: 1 });
    }

    #[tokio::test]
    async fn test_negative_result_is_rejected_before_writing() {
        let (db, pid) = setup().await;
        let request = AdjustRequest::new(&pid, "L1", -1, "sale", "user1");

        let mut tx = db.pool().begin().await.unwrap();
        let err = StockRepository::adjust_in(&mut tx, &request, StockLevel::absent())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 0, requested: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_absent_pair_reads_as_zero() {
        let (db, pid) = setup().await;
        assert_eq!(db.stock().level(&pid, "L9").await.unwrap(), StockLevel::absent());
        assert!(db
            .stock()
            .list_for_products("L9", &[pid.clone()])
            .await
            .unwrap()
            .is_empty());
    }
}
