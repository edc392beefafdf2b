//! # Movement Repository
//!
//! Append-only movement log. Movements are written only inside a ledger
//! transaction (see `StockRepository::adjust_in`); triggers in the schema
//! reject UPDATE and DELETE.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use stockline_core::Movement;

const MOVEMENT_COLUMNS: &str =
    "id, stock_record_id, product_id, location_id, kind, quantity, reason, actor_id, created_at";

/// Sum of movement magnitudes by direction for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct MovementTotals {
    pub entradas: i64,
    pub salidas: i64,
}

impl MovementTotals {
    /// Net effect of every movement.
    pub fn net(&self) -> i64 {
        self.entradas - self.salidas
    }
}

/// Repository for the movement log.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Appends a movement on the caller's connection/transaction.
    pub async fn insert_in(conn: &mut SqliteConnection, movement: &Movement) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO movements (
                id, stock_record_id, product_id, location_id,
                kind, quantity, reason, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.stock_record_id)
        .bind(&movement.product_id)
        .bind(&movement.location_id)
        .bind(movement.kind)
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.actor_id)
        .bind(movement.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Gets a movement by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Movement>> {
        let sql = format!("SELECT {} FROM movements WHERE id = ?1", MOVEMENT_COLUMNS);
        let movement = sqlx::query_as::<_, Movement>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movement)
    }

    /// Movements for a pair, oldest first.
    pub async fn list_for_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Vec<Movement>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM movements
            WHERE product_id = ?1 AND location_id = ?2
            ORDER BY created_at, rowid
            "#,
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, Movement>(&sql)
            .bind(product_id)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements written with an exact reason (e.g. one reconciliation session).
    pub async fn list_by_reason(&self, reason: &str) -> DbResult<Vec<Movement>> {
        let sql = format!(
            "SELECT {} FROM movements WHERE reason = ?1 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, Movement>(&sql)
            .bind(reason)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Entrada and salida totals for a pair.
    pub async fn totals(&self, product_id: &str, location_id: &str) -> DbResult<MovementTotals> {
        let totals = sqlx::query_as::<_, MovementTotals>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'entrada' THEN quantity ELSE 0 END), 0) AS entradas,
                COALESCE(SUM(CASE WHEN kind = 'salida' THEN quantity ELSE 0 END), 0) AS salidas
            FROM movements
            WHERE product_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }

    /// Total movements at a location.
    pub async fn count_by_location(&self, location_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movements WHERE location_id = ?1")
            .bind(location_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
