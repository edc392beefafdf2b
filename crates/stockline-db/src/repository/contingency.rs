//! # Contingency Repository
//!
//! The contingency gate. Contingencies are raised and resolved by an
//! external process; this system only asks whether an open one covers a
//! scope. `insert` and `set_status` exist for that external owner.
//!
//! ## Exact Scope Matching
//! ```text
//! contingency (L1, A)   gates  open(L1, A)
//! contingency (L1, A)   does NOT gate  open(L1, B) or open(L1, general)
//! contingency (L1, -)   gates  open(L1, general) only
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockline_core::{Contingency, ContingencyKind, ContingencyStatus, ReconciliationScope};

const CONTINGENCY_COLUMNS: &str =
    "id, location_id, category_id, kind, status, description, created_at";

fn kind_tag(kind: ContingencyKind) -> &'static str {
    match kind {
        ContingencyKind::Conciliacion => "conciliacion",
        ContingencyKind::ConciliacionGeneral => "conciliacion_general",
        ContingencyKind::Otro => "otro",
    }
}

/// Repository for contingencies.
#[derive(Debug, Clone)]
pub struct ContingencyRepository {
    pool: SqlitePool,
}

impl ContingencyRepository {
    /// Creates a new ContingencyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ContingencyRepository { pool }
    }

    /// Open contingencies of the given kinds for exactly this scope.
    ///
    /// `category_id = None` matches only contingencies with no category.
    pub async fn find_open(
        &self,
        location_id: &str,
        category_id: Option<&str>,
        kinds: &[ContingencyKind],
    ) -> DbResult<Vec<Contingency>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let kinds: Vec<&str> = kinds.iter().copied().map(kind_tag).collect();
        let kinds = serde_json::to_string(&kinds)
            .map_err(|e| DbError::Internal(format!("encode kinds: {}", e)))?;

        let sql = format!(
            r#"
            SELECT {}
            FROM contingencies
            WHERE location_id = ?1
            AND ((?2 IS NULL AND category_id IS NULL) OR category_id = ?2)
            AND status IN ('pendiente', 'en_revision')
            AND kind IN (SELECT value FROM json_each(?3))
            ORDER BY created_at
            "#,
            CONTINGENCY_COLUMNS
        );

        let contingencies = sqlx::query_as::<_, Contingency>(&sql)
            .bind(location_id)
            .bind(category_id)
            .bind(kinds)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            location_id = %location_id,
            category_id = ?category_id,
            open = contingencies.len(),
            "Contingency gate checked"
        );
        Ok(contingencies)
    }

    /// Open contingencies of the given kinds for a scope.
    pub async fn find_open_for_scope(
        &self,
        scope: &ReconciliationScope,
        kinds: &[ContingencyKind],
    ) -> DbResult<Vec<Contingency>> {
        self.find_open(&scope.location_id, scope.category_id.as_deref(), kinds)
            .await
    }

    /// Raises a contingency in `pendiente` status.
    pub async fn insert(
        &self,
        scope: &ReconciliationScope,
        kind: ContingencyKind,
        description: &str,
    ) -> DbResult<Contingency> {
        let contingency = Contingency {
            id: Uuid::new_v4().to_string(),
            location_id: scope.location_id.clone(),
            category_id: scope.category_id.clone(),
            kind,
            status: ContingencyStatus::Pendiente,
            description: description.to_string(),
            created_at: Utc::now(),
        };

        debug!(id = %contingency.id, %scope, "Raising contingency");

        sqlx::query(
            r#"
            INSERT INTO contingencies (
                id, location_id, category_id, kind, status, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&contingency.id)
        .bind(&contingency.location_id)
        .bind(&contingency.category_id)
        .bind(contingency.kind)
        .bind(contingency.status)
        .bind(&contingency.description)
        .bind(contingency.created_at)
        .execute(&self.pool)
        .await?;

        Ok(contingency)
    }

    /// Moves a contingency to a new review status.
    pub async fn set_status(&self, id: &str, status: ContingencyStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE contingencies SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Contingency", id));
        }

        Ok(())
    }
}
