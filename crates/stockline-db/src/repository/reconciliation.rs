//! # Reconciliation Repository
//!
//! Persistence for reconciliation sessions and their lines. Writes that are
//! part of a larger unit of work take the caller's connection (`*_in`).
//!
//! ## Guarded Writes
//! Every state and line write is conditional, so a lost race shows up as
//! `false` rather than silently overwriting:
//! - state changes require the session to still be open
//! - counts require an open session and an unapplied correction
//! - marking a line applied requires it to be unapplied with the difference
//!   the correction was built from
//! - resolving requires every line counted and every non-zero difference
//!   applied

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use stockline_core::{
    ReconciliationLine, ReconciliationScope, ReconciliationSession, ReconciliationState,
};

const SESSION_COLUMNS: &str =
    "id, location_id, category_id, state, opened_by, opened_at, closed_at";

const LINE_COLUMNS: &str = "session_id, product_id, theoretical_quantity, physical_quantity, \
    difference, applied_movement_id";

/// Flat session row; lines are loaded separately.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    location_id: String,
    category_id: Option<String>,
    state: ReconciliationState,
    opened_by: String,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self, lines: Vec<ReconciliationLine>) -> ReconciliationSession {
        ReconciliationSession {
            id: self.id,
            scope: ReconciliationScope {
                location_id: self.location_id,
                category_id: self.category_id,
            },
            state: self.state,
            opened_by: self.opened_by,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            lines,
        }
    }
}

/// Repository for reconciliation sessions.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationRepository { pool }
    }

    /// Gets a session with its lines.
    pub async fn get(&self, id: &str) -> DbResult<Option<ReconciliationSession>> {
        let sql = format!(
            "SELECT {} FROM reconciliation_sessions WHERE id = ?1",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let lines = self.lines(&row.id).await?;
                Ok(Some(row.into_session(lines)))
            }
            None => Ok(None),
        }
    }

    /// The open session for exactly this scope, if any.
    pub async fn find_open_for_scope(
        &self,
        scope: &ReconciliationScope,
    ) -> DbResult<Option<ReconciliationSession>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM reconciliation_sessions
            WHERE location_id = ?1
            AND COALESCE(category_id, '') = COALESCE(?2, '')
            AND state IN ('pendiente', 'en_proceso')
            "#,
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(&scope.location_id)
            .bind(&scope.category_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let lines = self.lines(&row.id).await?;
                Ok(Some(row.into_session(lines)))
            }
            None => Ok(None),
        }
    }

    async fn lines(&self, session_id: &str) -> DbResult<Vec<ReconciliationLine>> {
        let sql = format!(
            "SELECT {} FROM reconciliation_lines WHERE session_id = ?1 ORDER BY product_id",
            LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, ReconciliationLine>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    /// Inserts a session and its snapshot lines.
    ///
    /// Fails with `UniqueViolation` when another open session already
    /// holds the scope.
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        session: &ReconciliationSession,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_sessions (
                id, location_id, category_id, state, opened_by, opened_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.scope.location_id)
        .bind(&session.scope.category_id)
        .bind(session.state)
        .bind(&session.opened_by)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .execute(&mut *conn)
        .await?;

        for line in &session.lines {
            sqlx::query(
                r#"
                INSERT INTO reconciliation_lines (
                    session_id, product_id, theoretical_quantity,
                    physical_quantity, difference, applied_movement_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&line.session_id)
            .bind(&line.product_id)
            .bind(line.theoretical_quantity)
            .bind(line.physical_quantity)
            .bind(line.difference)
            .bind(&line.applied_movement_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Stores a line's count.
    ///
    /// False when the correction was already applied or the session is no
    /// longer open.
    pub async fn record_count_in(
        conn: &mut SqliteConnection,
        line: &ReconciliationLine,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_lines SET
                physical_quantity = ?3,
                difference = ?4
            WHERE session_id = ?1 AND product_id = ?2 AND applied_movement_id IS NULL
            AND EXISTS (
                SELECT 1 FROM reconciliation_sessions
                WHERE id = ?1 AND state IN ('pendiente', 'en_proceso')
            )
            "#,
        )
        .bind(&line.session_id)
        .bind(&line.product_id)
        .bind(line.physical_quantity)
        .bind(line.difference)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Links a line to its committed correction.
    ///
    /// False if already linked, or if the line was recounted and no longer
    /// carries `difference`.
    pub async fn mark_applied_in(
        conn: &mut SqliteConnection,
        session_id: &str,
        product_id: &str,
        movement_id: &str,
        difference: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_lines SET applied_movement_id = ?3
            WHERE session_id = ?1 AND product_id = ?2
            AND applied_movement_id IS NULL AND difference = ?4
            "#,
        )
        .bind(session_id)
        .bind(product_id)
        .bind(movement_id)
        .bind(difference)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moves an open session to `state`. False when it is no longer open.
    ///
    /// `Resuelta` is also refused while any line is uncounted or has an
    /// unapplied non-zero difference, so a count landing mid-close keeps
    /// the session open.
    pub async fn transition_in(
        conn: &mut SqliteConnection,
        session_id: &str,
        state: ReconciliationState,
        closed_at: Option<DateTime<Utc>>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_sessions SET state = ?2, closed_at = ?3
            WHERE id = ?1 AND state IN ('pendiente', 'en_proceso')
            AND (
                ?2 != 'resuelta'
                OR NOT EXISTS (
                    SELECT 1 FROM reconciliation_lines
                    WHERE session_id = ?1
                    AND (
                        physical_quantity IS NULL
                        OR (difference != 0 AND applied_movement_id IS NULL)
                    )
                )
            )
            "#,
        )
        .bind(session_id)
        .bind(state)
        .bind(closed_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
