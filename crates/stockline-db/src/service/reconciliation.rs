//! # Reconciliation Workflow
//!
//! Theoretical vs physical comparison for one scope (a location, optionally
//! narrowed to a category), gated by open contingencies.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open(scope)                                                            │
//! │    ├─ open conciliacion contingency for EXACT scope ──► ScopeBlocked    │
//! │    ├─ open session for scope exists ──► returned as-is                  │
//! │    └─ snapshot ledger quantities ──► pendiente                          │
//! │                                                                         │
//! │  record_count(session, product, physical)                               │
//! │    └─ first count ──► en_proceso                                        │
//! │                                                                         │
//! │  close(session)                                                         │
//! │    ├─ any line uncounted ──► LineIncomplete                             │
//! │    ├─ per non-zero, unapplied line:                                     │
//! │    │     BEGIN  CAS write + movement + line.applied_movement_id  COMMIT │
//! │    ├─ all settled ──► resuelta                                          │
//! │    └─ otherwise stays open, CloseReport lists failed lines              │
//! │                                                                         │
//! │  block(session) ──► bloqueada   (only while a contingency gates scope)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Contingencies at a different granularity never gate each other: a
//! category contingency leaves the general scope open, and vice versa.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::contingency::ContingencyRepository;
use crate::repository::product::ProductRepository;
use crate::repository::reconciliation::ReconciliationRepository;
use crate::repository::stock::StockRepository;
use crate::service::alerts::AlertMonitor;
use stockline_core::reconciliation::{
    self as rules, blocked_error, correction_reason, ensure_complete, ensure_open,
    pending_corrections, snapshot_line, GATE_KINDS,
};
use stockline_core::validation::{validate_identifier, validate_uuid};
use stockline_core::{
    AdjustRequest, CoreError, ReconciliationLine, ReconciliationScope, ReconciliationSession,
    ReconciliationState, DEFAULT_RETRY_ATTEMPTS,
};

/// A correction committed during `close`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub product_id: String,
    pub delta: i64,
    pub movement_id: String,
}

/// A line whose correction could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub product_id: String,
    pub difference: i64,
    pub error: String,
}

/// Result of a close attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReport {
    pub session: ReconciliationSession,
    pub applied: Vec<AppliedCorrection>,
    pub failed: Vec<LineFailure>,
}

impl CloseReport {
    pub fn is_resolved(&self) -> bool {
        self.session.state == ReconciliationState::Resuelta
    }
}

/// Reconciliation session service.
#[derive(Debug, Clone)]
pub struct ReconciliationWorkflow {
    pool: SqlitePool,
    products: ProductRepository,
    stock: StockRepository,
    contingencies: ContingencyRepository,
    sessions: ReconciliationRepository,
    alerts: AlertMonitor,
    retry_attempts: u32,
}

impl ReconciliationWorkflow {
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationWorkflow {
            products: ProductRepository::new(pool.clone()),
            stock: StockRepository::new(pool.clone()),
            contingencies: ContingencyRepository::new(pool.clone()),
            sessions: ReconciliationRepository::new(pool.clone()),
            alerts: AlertMonitor::new(pool.clone()),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            pool,
        }
    }

    /// Attempts per correction line on `VersionConflict` (minimum 1).
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    // -------------------------------------------------------------------------
    // Open
    // -------------------------------------------------------------------------

    /// Opens a session for `scope`, or returns the one already open.
    ///
    /// ## Errors
    /// - `ScopeBlocked` when an open reconciliation contingency exists for
    ///   exactly this scope
    pub async fn open(
        &self,
        scope: ReconciliationScope,
        opened_by: &str,
    ) -> DbResult<ReconciliationSession> {
        validate_identifier("location_id", &scope.location_id)?;
        if let Some(category_id) = &scope.category_id {
            validate_identifier("category_id", category_id)?;
        }
        validate_identifier("opened_by", opened_by)?;

        self.check_gate(&scope).await?;

        if let Some(existing) = self.sessions.find_open_for_scope(&scope).await? {
            debug!(
                session_id = %existing.id,
                scope = %scope,
                "Returning open reconciliation session"
            );
            return Ok(existing);
        }

        let session = self.snapshot(scope, opened_by).await?;

        match self.insert_session(&session).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    scope = %session.scope,
                    lines = session.lines.len(),
                    "Reconciliation session opened"
                );
                Ok(session)
            }
            Err(err) if err.is_unique_violation() || err.is_busy() => {
                debug!(scope = %session.scope, error = %err, "Concurrent open, loading winner");
                self.sessions
                    .find_open_for_scope(&session.scope)
                    .await?
                    .ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn snapshot(
        &self,
        scope: ReconciliationScope,
        opened_by: &str,
    ) -> DbResult<ReconciliationSession> {
        let products = self
            .products
            .list_active_in_category(scope.category_id.as_deref())
            .await?;
        let quantities: HashMap<String, i64> = self
            .stock
            .list_by_location(&scope.location_id)
            .await?
            .into_iter()
            .map(|record| (record.product_id, record.quantity))
            .collect();

        let id = Uuid::new_v4().to_string();
        let lines = products
            .iter()
            .map(|product| {
                let theoretical = quantities.get(&product.id).copied().unwrap_or(0);
                snapshot_line(&id, &product.id, theoretical)
            })
            .collect();

        Ok(ReconciliationSession {
            id,
            scope,
            state: ReconciliationState::Pendiente,
            opened_by: opened_by.to_string(),
            opened_at: Utc::now(),
            closed_at: None,
            lines,
        })
    }

    async fn insert_session(&self, session: &ReconciliationSession) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        ReconciliationRepository::insert_in(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Count
    // -------------------------------------------------------------------------

    /// Records the physical count for one product line.
    pub async fn record_count(
        &self,
        session_id: &str,
        product_id: &str,
        physical_quantity: i64,
    ) -> DbResult<ReconciliationSession> {
        let mut session = self.load(session_id).await?;
        ensure_open(&session)?;
        self.check_gate(&session.scope).await?;

        let previous_state = session.state;
        let line = rules::record_count(&mut session, product_id, physical_quantity)?;

        let mut tx = self.pool.begin().await?;
        if !ReconciliationRepository::record_count_in(&mut tx, &line).await? {
            drop(tx);
            ensure_open(&self.load(session_id).await?)?;
            return Err(CoreError::InvalidTransition {
                session_id: session.id.clone(),
                reason: format!("correction for product {} is already applied", product_id),
            }
            .into());
        }
        if session.state != previous_state
            && !ReconciliationRepository::transition_in(&mut tx, &session.id, session.state, None)
                .await?
        {
            drop(tx);
            return Err(self.closed_error(&session.id).await);
        }
        tx.commit().await?;

        debug!(
            session_id = %session.id,
            product_id = %product_id,
            physical = physical_quantity,
            difference = ?line.difference,
            "Reconciliation count recorded"
        );
        Ok(session)
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Applies every pending correction and resolves the session when all
    /// lines are settled.
    ///
    /// Each line commits on its own; a failed line leaves the session open
    /// and a later `close` only retries the lines still unsettled.
    pub async fn close(&self, session_id: &str, actor_id: &str) -> DbResult<CloseReport> {
        validate_identifier("actor_id", actor_id)?;

        let session = self.load(session_id).await?;
        ensure_open(&session)?;
        ensure_complete(&session)?;
        self.check_gate(&session.scope).await?;

        let reason = correction_reason(&session.id);
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for line in pending_corrections(&session) {
            let difference = line.difference.unwrap_or(0);
            match self.apply_correction(&session, line, &reason, actor_id).await {
                Ok(Some(movement_id)) => applied.push(AppliedCorrection {
                    product_id: line.product_id.clone(),
                    delta: difference,
                    movement_id,
                }),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        session_id = %session.id,
                        product_id = %line.product_id,
                        difference,
                        error = %err,
                        "Reconciliation correction failed"
                    );
                    failed.push(LineFailure {
                        product_id: line.product_id.clone(),
                        difference,
                        error: err.to_string(),
                    });
                }
            }
        }

        if failed.is_empty() {
            let mut tx = self.pool.begin().await?;
            let resolved = ReconciliationRepository::transition_in(
                &mut tx,
                &session.id,
                ReconciliationState::Resuelta,
                Some(Utc::now()),
            )
            .await?;
            tx.commit().await?;

            if resolved {
                info!(
                    session_id = %session.id,
                    corrections = applied.len(),
                    "Reconciliation session resolved"
                );
            } else {
                debug!(
                    session_id = %session.id,
                    "Session not resolved: left open state or has unsettled lines"
                );
            }
        } else {
            warn!(
                session_id = %session.id,
                applied = applied.len(),
                failed = failed.len(),
                "Reconciliation close incomplete, session stays open"
            );
        }

        let session = self.load(session_id).await?;
        Ok(CloseReport {
            session,
            applied,
            failed,
        })
    }

    /// Commits one line's correction, retrying version conflicts.
    ///
    /// `Ok(None)` means a concurrent close already applied it, or the line
    /// was recounted after this close read it.
    async fn apply_correction(
        &self,
        session: &ReconciliationSession,
        line: &ReconciliationLine,
        reason: &str,
        actor_id: &str,
    ) -> DbResult<Option<String>> {
        let request = AdjustRequest::new(
            &line.product_id,
            &session.scope.location_id,
            line.difference.unwrap_or(0),
            reason,
            actor_id,
        );

        let mut attempt = 1;
        loop {
            match self.try_correction(session, &request).await {
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    debug!(
                        session_id = %session.id,
                        product_id = %line.product_id,
                        attempt,
                        "Retrying reconciliation correction"
                    );
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }

    async fn try_correction(
        &self,
        session: &ReconciliationSession,
        request: &AdjustRequest,
    ) -> DbResult<Option<String>> {
        let level = self
            .stock
            .level(&request.product_id, &request.location_id)
            .await?;

        let mut tx = self.pool.begin().await?;
        let (record, movement) = StockRepository::adjust_in(&mut tx, request, level).await?;
        let linked = ReconciliationRepository::mark_applied_in(
            &mut tx,
            &session.id,
            &request.product_id,
            &movement.id,
            request.delta,
        )
        .await?;
        if !linked {
            // Dropping the transaction rolls the stock write back.
            return Ok(None);
        }
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            session_id = %session.id,
            product_id = %record.product_id,
            delta = request.delta,
            quantity = record.quantity,
            "Reconciliation correction applied"
        );

        if let Err(err) = self
            .alerts
            .reevaluate(&record.product_id, &record.location_id)
            .await
        {
            warn!(product_id = %record.product_id, error = %err, "Alert refresh failed");
        }
        Ok(Some(movement.id))
    }

    // -------------------------------------------------------------------------
    // Block / Queries
    // -------------------------------------------------------------------------

    /// Moves an open session to `bloqueada` while a contingency gates its scope.
    pub async fn block(&self, session_id: &str) -> DbResult<ReconciliationSession> {
        let session = self.load(session_id).await?;
        ensure_open(&session)?;

        let gating = self
            .contingencies
            .find_open_for_scope(&session.scope, &GATE_KINDS)
            .await?;
        let Some(contingency) = gating.first() else {
            return Err(CoreError::InvalidTransition {
                session_id: session.id.clone(),
                reason: "no open contingency gates this scope".to_string(),
            }
            .into());
        };

        let mut tx = self.pool.begin().await?;
        let blocked = ReconciliationRepository::transition_in(
            &mut tx,
            &session.id,
            ReconciliationState::Bloqueada,
            Some(Utc::now()),
        )
        .await?;
        if !blocked {
            drop(tx);
            return Err(self.closed_error(&session.id).await);
        }
        tx.commit().await?;

        info!(
            session_id = %session.id,
            contingency_id = %contingency.id,
            "Reconciliation session blocked"
        );
        self.load(session_id).await
    }

    pub async fn get(&self, session_id: &str) -> DbResult<Option<ReconciliationSession>> {
        validate_uuid("session_id", session_id)?;
        self.sessions.get(session_id).await
    }

    /// The open session for exactly this scope, if any.
    pub async fn active_for_scope(
        &self,
        scope: &ReconciliationScope,
    ) -> DbResult<Option<ReconciliationSession>> {
        self.sessions.find_open_for_scope(scope).await
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn load(&self, session_id: &str) -> DbResult<ReconciliationSession> {
        validate_uuid("session_id", session_id)?;
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()).into())
    }

    async fn check_gate(&self, scope: &ReconciliationScope) -> DbResult<()> {
        let open = self
            .contingencies
            .find_open_for_scope(scope, &GATE_KINDS)
            .await?;

        match open.first() {
            Some(contingency) => {
                debug!(scope = %scope, contingency_id = %contingency.id, "Scope blocked");
                Err(blocked_error(contingency).into())
            }
            None => Ok(()),
        }
    }

    async fn closed_error(&self, session_id: &str) -> DbError {
        match self.sessions.get(session_id).await {
            Ok(Some(session)) => CoreError::SessionClosed {
                session_id: session.id,
                state: session.state,
            }
            .into(),
            Ok(None) => CoreError::SessionNotFound(session_id.to_string()).into(),
            Err(err) => err,
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
    use stockline_core::{ContingencyKind, ContingencyStatus, ScopeGranularity};

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.products().create("A", None, "A", Some("bebidas")).await.unwrap();
        let b = db.products().create("B", None, "B", Some("snacks")).await.unwrap();
        db.ledger()
            .adjust(AdjustRequest::new(&a.id, "L1", 10, "delivery", "user1"))
            .await
            .unwrap();
        (db, a.id, b.id)
    }

    #[tokio::test]
    async fn test_open_snapshots_and_is_idempotent() {
        let (db, a, b) = setup().await;
        let workflow = db.reconciliation();

        let session = workflow
            .open(ReconciliationScope::general("L1"), "auditor")
            .await
            .unwrap();
        assert_eq!(session.state, ReconciliationState::Pendiente);
        assert_eq!(session.line(&a).unwrap().theoretical_quantity, 10);
        assert_eq!(session.line(&b).unwrap().theoretical_quantity, 0);

        let again = workflow
            .open(ReconciliationScope::general("L1"), "someone-else")
            .await
            .unwrap();
        assert_eq!(again.id, session.id);

        let scoped = workflow
            .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
            .await
            .unwrap();
        assert_ne!(scoped.id, session.id);
        assert_eq!(scoped.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_contingency_gates_exact_scope_only() {
        let (db, _, _) = setup().await;
        let contingency = db
            .contingencies()
            .insert(
                &ReconciliationScope::category("L1", "bebidas"),
                ContingencyKind::Conciliacion,
                "count mismatch",
            )
            .await
            .unwrap();

        let err = db
            .reconciliation()
            .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
            .await
            .unwrap_err();
        match err {
            DbError::Domain(CoreError::ScopeBlocked {
                contingency_id,
                granularity,
                ..
            }) => {
                assert_eq!(contingency_id, contingency.id);
                assert_eq!(granularity, ScopeGranularity::Categoria);
            }
            other => panic!("expected ScopeBlocked, got {:?}", other),
        }

        assert!(db
            .reconciliation()
            .open(ReconciliationScope::general("L1"), "auditor")
            .await
            .is_ok());

        db.contingencies()
            .set_status(&contingency.id, ContingencyStatus::Resuelto)
            .await
            .unwrap();
        assert!(db
            .reconciliation()
            .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_count_then_close_applies_difference() {
        let (db, a, b) = setup().await;
        let workflow = db.reconciliation();
        let session = workflow
            .open(ReconciliationScope::general("L1"), "auditor")
            .await
            .unwrap();

        let counted = workflow.record_count(&session.id, &a, 7).await.unwrap();
        assert_eq!(counted.state, ReconciliationState::EnProceso);

        let err = workflow.close(&session.id, "auditor").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::LineIncomplete { .. })));

        workflow.record_count(&session.id, &b, 0).await.unwrap();
        let report = workflow.close(&session.id, "auditor").await.unwrap();

        assert!(report.is_resolved());
        assert!(report.failed.is_empty());
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].delta, -3);
        assert!(report.session.closed_at.is_some());
        assert_eq!(db.ledger().get(&a, "L1").await.unwrap().unwrap().quantity, 7);

        let err = workflow.record_count(&session.id, &a, 5).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SessionClosed { .. })));
    }

    #[tokio::test]
    async fn test_count_rules() {
        let (db, a, _) = setup().await;
        let workflow = db.reconciliation();
        let session = workflow
            .open(ReconciliationScope::category("L1", "bebidas"), "auditor")
            .await
            .unwrap();

        assert!(workflow.record_count(&session.id, &a, -1).await.is_err());

        let err = workflow
            .record_count(&session.id, "not-in-scope", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::LineNotFound { .. })));

        let missing = Uuid::new_v4().to_string();
        let err = workflow.record_count(&missing, &a, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_block_requires_gating_contingency() {
        let (db, _, _) = setup().await;
        let workflow = db.reconciliation();
        let session = workflow
            .open(ReconciliationScope::general("L1"), "auditor")
            .await
            .unwrap();

        let err = workflow.block(&session.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidTransition { .. })));

        db.contingencies()
            .insert(
                &ReconciliationScope::general("L1"),
                ContingencyKind::ConciliacionGeneral,
                "shrinkage",
            )
            .await
            .unwrap();

        let blocked = workflow.block(&session.id).await.unwrap();
        assert_eq!(blocked.state, ReconciliationState::Bloqueada);
        assert!(workflow
            .active_for_scope(&ReconciliationScope::general("L1"))
            .await
            .unwrap()
            .is_none());
    }
}
