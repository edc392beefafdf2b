//! # Reconciliation Rules
//!
//! Pure state-machine rules for reconciliation sessions. The workflow in
//! `stockline-db` loads a session, applies these rules, and persists.
//!
//! ## Line Lifecycle
//! ```text
//! snapshot ──► counted (physical, difference) ──► settled
//!                                                   │
//!              difference == 0 ─────────────────────┤
//!              correction movement committed ───────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Contingency, ContingencyKind, ReconciliationLine, ReconciliationSession, ReconciliationState,
};
use crate::validation::validate_count;

/// Contingency kinds that gate reconciliation.
pub const GATE_KINDS: [ContingencyKind; 2] = [
    ContingencyKind::Conciliacion,
    ContingencyKind::ConciliacionGeneral,
];

/// Movement reason written for a session's corrections.
pub fn correction_reason(session_id: &str) -> String {
    format!("reconciliation:{}", session_id)
}

/// Error for a scope gated by `contingency`.
pub fn blocked_error(contingency: &Contingency) -> CoreError {
    let scope = contingency.scope();
    CoreError::ScopeBlocked {
        contingency_id: contingency.id.clone(),
        granularity: scope.granularity(),
        scope,
    }
}

/// Snapshot line for one product.
pub fn snapshot_line(
    session_id: &str,
    product_id: &str,
    theoretical_quantity: i64,
) -> ReconciliationLine {
    ReconciliationLine {
        session_id: session_id.to_string(),
        product_id: product_id.to_string(),
        theoretical_quantity,
        physical_quantity: None,
        difference: None,
        applied_movement_id: None,
    }
}

/// Fails unless the session still accepts counts and corrections.
pub fn ensure_open(session: &ReconciliationSession) -> CoreResult<()> {
    if session.state.is_open() {
        Ok(())
    } else {
        Err(CoreError::SessionClosed {
            session_id: session.id.clone(),
            state: session.state,
        })
    }
}

/// Records a physical count on the session in memory.
///
/// Moves `pendiente` to `en_proceso` on the first count. A line whose
/// correction already committed cannot be recounted.
pub fn record_count(
    session: &mut ReconciliationSession,
    product_id: &str,
    physical_quantity: i64,
) -> CoreResult<ReconciliationLine> {
    validate_count(physical_quantity)?;
    ensure_open(session)?;

    let session_id = session.id.clone();
    let line = session
        .lines
        .iter_mut()
        .find(|l| l.product_id == product_id)
        .ok_or_else(|| CoreError::LineNotFound {
            session_id: session_id.clone(),
            product_id: product_id.to_string(),
        })?;

    if line.applied_movement_id.is_some() {
        return Err(CoreError::InvalidTransition {
            session_id,
            reason: format!("correction for product {} is already applied", product_id),
        });
    }

    line.physical_quantity = Some(physical_quantity);
    line.difference = Some(physical_quantity - line.theoretical_quantity);
    let line = line.clone();

    session.state = state_after_count(session.state);
    Ok(line)
}

/// State after any count is recorded.
pub fn state_after_count(state: ReconciliationState) -> ReconciliationState {
    match state {
        ReconciliationState::Pendiente => ReconciliationState::EnProceso,
        other => other,
    }
}

/// Products whose line still has no physical count.
pub fn missing_counts(session: &ReconciliationSession) -> Vec<String> {
    session
        .lines
        .iter()
        .filter(|l| l.physical_quantity.is_none())
        .map(|l| l.product_id.clone())
        .collect()
}

/// Fails with `LineIncomplete` when any line is uncounted.
pub fn ensure_complete(session: &ReconciliationSession) -> CoreResult<()> {
    let missing = missing_counts(session);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::LineIncomplete {
            session_id: session.id.clone(),
            missing_products: missing,
        })
    }
}

/// A counted line with nothing left to apply.
pub fn is_settled(line: &ReconciliationLine) -> bool {
    match line.difference {
        Some(0) => true,
        Some(_) => line.applied_movement_id.is_some(),
        None => false,
    }
}

/// Lines with a non-zero difference that is not yet applied.
pub fn pending_corrections(session: &ReconciliationSession) -> Vec<&ReconciliationLine> {
    session
        .lines
        .iter()
        .filter(|l| !is_settled(l) && l.difference.is_some())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
