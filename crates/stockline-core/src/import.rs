//! # Bulk Import Planning
//!
//! Pure per-row computation for the bulk import orchestrator.
//!
//! ## Where This Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BulkImporter (stockline-db)                                            │
//! │                                                                         │
//! │   pre-load (2 queries) ──► for each batch of N rows:                    │
//! │                              │                                          │
//! │                              ├─ budget check                            │
//! │                              ├─ parse_quantity + plan_row  ◄── THIS     │
//! │                              │  (pre-loaded maps only, no I/O)          │
//! │                              ├─ one transaction: CAS + movement / row   │
//! │                              └─ ImportTally::record                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{ImportMode, QuantityCell};
use crate::MAX_STOCK_QUANTITY;

// =============================================================================
// Row Errors
// =============================================================================

/// Per-row import failure. Collected into the report, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Error)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowError {
    /// Identifier matched no active product.
    #[error("Product not found: {identifier}")]
    ProductNotFound { identifier: String },

    /// Target quantity is non-numeric, negative, fractional or out of range.
    #[error("Invalid quantity: {reason}")]
    InvalidQuantity { reason: String },

    /// The stock record changed under the batch transaction.
    #[error("Stock record changed concurrently, re-upload to retry")]
    VersionConflict,

    /// The batch transaction failed as a whole.
    #[error("Batch commit failed: {message}")]
    CommitFailed { message: String },
}

impl RowError {
    fn invalid(reason: impl Into<String>) -> Self {
        RowError::InvalidQuantity {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Quantity Parsing
// =============================================================================

/// Parses an uploaded cell into a whole, non-negative unit count.
///
/// ## Example
/// ```rust
/// use stockline_core::import::parse_quantity;
/// use stockline_core::QuantityCell;
///
/// assert_eq!(parse_quantity(&QuantityCell::Number(12.0)), Ok(12));
/// assert_eq!(parse_quantity(&QuantityCell::Text(" 7 ".into())), Ok(7));
/// assert!(parse_quantity(&QuantityCell::Text("seven".into())).is_err());
/// assert!(parse_quantity(&QuantityCell::Number(-1.0)).is_err());
/// ```
pub fn parse_quantity(cell: &QuantityCell) -> Result<i64, RowError> {
    match cell {
        QuantityCell::Number(value) => from_number(*value),
        QuantityCell::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(RowError::invalid("empty quantity"));
            }
            match text.parse::<i64>() {
                Ok(value) => check_range(value),
                Err(_) => match text.parse::<f64>() {
                    Ok(value) => from_number(value),
                    Err(_) => Err(RowError::invalid(format!("'{}' is not a number", text))),
                },
            }
        }
    }
}

fn from_number(value: f64) -> Result<i64, RowError> {
    if !value.is_finite() {
        return Err(RowError::invalid("quantity is not a finite number"));
    }
    if value.fract() != 0.0 {
        return Err(RowError::invalid(format!("{} is not a whole quantity", value)));
    }
    if value < 0.0 {
        return Err(RowError::invalid(format!("{} is negative", value)));
    }
    if value > MAX_STOCK_QUANTITY as f64 {
        return Err(RowError::invalid(format!(
            "{} exceeds maximum {}",
            value, MAX_STOCK_QUANTITY
        )));
    }
    Ok(value as i64)
}

fn check_range(value: i64) -> Result<i64, RowError> {
    if value < 0 {
        return Err(RowError::invalid(format!("{} is negative", value)));
    }
    if value > MAX_STOCK_QUANTITY {
        return Err(RowError::invalid(format!(
            "{} exceeds maximum {}",
            value, MAX_STOCK_QUANTITY
        )));
    }
    Ok(value)
}

// =============================================================================
// Row Planning
// =============================================================================

/// The computed effect of one row on its stock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPlan {
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub delta: i64,
    /// `decrementar` asked for more than was available and stopped at zero.
    pub clamped: bool,
    /// Units requested but not removed because of the clamp.
    pub shortfall: i64,
}

impl RowPlan {
    /// A plan that leaves the record untouched writes no movement.
    pub fn is_noop(&self) -> bool {
        self.delta == 0
    }
}

/// Computes the delta a row applies to the current quantity.
///
/// ## Mode Semantics
/// ```text
/// establecer   current=8, target=5  → new 5,  delta -3
/// incrementar  current=8, target=5  → new 13, delta +5
/// decrementar  current=8, target=5  → new 3,  delta -5
/// decrementar  current=3, target=5  → new 0,  delta -3, clamped (shortfall 2)
/// ```
pub fn plan_row(mode: ImportMode, current: i64, target: i64) -> Result<RowPlan, RowError> {
    let target = check_range(target)?;

    let (new_quantity, clamped, shortfall) = match mode {
        ImportMode::Establecer => (target, false, 0),
        ImportMode::Incrementar => {
            let new_quantity = current
                .checked_add(target)
                .filter(|q| *q <= MAX_STOCK_QUANTITY)
                .ok_or_else(|| {
                    RowError::invalid(format!(
                        "{} + {} exceeds maximum {}",
                        current, target, MAX_STOCK_QUANTITY
                    ))
                })?;
            (new_quantity, false, 0)
        }
        ImportMode::Decrementar => {
            if target > current {
                (0, true, target - current)
            } else {
                (current - target, false, 0)
            }
        }
    };

    Ok(RowPlan {
        previous_quantity: current,
        new_quantity,
        delta: new_quantity - current,
        clamped,
        shortfall,
    })
}

/// Rejects requests over the row cap before any work happens.
pub fn check_row_count(rows: usize, max_rows: usize) -> CoreResult<()> {
    if rows > max_rows {
        return Err(CoreError::ImportTooLarge {
            rows,
            max: max_rows,
        });
    }
    Ok(())
}

// =============================================================================
// Outcomes & Report
// =============================================================================

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// Quantity changed and one movement was written.
    Applied {
        previous_quantity: i64,
        new_quantity: i64,
        delta: i64,
        movement_id: String,
        clamped: bool,
        shortfall: i64,
    },
    /// Target equals current quantity; nothing written.
    Unchanged { quantity: i64 },
    /// Row-level error.
    Failed { error: RowError },
}

/// Outcome for one input row, indexed by its position in the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RowOutcome {
    pub row: usize,
    pub identifier: String,
    pub product_id: Option<String>,
    pub status: RowStatus,
}

impl RowOutcome {
    pub fn failed(
        row: usize,
        identifier: impl Into<String>,
        product_id: Option<String>,
        error: RowError,
    ) -> Self {
        RowOutcome {
            row,
            identifier: identifier.into(),
            product_id,
            status: RowStatus::Failed { error },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RowStatus::Failed { .. })
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.status, RowStatus::Applied { .. })
    }
}

/// Result of a bulk import run.
///
/// Counts are always exact; `outcomes` may be truncated for reporting.
/// `processed + errored + unprocessed_due_to_timeout == total_rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportReport {
    pub total_rows: usize,
    /// Applied plus unchanged rows.
    pub processed: usize,
    pub errored: usize,
    pub unprocessed_due_to_timeout: usize,
    /// Index of the first row a re-run should start from.
    pub first_unprocessed_row: Option<usize>,
    /// The wall-clock budget ran out; this is a partial result, not an error.
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub outcomes: Vec<RowOutcome>,
    pub outcomes_truncated: bool,
}

impl ImportReport {
    /// Report for a request with no rows.
    pub fn empty() -> Self {
        ImportTally::new(0, 0).finish(None, Duration::ZERO)
    }
}

/// Accumulates row outcomes into an [`ImportReport`].
#[derive(Debug)]
pub struct ImportTally {
    total_rows: usize,
    detail_limit: usize,
    processed: usize,
    errored: usize,
    outcomes: Vec<RowOutcome>,
    truncated: bool,
}

impl ImportTally {
    pub fn new(total_rows: usize, detail_limit: usize) -> Self {
        ImportTally {
            total_rows,
            detail_limit,
            processed: 0,
            errored: 0,
            outcomes: Vec::with_capacity(detail_limit.min(total_rows)),
            truncated: false,
        }
    }

    /// Records a final row outcome. Call only once the row's batch settled.
    pub fn record(&mut self, outcome: RowOutcome) {
        if outcome.is_failed() {
            self.errored += 1;
        } else {
            self.processed += 1;
        }

        if self.outcomes.len() < self.detail_limit {
            self.outcomes.push(outcome);
        } else {
            self.truncated = true;
        }
    }

    /// Rows recorded so far.
    pub fn settled(&self) -> usize {
        self.processed + self.errored
    }

    /// Builds the report. `first_unprocessed_row` is set when the budget ran out.
    pub fn finish(self, first_unprocessed_row: Option<usize>, elapsed: Duration) -> ImportReport {
        let unprocessed = first_unprocessed_row
            .map(|first| self.total_rows.saturating_sub(first))
            .unwrap_or(0);

        ImportReport {
            total_rows: self.total_rows,
            processed: self.processed,
            errored: self.errored,
            unprocessed_due_to_timeout: unprocessed,
            first_unprocessed_row,
            timed_out: first_unprocessed_row.is_some(),
            elapsed_ms: elapsed.as_millis() as u64,
            outcomes: self.outcomes,
            outcomes_truncated: self.truncated,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
