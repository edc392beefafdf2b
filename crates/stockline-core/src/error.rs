//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger / reconciliation rule violations        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockline-core::import                                                │
//! │  └── RowError         - Per-row import failures (collected, not raised)│
//! │                                                                         │
//! │  stockline-db errors (separate crate)                                  │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Semantics
//! | Variant             | Retry?                                          |
//! |---------------------|-------------------------------------------------|
//! | `VersionConflict`   | Yes, after a fresh read                         |
//! | `InsufficientStock` | Only after the caller re-checks availability    |
//! | `ScopeBlocked`      | No, until the contingency resolves externally   |
//! | everything else     | No, caller logic error                          |

use thiserror::Error;

use crate::types::{ReconciliationScope, ReconciliationState, ScopeGranularity};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Adjustment would drive the stock record negative.
    ///
    /// ## User Workflow
    /// ```text
    /// Stock at L: 10
    ///      │
    ///      ▼
    /// Adjust(P, L, -15)
    ///      │
    ///      ▼
    /// InsufficientStock { available: 10, requested: 15 }
    ///      │
    ///      ▼
    /// Stock at L: 10 (unchanged, no movement written)
    /// ```
    #[error(
        "Insufficient stock for product {product_id} at {location_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: String,
        location_id: String,
        available: i64,
        requested: i64,
    },

    /// Another writer changed the stock record between read and write.
    #[error(
        "Stock record for product {product_id} at {location_id} changed concurrently (expected version {expected_version})"
    )]
    VersionConflict {
        product_id: String,
        location_id: String,
        expected_version: i64,
    },

    /// An open contingency prevents reconciliation in this exact scope.
    #[error("Reconciliation blocked for {scope} ({granularity} scope) by open contingency {contingency_id}")]
    ScopeBlocked {
        contingency_id: String,
        scope: ReconciliationScope,
        granularity: ScopeGranularity,
    },

    /// Reconciliation session does not exist.
    #[error("Reconciliation session not found: {0}")]
    SessionNotFound(String),

    /// Reconciliation session is terminal and cannot be changed.
    #[error("Reconciliation session {session_id} is {state}, cannot perform operation")]
    SessionClosed {
        session_id: String,
        state: ReconciliationState,
    },

    /// Close was requested while some lines have no physical count.
    #[error(
        "Reconciliation session {session_id} has {} lines without a physical count",
        .missing_products.len()
    )]
    LineIncomplete {
        session_id: String,
        missing_products: Vec<String>,
    },

    /// The product is not part of the session's snapshot.
    #[error("Product {product_id} is not part of reconciliation session {session_id}")]
    LineNotFound {
        session_id: String,
        product_id: String,
    },

    /// Requested state change is not allowed.
    #[error("Invalid transition for reconciliation session {session_id}: {reason}")]
    InvalidTransition { session_id: String, reason: String },

    /// Import request has more rows than the configured cap.
    #[error("Import has {rows} rows, maximum is {max}")]
    ImportTooLarge { rows: usize, max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true when retrying after a fresh read can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::VersionConflict { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any read or write happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., non-numeric quantity).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
