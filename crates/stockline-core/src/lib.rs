//! # stockline-core: Pure Inventory Logic for Stockline
//!
//! This crate holds the inventory rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │       Callers (import pipeline, reconciliation UI, POS)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockline-db (services + SQLite)                │   │
//! │  │   StockLedger • BulkImporter • ReconciliationWorkflow • Alerts  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockline-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐ ┌──────────┐  │   │
//! │  │   │  types  │ │validation│ │  alert  │ │ import │ │reconcil. │  │   │
//! │  │   └─────────┘ └──────────┘ └─────────┘ └────────┘ └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StockRecord, Movement, ReconciliationSession, ...)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`alert`] - Threshold classification
//! - [`import`] - Bulk import row planning and reporting
//! - [`reconciliation`] - Session state-machine rules
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::import::plan_row;
//! use stockline_core::ImportMode;
//!
//! // Uploaded "set to 5" against 8 on hand
//! let plan = plan_row(ImportMode::Establecer, 8, 5).unwrap();
//! assert_eq!(plan.delta, -3);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alert;
pub mod error;
pub mod import;
pub mod reconciliation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use import::{ImportReport, RowError, RowOutcome, RowStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest quantity a stock record may hold.
///
/// Keeps `incrementar` sums and float cells well inside i64 and f64 precision.
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000_000;

/// Default cap on rows per import request.
pub const MAX_IMPORT_ROWS: usize = 1000;

/// Default rows per import batch transaction.
pub const DEFAULT_IMPORT_BATCH_SIZE: usize = 20;

/// Default wall-clock budget for one import request, in seconds.
pub const DEFAULT_IMPORT_BUDGET_SECS: u64 = 25;

/// Default number of row outcomes kept in an import report.
pub const DEFAULT_IMPORT_DETAIL_LIMIT: usize = 200;

/// Default attempts for caller-side retry of version conflicts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
