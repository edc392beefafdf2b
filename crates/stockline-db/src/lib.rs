//! # stockline-db: Database Layer for Stockline
//!
//! SQLite storage and the transactional services of the inventory backbone:
//! the stock ledger, bulk import, reconciliation sessions and stock alerts.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Data Flow                              │
//! │                                                                         │
//! │  Sale / Receiving / Upload / Audit                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (service/)    │───►│ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ StockLedger   │    │ StockRepo     │    │ 001_initial_ │  │   │
//! │  │   │ BulkImporter  │    │ MovementRepo  │    │ schema.sql   │  │   │
//! │  │   │ Reconciliation│    │ ...           │    │              │  │   │
//! │  │   │ AlertMonitor  │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Statement-level access per table
//! - [`service`] - Ledger, import, reconciliation and alert services
//! - [`config`] - File and environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockline_db::{Database, InventoryConfig};
//! use stockline_core::AdjustRequest;
//!
//! let config = InventoryConfig::load_default()?;
//! let db = Database::new(config.db_config()).await?;
//!
//! db.ledger()
//!     .adjust(AdjustRequest::new(&product_id, "store-1", -2, "sale:1042", "pos-3"))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, InventoryConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::alert::AlertRepository;
pub use repository::contingency::ContingencyRepository;
pub use repository::movement::MovementRepository;
pub use repository::product::ProductRepository;
pub use repository::reconciliation::ReconciliationRepository;
pub use repository::stock::StockRepository;

// Services
pub use service::alerts::AlertMonitor;
pub use service::import::{BulkImporter, ImportSettings, Stopwatch, WallClock};
pub use service::ledger::{AdjustOutcome, BalanceCheck, StockLedger};
pub use service::reconciliation::{
    AppliedCorrection, CloseReport, LineFailure, ReconciliationWorkflow,
};
