//! # Service Module
//!
//! Inventory services built on the repositories. Each service owns its
//! transaction boundaries; repositories only run statements.
//!
//! ```text
//! ┌───────────────────┐   ┌───────────────────┐   ┌──────────────────────┐
//! │   BulkImporter    │   │ Reconciliation-   │   │     StockLedger      │
//! │   (import.rs)     │   │ Workflow          │   │     (ledger.rs)      │
//! │                   │   │ (reconciliation)  │   │                      │
//! └─────────┬─────────┘   └─────────┬─────────┘   └──────────┬───────────┘
//!           │  StockRepository::adjust_in (CAS + movement)    │
//!           └──────────────────────┬──────────────────────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │   AlertMonitor   │  re-evaluated after commit
//!                         │   (alerts.rs)    │
//!                         └──────────────────┘
//! ```

pub mod alerts;
pub mod import;
pub mod ledger;
pub mod reconciliation;
