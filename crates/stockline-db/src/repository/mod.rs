//! # Repository Module
//!
//! Database repository implementations for Stockline.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Services                            │
//! │                                                                         │
//! │  Service (owns the transaction)                                        │
//! │       │                                                                 │
//! │       │  let mut tx = pool.begin().await?;                             │
//! │       │  StockRepository::adjust_in(&mut tx, &request, level)          │
//! │       │  ReconciliationRepository::mark_applied_in(&mut tx, ...)       │
//! │       │  tx.commit().await?;                                           │
//! │       ▼                                                                 │
//! │  Repository                                                            │
//! │  ├── reads:  &self, run on the pool                                    │
//! │  └── writes: `*_in(conn, ..)`, run on the caller's transaction         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog reads, identifier resolution
//! - [`StockRepository`](stock::StockRepository) - Stock reads and the versioned write
//! - [`MovementRepository`](movement::MovementRepository) - Append-only movement log
//! - [`ContingencyRepository`](contingency::ContingencyRepository) - Contingency gate
//! - [`ReconciliationRepository`](reconciliation::ReconciliationRepository) - Sessions and lines
//! - [`AlertRepository`](alert::AlertRepository) - Thresholds and derived alerts

pub mod alert;
pub mod contingency;
pub mod movement;
pub mod product;
pub mod reconciliation;
pub mod stock;
