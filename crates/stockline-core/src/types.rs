//! # Domain Types
//!
//! Core domain types used throughout Stockline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  StockRecord    │   │    Movement     │   │ StockThresholds │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  product_id     │1─N│  stock_record_id│   │  minimo         │       │
//! │  │  location_id    │   │  kind           │   │  maximo?        │       │
//! │  │  quantity >= 0  │   │  quantity > 0   │   │  punto_repos.?  │       │
//! │  │  version        │   │  reason, actor  │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ReconciliationSession│   │   Contingency    │   │   AlertRecord   │  │
//! │  │  ─────────────────  │   │  ──────────────  │   │  ─────────────  │  │
//! │  │  scope (loc, cat?)  │   │  scope (loc,cat?)│   │  tier           │  │
//! │  │  state              │   │  kind, status    │   │  current / ref  │  │
//! │  │  lines[]            │   └──────────────────┘   └─────────────────┘  │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, barcode, scope key) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Product
// =============================================================================

/// Reference data for a stocked product.
///
/// Products are owned by the catalog; the ledger only reads them to resolve
/// import identifiers and reconciliation scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Display name.
    pub name: String,

    /// Category used for scoped reconciliation.
    pub category_id: Option<String>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns true when `identifier` names this product by SKU, barcode or id.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.sku == identifier
            || self.barcode.as_deref() == Some(identifier)
            || self.id == identifier
    }
}

// =============================================================================
// Stock Record
// =============================================================================

/// Quantity of one product at one location.
///
/// ## Optimistic Versioning
/// `version` starts at 1 on the first committed adjustment and increments on
/// every successful write. Writers read `version`, then write
/// `WHERE version = <read>`; zero affected rows means someone else won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRecord {
    pub id: String,
    pub product_id: String,
    pub location_id: String,
    /// Units on hand. Never negative.
    pub quantity: i64,
    pub version: i64,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

/// The ledger's view of a (product, location) pair at read time.
///
/// An absent record reads as quantity 0, version 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StockLevel {
    pub quantity: i64,
    pub version: i64,
}

impl StockLevel {
    /// Level of a pair that has never been adjusted.
    pub const fn absent() -> Self {
        StockLevel {
            quantity: 0,
            version: 0,
        }
    }

    /// Returns true when no stock record exists yet.
    pub const fn is_absent(&self) -> bool {
        self.version == 0
    }

    /// Level after one committed write of `delta`.
    pub const fn after(&self, delta: i64) -> Self {
        StockLevel {
            quantity: self.quantity + delta,
            version: self.version + 1,
        }
    }
}

impl From<&StockRecord> for StockLevel {
    fn from(record: &StockRecord) -> Self {
        StockLevel {
            quantity: record.quantity,
            version: record.version,
        }
    }
}

// =============================================================================
// Movement
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock coming in (positive delta).
    Entrada,
    /// Stock going out (negative delta).
    Salida,
}

impl MovementKind {
    /// Kind for a signed delta. Zero has no movement.
    pub fn from_delta(delta: i64) -> Option<Self> {
        match delta.signum() {
            1 => Some(MovementKind::Entrada),
            -1 => Some(MovementKind::Salida),
            _ => None,
        }
    }

    /// Applies the direction to a positive magnitude.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::Entrada => quantity,
            MovementKind::Salida => -quantity,
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementKind::Entrada => write!(f, "entrada"),
            MovementKind::Salida => write!(f, "salida"),
        }
    }
}

/// Immutable record of one committed quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Movement {
    pub id: String,
    pub stock_record_id: String,
    pub product_id: String,
    pub location_id: String,
    pub kind: MovementKind,
    /// Always a positive magnitude; direction lives in `kind`.
    pub quantity: i64,
    pub reason: String,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Signed effect of this movement on the record's quantity.
    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

/// A single ledger adjustment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustRequest {
    pub product_id: String,
    pub location_id: String,
    /// Positive for entrada, negative for salida.
    pub delta: i64,
    pub reason: String,
    pub actor_id: String,
}

impl AdjustRequest {
    pub fn new(
        product_id: impl Into<String>,
        location_id: impl Into<String>,
        delta: i64,
        reason: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        AdjustRequest {
            product_id: product_id.into(),
            location_id: location_id.into(),
            delta,
            reason: reason.into(),
            actor_id: actor_id.into(),
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Lifecycle state of a reconciliation session.
///
/// ```text
///   none ──open──► pendiente ──first count──► en_proceso
///                      │                          │
///                      ├──────────close───────────┼──► resuelta  (terminal)
///                      └──────────block───────────┴──► bloqueada (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    /// Opened, snapshot taken, no counts yet.
    Pendiente,
    /// At least one physical count recorded.
    EnProceso,
    /// Closed with every difference applied to the ledger.
    Resuelta,
    /// Abandoned because a contingency gated the scope.
    Bloqueada,
}

impl ReconciliationState {
    /// Open sessions accept counts and can be closed.
    pub const fn is_open(&self) -> bool {
        matches!(
            self,
            ReconciliationState::Pendiente | ReconciliationState::EnProceso
        )
    }

    pub const fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl Default for ReconciliationState {
    fn default() -> Self {
        ReconciliationState::Pendiente
    }
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationState::Pendiente => write!(f, "pendiente"),
            ReconciliationState::EnProceso => write!(f, "en_proceso"),
            ReconciliationState::Resuelta => write!(f, "resuelta"),
            ReconciliationState::Bloqueada => write!(f, "bloqueada"),
        }
    }
}

/// Granularity of a scope key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScopeGranularity {
    /// Whole location (no category).
    General,
    /// Single category within a location.
    Categoria,
}

impl fmt::Display for ScopeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeGranularity::General => write!(f, "general"),
            ScopeGranularity::Categoria => write!(f, "categoria"),
        }
    }
}

/// Structured scope key shared by sessions and contingencies.
///
/// Scopes match exactly: `(L, Some(A))`, `(L, Some(B))` and `(L, None)` are
/// three unrelated keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationScope {
    pub location_id: String,
    /// `None` is the general (location-wide) scope.
    pub category_id: Option<String>,
}

impl ReconciliationScope {
    /// Location-wide scope.
    pub fn general(location_id: impl Into<String>) -> Self {
        ReconciliationScope {
            location_id: location_id.into(),
            category_id: None,
        }
    }

    /// Scope limited to one category.
    pub fn category(location_id: impl Into<String>, category_id: impl Into<String>) -> Self {
        ReconciliationScope {
            location_id: location_id.into(),
            category_id: Some(category_id.into()),
        }
    }

    pub fn granularity(&self) -> ScopeGranularity {
        match self.category_id {
            Some(_) => ScopeGranularity::Categoria,
            None => ScopeGranularity::General,
        }
    }
}

impl fmt::Display for ReconciliationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category_id {
            Some(category) => write!(f, "location {} / category {}", self.location_id, category),
            None => write!(f, "location {} / general", self.location_id),
        }
    }
}

/// One product's theoretical vs physical comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReconciliationLine {
    pub session_id: String,
    pub product_id: String,
    /// Ledger quantity frozen when the session opened.
    pub theoretical_quantity: i64,
    pub physical_quantity: Option<i64>,
    /// physical − theoretical, present once counted.
    pub difference: Option<i64>,
    /// Movement that applied this line's correction, once committed.
    pub applied_movement_id: Option<String>,
}

/// A bounded theoretical/physical comparison for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationSession {
    pub id: String,
    pub scope: ReconciliationScope,
    pub state: ReconciliationState,
    pub opened_by: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub lines: Vec<ReconciliationLine>,
}

impl ReconciliationSession {
    pub fn line(&self, product_id: &str) -> Option<&ReconciliationLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }
}

// =============================================================================
// Contingency
// =============================================================================

/// What a contingency is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyKind {
    /// Discrepancy raised against a category reconciliation.
    Conciliacion,
    /// Discrepancy raised against a location-wide reconciliation.
    ConciliacionGeneral,
    /// Anything else; never gates reconciliation.
    Otro,
}

/// Review status, managed outside this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyStatus {
    Pendiente,
    EnRevision,
    Resuelto,
    Rechazado,
}

impl ContingencyStatus {
    /// Statuses that gate reconciliation in the contingency's scope.
    pub const OPEN: [ContingencyStatus; 2] =
        [ContingencyStatus::Pendiente, ContingencyStatus::EnRevision];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

/// Externally raised, human-tracked discrepancy report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Contingency {
    pub id: String,
    pub location_id: String,
    pub category_id: Option<String>,
    pub kind: ContingencyKind,
    pub status: ContingencyStatus,
    pub description: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Contingency {
    pub fn scope(&self) -> ReconciliationScope {
        ReconciliationScope {
            location_id: self.location_id.clone(),
            category_id: self.category_id.clone(),
        }
    }
}

// =============================================================================
// Alerts
// =============================================================================

/// Configured stock thresholds for a (product, location) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockThresholds {
    pub product_id: String,
    pub location_id: String,
    /// At or below this (but above zero) the pair is `bajo`.
    pub minimo: i64,
    /// At or above this the pair is `exceso`.
    pub maximo: Option<i64>,
    /// Above `minimo` and at or below this the pair needs `reposicion`.
    pub punto_reposicion: Option<i64>,
}

/// Alert severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    /// Out of stock.
    Critico,
    /// At or below the minimum.
    Bajo,
    /// At or above the maximum.
    Exceso,
    /// Inside the reorder band.
    Reposicion,
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertTier::Critico => write!(f, "critico"),
            AlertTier::Bajo => write!(f, "bajo"),
            AlertTier::Exceso => write!(f, "exceso"),
            AlertTier::Reposicion => write!(f, "reposicion"),
        }
    }
}

/// Derived alert, regenerated on every re-evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AlertRecord {
    pub product_id: String,
    pub location_id: String,
    pub tier: AlertTier,
    pub current_quantity: i64,
    /// The threshold that was crossed.
    pub reference_quantity: i64,
    #[ts(as = "String")]
    pub detected_at: DateTime<Utc>,
}

// =============================================================================
// Bulk Import Input
// =============================================================================

/// How a row's target quantity is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Set the absolute quantity.
    Establecer,
    /// Add to the current quantity.
    Incrementar,
    /// Subtract from the current quantity, floored at zero.
    Decrementar,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Establecer => write!(f, "establecer"),
            ImportMode::Incrementar => write!(f, "incrementar"),
            ImportMode::Decrementar => write!(f, "decrementar"),
        }
    }
}

/// A spreadsheet cell as handed over by the upstream parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum QuantityCell {
    Number(f64),
    Text(String),
}

impl From<i64> for QuantityCell {
    fn from(value: i64) -> Self {
        QuantityCell::Number(value as f64)
    }
}

impl From<&str> for QuantityCell {
    fn from(value: &str) -> Self {
        QuantityCell::Text(value.to_string())
    }
}

/// One uploaded row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportRow {
    /// SKU, barcode or product id.
    pub identifier: String,
    pub target_quantity: QuantityCell,
}

impl ImportRow {
    pub fn new(identifier: impl Into<String>, target_quantity: impl Into<QuantityCell>) -> Self {
        ImportRow {
            identifier: identifier.into(),
            target_quantity: target_quantity.into(),
        }
    }
}

/// A full bulk import request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportRequest {
    pub location_id: String,
    pub actor_id: String,
    pub mode: ImportMode,
    pub rows: Vec<ImportRow>,
}

// =============================================================================
// Unit Tests
// =============================================================================
