//! # Validation Module
//!
//! Input validation for ledger, reconciliation and threshold requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (import pipeline / reconciliation UI)                 │
//! │  └── Shape of the request (deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Business rule validation, before any read or write                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0), CHECK (movement quantity > 0)              │
//! │  └── UNIQUE (product, location), one open session per scope            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{AdjustRequest, StockThresholds};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted identifier (ids, SKUs, actor ids).
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Longest accepted movement reason.
pub const MAX_REASON_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required identifier field.
///
/// ## Example
/// ```rust
/// use stockline_core::validation::validate_identifier;
///
/// assert!(validate_identifier("location_id", "LOC-1").is_ok());
/// assert!(validate_identifier("location_id", "  ").is_err());
/// ```
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    Ok(())
}

/// Validates a generated entity id (session ids, record ids).
///
/// ## Example
/// ```rust
/// use stockline_core::validation::validate_uuid;
///
/// assert!(validate_uuid("session_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("session_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates a movement reason.
///
/// Every movement must say why it happened; an empty reason is rejected.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.len() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an adjustment delta. Zero deltas would produce no movement.
pub fn validate_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        });
    }

    Ok(())
}

/// Validates a physical count entered during reconciliation.
pub fn validate_count(quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "physical_quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a full adjustment request.
pub fn validate_adjust_request(request: &AdjustRequest) -> ValidationResult<()> {
    validate_identifier("product_id", &request.product_id)?;
    validate_identifier("location_id", &request.location_id)?;
    validate_identifier("actor_id", &request.actor_id)?;
    validate_reason(&request.reason)?;
    validate_delta(request.delta)
}

/// Validates threshold configuration.
///
/// ## Rules
/// - `minimo >= 0`
/// - `maximo > minimo` when set
/// - `minimo <= punto_reposicion` when set, and below `maximo` when both set
pub fn validate_thresholds(thresholds: &StockThresholds) -> ValidationResult<()> {
    validate_identifier("product_id", &thresholds.product_id)?;
    validate_identifier("location_id", &thresholds.location_id)?;

    if thresholds.minimo < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "minimo".to_string(),
        });
    }

    if let Some(maximo) = thresholds.maximo {
        if maximo <= thresholds.minimo {
            return Err(ValidationError::OutOfRange {
                field: "maximo".to_string(),
                min: thresholds.minimo + 1,
                max: i64::MAX,
            });
        }
    }

    if let Some(punto) = thresholds.punto_reposicion {
        let upper = thresholds.maximo.map(|m| m - 1).unwrap_or(i64::MAX);
        if punto < thresholds.minimo || punto > upper {
            return Err(ValidationError::OutOfRange {
                field: "punto_reposicion".to_string(),
                min: thresholds.minimo,
                max: upper,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
