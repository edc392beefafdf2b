//! # Alert Evaluation
//!
//! Pure classification of a stock quantity against its thresholds.
//!
//! ## Rules (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quantity == 0                              → critico    (ref 0)        │
//! │  0 < quantity <= minimo                     → bajo       (ref minimo)   │
//! │  quantity >= maximo                         → exceso     (ref maximo)   │
//! │  minimo < quantity <= punto_reposicion      → reposicion (ref punto)    │
//! │  otherwise                                  → no alert                  │
//! │                                                                         │
//! │   0     minimo        punto_reposicion          maximo                  │
//! │   ├──────┼──────────────────┼──────────────────────┼──────────►         │
//! │  crit.  bajo           reposicion       (none)          exceso          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here reads or writes the ledger; `stockline-db` persists the
//! result and clears superseded tiers.

use chrono::{DateTime, Utc};

use crate::types::{AlertRecord, AlertTier, StockThresholds};

/// A classified tier together with the threshold that was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertLevel {
    pub tier: AlertTier,
    pub reference_quantity: i64,
}

/// Classifies a quantity against configured thresholds.
///
/// ## Example
/// ```rust
/// use stockline_core::alert::classify;
/// use stockline_core::{AlertTier, StockThresholds};
///
/// let t = StockThresholds {
///     product_id: "P1".into(),
///     location_id: "L1".into(),
///     minimo: 5,
///     maximo: Some(100),
///     punto_reposicion: Some(20),
/// };
/// assert_eq!(classify(0, &t).unwrap().tier, AlertTier::Critico);
/// assert_eq!(classify(15, &t).unwrap().tier, AlertTier::Reposicion);
/// assert!(classify(50, &t).is_none());
/// ```
pub fn classify(quantity: i64, thresholds: &StockThresholds) -> Option<AlertLevel> {
    if quantity <= 0 {
        return Some(AlertLevel {
            tier: AlertTier::Critico,
            reference_quantity: 0,
        });
    }

    if quantity <= thresholds.minimo {
        return Some(AlertLevel {
            tier: AlertTier::Bajo,
            reference_quantity: thresholds.minimo,
        });
    }

    if let Some(maximo) = thresholds.maximo {
        if quantity >= maximo {
            return Some(AlertLevel {
                tier: AlertTier::Exceso,
                reference_quantity: maximo,
            });
        }
    }

    match thresholds.punto_reposicion {
        Some(punto) if quantity <= punto => Some(AlertLevel {
            tier: AlertTier::Reposicion,
            reference_quantity: punto,
        }),
        _ => None,
    }
}

/// Builds the alert record for a pair, if any tier applies.
pub fn evaluate(
    quantity: i64,
    thresholds: &StockThresholds,
    detected_at: DateTime<Utc>,
) -> Option<AlertRecord> {
    classify(quantity, thresholds).map(|level| AlertRecord {
        product_id: thresholds.product_id.clone(),
        location_id: thresholds.location_id.clone(),
        tier: level.tier,
        current_quantity: quantity,
        reference_quantity: level.reference_quantity,
        detected_at,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
