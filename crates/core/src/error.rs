//! Domain error model.

use core::fmt;

use thiserror::Error;

use crate::id::{BankId, CardId, LocationId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// The balance a stock guard was evaluated against.
///
/// Exits and transfers draw from a single location row; the per-card total
/// is guarded separately so a drifted cache can never be driven negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockScope {
    /// Balance of one (card, location) pair.
    Location(LocationId),
    /// The per-card total across all locations.
    CardTotal,
}

impl fmt::Display for StockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(id) => write!(f, "location {id}"),
            Self::CardTotal => write!(f, "card total"),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock rules). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, inactive card).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. corrupt movement history).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// A withdrawal would drive a balance below zero.
    #[error(
        "insufficient stock for card {card_id} at {scope}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        card_id: CardId,
        scope: StockScope,
        requested: i64,
        available: i64,
    },

    /// Card and location belong to different banks.
    #[error(
        "card {card_id} belongs to bank {card_bank} but location {location_id} belongs to bank {location_bank}"
    )]
    OwnershipMismatch {
        card_id: CardId,
        card_bank: BankId,
        location_id: LocationId,
        location_bank: BankId,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_amounts() {
        let card = CardId::new();
        let location = LocationId::new();
        let err = DomainError::InsufficientStock {
            card_id: card,
            scope: StockScope::Location(location),
            requested: 30,
            available: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("requested 30"));
        assert!(msg.contains("available 10"));
        assert!(msg.contains(&location.to_string()));
    }

    #[test]
    fn not_found_names_resource_and_id() {
        let id = CardId::new();
        let err = DomainError::not_found("card", id);
        assert_eq!(err.to_string(), format!("card not found: {id}"));
    }
}
