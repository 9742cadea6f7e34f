use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cardvault_core::{CardId, DomainError, DomainResult, LocationId, MovementId, UserId};

use crate::balance::BalanceChange;

/// How a movement changes stock: into the vault, out of it, or between
/// locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entry,
    Exit,
    Transfer,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            "transfer" => Ok(Self::Transfer),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected entry, exit or transfer)"
            ))),
        }
    }
}

/// A movement type with the location endpoints its type requires.
///
/// Once a request validates into a `MovementKind`, an entry without a
/// destination or a transfer onto itself is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Entry { to: LocationId },
    Exit { from: LocationId },
    Transfer { from: LocationId, to: LocationId },
}

impl MovementKind {
    pub fn movement_type(&self) -> MovementType {
        match self {
            Self::Entry { .. } => MovementType::Entry,
            Self::Exit { .. } => MovementType::Exit,
            Self::Transfer { .. } => MovementType::Transfer,
        }
    }

    pub fn from_location(&self) -> Option<LocationId> {
        match self {
            Self::Entry { .. } => None,
            Self::Exit { from } | Self::Transfer { from, .. } => Some(*from),
        }
    }

    pub fn to_location(&self) -> Option<LocationId> {
        match self {
            Self::Entry { to } | Self::Transfer { to, .. } => Some(*to),
            Self::Exit { .. } => None,
        }
    }

    /// Every location this movement touches, source first.
    pub fn endpoints(&self) -> impl Iterator<Item = LocationId> {
        [self.from_location(), self.to_location()]
            .into_iter()
            .flatten()
    }

    /// The per-location balance changes this movement causes.
    pub fn balance_changes(&self, quantity: i64) -> Vec<BalanceChange> {
        match self {
            Self::Entry { to } => vec![BalanceChange {
                location_id: *to,
                delta: quantity,
            }],
            Self::Exit { from } => vec![BalanceChange {
                location_id: *from,
                delta: -quantity,
            }],
            Self::Transfer { from, to } => vec![
                BalanceChange {
                    location_id: *from,
                    delta: -quantity,
                },
                BalanceChange {
                    location_id: *to,
                    delta: quantity,
                },
            ],
        }
    }

    /// The change to the card's total across all locations.
    pub fn total_delta(&self, quantity: i64) -> i64 {
        match self {
            Self::Entry { .. } => quantity,
            Self::Exit { .. } => -quantity,
            Self::Transfer { .. } => 0,
        }
    }
}

/// What a caller asks the ledger to record. Unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub card_id: CardId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub reason: String,
    pub recorded_by: UserId,
}

impl MovementRequest {
    /// Check quantity, reason and endpoint presence for the movement type.
    ///
    /// Endpoint fields the type does not use are ignored, not rejected.
    /// Import templates routinely send both columns filled.
    pub fn validate(&self) -> DomainResult<MovementKind> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "movement quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("movement reason cannot be empty"));
        }
        match self.movement_type {
            MovementType::Entry => match self.to_location_id {
                Some(to) => Ok(MovementKind::Entry { to }),
                None => Err(DomainError::validation(
                    "entry movements require a destination location",
                )),
            },
            MovementType::Exit => match self.from_location_id {
                Some(from) => Ok(MovementKind::Exit { from }),
                None => Err(DomainError::validation(
                    "exit movements require a source location",
                )),
            },
            MovementType::Transfer => match (self.from_location_id, self.to_location_id) {
                (Some(from), Some(to)) if from == to => Err(DomainError::validation(
                    "transfer source and destination must differ",
                )),
                (Some(from), Some(to)) => Ok(MovementKind::Transfer { from, to }),
                _ => Err(DomainError::validation(
                    "transfer movements require a source and a destination location",
                )),
            },
        }
    }
}

/// One immutable line of the stock ledger.
///
/// Movements are facts. Admin corrections rewrite the affected line and its
/// balance effects in one transaction; nothing else may touch a recorded
/// movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub card_id: CardId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub reason: String,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl Movement {
    /// Build a ledger line from a validated request. Endpoints the type does
    /// not use are dropped rather than stored.
    pub fn record(
        id: MovementId,
        card_id: CardId,
        kind: MovementKind,
        quantity: i64,
        reason: impl Into<String>,
        recorded_by: UserId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            card_id,
            movement_type: kind.movement_type(),
            quantity,
            from_location_id: kind.from_location(),
            to_location_id: kind.to_location(),
            reason: reason.into().trim().to_owned(),
            recorded_by,
            recorded_at,
        }
    }

    /// Recover the typed endpoints of a stored line.
    ///
    /// Lines written through [`Movement::record`] always round-trip; a line
    /// that does not is corrupt storage, not caller error.
    pub fn kind(&self) -> DomainResult<MovementKind> {
        match self.movement_type {
            MovementType::Entry => match self.to_location_id {
                Some(to) => Ok(MovementKind::Entry { to }),
                None => Err(self.corrupt("entry without a destination location")),
            },
            MovementType::Exit => match self.from_location_id {
                Some(from) => Ok(MovementKind::Exit { from }),
                None => Err(self.corrupt("exit without a source location")),
            },
            MovementType::Transfer => match (self.from_location_id, self.to_location_id) {
                (Some(from), Some(to)) if from == to => {
                    Err(self.corrupt("transfer from a location onto itself"))
                }
                (Some(from), Some(to)) => Ok(MovementKind::Transfer { from, to }),
                _ => Err(self.corrupt("transfer missing an endpoint")),
            },
        }
    }

    pub fn balance_changes(&self) -> DomainResult<Vec<BalanceChange>> {
        Ok(self.kind()?.balance_changes(self.quantity))
    }

    pub fn total_delta(&self) -> DomainResult<i64> {
        Ok(self.kind()?.total_delta(self.quantity))
    }

    fn corrupt(&self, what: &str) -> DomainError {
        DomainError::invariant(format!("movement {} is corrupt: {what}", self.id))
    }
}
