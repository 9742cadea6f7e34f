use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cardvault_core::CardId;
use cardvault_events::Event;

use crate::movement::Movement;

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement: Movement,
    pub card_name: String,
    /// Card total after the movement committed.
    pub card_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReverted {
    /// The line that was removed from the ledger.
    pub movement: Movement,
    pub card_name: String,
    pub card_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementCorrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCorrected {
    pub before: Movement,
    pub after: Movement,
    pub card_name: String,
    pub card_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLow. Emitted whenever a committed write leaves a card's total
/// at or below its minimum threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLow {
    pub card_id: CardId,
    pub card_name: String,
    pub quantity: i64,
    pub min_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Facts emitted by the ledger after a commit.
///
/// Snapshot fields (card name, new total) are carried on the event so
/// observers need no follow-up reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    MovementRecorded(MovementRecorded),
    MovementReverted(MovementReverted),
    MovementCorrected(MovementCorrected),
    StockLow(StockLow),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementRecorded(_) => "ledger.movement.recorded",
            LedgerEvent::MovementReverted(_) => "ledger.movement.reverted",
            LedgerEvent::MovementCorrected(_) => "ledger.movement.corrected",
            LedgerEvent::StockLow(_) => "ledger.stock.low",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementRecorded(e) => e.occurred_at,
            LedgerEvent::MovementReverted(e) => e.occurred_at,
            LedgerEvent::MovementCorrected(e) => e.occurred_at,
            LedgerEvent::StockLow(e) => e.occurred_at,
        }
    }
}
