//! `cardvault-ledger` — the stock movement ledger.
//!
//! Movements are the append-only history; balance rows are the authoritative
//! counts derived from them. This crate owns the pure pieces: movement shape
//! and validation, the balance arithmetic with its non-negativity guards,
//! history replay, and the events a committed write emits.

pub mod balance;
pub mod events;
pub mod movement;
pub mod replay;

pub use balance::{BalanceChange, StockBalance, merged, reversed};
pub use events::{
    LedgerEvent, MovementCorrected, MovementRecorded, MovementReverted, StockLow,
};
pub use movement::{Movement, MovementKind, MovementRequest, MovementType};
pub use replay::{ReplayedStock, replay_movements};
