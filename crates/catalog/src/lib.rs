//! `cardvault-catalog` — banks, card types, and storage locations.
//!
//! Catalog entities describe *what exists*; how much of it sits where is the
//! ledger's business. The only stock-adjacent state here is the cached
//! per-card total, and the guards that keep it honest.

pub mod bank;
pub mod card;
pub mod location;

pub use bank::{Bank, ImportBankRef, resolve_bank_for_import};
pub use card::{Card, CardClass, CardThresholds, CardUpdate};
pub use location::Location;
