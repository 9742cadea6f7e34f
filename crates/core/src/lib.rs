//! `cardvault-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, StockScope};
pub use id::{BankId, CardId, LocationId, MovementId, UserId};
