//! Storage contracts for the catalog and the ledger.
//!
//! Two backends implement these traits: [`InMemoryVault`] for dev/test and
//! [`PostgresVault`] for production. Both enforce the same rules inside their
//! write paths, so a caller cannot tell them apart by misbehaving.
//!
//! The one operation that matters here is [`LedgerStore::apply_movement`]:
//! a movement line plus all of its balance effects commit as a single unit,
//! or nothing commits at all. Everything the consistency model promises
//! hangs off that.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryVault;
pub use postgres::PostgresVault;

use async_trait::async_trait;
use thiserror::Error;

use cardvault_catalog::{Bank, Card, Location};
use cardvault_core::{BankId, CardId, DomainError, LocationId, MovementId};
use cardvault_ledger::{BalanceChange, Movement, ReplayedStock, StockBalance};

/// Storage-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain guard tripped inside the write; the transaction was rolled
    /// back in full.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A uniqueness or referential constraint was violated.
    #[error("constraint violated in {operation}: {message}")]
    Constraint {
        operation: &'static str,
        message: String,
    },

    /// A concurrent writer got there first.
    #[error("conflict in {operation}: {message}")]
    Conflict {
        operation: &'static str,
        message: String,
    },

    /// The backend was unreachable or failed mid-operation.
    #[error("storage unavailable in {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub(crate) fn constraint(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Constraint {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn conflict(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            message: message.into(),
        }
    }
}

/// How a movement write hits the ledger inside its transaction.
#[derive(Debug, Clone)]
pub enum MovementWrite {
    /// Append a new line.
    Insert(Movement),
    /// Swap a line in place (admin correction). The line keeps its
    /// `recorded_at`, so it keeps its spot in the history.
    Replace(Movement),
    /// Remove a line (admin revert).
    Delete(MovementId),
}

/// Catalog persistence: banks, cards, locations.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_bank(&self, bank: Bank) -> Result<(), StoreError>;
    async fn bank(&self, id: BankId) -> Result<Option<Bank>, StoreError>;
    async fn banks(&self) -> Result<Vec<Bank>, StoreError>;
    async fn deactivate_bank(&self, id: BankId) -> Result<(), StoreError>;

    async fn insert_card(&self, card: Card) -> Result<(), StoreError>;
    async fn card(&self, id: CardId) -> Result<Option<Card>, StoreError>;
    async fn cards(&self) -> Result<Vec<Card>, StoreError>;
    async fn cards_for_bank(&self, bank_id: BankId) -> Result<Vec<Card>, StoreError>;

    /// Persist a metadata change. The cached stock total is *not* written
    /// through this path; only ledger writes may touch it.
    async fn update_card_metadata(&self, card: &Card) -> Result<(), StoreError>;

    /// Soft-delete a card. Fails while the card still holds stock; the check
    /// and the flag flip are one atomic step.
    async fn deactivate_card(&self, id: CardId) -> Result<(), StoreError>;

    async fn insert_location(&self, location: Location) -> Result<(), StoreError>;
    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;
    async fn locations(&self) -> Result<Vec<Location>, StoreError>;

    /// Soft-delete a location. Fails while any card still has stock there,
    /// so stock can never be stranded at a retired location.
    async fn deactivate_location(&self, id: LocationId) -> Result<(), StoreError>;
}

/// Ledger persistence: balance rows and the movement history.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Quantity of one (card, location) pair. Zero when no row exists.
    async fn balance(&self, card_id: CardId, location_id: LocationId)
    -> Result<i64, StoreError>;

    async fn balances_for_card(&self, card_id: CardId) -> Result<Vec<StockBalance>, StoreError>;
    async fn balances_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockBalance>, StoreError>;

    async fn movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Full history of one card, oldest line first.
    async fn movements_for_card(&self, card_id: CardId) -> Result<Vec<Movement>, StoreError>;

    /// Most recent lines across all cards, newest first.
    async fn recent_movements(&self, limit: usize) -> Result<Vec<Movement>, StoreError>;

    /// The atomic unit of the ledger.
    ///
    /// Persists the movement write, applies each per-location change and the
    /// card-total delta, all or nothing. Any balance that would go negative
    /// aborts the whole write with
    /// [`DomainError::InsufficientStock`](cardvault_core::DomainError).
    /// Returns the card's new total.
    async fn apply_movement(
        &self,
        card_id: CardId,
        write: MovementWrite,
        changes: &[BalanceChange],
        total_delta: i64,
    ) -> Result<i64, StoreError>;

    /// Reconciliation: atomically overwrite a card's balance rows and cached
    /// total with the result of a history replay.
    async fn replace_card_stock(&self, replay: &ReplayedStock) -> Result<(), StoreError>;
}

/// A backend that persists both the catalog and the ledger.
///
/// Services hold an `Arc<dyn VaultStore>` so the two concerns always point at
/// the same backend and the movement write path can read catalog rows.
pub trait VaultStore: CatalogStore + LedgerStore {}

impl<T: CatalogStore + LedgerStore + ?Sized> VaultStore for T {}
