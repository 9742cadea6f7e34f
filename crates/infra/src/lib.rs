//! Infrastructure layer: storage backends, services, audit and alerting.
//!
//! The services are the only write path into the vault. They validate against
//! catalog state, hand the store one atomic write, and fan committed facts out
//! to observers.

pub mod audit;
pub mod catalog_service;
pub mod ledger_service;
pub mod notify;
pub mod store;

pub use audit::{AuditEntry, AuditLog, AuditWriter, InMemoryAuditLog};
pub use catalog_service::{CatalogService, NewBank, NewCard, NewLocation};
pub use ledger_service::{
    BalanceCorrection, ConsistencyReport, LedgerError, LedgerService, MovementReceipt,
    RebuildReport,
};
pub use notify::LowStockNotifier;
pub use store::{
    CatalogStore, InMemoryVault, LedgerStore, MovementWrite, PostgresVault, StoreError,
    VaultStore,
};
