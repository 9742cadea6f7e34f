//! Catalog orchestration: thin create/read/update over banks, cards and
//! locations.
//!
//! Everything stock-related is deliberately absent. A card's cached total is
//! written only by the ledger, and the stock-guarded deactivations run inside
//! the store so the guard and the flag flip cannot be split.

use std::sync::Arc;

use chrono::Utc;

use cardvault_catalog::{Bank, Card, CardClass, CardThresholds, CardUpdate, Location};
use cardvault_core::{BankId, CardId, DomainError, LocationId};

use crate::ledger_service::LedgerError;
use crate::store::VaultStore;

/// Input for registering a bank.
#[derive(Debug, Clone)]
pub struct NewBank {
    pub code: String,
    pub name: String,
}

/// Input for adding a card type to the catalog.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub bank_id: BankId,
    pub name: String,
    pub class: CardClass,
    pub thresholds: CardThresholds,
}

/// Input for registering a storage location.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub bank_id: BankId,
    pub name: String,
    pub site: Option<String>,
}

/// Master-data operations over the catalog.
pub struct CatalogService {
    store: Arc<dyn VaultStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    pub async fn create_bank(&self, input: NewBank) -> Result<Bank, LedgerError> {
        let bank = Bank::new(BankId::new(), input.code, input.name, Utc::now())?;
        self.store.insert_bank(bank.clone()).await?;
        tracing::info!(bank_id = %bank.id(), code = bank.code(), "bank created");
        Ok(bank)
    }

    pub async fn bank(&self, id: BankId) -> Result<Bank, LedgerError> {
        self.store
            .bank(id)
            .await?
            .ok_or_else(|| DomainError::not_found("bank", id).into())
    }

    pub async fn banks(&self) -> Result<Vec<Bank>, LedgerError> {
        Ok(self.store.banks().await?)
    }

    pub async fn create_card(&self, input: NewCard) -> Result<Card, LedgerError> {
        let bank = self.bank(input.bank_id).await?;
        if !bank.is_active() {
            return Err(DomainError::validation(format!(
                "bank '{}' ({}) is inactive",
                bank.name(),
                bank.id()
            ))
            .into());
        }
        let card = Card::new(
            CardId::new(),
            bank.id(),
            input.name,
            input.class,
            input.thresholds,
            Utc::now(),
        )?;
        self.store.insert_card(card.clone()).await?;
        tracing::info!(card_id = %card.id(), bank_id = %bank.id(), "card created");
        Ok(card)
    }

    pub async fn card(&self, id: CardId) -> Result<Card, LedgerError> {
        self.store
            .card(id)
            .await?
            .ok_or_else(|| DomainError::not_found("card", id).into())
    }

    pub async fn cards(&self) -> Result<Vec<Card>, LedgerError> {
        Ok(self.store.cards().await?)
    }

    pub async fn cards_for_bank(&self, bank_id: BankId) -> Result<Vec<Card>, LedgerError> {
        self.bank(bank_id).await?;
        Ok(self.store.cards_for_bank(bank_id).await?)
    }

    /// Update a card's metadata. Threshold and name validation happened when
    /// the [`CardUpdate`] was built; the cached stock total is untouched.
    pub async fn update_card(&self, id: CardId, update: CardUpdate) -> Result<Card, LedgerError> {
        let mut card = self.card(id).await?;
        card.apply_update(update, Utc::now())?;
        self.store.update_card_metadata(&card).await?;
        Ok(card)
    }

    /// Soft-delete a card. Only permitted once its stock is zero everywhere;
    /// the store checks and flips atomically.
    pub async fn deactivate_card(&self, id: CardId) -> Result<(), LedgerError> {
        self.store.deactivate_card(id).await?;
        tracing::info!(card_id = %id, "card deactivated");
        Ok(())
    }

    pub async fn create_location(&self, input: NewLocation) -> Result<Location, LedgerError> {
        let bank = self.bank(input.bank_id).await?;
        if !bank.is_active() {
            return Err(DomainError::validation(format!(
                "bank '{}' ({}) is inactive",
                bank.name(),
                bank.id()
            ))
            .into());
        }
        let location = Location::new(
            LocationId::new(),
            bank.id(),
            input.name,
            input.site,
            Utc::now(),
        )?;
        self.store.insert_location(location.clone()).await?;
        tracing::info!(location_id = %location.id(), bank_id = %bank.id(), "location created");
        Ok(location)
    }

    pub async fn location(&self, id: LocationId) -> Result<Location, LedgerError> {
        self.store
            .location(id)
            .await?
            .ok_or_else(|| DomainError::not_found("location", id).into())
    }

    pub async fn locations(&self) -> Result<Vec<Location>, LedgerError> {
        Ok(self.store.locations().await?)
    }

    /// Soft-delete a location. Refused while any card still has stock there.
    pub async fn deactivate_location(&self, id: LocationId) -> Result<(), LedgerError> {
        self.store.deactivate_location(id).await?;
        tracing::info!(location_id = %id, "location deactivated");
        Ok(())
    }
}

impl core::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CatalogService").finish_non_exhaustive()
    }
}
