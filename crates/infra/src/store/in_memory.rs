//! In-memory backend for dev and tests.
//!
//! One `RwLock` guards the whole vault, so `apply_movement` gets its
//! all-or-nothing behavior the cheap way: stage every mutation on clones,
//! fail before touching shared state, commit by moving the clones in.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use cardvault_catalog::{Bank, Card, Location};
use cardvault_core::{BankId, CardId, DomainError, LocationId, MovementId};
use cardvault_ledger::{BalanceChange, Movement, ReplayedStock, StockBalance};

use super::{CatalogStore, LedgerStore, MovementWrite, StoreError};

#[derive(Debug, Default)]
struct VaultState {
    banks: HashMap<BankId, Bank>,
    cards: HashMap<CardId, Card>,
    locations: HashMap<LocationId, Location>,
    balances: HashMap<(CardId, LocationId), StockBalance>,
    movements: Vec<Movement>,
}

/// In-memory catalog + ledger store.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    state: RwLock<VaultState>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, VaultState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::unavailable(operation, "lock poisoned"))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, VaultState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::unavailable(operation, "lock poisoned"))
    }

    /// Test support: overwrite one balance row without touching the ledger,
    /// i.e. manufacture exactly the drift reconciliation exists to repair.
    #[cfg(test)]
    pub(crate) fn force_balance(
        &self,
        card_id: CardId,
        location_id: LocationId,
        quantity: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.write("force_balance")?;
        state.balances.insert(
            (card_id, location_id),
            StockBalance::restore(card_id, location_id, quantity),
        );
        Ok(())
    }

    /// Test support: overwrite a card's cached total without touching the
    /// ledger.
    #[cfg(test)]
    pub(crate) fn force_card_total(
        &self,
        card_id: CardId,
        quantity: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.write("force_card_total")?;
        let card = state
            .cards
            .get_mut(&card_id)
            .ok_or_else(|| DomainError::not_found("card", card_id))?;
        card.reset_quantity(quantity, Utc::now())?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryVault {
    async fn insert_bank(&self, bank: Bank) -> Result<(), StoreError> {
        let mut state = self.write("insert_bank")?;
        if state.banks.contains_key(&bank.id()) {
            return Err(StoreError::conflict(
                "insert_bank",
                format!("bank {} already exists", bank.id()),
            ));
        }
        if state
            .banks
            .values()
            .any(|b| b.code().eq_ignore_ascii_case(bank.code()))
        {
            return Err(StoreError::constraint(
                "insert_bank",
                format!("bank code '{}' already exists", bank.code()),
            ));
        }
        state.banks.insert(bank.id(), bank);
        Ok(())
    }

    async fn bank(&self, id: BankId) -> Result<Option<Bank>, StoreError> {
        Ok(self.read("bank")?.banks.get(&id).cloned())
    }

    async fn banks(&self) -> Result<Vec<Bank>, StoreError> {
        let mut banks: Vec<Bank> = self.read("banks")?.banks.values().cloned().collect();
        banks.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(banks)
    }

    async fn deactivate_bank(&self, id: BankId) -> Result<(), StoreError> {
        let mut state = self.write("deactivate_bank")?;
        let bank = state
            .banks
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("bank", id))?;
        bank.deactivate();
        Ok(())
    }

    async fn insert_card(&self, card: Card) -> Result<(), StoreError> {
        let mut state = self.write("insert_card")?;
        if state.cards.contains_key(&card.id()) {
            return Err(StoreError::conflict(
                "insert_card",
                format!("card {} already exists", card.id()),
            ));
        }
        if !state.banks.contains_key(&card.bank_id()) {
            return Err(StoreError::constraint(
                "insert_card",
                format!("bank {} does not exist", card.bank_id()),
            ));
        }
        state.cards.insert(card.id(), card);
        Ok(())
    }

    async fn card(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        Ok(self.read("card")?.cards.get(&id).cloned())
    }

    async fn cards(&self) -> Result<Vec<Card>, StoreError> {
        let mut cards: Vec<Card> = self.read("cards")?.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
        Ok(cards)
    }

    async fn cards_for_bank(&self, bank_id: BankId) -> Result<Vec<Card>, StoreError> {
        let mut cards: Vec<Card> = self
            .read("cards_for_bank")?
            .cards
            .values()
            .filter(|c| c.bank_id() == bank_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
        Ok(cards)
    }

    async fn update_card_metadata(&self, card: &Card) -> Result<(), StoreError> {
        let mut state = self.write("update_card_metadata")?;
        let existing = state
            .cards
            .get(&card.id())
            .ok_or_else(|| DomainError::not_found("card", card.id()))?;
        // Stock total, lifecycle flag and lineage stay whatever storage says.
        let merged = Card::restore(
            card.id(),
            existing.bank_id(),
            card.name().to_owned(),
            card.class().clone(),
            card.thresholds(),
            existing.quantity(),
            existing.is_active(),
            existing.created_at(),
            card.updated_at(),
        );
        state.cards.insert(card.id(), merged);
        Ok(())
    }

    async fn deactivate_card(&self, id: CardId) -> Result<(), StoreError> {
        let mut state = self.write("deactivate_card")?;
        let mut card = state
            .cards
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("card", id))?;
        card.deactivate(Utc::now())?;
        state.cards.insert(id, card);
        Ok(())
    }

    async fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        let mut state = self.write("insert_location")?;
        if state.locations.contains_key(&location.id()) {
            return Err(StoreError::conflict(
                "insert_location",
                format!("location {} already exists", location.id()),
            ));
        }
        if !state.banks.contains_key(&location.bank_id()) {
            return Err(StoreError::constraint(
                "insert_location",
                format!("bank {} does not exist", location.bank_id()),
            ));
        }
        state.locations.insert(location.id(), location);
        Ok(())
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        Ok(self.read("location")?.locations.get(&id).cloned())
    }

    async fn locations(&self) -> Result<Vec<Location>, StoreError> {
        let mut locations: Vec<Location> =
            self.read("locations")?.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
        Ok(locations)
    }

    async fn deactivate_location(&self, id: LocationId) -> Result<(), StoreError> {
        let mut state = self.write("deactivate_location")?;
        if !state.locations.contains_key(&id) {
            return Err(DomainError::not_found("location", id).into());
        }
        let stranded: i64 = state
            .balances
            .values()
            .filter(|b| b.location_id() == id)
            .map(StockBalance::quantity)
            .sum();
        if stranded > 0 {
            return Err(DomainError::validation(format!(
                "location {id} still holds {stranded} units of stock"
            ))
            .into());
        }
        if let Some(location) = state.locations.get_mut(&id) {
            location.deactivate();
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryVault {
    async fn balance(
        &self,
        card_id: CardId,
        location_id: LocationId,
    ) -> Result<i64, StoreError> {
        Ok(self
            .read("balance")?
            .balances
            .get(&(card_id, location_id))
            .map(StockBalance::quantity)
            .unwrap_or(0))
    }

    async fn balances_for_card(&self, card_id: CardId) -> Result<Vec<StockBalance>, StoreError> {
        let mut balances: Vec<StockBalance> = self
            .read("balances_for_card")?
            .balances
            .values()
            .filter(|b| b.card_id() == card_id)
            .copied()
            .collect();
        balances.sort_by_key(|b| b.location_id());
        Ok(balances)
    }

    async fn balances_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockBalance>, StoreError> {
        let mut balances: Vec<StockBalance> = self
            .read("balances_for_location")?
            .balances
            .values()
            .filter(|b| b.location_id() == location_id)
            .copied()
            .collect();
        balances.sort_by_key(|b| b.card_id());
        Ok(balances)
    }

    async fn movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .read("movement")?
            .movements
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn movements_for_card(&self, card_id: CardId) -> Result<Vec<Movement>, StoreError> {
        let mut movements: Vec<Movement> = self
            .read("movements_for_card")?
            .movements
            .iter()
            .filter(|m| m.card_id == card_id)
            .cloned()
            .collect();
        movements.sort_by_key(|m| (m.recorded_at, m.id));
        Ok(movements)
    }

    async fn recent_movements(&self, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let mut movements: Vec<Movement> =
            self.read("recent_movements")?.movements.clone();
        movements.sort_by_key(|m| std::cmp::Reverse((m.recorded_at, m.id)));
        movements.truncate(limit);
        Ok(movements)
    }

    async fn apply_movement(
        &self,
        card_id: CardId,
        write: MovementWrite,
        changes: &[BalanceChange],
        total_delta: i64,
    ) -> Result<i64, StoreError> {
        let mut state = self.write("apply_movement")?;

        // Stage everything on clones; shared state is only touched after the
        // last guard has passed.
        let mut card = state
            .cards
            .get(&card_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("card", card_id))?;

        let mut staged: HashMap<LocationId, StockBalance> = HashMap::new();
        for change in changes {
            let balance = staged.entry(change.location_id).or_insert_with(|| {
                state
                    .balances
                    .get(&(card_id, change.location_id))
                    .copied()
                    .unwrap_or_else(|| StockBalance::new(card_id, change.location_id))
            });
            balance.apply_delta(change.delta)?;
        }

        let new_total = card.apply_stock_delta(total_delta, Utc::now())?;

        let movement_op = match write {
            MovementWrite::Insert(movement) => {
                if state.movements.iter().any(|m| m.id == movement.id) {
                    return Err(StoreError::conflict(
                        "apply_movement",
                        format!("movement {} already exists", movement.id),
                    ));
                }
                StagedWrite::Insert(movement)
            }
            MovementWrite::Replace(movement) => {
                let index = state
                    .movements
                    .iter()
                    .position(|m| m.id == movement.id)
                    .ok_or_else(|| DomainError::not_found("movement", movement.id))?;
                StagedWrite::Replace(index, movement)
            }
            MovementWrite::Delete(id) => {
                let index = state
                    .movements
                    .iter()
                    .position(|m| m.id == id)
                    .ok_or_else(|| DomainError::not_found("movement", id))?;
                StagedWrite::Delete(index)
            }
        };

        // Commit.
        for (location_id, balance) in staged {
            state.balances.insert((card_id, location_id), balance);
        }
        state.cards.insert(card_id, card);
        match movement_op {
            StagedWrite::Insert(movement) => state.movements.push(movement),
            StagedWrite::Replace(index, movement) => state.movements[index] = movement,
            StagedWrite::Delete(index) => {
                state.movements.remove(index);
            }
        }
        Ok(new_total)
    }

    async fn replace_card_stock(&self, replay: &ReplayedStock) -> Result<(), StoreError> {
        let mut state = self.write("replace_card_stock")?;
        let mut card = state
            .cards
            .get(&replay.card_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("card", replay.card_id))?;
        card.reset_quantity(replay.total, Utc::now())?;

        state.balances.retain(|(c, _), _| *c != replay.card_id);
        for (location_id, quantity) in &replay.balances {
            state.balances.insert(
                (replay.card_id, *location_id),
                StockBalance::restore(replay.card_id, *location_id, *quantity),
            );
        }
        state.cards.insert(replay.card_id, card);
        Ok(())
    }
}

enum StagedWrite {
    Insert(Movement),
    Replace(usize, Movement),
    Delete(usize),
}

#[cfg(test)]
mod tests {
    use cardvault_catalog::{CardClass, CardThresholds};
    use cardvault_core::{MovementId, UserId};
    use cardvault_ledger::{MovementKind, merged, reversed};

    use super::*;

    async fn seeded() -> (InMemoryVault, CardId, LocationId, LocationId) {
        let vault = InMemoryVault::new();
        let bank_id = BankId::new();
        vault
            .insert_bank(Bank::new(bank_id, "FNB", "First National", Utc::now()).unwrap())
            .await
            .unwrap();

        let card = Card::new(
            CardId::new(),
            bank_id,
            "Platinum Credit",
            CardClass::new("credit", Some("platinum".into()), None).unwrap(),
            CardThresholds::new(5, 500).unwrap(),
            Utc::now(),
        )
        .unwrap();
        let card_id = card.id();
        vault.insert_card(card).await.unwrap();

        let vault_loc = Location::new(LocationId::new(), bank_id, "Main Vault", None, Utc::now())
            .unwrap();
        let branch_loc =
            Location::new(LocationId::new(), bank_id, "Branch 12", None, Utc::now()).unwrap();
        let (v, b) = (vault_loc.id(), branch_loc.id());
        vault.insert_location(vault_loc).await.unwrap();
        vault.insert_location(branch_loc).await.unwrap();
        (vault, card_id, v, b)
    }

    fn entry(card_id: CardId, to: LocationId, quantity: i64) -> (Movement, Vec<BalanceChange>, i64) {
        let kind = MovementKind::Entry { to };
        let movement = Movement::record(
            MovementId::new(),
            card_id,
            kind,
            quantity,
            "test",
            UserId::new(),
            Utc::now(),
        );
        let changes = kind.balance_changes(quantity);
        let delta = kind.total_delta(quantity);
        (movement, changes, delta)
    }

    #[tokio::test]
    async fn failed_transfer_leaves_no_trace() {
        let (vault, card_id, from, to) = seeded().await;
        let (movement, changes, delta) = entry(card_id, from, 10);
        vault
            .apply_movement(card_id, MovementWrite::Insert(movement), &changes, delta)
            .await
            .unwrap();

        // Transfer more than the source holds.
        let kind = MovementKind::Transfer { from, to };
        let movement = Movement::record(
            MovementId::new(),
            card_id,
            kind,
            25,
            "too much",
            UserId::new(),
            Utc::now(),
        );
        let err = vault
            .apply_movement(
                card_id,
                MovementWrite::Insert(movement),
                &kind.balance_changes(25),
                kind.total_delta(25),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InsufficientStock { .. })
        ));

        // Nothing moved: no destination row, source untouched, one line.
        assert_eq!(vault.balance(card_id, from).await.unwrap(), 10);
        assert_eq!(vault.balance(card_id, to).await.unwrap(), 0);
        assert_eq!(vault.movements_for_card(card_id).await.unwrap().len(), 1);
        let card = vault.card(card_id).await.unwrap().unwrap();
        assert_eq!(card.quantity(), 10);
    }

    #[tokio::test]
    async fn duplicate_movement_id_is_a_conflict() {
        let (vault, card_id, loc, _) = seeded().await;
        let (movement, changes, delta) = entry(card_id, loc, 5);
        vault
            .apply_movement(
                card_id,
                MovementWrite::Insert(movement.clone()),
                &changes,
                delta,
            )
            .await
            .unwrap();
        let err = vault
            .apply_movement(card_id, MovementWrite::Insert(movement), &changes, delta)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        // The duplicate must not have bumped the balance.
        assert_eq!(vault.balance(card_id, loc).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn replace_applies_net_effects() {
        let (vault, card_id, loc, other) = seeded().await;
        let (movement, changes, delta) = entry(card_id, loc, 10);
        let original_id = movement.id;
        vault
            .apply_movement(card_id, MovementWrite::Insert(movement.clone()), &changes, delta)
            .await
            .unwrap();

        // Correct the entry to 4 units at a different location.
        let corrected_kind = MovementKind::Entry { to: other };
        let corrected = Movement::record(
            original_id,
            card_id,
            corrected_kind,
            4,
            "corrected",
            UserId::new(),
            movement.recorded_at,
        );
        let net = merged(
            &reversed(&movement.balance_changes().unwrap()),
            &corrected.balance_changes().unwrap(),
        );
        let net_delta = corrected.total_delta().unwrap() - movement.total_delta().unwrap();
        vault
            .apply_movement(card_id, MovementWrite::Replace(corrected), &net, net_delta)
            .await
            .unwrap();

        assert_eq!(vault.balance(card_id, loc).await.unwrap(), 0);
        assert_eq!(vault.balance(card_id, other).await.unwrap(), 4);
        let history = vault.movements_for_card(card_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].quantity, 4);
        assert_eq!(
            vault.card(card_id).await.unwrap().unwrap().quantity(),
            4
        );
    }

    #[tokio::test]
    async fn card_with_stock_cannot_be_deactivated() {
        let (vault, card_id, loc, _) = seeded().await;
        let (movement, changes, delta) = entry(card_id, loc, 3);
        vault
            .apply_movement(card_id, MovementWrite::Insert(movement), &changes, delta)
            .await
            .unwrap();
        let err = vault.deactivate_card(card_id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::Validation(_))
        ));
        assert!(vault.card(card_id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn location_holding_stock_cannot_be_deactivated() {
        let (vault, card_id, loc, _) = seeded().await;
        let (movement, changes, delta) = entry(card_id, loc, 3);
        vault
            .apply_movement(card_id, MovementWrite::Insert(movement), &changes, delta)
            .await
            .unwrap();
        assert!(vault.deactivate_location(loc).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_bank_code_is_a_constraint() {
        let vault = InMemoryVault::new();
        vault
            .insert_bank(Bank::new(BankId::new(), "FNB", "First National", Utc::now()).unwrap())
            .await
            .unwrap();
        let err = vault
            .insert_bank(Bank::new(BankId::new(), "fnb", "Other", Utc::now()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
    }
}
