use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cardvault_core::{BankId, CardId, DomainError, DomainResult, StockScope};

use crate::location::Location;

/// Three-level card classification (e.g. "credit" / "platinum" / "travel").
///
/// Levels below the first are optional, but a level may only be set when the
/// level above it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardClass {
    card_type: String,
    sub_type: Option<String>,
    sub_sub_type: Option<String>,
}

impl CardClass {
    pub fn new(
        card_type: impl Into<String>,
        sub_type: Option<String>,
        sub_sub_type: Option<String>,
    ) -> DomainResult<Self> {
        let card_type = card_type.into().trim().to_owned();
        if card_type.is_empty() {
            return Err(DomainError::validation("card type cannot be empty"));
        }
        let sub_type = normalize_level(sub_type);
        let sub_sub_type = normalize_level(sub_sub_type);
        if sub_sub_type.is_some() && sub_type.is_none() {
            return Err(DomainError::validation(
                "sub-sub-type requires a sub-type",
            ));
        }
        Ok(Self {
            card_type,
            sub_type,
            sub_sub_type,
        })
    }

    /// Rebuild from storage. Values are assumed already validated.
    pub fn restore(
        card_type: String,
        sub_type: Option<String>,
        sub_sub_type: Option<String>,
    ) -> Self {
        Self {
            card_type,
            sub_type,
            sub_sub_type,
        }
    }

    pub fn card_type(&self) -> &str {
        &self.card_type
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn sub_sub_type(&self) -> Option<&str> {
        self.sub_sub_type.as_deref()
    }
}

fn normalize_level(level: Option<String>) -> Option<String> {
    level
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Low/high stock alert bounds for a card. `min < max`, both non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardThresholds {
    min: i64,
    max: i64,
}

impl CardThresholds {
    pub fn new(min: i64, max: i64) -> DomainResult<Self> {
        if min < 0 {
            return Err(DomainError::validation(
                "minimum threshold cannot be negative",
            ));
        }
        if min >= max {
            return Err(DomainError::validation(format!(
                "minimum threshold {min} must be below maximum threshold {max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Rebuild from storage. Values are assumed already validated.
    pub fn restore(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

/// Optional-field update applied to a card's metadata.
///
/// Stock is deliberately absent: the cached total is owned by the ledger and
/// never edited through catalog updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardUpdate {
    pub name: Option<String>,
    pub class: Option<CardClass>,
    pub thresholds: Option<CardThresholds>,
}

/// A card type tracked in the vault (not an individual plastic card).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    id: CardId,
    bank_id: BankId,
    name: String,
    class: CardClass,
    thresholds: CardThresholds,
    quantity: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Card {
    /// Create a new card with zero stock. Stock only ever changes through
    /// recorded movements.
    pub fn new(
        id: CardId,
        bank_id: BankId,
        name: impl Into<String>,
        class: CardClass,
        thresholds: CardThresholds,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::validation("card name cannot be empty"));
        }
        Ok(Self {
            id,
            bank_id,
            name,
            class,
            thresholds,
            quantity: 0,
            is_active: true,
            created_at,
            updated_at: created_at,
        })
    }

    /// Rebuild from storage. Values are assumed already validated.
    pub fn restore(
        id: CardId,
        bank_id: BankId,
        name: String,
        class: CardClass,
        thresholds: CardThresholds,
        quantity: i64,
        is_active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bank_id,
            name,
            class,
            thresholds,
            quantity,
            is_active,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn bank_id(&self) -> BankId {
        self.bank_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &CardClass {
        &self.class
    }

    pub fn thresholds(&self) -> CardThresholds {
        self.thresholds
    }

    /// Cached total on-hand across all locations. Kept in sync by the ledger;
    /// the movement history is the authority when the two disagree.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_min(&self) -> bool {
        self.quantity <= self.thresholds.min
    }

    pub fn is_above_max(&self) -> bool {
        self.quantity >= self.thresholds.max
    }

    /// Apply a ledger-driven change to the cached total.
    ///
    /// The total can never go negative, even when per-location rows have
    /// drifted. Returns the new total.
    pub fn apply_stock_delta(&mut self, delta: i64, at: DateTime<Utc>) -> DomainResult<i64> {
        let next = self.quantity.checked_add(delta).ok_or_else(|| {
            DomainError::invariant(format!("stock total for card {} overflows", self.id))
        })?;
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                card_id: self.id,
                scope: StockScope::CardTotal,
                requested: -delta,
                available: self.quantity,
            });
        }
        self.quantity = next;
        self.updated_at = at;
        Ok(next)
    }

    /// Overwrite the cached total from a history replay.
    pub fn reset_quantity(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        if quantity < 0 {
            return Err(DomainError::invariant(format!(
                "replayed stock total for card {} is negative",
                self.id
            )));
        }
        self.quantity = quantity;
        self.updated_at = at;
        Ok(())
    }

    pub fn apply_update(&mut self, update: CardUpdate, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = update.name {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(DomainError::validation("card name cannot be empty"));
            }
            self.name = name;
        }
        if let Some(class) = update.class {
            self.class = class;
        }
        if let Some(thresholds) = update.thresholds {
            self.thresholds = thresholds;
        }
        self.updated_at = at;
        Ok(())
    }

    /// Soft-delete. Only a card with zero stock can be retired; remaining
    /// stock has to be moved out or corrected first.
    pub fn deactivate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.quantity != 0 {
            return Err(DomainError::validation(format!(
                "card {} still has {} units in stock",
                self.id, self.quantity
            )));
        }
        self.is_active = false;
        self.updated_at = at;
        Ok(())
    }

    /// Invariant helper: a movement may only touch locations of the card's
    /// own bank.
    pub fn ensure_same_bank(&self, location: &Location) -> DomainResult<()> {
        if self.bank_id != location.bank_id() {
            return Err(DomainError::OwnershipMismatch {
                card_id: self.id,
                card_bank: self.bank_id,
                location_id: location.id(),
                location_bank: location.bank_id(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cardvault_core::LocationId;

    use super::*;

    fn class() -> CardClass {
        CardClass::new("credit", Some("platinum".into()), None).unwrap()
    }

    fn card() -> Card {
        Card::new(
            CardId::new(),
            BankId::new(),
            "Platinum Credit",
            class(),
            CardThresholds::new(10, 500).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn thresholds_must_be_ordered_and_non_negative() {
        assert!(CardThresholds::new(-1, 10).is_err());
        assert!(CardThresholds::new(10, 10).is_err());
        assert!(CardThresholds::new(20, 10).is_err());
        assert!(CardThresholds::new(0, 1).is_ok());
    }

    #[test]
    fn sub_sub_type_requires_sub_type() {
        let err = CardClass::new("credit", None, Some("travel".into())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        // Blank levels are treated as absent, so this is the same error.
        assert!(CardClass::new("credit", Some("  ".into()), Some("travel".into())).is_err());
    }

    #[test]
    fn new_card_starts_at_zero_stock() {
        let card = card();
        assert_eq!(card.quantity(), 0);
        assert!(card.is_active());
        assert!(card.is_below_min());
    }

    #[test]
    fn stock_total_never_goes_negative() {
        let mut card = card();
        card.apply_stock_delta(5, Utc::now()).unwrap();
        let err = card.apply_stock_delta(-6, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientStock {
                scope: StockScope::CardTotal,
                requested: 6,
                available: 5,
                ..
            }
        ));
        // The failed delta must not have been applied.
        assert_eq!(card.quantity(), 5);
    }

    #[test]
    fn deactivation_requires_zero_stock() {
        let mut card = card();
        card.apply_stock_delta(1, Utc::now()).unwrap();
        assert!(card.deactivate(Utc::now()).is_err());
        card.apply_stock_delta(-1, Utc::now()).unwrap();
        card.deactivate(Utc::now()).unwrap();
        assert!(!card.is_active());
    }

    #[test]
    fn update_leaves_stock_untouched() {
        let mut card = card();
        card.apply_stock_delta(42, Utc::now()).unwrap();
        card.apply_update(
            CardUpdate {
                name: Some("Platinum Credit v2".into()),
                class: None,
                thresholds: Some(CardThresholds::new(5, 50).unwrap()),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(card.name(), "Platinum Credit v2");
        assert_eq!(card.quantity(), 42);
        assert_eq!(card.thresholds().min(), 5);
    }

    #[test]
    fn movements_may_only_touch_the_owning_banks_locations() {
        let card = card();
        let home = Location::new(
            LocationId::new(),
            card.bank_id(),
            "Main Vault",
            None,
            Utc::now(),
        )
        .unwrap();
        let foreign = Location::new(
            LocationId::new(),
            BankId::new(),
            "Rival Vault",
            None,
            Utc::now(),
        )
        .unwrap();

        assert!(card.ensure_same_bank(&home).is_ok());
        let err = card.ensure_same_bank(&foreign).unwrap_err();
        assert!(matches!(err, DomainError::OwnershipMismatch { .. }));
    }
}
