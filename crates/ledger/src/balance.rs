use std::collections::BTreeMap;

use cardvault_core::{CardId, DomainError, DomainResult, LocationId, StockScope};

/// A signed quantity change to one (card, location) balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub location_id: LocationId,
    pub delta: i64,
}

/// Negate a change set. Reverting a movement applies the reverse of what it
/// originally did.
pub fn reversed(changes: &[BalanceChange]) -> Vec<BalanceChange> {
    changes
        .iter()
        .map(|c| BalanceChange {
            location_id: c.location_id,
            delta: -c.delta,
        })
        .collect()
}

/// Combine two change sets into one, summing per-location deltas and dropping
/// locations that net to zero.
///
/// A correction is `merged(reversed(old), new)` applied as a single unit, so
/// a location both sets touch is checked against its *net* change rather than
/// transiently under- or overflowing.
pub fn merged(a: &[BalanceChange], b: &[BalanceChange]) -> Vec<BalanceChange> {
    let mut net: BTreeMap<LocationId, i64> = BTreeMap::new();
    for change in a.iter().chain(b) {
        *net.entry(change.location_id).or_insert(0) += change.delta;
    }
    net.into_iter()
        .filter(|(_, delta)| *delta != 0)
        .map(|(location_id, delta)| BalanceChange { location_id, delta })
        .collect()
}

/// The authoritative count of one card at one location.
///
/// Rows are created on a pair's first movement and then stay, even at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockBalance {
    card_id: CardId,
    location_id: LocationId,
    quantity: i64,
}

impl StockBalance {
    pub fn new(card_id: CardId, location_id: LocationId) -> Self {
        Self {
            card_id,
            location_id,
            quantity: 0,
        }
    }

    /// Rebuild from storage. The quantity is assumed already validated.
    pub fn restore(card_id: CardId, location_id: LocationId, quantity: i64) -> Self {
        Self {
            card_id,
            location_id,
            quantity,
        }
    }

    pub fn card_id(&self) -> CardId {
        self.card_id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Apply a signed change, refusing to go negative. Returns the new
    /// quantity.
    pub fn apply_delta(&mut self, delta: i64) -> DomainResult<i64> {
        let next = self.quantity.checked_add(delta).ok_or_else(|| {
            DomainError::invariant(format!(
                "balance for card {} at location {} overflows",
                self.card_id, self.location_id
            ))
        })?;
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                card_id: self.card_id,
                scope: StockScope::Location(self.location_id),
                requested: -delta,
                available: self.quantity,
            });
        }
        self.quantity = next;
        Ok(next)
    }
}
