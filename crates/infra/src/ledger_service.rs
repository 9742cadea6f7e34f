//! Ledger orchestration: the one write path for stock.
//!
//! [`LedgerService`] owns the full movement lifecycle: validate the request,
//! resolve and cross-check the catalog references, hand the store one atomic
//! write, then notify observers of what committed. Reconciliation and the
//! administrative correction paths live here too, built from the same pieces.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use cardvault_catalog::Card;
use cardvault_core::{CardId, DomainError, LocationId, MovementId, StockScope, UserId};
use cardvault_events::ObserverSet;
use cardvault_ledger::{
    LedgerEvent, Movement, MovementCorrected, MovementKind, MovementRecorded, MovementRequest,
    MovementReverted, StockLow, merged, replay_movements, reversed,
};

use crate::store::{MovementWrite, StoreError, VaultStore};

/// Failure at the service seam: either the domain said no, or storage did.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The backend failed; the transaction was rolled back in full. The only
    /// variant a caller may sensibly retry.
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        // Domain guards tripped inside the store surface as domain errors;
        // the caller should not be able to tell where a guard ran.
        match err {
            StoreError::Domain(e) => Self::Domain(e),
            other => Self::Storage(other),
        }
    }
}

/// What a committed movement write hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementReceipt {
    pub movement: Movement,
    /// Card total across all locations after the commit.
    pub card_quantity: i64,
}

/// One location where the live row and the replayed history disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceCorrection {
    pub location_id: LocationId,
    pub live: i64,
    pub replayed: i64,
}

/// Outcome of [`LedgerService::rebuild_from_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub card_id: CardId,
    pub movements_replayed: usize,
    pub total_before: i64,
    pub total_after: i64,
    /// Per-location rows the rebuild changed. Empty when the card was clean.
    pub corrections: Vec<BalanceCorrection>,
}

/// Outcome of [`LedgerService::verify_consistency`] (read-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub card_id: CardId,
    pub consistent: bool,
    pub live_total: i64,
    pub replayed_total: i64,
    pub drift: Vec<BalanceCorrection>,
}

/// The stock movement ledger.
///
/// Balance rows are authoritative for reads and are updated in the same
/// transaction as the movement line; history replay exists to audit and
/// repair them, never to answer "how much is there" on the hot path.
pub struct LedgerService {
    store: Arc<dyn VaultStore>,
    observers: ObserverSet<LedgerEvent>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn VaultStore>, observers: ObserverSet<LedgerEvent>) -> Self {
        Self { store, observers }
    }

    /// Record one movement: validate, apply atomically, notify observers.
    ///
    /// Checks run cheapest-first: request shape, then catalog references and
    /// ownership, then an advisory balance check that produces the
    /// requested-vs-available error message. The store re-runs the balance
    /// guards inside the transaction, so a concurrent writer can never slip
    /// a balance below zero between check and apply.
    pub async fn record_movement(
        &self,
        request: MovementRequest,
    ) -> Result<MovementReceipt, LedgerError> {
        let kind = request.validate()?;
        let card = self.active_card(request.card_id).await?;
        self.check_endpoints(&card, kind).await?;
        self.check_available(&card, kind, request.quantity).await?;

        let movement = Movement::record(
            MovementId::new(),
            card.id(),
            kind,
            request.quantity,
            request.reason,
            request.recorded_by,
            Utc::now(),
        );
        let changes = kind.balance_changes(request.quantity);
        let total_delta = kind.total_delta(request.quantity);

        let card_quantity = self
            .store
            .apply_movement(
                card.id(),
                MovementWrite::Insert(movement.clone()),
                &changes,
                total_delta,
            )
            .await?;

        tracing::info!(
            card_id = %card.id(),
            movement_id = %movement.id,
            movement_type = %movement.movement_type,
            quantity = movement.quantity,
            card_quantity,
            "movement recorded"
        );

        self.observers
            .notify_all(&LedgerEvent::MovementRecorded(MovementRecorded {
                movement: movement.clone(),
                card_name: card.name().to_owned(),
                card_quantity,
                occurred_at: Utc::now(),
            }))
            .await;
        self.emit_low_stock_if_needed(&card, card_quantity).await;

        Ok(MovementReceipt {
            movement,
            card_quantity,
        })
    }

    /// Advisory read used by forms before submitting an exit or transfer.
    /// The authoritative check happens again inside [`record_movement`].
    ///
    /// [`record_movement`]: LedgerService::record_movement
    pub async fn available_stock(
        &self,
        card_id: CardId,
        location_id: LocationId,
    ) -> Result<i64, LedgerError> {
        Ok(self.store.balance(card_id, location_id).await?)
    }

    /// Per-location breakdown of one card's stock.
    pub async fn balances_for_card(
        &self,
        card_id: CardId,
    ) -> Result<Vec<cardvault_ledger::StockBalance>, LedgerError> {
        self.require_card(card_id).await?;
        Ok(self.store.balances_for_card(card_id).await?)
    }

    /// Full history of one card, oldest line first.
    pub async fn movements_for_card(
        &self,
        card_id: CardId,
    ) -> Result<Vec<Movement>, LedgerError> {
        self.require_card(card_id).await?;
        Ok(self.store.movements_for_card(card_id).await?)
    }

    /// Most recent lines across all cards, newest first.
    pub async fn recent_movements(&self, limit: usize) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.store.recent_movements(limit).await?)
    }

    /// Administrative revert: undo a movement's balance effects and delete
    /// the line, as one atomic write.
    ///
    /// Rejected when the reversal itself would drive a balance negative,
    /// e.g. reverting an entry whose stock has since moved on.
    pub async fn revert_movement(
        &self,
        movement_id: MovementId,
        reverted_by: UserId,
    ) -> Result<MovementReceipt, LedgerError> {
        let movement = self.require_movement(movement_id).await?;
        let card = self.require_card(movement.card_id).await?;

        let changes = reversed(&movement.balance_changes()?);
        let total_delta = -movement.total_delta()?;

        let card_quantity = self
            .store
            .apply_movement(
                card.id(),
                MovementWrite::Delete(movement.id),
                &changes,
                total_delta,
            )
            .await?;

        tracing::info!(
            card_id = %card.id(),
            movement_id = %movement.id,
            reverted_by = %reverted_by,
            card_quantity,
            "movement reverted"
        );

        self.observers
            .notify_all(&LedgerEvent::MovementReverted(MovementReverted {
                movement: movement.clone(),
                card_name: card.name().to_owned(),
                card_quantity,
                occurred_at: Utc::now(),
            }))
            .await;
        self.emit_low_stock_if_needed(&card, card_quantity).await;

        Ok(MovementReceipt {
            movement,
            card_quantity,
        })
    }

    /// Administrative correction: revert the stored line and apply the
    /// corrected one as a single atomic write.
    ///
    /// The line keeps its id and its original `recorded_at`, so history
    /// ordering is stable across corrections. Balance guards run against the
    /// *net* change, so correcting an entry of 100 down to 80 only needs the
    /// 20-unit difference to be available.
    pub async fn correct_movement(
        &self,
        movement_id: MovementId,
        request: MovementRequest,
    ) -> Result<MovementReceipt, LedgerError> {
        let original = self.require_movement(movement_id).await?;
        if request.card_id != original.card_id {
            return Err(DomainError::validation(format!(
                "movement {movement_id} belongs to card {}; a correction cannot move it to another card",
                original.card_id
            ))
            .into());
        }

        let kind = request.validate()?;
        let card = self.require_card(original.card_id).await?;
        self.check_endpoints(&card, kind).await?;

        let corrected = Movement::record(
            original.id,
            card.id(),
            kind,
            request.quantity,
            request.reason,
            request.recorded_by,
            original.recorded_at,
        );
        let net_changes = merged(
            &reversed(&original.balance_changes()?),
            &corrected.balance_changes()?,
        );
        let net_delta = corrected.total_delta()? - original.total_delta()?;

        let card_quantity = self
            .store
            .apply_movement(
                card.id(),
                MovementWrite::Replace(corrected.clone()),
                &net_changes,
                net_delta,
            )
            .await?;

        tracing::info!(
            card_id = %card.id(),
            movement_id = %corrected.id,
            card_quantity,
            "movement corrected"
        );

        self.observers
            .notify_all(&LedgerEvent::MovementCorrected(MovementCorrected {
                before: original,
                after: corrected.clone(),
                card_name: card.name().to_owned(),
                card_quantity,
                occurred_at: Utc::now(),
            }))
            .await;
        self.emit_low_stock_if_needed(&card, card_quantity).await;

        Ok(MovementReceipt {
            movement: corrected,
            card_quantity,
        })
    }

    /// Reconciliation: replay the card's history from zero and overwrite the
    /// live rows and cached total with the result.
    ///
    /// Idempotent: a second run replays the same history onto already-correct
    /// rows and reports no corrections. Fails without writing when the
    /// history itself is corrupt (a prefix would drive a balance negative);
    /// repair must not launder a broken ledger into healthy-looking rows.
    pub async fn rebuild_from_history(
        &self,
        card_id: CardId,
    ) -> Result<RebuildReport, LedgerError> {
        let card = self.require_card(card_id).await?;
        let movements = self.store.movements_for_card(card_id).await?;
        let replayed = replay_movements(card_id, &movements)?;

        let live = self.live_balances(card_id).await?;
        let corrections = diff_balances(&live, &replayed.balances);
        let total_before = card.quantity();

        self.store.replace_card_stock(&replayed).await?;

        if !corrections.is_empty() || total_before != replayed.total {
            tracing::warn!(
                card_id = %card_id,
                total_before,
                total_after = replayed.total,
                corrected_rows = corrections.len(),
                "stock rebuilt from history repaired drift"
            );
        }

        Ok(RebuildReport {
            card_id,
            movements_replayed: replayed.movements_replayed,
            total_before,
            total_after: replayed.total,
            corrections,
        })
    }

    /// Read-only drift check: the same replay as a rebuild, compared against
    /// the live rows without writing anything.
    pub async fn verify_consistency(
        &self,
        card_id: CardId,
    ) -> Result<ConsistencyReport, LedgerError> {
        let card = self.require_card(card_id).await?;
        let movements = self.store.movements_for_card(card_id).await?;
        let replayed = replay_movements(card_id, &movements)?;

        let live = self.live_balances(card_id).await?;
        let drift = diff_balances(&live, &replayed.balances);
        let live_total = card.quantity();
        let consistent = drift.is_empty() && live_total == replayed.total;

        Ok(ConsistencyReport {
            card_id,
            consistent,
            live_total,
            replayed_total: replayed.total,
            drift,
        })
    }

    async fn active_card(&self, card_id: CardId) -> Result<Card, LedgerError> {
        let card = self.require_card(card_id).await?;
        if !card.is_active() {
            return Err(DomainError::validation(format!(
                "card '{}' ({card_id}) is inactive and cannot receive movements",
                card.name()
            ))
            .into());
        }
        Ok(card)
    }

    async fn require_card(&self, card_id: CardId) -> Result<Card, LedgerError> {
        self.store
            .card(card_id)
            .await?
            .ok_or_else(|| DomainError::not_found("card", card_id).into())
    }

    async fn require_movement(&self, movement_id: MovementId) -> Result<Movement, LedgerError> {
        self.store
            .movement(movement_id)
            .await?
            .ok_or_else(|| DomainError::not_found("movement", movement_id).into())
    }

    /// Resolve every endpoint the movement touches: it must exist, be active,
    /// and belong to the card's bank.
    async fn check_endpoints(&self, card: &Card, kind: MovementKind) -> Result<(), LedgerError> {
        for location_id in kind.endpoints() {
            let location = self
                .store
                .location(location_id)
                .await?
                .ok_or_else(|| DomainError::not_found("location", location_id))?;
            if !location.is_active() {
                return Err(DomainError::validation(format!(
                    "location '{}' ({location_id}) is inactive",
                    location.name()
                ))
                .into());
            }
            card.ensure_same_bank(&location)?;
        }
        Ok(())
    }

    /// Advisory sufficiency check, so a plain overdraft fails with the
    /// requested-vs-available message before a transaction is opened.
    async fn check_available(
        &self,
        card: &Card,
        kind: MovementKind,
        quantity: i64,
    ) -> Result<(), LedgerError> {
        if let Some(from) = kind.from_location() {
            let available = self.store.balance(card.id(), from).await?;
            if available < quantity {
                return Err(DomainError::InsufficientStock {
                    card_id: card.id(),
                    scope: StockScope::Location(from),
                    requested: quantity,
                    available,
                }
                .into());
            }
        }
        if matches!(kind, MovementKind::Exit { .. }) && card.quantity() < quantity {
            // The cached total should never be below the source row, but a
            // drifted cache must still refuse to go negative.
            return Err(DomainError::InsufficientStock {
                card_id: card.id(),
                scope: StockScope::CardTotal,
                requested: quantity,
                available: card.quantity(),
            }
            .into());
        }
        Ok(())
    }

    async fn live_balances(
        &self,
        card_id: CardId,
    ) -> Result<BTreeMap<LocationId, i64>, LedgerError> {
        Ok(self
            .store
            .balances_for_card(card_id)
            .await?
            .into_iter()
            .map(|b| (b.location_id(), b.quantity()))
            .collect())
    }

    async fn emit_low_stock_if_needed(&self, card: &Card, card_quantity: i64) {
        if card_quantity <= card.thresholds().min() {
            self.observers
                .notify_all(&LedgerEvent::StockLow(StockLow {
                    card_id: card.id(),
                    card_name: card.name().to_owned(),
                    quantity: card_quantity,
                    min_threshold: card.thresholds().min(),
                    occurred_at: Utc::now(),
                }))
                .await;
        }
    }
}

impl core::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerService")
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

/// Locations where live rows and replayed history disagree, in key order.
fn diff_balances(
    live: &BTreeMap<LocationId, i64>,
    replayed: &BTreeMap<LocationId, i64>,
) -> Vec<BalanceCorrection> {
    let mut locations: Vec<LocationId> = live.keys().chain(replayed.keys()).copied().collect();
    locations.sort();
    locations.dedup();

    locations
        .into_iter()
        .filter_map(|location_id| {
            let live = live.get(&location_id).copied().unwrap_or(0);
            let replayed = replayed.get(&location_id).copied().unwrap_or(0);
            (live != replayed).then_some(BalanceCorrection {
                location_id,
                live,
                replayed,
            })
        })
        .collect()
}
