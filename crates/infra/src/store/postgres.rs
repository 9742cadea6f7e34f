//! Postgres-backed vault storage.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to [`StoreError`] as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation on bank code) | `23505` | `Constraint` | Duplicate bank code |
//! | Database (other unique violation) | `23505` | `Conflict` | Concurrent insert of the same row |
//! | Database (foreign key violation) | `23503` | `Constraint` | Referenced bank/card/location missing |
//! | Database (check constraint violation) | `23514` | `Constraint` | Row would break a table CHECK |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / network / other | N/A | `Unavailable` | Backend unreachable |
//!
//! The CHECK constraints on `cards.quantity` and `stock_balances.quantity` are
//! a backstop. The write path reads the affected rows `FOR UPDATE` and refuses
//! a negative result itself, so callers see a typed
//! [`DomainError::InsufficientStock`] with the card and scope attached rather
//! than a raw constraint message.
//!
//! ## Thread Safety
//!
//! `PostgresVault` is `Send + Sync`. All multi-row writes run inside a single
//! transaction; balance rows are locked in `location_id` order so two
//! concurrent movements over the same pair of locations cannot deadlock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use cardvault_catalog::{Bank, Card, CardClass, CardThresholds, Location};
use cardvault_core::{
    BankId, CardId, DomainError, LocationId, MovementId, StockScope, UserId,
};
use cardvault_ledger::{
    BalanceChange, Movement, MovementType, ReplayedStock, StockBalance,
};

use super::{CatalogStore, LedgerStore, MovementWrite, StoreError};

/// Schema, applied statement by statement on startup. `IF NOT EXISTS`
/// everywhere, so re-running against an existing database is a no-op.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS banks (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS banks_code_key ON banks (LOWER(code))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        id UUID PRIMARY KEY,
        bank_id UUID NOT NULL REFERENCES banks (id),
        name TEXT NOT NULL,
        card_type TEXT NOT NULL,
        sub_type TEXT,
        sub_sub_type TEXT,
        min_threshold BIGINT NOT NULL,
        max_threshold BIGINT NOT NULL,
        quantity BIGINT NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT cards_quantity_non_negative CHECK (quantity >= 0),
        CONSTRAINT cards_thresholds_ordered
            CHECK (min_threshold >= 0 AND min_threshold < max_threshold)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS cards_bank_idx ON cards (bank_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id UUID PRIMARY KEY,
        bank_id UUID NOT NULL REFERENCES banks (id),
        name TEXT NOT NULL,
        site TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_balances (
        card_id UUID NOT NULL REFERENCES cards (id),
        location_id UUID NOT NULL REFERENCES locations (id),
        quantity BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (card_id, location_id),
        CONSTRAINT stock_balances_quantity_non_negative CHECK (quantity >= 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_balances_location_idx
        ON stock_balances (location_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        id UUID PRIMARY KEY,
        card_id UUID NOT NULL REFERENCES cards (id),
        movement_type TEXT NOT NULL,
        quantity BIGINT NOT NULL,
        from_location_id UUID REFERENCES locations (id),
        to_location_id UUID REFERENCES locations (id),
        reason TEXT NOT NULL,
        recorded_by UUID NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT movements_type_known
            CHECK (movement_type IN ('entry', 'exit', 'transfer')),
        CONSTRAINT movements_quantity_positive CHECK (quantity > 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS movements_card_history_idx
        ON movements (card_id, recorded_at)
    "#,
];

/// Postgres-backed implementation of [`CatalogStore`] and [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct PostgresVault {
    pool: PgPool,
}

impl PostgresVault {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool sized for a single service instance.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresVault {
    async fn insert_bank(&self, bank: Bank) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO banks (id, code, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(bank.id().as_uuid())
        .bind(bank.code())
        .bind(bank.name())
        .bind(bank.is_active())
        .bind(bank.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_bank", e))?;
        Ok(())
    }

    async fn bank(&self, id: BankId) -> Result<Option<Bank>, StoreError> {
        let row = sqlx::query(
            "SELECT id, code, name, is_active, created_at FROM banks WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("bank", e))?;
        row.map(|r| bank_from_row(&r)).transpose()
    }

    async fn banks(&self) -> Result<Vec<Bank>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, code, name, is_active, created_at FROM banks ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("banks", e))?;
        rows.iter().map(bank_from_row).collect()
    }

    async fn deactivate_bank(&self, id: BankId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE banks SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("deactivate_bank", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("bank", id).into());
        }
        Ok(())
    }

    async fn insert_card(&self, card: Card) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cards (
                id, bank_id, name, card_type, sub_type, sub_sub_type,
                min_threshold, max_threshold, quantity, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(card.id().as_uuid())
        .bind(card.bank_id().as_uuid())
        .bind(card.name())
        .bind(card.class().card_type())
        .bind(card.class().sub_type())
        .bind(card.class().sub_sub_type())
        .bind(card.thresholds().min())
        .bind(card.thresholds().max())
        .bind(card.quantity())
        .bind(card.is_active())
        .bind(card.created_at())
        .bind(card.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_card", e))?;
        Ok(())
    }

    async fn card(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        let row = sqlx::query(&card_select("WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("card", e))?;
        row.map(|r| card_from_row(&r)).transpose()
    }

    async fn cards(&self) -> Result<Vec<Card>, StoreError> {
        let rows = sqlx::query(&card_select("ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("cards", e))?;
        rows.iter().map(card_from_row).collect()
    }

    async fn cards_for_bank(&self, bank_id: BankId) -> Result<Vec<Card>, StoreError> {
        let rows = sqlx::query(&card_select("WHERE bank_id = $1 ORDER BY name, id"))
            .bind(bank_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("cards_for_bank", e))?;
        rows.iter().map(card_from_row).collect()
    }

    async fn update_card_metadata(&self, card: &Card) -> Result<(), StoreError> {
        // Deliberately does not touch `quantity`; only ledger writes may.
        let result = sqlx::query(
            r#"
            UPDATE cards
            SET name = $2,
                card_type = $3,
                sub_type = $4,
                sub_sub_type = $5,
                min_threshold = $6,
                max_threshold = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(card.id().as_uuid())
        .bind(card.name())
        .bind(card.class().card_type())
        .bind(card.class().sub_type())
        .bind(card.class().sub_sub_type())
        .bind(card.thresholds().min())
        .bind(card.thresholds().max())
        .bind(card.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_card_metadata", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("card", card.id()).into());
        }
        Ok(())
    }

    async fn deactivate_card(&self, id: CardId) -> Result<(), StoreError> {
        let mut tx = begin(&self.pool, "deactivate_card").await?;
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM cards WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("deactivate_card", e))?;
        let Some(quantity) = quantity else {
            return Err(DomainError::not_found("card", id).into());
        };
        if quantity != 0 {
            return Err(DomainError::validation(format!(
                "card {id} still has {quantity} units in stock"
            ))
            .into());
        }
        sqlx::query("UPDATE cards SET is_active = FALSE, updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("deactivate_card", e))?;
        commit(tx, "deactivate_card").await
    }

    async fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, bank_id, name, site, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(location.id().as_uuid())
        .bind(location.bank_id().as_uuid())
        .bind(location.name())
        .bind(location.site())
        .bind(location.is_active())
        .bind(location.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, bank_id, name, site, is_active, created_at
            FROM locations WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("location", e))?;
        row.map(|r| location_from_row(&r)).transpose()
    }

    async fn locations(&self) -> Result<Vec<Location>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, bank_id, name, site, is_active, created_at
            FROM locations ORDER BY name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("locations", e))?;
        rows.iter().map(location_from_row).collect()
    }

    async fn deactivate_location(&self, id: LocationId) -> Result<(), StoreError> {
        let mut tx = begin(&self.pool, "deactivate_location").await?;
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM locations WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("deactivate_location", e))?;
        if exists.is_none() {
            return Err(DomainError::not_found("location", id).into());
        }
        let stranded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_balances WHERE location_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deactivate_location", e))?;
        if stranded != 0 {
            return Err(DomainError::validation(format!(
                "location {id} still holds {stranded} units of stock"
            ))
            .into());
        }
        sqlx::query("UPDATE locations SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("deactivate_location", e))?;
        commit(tx, "deactivate_location").await
    }
}

#[async_trait]
impl LedgerStore for PostgresVault {
    async fn balance(
        &self,
        card_id: CardId,
        location_id: LocationId,
    ) -> Result<i64, StoreError> {
        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM stock_balances WHERE card_id = $1 AND location_id = $2",
        )
        .bind(card_id.as_uuid())
        .bind(location_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("balance", e))?;
        Ok(quantity.unwrap_or(0))
    }

    async fn balances_for_card(&self, card_id: CardId) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT card_id, location_id, quantity
            FROM stock_balances WHERE card_id = $1 ORDER BY location_id
            "#,
        )
        .bind(card_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("balances_for_card", e))?;
        rows.iter().map(balance_from_row).collect()
    }

    async fn balances_for_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT card_id, location_id, quantity
            FROM stock_balances WHERE location_id = $1 ORDER BY card_id
            "#,
        )
        .bind(location_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("balances_for_location", e))?;
        rows.iter().map(balance_from_row).collect()
    }

    async fn movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let row = sqlx::query(&movement_select("WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("movement", e))?;
        row.map(|r| movement_from_row(&r)).transpose()
    }

    async fn movements_for_card(&self, card_id: CardId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(&movement_select(
            "WHERE card_id = $1 ORDER BY recorded_at ASC, id ASC",
        ))
        .bind(card_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_for_card", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn recent_movements(&self, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(&movement_select(
            "ORDER BY recorded_at DESC, id DESC LIMIT $1",
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(
        skip(self, write, changes),
        fields(card_id = %card_id, total_delta),
        err
    )]
    async fn apply_movement(
        &self,
        card_id: CardId,
        write: MovementWrite,
        changes: &[BalanceChange],
        total_delta: i64,
    ) -> Result<i64, StoreError> {
        let mut tx = begin(&self.pool, "apply_movement").await?;

        let current_total: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM cards WHERE id = $1 FOR UPDATE")
                .bind(card_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("apply_movement", e))?;
        let Some(current_total) = current_total else {
            return Err(DomainError::not_found("card", card_id).into());
        };

        // Lock balance rows in location order; concurrent writers over the
        // same pair then lock in the same order.
        let mut ordered = changes.to_vec();
        ordered.sort_by_key(|c| c.location_id);
        for change in &ordered {
            apply_balance_change(&mut tx, card_id, change).await?;
        }

        let new_total = current_total.checked_add(total_delta).ok_or_else(|| {
            DomainError::invariant(format!("stock total for card {card_id} overflows"))
        })?;
        if new_total < 0 {
            return Err(DomainError::InsufficientStock {
                card_id,
                scope: StockScope::CardTotal,
                requested: -total_delta,
                available: current_total,
            }
            .into());
        }
        sqlx::query("UPDATE cards SET quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(card_id.as_uuid())
            .bind(new_total)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_movement", e))?;

        match write {
            MovementWrite::Insert(movement) => {
                sqlx::query(
                    r#"
                    INSERT INTO movements (
                        id, card_id, movement_type, quantity,
                        from_location_id, to_location_id,
                        reason, recorded_by, recorded_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(movement.id.as_uuid())
                .bind(movement.card_id.as_uuid())
                .bind(movement.movement_type.as_str())
                .bind(movement.quantity)
                .bind(movement.from_location_id.map(|id| *id.as_uuid()))
                .bind(movement.to_location_id.map(|id| *id.as_uuid()))
                .bind(&movement.reason)
                .bind(movement.recorded_by.as_uuid())
                .bind(movement.recorded_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("apply_movement", e))?;
            }
            MovementWrite::Replace(movement) => {
                let result = sqlx::query(
                    r#"
                    UPDATE movements
                    SET movement_type = $3,
                        quantity = $4,
                        from_location_id = $5,
                        to_location_id = $6,
                        reason = $7,
                        recorded_by = $8
                    WHERE id = $1 AND card_id = $2
                    "#,
                )
                .bind(movement.id.as_uuid())
                .bind(movement.card_id.as_uuid())
                .bind(movement.movement_type.as_str())
                .bind(movement.quantity)
                .bind(movement.from_location_id.map(|id| *id.as_uuid()))
                .bind(movement.to_location_id.map(|id| *id.as_uuid()))
                .bind(&movement.reason)
                .bind(movement.recorded_by.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("apply_movement", e))?;
                if result.rows_affected() == 0 {
                    return Err(DomainError::not_found("movement", movement.id).into());
                }
            }
            MovementWrite::Delete(id) => {
                let result =
                    sqlx::query("DELETE FROM movements WHERE id = $1 AND card_id = $2")
                        .bind(id.as_uuid())
                        .bind(card_id.as_uuid())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("apply_movement", e))?;
                if result.rows_affected() == 0 {
                    return Err(DomainError::not_found("movement", id).into());
                }
            }
        }

        commit(tx, "apply_movement").await?;
        Ok(new_total)
    }

    #[instrument(
        skip(self, replay),
        fields(card_id = %replay.card_id, total = replay.total),
        err
    )]
    async fn replace_card_stock(&self, replay: &ReplayedStock) -> Result<(), StoreError> {
        let mut tx = begin(&self.pool, "replace_card_stock").await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM cards WHERE id = $1 FOR UPDATE")
                .bind(replay.card_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("replace_card_stock", e))?;
        if exists.is_none() {
            return Err(DomainError::not_found("card", replay.card_id).into());
        }

        sqlx::query("DELETE FROM stock_balances WHERE card_id = $1")
            .bind(replay.card_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_card_stock", e))?;
        // Zero rows are kept too: a location the history touched stays
        // visible even when it is back at zero.
        for (location_id, quantity) in &replay.balances {
            sqlx::query(
                r#"
                INSERT INTO stock_balances (card_id, location_id, quantity)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(replay.card_id.as_uuid())
            .bind(location_id.as_uuid())
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_card_stock", e))?;
        }

        sqlx::query("UPDATE cards SET quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(replay.card_id.as_uuid())
            .bind(replay.total)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_card_stock", e))?;

        commit(tx, "replace_card_stock").await
    }
}

/// Lock one balance row, apply the delta and upsert the result. Refuses a
/// negative result with the current quantity attached.
async fn apply_balance_change(
    tx: &mut Transaction<'_, Postgres>,
    card_id: CardId,
    change: &BalanceChange,
) -> Result<(), StoreError> {
    let current: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT quantity FROM stock_balances
        WHERE card_id = $1 AND location_id = $2
        FOR UPDATE
        "#,
    )
    .bind(card_id.as_uuid())
    .bind(change.location_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("apply_movement", e))?;

    let current = current.unwrap_or(0);
    let next = current.checked_add(change.delta).ok_or_else(|| {
        DomainError::invariant(format!(
            "balance for card {card_id} at location {} overflows",
            change.location_id
        ))
    })?;
    if next < 0 {
        return Err(DomainError::InsufficientStock {
            card_id,
            scope: StockScope::Location(change.location_id),
            requested: -change.delta,
            available: current,
        }
        .into());
    }

    sqlx::query(
        r#"
        INSERT INTO stock_balances (card_id, location_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (card_id, location_id)
        DO UPDATE SET quantity = EXCLUDED.quantity
        "#,
    )
    .bind(card_id.as_uuid())
    .bind(change.location_id.as_uuid())
    .bind(next)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("apply_movement", e))?;
    Ok(())
}

async fn begin(
    pool: &PgPool,
    operation: &'static str,
) -> Result<Transaction<'static, Postgres>, StoreError> {
    pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
}

async fn commit(
    tx: Transaction<'_, Postgres>,
    operation: &'static str,
) -> Result<(), StoreError> {
    tx.commit().await.map_err(|e| map_sqlx_error(operation, e))
}

/// Map SQLx errors to [`StoreError`].
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_owned();
            match db_err.code().as_deref() {
                Some("23505") => {
                    if db_err.constraint() == Some("banks_code_key") {
                        StoreError::constraint(operation, "bank code already in use")
                    } else {
                        StoreError::conflict(operation, message)
                    }
                }
                Some("23503") | Some("23514") => StoreError::constraint(operation, message),
                _ => StoreError::unavailable(operation, message),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::unavailable(operation, "connection pool closed")
        }
        other => StoreError::unavailable(operation, other.to_string()),
    }
}

// SQLx row types

fn card_select(suffix: &str) -> String {
    format!(
        r#"
        SELECT id, bank_id, name, card_type, sub_type, sub_sub_type,
               min_threshold, max_threshold, quantity, is_active,
               created_at, updated_at
        FROM cards {suffix}
        "#
    )
}

fn movement_select(suffix: &str) -> String {
    format!(
        r#"
        SELECT id, card_id, movement_type, quantity,
               from_location_id, to_location_id,
               reason, recorded_by, recorded_at
        FROM movements {suffix}
        "#
    )
}

fn bank_from_row(row: &PgRow) -> Result<Bank, StoreError> {
    let row = BankRow::from_row(row).map_err(|e| decode_error("bank", e))?;
    Ok(Bank::restore(
        BankId::from_uuid(row.id),
        row.code,
        row.name,
        row.is_active,
        row.created_at,
    ))
}

fn card_from_row(row: &PgRow) -> Result<Card, StoreError> {
    let row = CardRow::from_row(row).map_err(|e| decode_error("card", e))?;
    Ok(Card::restore(
        CardId::from_uuid(row.id),
        BankId::from_uuid(row.bank_id),
        row.name,
        CardClass::restore(row.card_type, row.sub_type, row.sub_sub_type),
        CardThresholds::restore(row.min_threshold, row.max_threshold),
        row.quantity,
        row.is_active,
        row.created_at,
        row.updated_at,
    ))
}

fn location_from_row(row: &PgRow) -> Result<Location, StoreError> {
    let row = LocationRow::from_row(row).map_err(|e| decode_error("location", e))?;
    Ok(Location::restore(
        LocationId::from_uuid(row.id),
        BankId::from_uuid(row.bank_id),
        row.name,
        row.site,
        row.is_active,
        row.created_at,
    ))
}

fn balance_from_row(row: &PgRow) -> Result<StockBalance, StoreError> {
    let row = BalanceRow::from_row(row).map_err(|e| decode_error("stock balance", e))?;
    Ok(StockBalance::restore(
        CardId::from_uuid(row.card_id),
        LocationId::from_uuid(row.location_id),
        row.quantity,
    ))
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let row = MovementRow::from_row(row).map_err(|e| decode_error("movement", e))?;
    let movement_type: MovementType = row
        .movement_type
        .parse()
        .map_err(StoreError::Domain)?;
    Ok(Movement {
        id: MovementId::from_uuid(row.id),
        card_id: CardId::from_uuid(row.card_id),
        movement_type,
        quantity: row.quantity,
        from_location_id: row.from_location_id.map(LocationId::from_uuid),
        to_location_id: row.to_location_id.map(LocationId::from_uuid),
        reason: row.reason,
        recorded_by: UserId::from_uuid(row.recorded_by),
        recorded_at: row.recorded_at,
    })
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::unavailable("decode_row", format!("failed to decode {what} row: {err}"))
}

#[derive(Debug)]
struct BankRow {
    id: uuid::Uuid,
    code: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BankRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BankRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct CardRow {
    id: uuid::Uuid,
    bank_id: uuid::Uuid,
    name: String,
    card_type: String,
    sub_type: Option<String>,
    sub_sub_type: Option<String>,
    min_threshold: i64,
    max_threshold: i64,
    quantity: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CardRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CardRow {
            id: row.try_get("id")?,
            bank_id: row.try_get("bank_id")?,
            name: row.try_get("name")?,
            card_type: row.try_get("card_type")?,
            sub_type: row.try_get("sub_type")?,
            sub_sub_type: row.try_get("sub_sub_type")?,
            min_threshold: row.try_get("min_threshold")?,
            max_threshold: row.try_get("max_threshold")?,
            quantity: row.try_get("quantity")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug)]
struct LocationRow {
    id: uuid::Uuid,
    bank_id: uuid::Uuid,
    name: String,
    site: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for LocationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LocationRow {
            id: row.try_get("id")?,
            bank_id: row.try_get("bank_id")?,
            name: row.try_get("name")?,
            site: row.try_get("site")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct BalanceRow {
    card_id: uuid::Uuid,
    location_id: uuid::Uuid,
    quantity: i64,
}

impl<'r> FromRow<'r, PgRow> for BalanceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BalanceRow {
            card_id: row.try_get("card_id")?,
            location_id: row.try_get("location_id")?,
            quantity: row.try_get("quantity")?,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    id: uuid::Uuid,
    card_id: uuid::Uuid,
    movement_type: String,
    quantity: i64,
    from_location_id: Option<uuid::Uuid>,
    to_location_id: Option<uuid::Uuid>,
    reason: String,
    recorded_by: uuid::Uuid,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            card_id: row.try_get("card_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            from_location_id: row.try_get("from_location_id")?,
            to_location_id: row.try_get("to_location_id")?,
            reason: row.try_get("reason")?,
            recorded_by: row.try_get("recorded_by")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_map_to_unavailable() {
        let err = map_sqlx_error("insert_bank", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Unavailable { .. }));

        let err = map_sqlx_error("balance", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
