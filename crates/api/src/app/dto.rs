//! Request bodies and JSON mapping for catalog entities.
//!
//! Ledger receipts and reports serialize directly; only the catalog types
//! (private fields, richer internal shape) get explicit mappers.

use serde::Deserialize;
use serde_json::json;

use cardvault_catalog::{Bank, Card, CardClass, CardThresholds, CardUpdate, Location};
use cardvault_core::{DomainError, DomainResult, UserId};
use cardvault_ledger::{MovementRequest, StockBalance};

#[derive(Debug, Deserialize)]
pub struct CreateBankRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub bank_id: String,
    pub name: String,
    pub card_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub sub_sub_type: Option<String>,
    pub min_threshold: i64,
    pub max_threshold: i64,
}

impl CreateCardRequest {
    pub fn class(&self) -> DomainResult<CardClass> {
        CardClass::new(
            self.card_type.clone(),
            self.sub_type.clone(),
            self.sub_sub_type.clone(),
        )
    }

    pub fn thresholds(&self) -> DomainResult<CardThresholds> {
        CardThresholds::new(self.min_threshold, self.max_threshold)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub sub_sub_type: Option<String>,
    #[serde(default)]
    pub min_threshold: Option<i64>,
    #[serde(default)]
    pub max_threshold: Option<i64>,
}

impl UpdateCardRequest {
    /// Classification and thresholds update as wholes, never field-by-field.
    pub fn into_update(self) -> DomainResult<CardUpdate> {
        let class = match self.card_type {
            Some(card_type) => Some(CardClass::new(card_type, self.sub_type, self.sub_sub_type)?),
            None if self.sub_type.is_some() || self.sub_sub_type.is_some() => {
                return Err(DomainError::validation(
                    "changing the classification requires card_type",
                ));
            }
            None => None,
        };
        let thresholds = match (self.min_threshold, self.max_threshold) {
            (Some(min), Some(max)) => Some(CardThresholds::new(min, max)?),
            (None, None) => None,
            _ => {
                return Err(DomainError::validation(
                    "min_threshold and max_threshold must be updated together",
                ));
            }
        };
        Ok(CardUpdate {
            name: self.name,
            class,
            thresholds,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    pub bank_id: String,
    pub name: String,
    #[serde(default)]
    pub site: Option<String>,
}

/// Body for recording a movement and for correcting an existing one.
#[derive(Debug, Deserialize)]
pub struct MovementBody {
    pub card_id: String,
    pub movement_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub from_location_id: Option<String>,
    #[serde(default)]
    pub to_location_id: Option<String>,
    pub reason: String,
}

impl MovementBody {
    pub fn to_domain(&self, recorded_by: UserId) -> DomainResult<MovementRequest> {
        Ok(MovementRequest {
            card_id: self.card_id.parse()?,
            movement_type: self.movement_type.parse()?,
            quantity: self.quantity,
            from_location_id: parse_optional_id(self.from_location_id.as_deref())?,
            to_location_id: parse_optional_id(self.to_location_id.as_deref())?,
            reason: self.reason.clone(),
            recorded_by,
        })
    }
}

fn parse_optional_id<T>(raw: Option<&str>) -> DomainResult<Option<T>>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.map(str::parse).transpose()
}

pub fn bank_to_json(bank: &Bank) -> serde_json::Value {
    json!({
        "id": bank.id().to_string(),
        "code": bank.code(),
        "name": bank.name(),
        "active": bank.is_active(),
        "created_at": bank.created_at(),
    })
}

pub fn card_to_json(card: &Card) -> serde_json::Value {
    json!({
        "id": card.id().to_string(),
        "bank_id": card.bank_id().to_string(),
        "name": card.name(),
        "card_type": card.class().card_type(),
        "sub_type": card.class().sub_type(),
        "sub_sub_type": card.class().sub_sub_type(),
        "min_threshold": card.thresholds().min(),
        "max_threshold": card.thresholds().max(),
        "quantity": card.quantity(),
        "below_min": card.is_below_min(),
        "above_max": card.is_above_max(),
        "active": card.is_active(),
        "created_at": card.created_at(),
        "updated_at": card.updated_at(),
    })
}

pub fn location_to_json(location: &Location) -> serde_json::Value {
    json!({
        "id": location.id().to_string(),
        "bank_id": location.bank_id().to_string(),
        "name": location.name(),
        "site": location.site(),
        "active": location.is_active(),
        "created_at": location.created_at(),
    })
}

pub fn balance_to_json(balance: &StockBalance) -> serde_json::Value {
    json!({
        "card_id": balance.card_id().to_string(),
        "location_id": balance.location_id().to_string(),
        "quantity": balance.quantity(),
    })
}
