use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use cardvault_auth::{Action, Module, Permission, Session};
use cardvault_core::CardId;
use cardvault_infra::NewCard;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_card).get(list_cards))
        .route("/:id", get(get_card).put(update_card).delete(deactivate_card))
        .route("/:id/balances", get(card_balances))
        .route("/:id/rebuild", post(rebuild_card))
        .route("/:id/consistency", get(card_consistency))
}

pub async fn create_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Json(body): Json<dto::CreateCardRequest>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::Create)) {
        return errors::forbidden(e);
    }
    let bank_id = match body.bank_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid bank id"),
    };
    let class = match body.class() {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };
    let thresholds = match body.thresholds() {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    match services
        .catalog
        .create_card(NewCard {
            bank_id,
            name: body.name,
            class,
            thresholds,
        })
        .await
    {
        Ok(card) => (StatusCode::CREATED, Json(dto::card_to_json(&card))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_cards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }

    match services.catalog.cards().await {
        Ok(cards) => Json(
            cards
                .iter()
                .map(dto::card_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };

    match services.catalog.card(card_id).await {
        Ok(card) => Json(dto::card_to_json(&card)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCardRequest>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::Edit)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };
    let update = match body.into_update() {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    match services.catalog.update_card(card_id, update).await {
        Ok(card) => Json(dto::card_to_json(&card)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Soft delete. Only permitted once the card's stock is zero everywhere.
pub async fn deactivate_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::Delete)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };

    match services.catalog.deactivate_card(card_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn card_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };

    match services.ledger.balances_for_card(card_id).await {
        Ok(balances) => Json(
            balances
                .iter()
                .map(dto::balance_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Replay the card's full history and overwrite the live balance rows.
pub async fn rebuild_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Movements, Action::Edit)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };

    match services.ledger.rebuild_from_history(card_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Read-only drift check between live rows and replayed history.
pub async fn card_consistency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };

    match services.ledger.verify_consistency(card_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
