use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use cardvault_auth::{Action, Module, Permission, Session};
use cardvault_core::BankId;
use cardvault_infra::NewBank;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bank).get(list_banks))
        .route("/:id", get(get_bank))
        .route("/:id/cards", get(list_bank_cards))
}

pub async fn create_bank(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Json(body): Json<dto::CreateBankRequest>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Banks, Action::Create)) {
        return errors::forbidden(e);
    }

    match services
        .catalog
        .create_bank(NewBank {
            code: body.code,
            name: body.name,
        })
        .await
    {
        Ok(bank) => (StatusCode::CREATED, Json(dto::bank_to_json(&bank))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_banks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Banks, Action::View)) {
        return errors::forbidden(e);
    }

    match services.catalog.banks().await {
        Ok(banks) => Json(
            banks
                .iter()
                .map(dto::bank_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_bank(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Banks, Action::View)) {
        return errors::forbidden(e);
    }
    let bank_id: BankId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid bank id"),
    };

    match services.catalog.bank(bank_id).await {
        Ok(bank) => Json(dto::bank_to_json(&bank)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_bank_cards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }
    let bank_id: BankId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid bank id"),
    };

    match services.catalog.cards_for_bank(bank_id).await {
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
