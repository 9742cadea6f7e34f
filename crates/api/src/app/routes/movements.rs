use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;

use cardvault_auth::{Action, Module, Permission, Session};
use cardvault_core::{CardId, MovementId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_movement).get(list_movements))
        .route("/:id", axum::routing::put(correct_movement).delete(revert_movement))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Json(body): Json<dto::MovementBody>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Movements, Action::Create)) {
        return errors::forbidden(e);
    }
    let request = match body.to_domain(session.user_id()) {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    match services.ledger.record_movement(request).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMovementsQuery {
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// With `card_id`, the card's full history oldest-first; without it, the
/// most recent lines across all cards.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Query(query): Query<ListMovementsQuery>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Movements, Action::View)) {
        return errors::forbidden(e);
    }

    let result = match query.card_id {
        Some(raw) => {
            let card_id: CardId = match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    return errors::json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_id",
                        "invalid card id",
                    );
                }
            };
            services.ledger.movements_for_card(card_id).await
        }
        None => {
            services
                .ledger
                .recent_movements(query.limit.unwrap_or(50))
                .await
        }
    };

    match result {
        Ok(movements) => Json(movements).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Administrative revert: undo the movement's balance effects and delete
/// the line.
pub async fn revert_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Movements, Action::Delete)) {
        return errors::forbidden(e);
    }
    let movement_id: MovementId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid movement id");
        }
    };

    match services
        .ledger
        .revert_movement(movement_id, session.user_id())
        .await
    {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Administrative correction: rewrite the line in place, guarded against the
/// net balance change.
pub async fn correct_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<dto::MovementBody>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Movements, Action::Edit)) {
        return errors::forbidden(e);
    }
    let movement_id: MovementId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid movement id");
        }
    };
    let request = match body.to_domain(session.user_id()) {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    match services.ledger.correct_movement(movement_id, request).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
