use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use cardvault_auth::{Action, Module, Permission, Session};
use cardvault_core::{CardId, LocationId};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:card_id/:location_id", get(available_stock))
}

/// Live balance for one (card, location) pair. Advisory: the authoritative
/// check happens again inside the movement write.
pub async fn available_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path((card_id, location_id)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Cards, Action::View)) {
        return errors::forbidden(e);
    }
    let card_id: CardId = match card_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid card id"),
    };
    let location_id: LocationId = match location_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid location id");
        }
    };

    match services.ledger.available_stock(card_id, location_id).await {
        Ok(available) => Json(serde_json::json!({
            "card_id": card_id.to_string(),
            "location_id": location_id.to_string(),
            "available": available,
        }))
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
