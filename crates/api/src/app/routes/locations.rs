use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use cardvault_auth::{Action, Module, Permission, Session};
use cardvault_core::LocationId;
use cardvault_infra::NewLocation;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_location).get(list_locations))
        .route("/:id", get(get_location).delete(deactivate_location))
}

pub async fn create_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Json(body): Json<dto::CreateLocationRequest>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Locations, Action::Create)) {
        return errors::forbidden(e);
    }
    let bank_id = match body.bank_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid bank id"),
    };

    match services
        .catalog
        .create_location(NewLocation {
            bank_id,
            name: body.name,
            site: body.site,
        })
        .await
    {
        Ok(location) => {
            (StatusCode::CREATED, Json(dto::location_to_json(&location))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_locations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Locations, Action::View)) {
        return errors::forbidden(e);
    }

    match services.catalog.locations().await {
        Ok(locations) => Json(
            locations
                .iter()
                .map(dto::location_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Locations, Action::View)) {
        return errors::forbidden(e);
    }
    let location_id: LocationId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid location id");
        }
    };

    match services.catalog.location(location_id).await {
        Ok(location) => Json(dto::location_to_json(&location)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Soft delete. Refused while any card still has stock at the location.
pub async fn deactivate_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Locations, Action::Delete)) {
        return errors::forbidden(e);
    }
    let location_id: LocationId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid location id");
        }
    };

    match services.catalog.deactivate_location(location_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
