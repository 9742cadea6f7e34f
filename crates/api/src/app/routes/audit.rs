use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use cardvault_auth::{Action, Module, Permission, Session};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(recent_entries))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Most recent audit entries, newest first.
pub async fn recent_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<Session>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    if let Err(e) = session.require(Permission::new(Module::Audit, Action::View)) {
        return errors::forbidden(e);
    }

    let entries = services.audit.recent(query.limit.unwrap_or(50)).await;
    Json(entries).into_response()
}
