use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use cardvault_auth::Session;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(session): Extension<Session>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": session.user_id().to_string(),
        "roles": session.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": session.permissions().grant_strings(),
    }))
}
