//! HTTP application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: store selection and service/observer wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> Router {
    let validator = Arc::new(cardvault_auth::Hs256TokenValidator::new(
        jwt_secret.into_bytes(),
    ));
    let auth_state = middleware::AuthState { validator };

    let services = Arc::new(services::build_services().await);

    // Protected routes: everything except the health probe.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
