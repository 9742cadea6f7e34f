use axum::{Router, routing::get};

pub mod audit;
pub mod banks;
pub mod cards;
pub mod locations;
pub mod movements;
pub mod stock;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/banks", banks::router())
        .nest("/cards", cards::router())
        .nest("/locations", locations::router())
        .nest("/movements", movements::router())
        .nest("/stock", stock::router())
        .nest("/audit", audit::router())
}
