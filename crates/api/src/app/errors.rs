use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cardvault_auth::AuthzError;
use cardvault_core::DomainError;
use cardvault_infra::LedgerError;

/// Map a service failure onto a status code and a stable error code.
///
/// Semantic refusals (insufficient stock, ownership, corrupt history) are
/// 422: the request was well-formed, the ledger said no.
pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        LedgerError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", msg)
        }
        LedgerError::Domain(err @ DomainError::NotFound { .. }) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        LedgerError::Domain(
            err @ DomainError::InsufficientStock {
                requested,
                available,
                ..
            },
        ) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": err.to_string(),
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        LedgerError::Domain(err @ DomainError::OwnershipMismatch { .. }) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "ownership_mismatch",
            err.to_string(),
        ),
        LedgerError::Domain(err @ DomainError::InvariantViolation(_)) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            err.to_string(),
        ),
        LedgerError::Storage(err) => {
            tracing::error!(error = %err, "storage failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "storage backend failure",
            )
        }
    }
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
