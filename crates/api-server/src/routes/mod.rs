//! Route handlers

pub mod auth;
pub mod clerk;
pub mod health;
pub mod session;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use portal_core::Error;

/// Custom header carrying the portal session bearer token. Never a cookie.
pub const SESSION_HEADER: &str = "x-customer-session";

/// The one error body shape every endpoint uses.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

pub fn error_body(message: impl Into<String>) -> Json<ApiError> {
    Json(ApiError {
        success: false,
        error: message.into(),
    })
}

/// The only place core errors turn into HTTP statuses. Infrastructure
/// failures keep their detail in the logs and send a generic body.
pub fn error_response(err: Error) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
        Error::TokenNotFound | Error::TokenExpired => StatusCode::UNAUTHORIZED,
        Error::NoMatchingCustomer => StatusCode::NOT_FOUND,
        Error::AlreadyHasPassword => StatusCode::CONFLICT,
        Error::NoAccessToBusiness => StatusCode::FORBIDDEN,
        Error::Notification(_)
        | Error::Hash(_)
        | Error::Io(_)
        | Error::Serialization(_)
        | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
        return (status, error_body("Internal server error"));
    }
    (status, error_body(err.to_string()))
}

/// Pull the session bearer token out of the request headers, if present.
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
