//! Credential flows: magic links, password register/login, password resets.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_core::account::AccountSummary;
use portal_core::directory::{AvailableContext, CustomerSummary};
use portal_core::flows::AuthSession;

use crate::state::AppState;

use super::{error_response, ApiError};

/// The lookup outcome stays invisible: both messages below are sent whether
/// or not the email matched anything.
const MAGIC_LINK_MESSAGE: &str =
    "If that email is in our system, a sign-in link is on its way.";
const RESET_MESSAGE: &str =
    "If that email is in our system, a password reset link is on its way.";

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyMagicRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub invite_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkResponse {
    pub success: bool,
    // Historical camelCase key; the rest of the wire is snake_case.
    #[serde(rename = "emailSent")]
    pub email_sent: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Body returned by every flow that opens a session.
#[derive(Debug, Serialize)]
pub struct AuthSuccessResponse {
    pub success: bool,
    pub session_token: String,
    pub session_expires_at: DateTime<Utc>,
    pub customer_account: AccountSummary,
    pub customer: Option<CustomerSummary>,
    pub available_businesses: Vec<AvailableContext>,
    pub active_business_id: Option<Uuid>,
    pub active_customer_id: Option<Uuid>,
}

pub(crate) fn auth_success(auth: AuthSession) -> AuthSuccessResponse {
    let AuthSession { token, view } = auth;
    AuthSuccessResponse {
        success: true,
        session_token: token,
        session_expires_at: view.session.expires_at,
        customer_account: view.account.to_summary(),
        customer: view.customer.as_ref().map(|record| record.to_summary()),
        available_businesses: view.available_businesses,
        active_business_id: view.session.active_business_id,
        active_customer_id: view.session.active_customer_id,
    }
}

async fn request_magic_link(
    State(state): State<AppState>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<Json<MagicLinkResponse>, (StatusCode, Json<ApiError>)> {
    let outcome = state
        .flows()
        .request_magic_link(&req.email, req.redirect_url.as_deref())
        .await
        .map_err(error_response)?;

    Ok(Json(MagicLinkResponse {
        success: true,
        email_sent: outcome.email_sent,
        message: MAGIC_LINK_MESSAGE.to_string(),
    }))
}

async fn verify_magic(
    State(state): State<AppState>,
    Json(req): Json<VerifyMagicRequest>,
) -> Result<Json<AuthSuccessResponse>, (StatusCode, Json<ApiError>)> {
    let auth = state
        .flows()
        .verify_magic_link(&req.token)
        .await
        .map_err(error_response)?;
    Ok(Json(auth_success(auth)))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthSuccessResponse>, (StatusCode, Json<ApiError>)> {
    let auth = state
        .flows()
        .register(&req.email, &req.password, req.invite_token.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(auth_success(auth)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthSuccessResponse>, (StatusCode, Json<ApiError>)> {
    let auth = state
        .flows()
        .login(&req.email, &req.password)
        .await
        .map_err(error_response)?;
    Ok(Json(auth_success(auth)))
}

async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ApiError>)> {
    state
        .flows()
        .request_password_reset(&req.email)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        success: true,
        message: RESET_MESSAGE.to_string(),
    }))
}

async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ApiError>)> {
    state
        .flows()
        .confirm_password_reset(&req.token, &req.password)
        .await
        .map_err(error_response)?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Password updated.".to_string(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/customer-auth/magic-link", post(request_magic_link))
        .route("/api/v1/customer-auth/verify-magic", post(verify_magic))
        .route("/api/v1/customer-auth/register", post(register))
        .route("/api/v1/customer-auth/login", post(login))
        .route(
            "/api/v1/customer-auth/password-reset",
            post(request_password_reset),
        )
        .route(
            "/api/v1/customer-auth/password-reset-confirm",
            post(confirm_password_reset),
        )
}
