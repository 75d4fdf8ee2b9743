//! Session endpoints: check, logout, business switching.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_core::account::AccountSummary;
use portal_core::directory::{AvailableContext, CustomerSummary};
use portal_core::flows::SessionView;

use crate::state::AppState;

use super::{error_body, error_response, session_token_from_headers, ApiError};

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Missing, unknown and expired tokens all produce exactly this body.
#[derive(Debug, Serialize)]
pub struct UnauthenticatedResponse {
    pub success: bool,
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub authenticated: bool,
    pub session_expires_at: DateTime<Utc>,
    pub customer_account: AccountSummary,
    pub customer: Option<CustomerSummary>,
    pub available_businesses: Vec<AvailableContext>,
    pub active_business_id: Option<Uuid>,
    pub active_customer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchBusinessRequest {
    pub business_id: Uuid,
}

pub(crate) fn session_body(view: SessionView) -> SessionResponse {
    SessionResponse {
        success: true,
        authenticated: true,
        session_expires_at: view.session.expires_at,
        customer_account: view.account.to_summary(),
        customer: view.customer.as_ref().map(|record| record.to_summary()),
        available_businesses: view.available_businesses,
        active_business_id: view.session.active_business_id,
        active_customer_id: view.session.active_customer_id,
    }
}

fn unauthenticated() -> Response {
    Json(UnauthenticatedResponse {
        success: true,
        authenticated: false,
    })
    .into_response()
}

async fn check_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let Some(token) = session_token_from_headers(&headers) else {
        return Ok(unauthenticated());
    };
    match state
        .flows()
        .check_session(token)
        .await
        .map_err(error_response)?
    {
        Some(view) => Ok(Json(session_body(view)).into_response()),
        None => Ok(unauthenticated()),
    }
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ApiError>)> {
    let token = session_token_from_headers(&headers);
    state.flows().logout(token).await.map_err(error_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn switch_business(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SwitchBusinessRequest>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<ApiError>)> {
    let Some(token) = session_token_from_headers(&headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            error_body("Invalid or expired session"),
        ));
    };
    match state
        .flows()
        .switch_business(token, req.business_id)
        .await
        .map_err(error_response)?
    {
        Some(view) => Ok(Json(session_body(view))),
        None => Err((
            StatusCode::UNAUTHORIZED,
            error_body("Invalid or expired session"),
        )),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/customer-auth/session", get(check_session))
        .route("/api/v1/customer-auth/logout", post(logout))
        .route(
            "/api/v1/customer-auth/switch-business",
            post(switch_business),
        )
}
