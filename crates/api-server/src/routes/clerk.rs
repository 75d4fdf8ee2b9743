//! Clerk federation endpoints.
//!
//! The Clerk session token is treated as an opaque bearer credential here;
//! verifying it cryptographically is the upstream SDK's job. These routes
//! only maintain the subject-to-account link and report portal context.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use portal_core::account::AccountSummary;
use portal_core::directory::{AvailableContext, CustomerSummary};
use portal_core::flows::{ClerkLink, ClerkVerify};

use crate::state::AppState;

use super::{error_body, error_response, ApiError};

#[derive(Debug, Deserialize)]
pub struct ClerkLinkRequest {
    pub clerk_user_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ClerkVerifyRequest {
    pub clerk_user_id: String,
    pub email: Option<String>,
}

/// Link outcome. Carries no session token: Clerk owns that session.
#[derive(Debug, Serialize)]
pub struct ClerkLinkResponse {
    pub success: bool,
    pub customer_account: AccountSummary,
    pub customer: Option<CustomerSummary>,
    pub available_businesses: Vec<AvailableContext>,
}

#[derive(Debug, Serialize)]
pub struct ClerkVerifyResponse {
    pub success: bool,
    pub authenticated: bool,
    pub needs_linking: bool,
    pub customer_account: AccountSummary,
    pub customer: Option<CustomerSummary>,
    pub available_businesses: Vec<AvailableContext>,
}

#[derive(Debug, Serialize)]
pub struct NeedsLinkingResponse {
    pub success: bool,
    pub authenticated: bool,
    pub needs_linking: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn link_response(link: ClerkLink) -> ClerkLinkResponse {
    ClerkLinkResponse {
        success: true,
        customer_account: link.account.to_summary(),
        customer: link.customer.as_ref().map(|record| record.to_summary()),
        available_businesses: link.available_businesses,
    }
}

fn verify_response(link: ClerkLink) -> ClerkVerifyResponse {
    ClerkVerifyResponse {
        success: true,
        authenticated: true,
        needs_linking: false,
        customer_account: link.account.to_summary(),
        customer: link.customer.as_ref().map(|record| record.to_summary()),
        available_businesses: link.available_businesses,
    }
}

async fn clerk_link(
    State(state): State<AppState>,
    Json(req): Json<ClerkLinkRequest>,
) -> Result<Json<ClerkLinkResponse>, (StatusCode, Json<ApiError>)> {
    let link = state
        .flows()
        .clerk_link(&req.clerk_user_id, &req.email)
        .await
        .map_err(error_response)?;
    Ok(Json(link_response(link)))
}

async fn clerk_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ClerkVerifyRequest>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    if bearer_token(&headers).is_none() {
        return Err((
            StatusCode::UNAUTHORIZED,
            error_body("Missing bearer token"),
        ));
    }

    let outcome = state
        .flows()
        .clerk_verify(&req.clerk_user_id, req.email.as_deref())
        .await
        .map_err(error_response)?;

    Ok(match outcome {
        ClerkVerify::Verified(link) | ClerkVerify::Linked(link) => {
            Json(verify_response(link)).into_response()
        }
        ClerkVerify::NeedsLinking => Json(NeedsLinkingResponse {
            success: true,
            authenticated: false,
            needs_linking: true,
        })
        .into_response(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/customer-auth/clerk-link", post(clerk_link))
        .route("/api/v1/customer-auth/clerk-verify", post(clerk_verify))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use portal_core::account::FileAccountStore;
    use portal_core::directory::FileDirectoryStore;
    use portal_core::flows::AuthFlows;
    use portal_core::notify::LogMailer;
    use portal_core::session::FileSessionStore;

    use crate::state::AppState;

    async fn build_state() -> (AppState, FileDirectoryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_path_buf();
        let accounts = FileAccountStore::new(data_dir.clone()).await.unwrap();
        let directory = FileDirectoryStore::new(data_dir.clone()).await.unwrap();
        let sessions = FileSessionStore::new(data_dir.clone()).await.unwrap();
        let flows = AuthFlows::new(
            accounts,
            directory.clone(),
            sessions,
            Arc::new(LogMailer),
            "http://localhost:3000".to_string(),
        );
        let state = AppState::with_flows(data_dir, flows);
        (state, directory, temp_dir)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn clerk_link_ties_subject_without_a_session() {
        let (state, directory, _temp_dir) = build_state().await;
        let business = directory.insert_business("Acme").await.unwrap();
        directory
            .insert_customer(business.id, "jane@example.com", None)
            .await
            .unwrap();

        let app = super::router().with_state(state);
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-link",
                None,
                json!({"clerk_user_id": "user_abc", "email": "jane@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["customer_account"]["email"], "jane@example.com");
        assert_eq!(payload["available_businesses"].as_array().unwrap().len(), 1);
        // No portal session on the federated branch.
        assert!(payload.get("session_token").is_none());

        let unknown = app
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-link",
                None,
                json!({"clerk_user_id": "user_abc", "email": "stranger@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clerk_verify_requires_a_bearer() {
        let (state, _directory, _temp_dir) = build_state().await;
        let app = super::router().with_state(state);

        let response = app
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-verify",
                None,
                json!({"clerk_user_id": "user_abc"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let payload = json_body(response).await;
        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "Missing bearer token");
    }

    #[tokio::test]
    async fn clerk_verify_covers_all_three_outcomes() {
        let (state, directory, _temp_dir) = build_state().await;
        let business = directory.insert_business("Acme").await.unwrap();
        directory
            .insert_customer(business.id, "jane@example.com", None)
            .await
            .unwrap();
        state
            .flows()
            .clerk_link("user_linked", "jane@example.com")
            .await
            .unwrap();

        let app = super::router().with_state(state);

        // Known subject.
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-verify",
                Some("opaque-clerk-jwt"),
                json!({"clerk_user_id": "user_linked"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["authenticated"], true);
        assert_eq!(payload["needs_linking"], false);

        // Unknown subject, no email to fall back on.
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-verify",
                Some("opaque-clerk-jwt"),
                json!({"clerk_user_id": "user_unknown"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["authenticated"], false);
        assert_eq!(payload["needs_linking"], true);

        // Unknown subject with an email: linked on the spot.
        let response = app
            .oneshot(post_json(
                "/api/v1/customer-auth/clerk-verify",
                Some("opaque-clerk-jwt"),
                json!({"clerk_user_id": "user_new", "email": "jane@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["authenticated"], true);
        assert_eq!(payload["customer_account"]["email"], "jane@example.com");
    }
}
