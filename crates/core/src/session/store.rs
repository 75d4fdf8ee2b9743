//! File-backed session store

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::AuthMethod;
use crate::directory::ActiveContext;
use crate::{Error, Result};

use super::model::Session;

pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<String, Session>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSessionState {
    sessions: Vec<Session>,
}

impl From<StoredSessionState> for SessionState {
    fn from(value: StoredSessionState) -> Self {
        Self {
            sessions: value
                .sessions
                .into_iter()
                .map(|item| (item.token_hash.clone(), item))
                .collect(),
        }
    }
}

impl From<&SessionState> for StoredSessionState {
    fn from(value: &SessionState) -> Self {
        Self {
            sessions: value.sessions.values().cloned().collect(),
        }
    }
}

#[derive(Clone)]
pub struct FileSessionStore {
    state: Arc<RwLock<SessionState>>,
    file_path: PathBuf,
    ttl_days: i64,
}

impl FileSessionStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|err| Error::Storage(format!("Failed to create data directory: {}", err)))?;

        let file_path = base_dir.join("sessions.json");
        let state = load_state(&file_path).await?;
        let ttl_days = std::env::var("PORTAL_SESSION_TTL_DAYS")
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_DAYS);

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            file_path,
            ttl_days,
        })
    }

    /// Issue a fresh session. Returns the raw bearer token together with
    /// the stored row; the raw value is not recoverable afterwards.
    pub async fn issue(
        &self,
        account_id: Uuid,
        auth_method: AuthMethod,
        context: Option<ActiveContext>,
    ) -> Result<(String, Session)> {
        let raw_token = generate_session_token();
        let now = Utc::now();
        let session = Session {
            token_hash: hash_token(&raw_token),
            account_id,
            auth_method,
            active_customer_id: context.map(|ctx| ctx.customer_id),
            active_business_id: context.map(|ctx| ctx.business_id),
            created_at: now,
            expires_at: now + Duration::days(self.ttl_days),
        };

        let mut state = self.state.write().await;
        state
            .sessions
            .insert(session.token_hash.clone(), session.clone());
        persist_state(&self.file_path, &state).await?;
        Ok((raw_token, session))
    }

    /// Look up a session by its raw bearer token. Unknown and expired
    /// tokens are the same `None`; callers cannot tell them apart, and
    /// neither can whoever is probing the API. Expired rows stay on disk.
    pub async fn validate(&self, raw_token: &str) -> Option<Session> {
        let token_hash = hash_token(raw_token);
        let state = self.state.read().await;
        let session = state.sessions.get(&token_hash)?;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.clone())
    }

    /// Drop a session. Returns whether anything was actually removed;
    /// revoking an unknown token is a quiet success.
    pub async fn revoke(&self, raw_token: &str) -> Result<bool> {
        let token_hash = hash_token(raw_token);
        let mut state = self.state.write().await;
        let removed = state.sessions.remove(&token_hash).is_some();
        if removed {
            persist_state(&self.file_path, &state).await?;
        }
        Ok(removed)
    }

    /// Point an existing session at a different business context.
    pub async fn set_active_context(
        &self,
        token_hash: &str,
        context: ActiveContext,
    ) -> Result<Session> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(token_hash)
            .ok_or_else(|| Error::Storage("Session not found".to_string()))?;
        session.active_customer_id = Some(context.customer_id);
        session.active_business_id = Some(context.business_id);
        let session = session.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(session)
    }
}

fn generate_session_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("cs_{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

async fn load_state(path: &Path) -> Result<SessionState> {
    if !path.exists() {
        return Ok(SessionState::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to read session state: {}", err)))?;
    if content.trim().is_empty() {
        return Ok(SessionState::default());
    }
    let stored: StoredSessionState = serde_json::from_str(&content)
        .map_err(|err| Error::Storage(format!("Failed to parse session state: {}", err)))?;
    Ok(stored.into())
}

async fn persist_state(path: &Path, state: &SessionState) -> Result<()> {
    let content = serde_json::to_string_pretty(&StoredSessionState::from(state))
        .map_err(|err| Error::Storage(format!("Failed to serialize session state: {}", err)))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|err| Error::Storage(format!("Failed to write session state: {}", err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn build_store() -> (FileSessionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("data"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn context() -> ActiveContext {
        ActiveContext {
            customer_id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn issue_and_validate_round_trip() {
        let (store, _temp_dir) = build_store().await;
        let account_id = Uuid::new_v4();
        let ctx = context();
        let (raw, issued) = store
            .issue(account_id, AuthMethod::Password, Some(ctx))
            .await
            .unwrap();

        assert!(raw.starts_with("cs_"));
        assert_ne!(issued.token_hash, raw);

        let session = store.validate(&raw).await.unwrap();
        assert_eq!(session.account_id, account_id);
        assert_eq!(session.active_business_id, Some(ctx.business_id));
        assert_eq!(session.active_customer_id, Some(ctx.customer_id));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (store, _temp_dir) = build_store().await;
        assert!(store.validate("cs_definitely-not-issued").await.is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (store, _temp_dir) = build_store().await;
        let (raw, _) = store
            .issue(Uuid::new_v4(), AuthMethod::MagicLink, Some(context()))
            .await
            .unwrap();

        assert!(store.revoke(&raw).await.unwrap());
        assert!(store.validate(&raw).await.is_none());
        assert!(!store.revoke(&raw).await.unwrap());
        assert!(!store.revoke("cs_never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn sessions_per_account_are_independent() {
        let (store, _temp_dir) = build_store().await;
        let account_id = Uuid::new_v4();
        let (first, _) = store
            .issue(account_id, AuthMethod::Password, Some(context()))
            .await
            .unwrap();
        let (second, _) = store
            .issue(account_id, AuthMethod::Password, Some(context()))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(store.revoke(&first).await.unwrap());
        assert!(store.validate(&second).await.is_some());
    }

    #[tokio::test]
    async fn expired_rows_load_but_do_not_validate() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");
        tokio::fs::create_dir_all(&dir).await.unwrap();

        // A row written by an earlier deployment: already expired, and
        // predating the context fields entirely.
        let raw = "cs_legacy-row-token";
        let stored = serde_json::json!({
            "sessions": [{
                "token_hash": hash_token(raw),
                "account_id": Uuid::new_v4(),
                "auth_method": "magic_link",
                "created_at": "2020-01-01T00:00:00Z",
                "expires_at": "2020-01-31T00:00:00Z"
            }]
        });
        tokio::fs::write(
            dir.join("sessions.json"),
            serde_json::to_string_pretty(&stored).unwrap(),
        )
        .await
        .unwrap();

        let store = FileSessionStore::new(dir).await.unwrap();
        assert!(store.validate(raw).await.is_none());
    }

    #[tokio::test]
    async fn set_active_context_persists() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");

        let (raw, new_ctx) = {
            let store = FileSessionStore::new(dir.clone()).await.unwrap();
            let (raw, session) = store
                .issue(Uuid::new_v4(), AuthMethod::Clerk, None)
                .await
                .unwrap();
            assert!(session.active_business_id.is_none());
            let new_ctx = context();
            store
                .set_active_context(&session.token_hash, new_ctx)
                .await
                .unwrap();
            (raw, new_ctx)
        };

        let store = FileSessionStore::new(dir).await.unwrap();
        let session = store.validate(&raw).await.unwrap();
        assert_eq!(session.active_business_id, Some(new_ctx.business_id));
        assert_eq!(session.active_customer_id, Some(new_ctx.customer_id));
    }
}
