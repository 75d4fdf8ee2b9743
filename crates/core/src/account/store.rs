//! File-backed account store
//!
//! Accounts live in a single JSON file under the data directory. The whole
//! state is cached in memory behind a tokio `RwLock` and rewritten after
//! every mutation. Check-and-mutate sequences hold the write lock for their
//! full duration, which is what makes single-use token consumption atomic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::token::{SingleUseToken, TokenKind};
use crate::{Error, Result};

use super::model::{AuthMethod, CustomerAccount};

#[derive(Debug, Default)]
struct AccountState {
    accounts: HashMap<Uuid, CustomerAccount>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredAccountState {
    accounts: Vec<CustomerAccount>,
}

impl From<StoredAccountState> for AccountState {
    fn from(value: StoredAccountState) -> Self {
        Self {
            accounts: value
                .accounts
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
        }
    }
}

impl From<&AccountState> for StoredAccountState {
    fn from(value: &AccountState) -> Self {
        Self {
            accounts: value.accounts.values().cloned().collect(),
        }
    }
}

#[derive(Clone)]
pub struct FileAccountStore {
    state: Arc<RwLock<AccountState>>,
    file_path: PathBuf,
}

impl FileAccountStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|err| Error::Storage(format!("Failed to create data directory: {}", err)))?;

        let file_path = base_dir.join("accounts.json");
        let state = load_state(&file_path).await?;

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            file_path,
        })
    }

    pub async fn get(&self, account_id: Uuid) -> Option<CustomerAccount> {
        let state = self.state.read().await;
        state.accounts.get(&account_id).cloned()
    }

    /// Look up an account by its normalized email.
    pub async fn find_by_email(&self, email: &str) -> Option<CustomerAccount> {
        let state = self.state.read().await;
        state
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned()
    }

    pub async fn find_by_clerk_user(&self, clerk_user_id: &str) -> Option<CustomerAccount> {
        let state = self.state.read().await;
        state
            .accounts
            .values()
            .find(|account| account.clerk_user_id.as_deref() == Some(clerk_user_id))
            .cloned()
    }

    /// Find the account for a normalized email or create one anchored to the
    /// given directory record. Lookup and insert happen under one write lock
    /// so two concurrent authentications cannot race a duplicate into place.
    pub async fn upsert_by_email(
        &self,
        email: &str,
        customer_id: Uuid,
    ) -> Result<CustomerAccount> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .accounts
            .values()
            .find(|account| account.email == email)
        {
            return Ok(existing.clone());
        }

        let account = CustomerAccount::new(email, customer_id);
        state.accounts.insert(account.id, account.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(account)
    }

    pub async fn set_password_hash(
        &self,
        account_id: Uuid,
        password_hash: String,
    ) -> Result<CustomerAccount> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| Error::Storage(format!("Account '{}' not found", account_id)))?;
        account.password_hash = Some(password_hash);
        account.updated_at = Utc::now();
        let account = account.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(account)
    }

    pub async fn set_clerk_user(
        &self,
        account_id: Uuid,
        clerk_user_id: &str,
    ) -> Result<CustomerAccount> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| Error::Storage(format!("Account '{}' not found", account_id)))?;
        account.clerk_user_id = Some(clerk_user_id.to_string());
        account.updated_at = Utc::now();
        let account = account.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(account)
    }

    /// Park a single-use token on the account. Any previously issued token
    /// is overwritten, which is how older links stop working.
    pub async fn store_token(&self, account_id: Uuid, token: SingleUseToken) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| Error::Storage(format!("Account '{}' not found", account_id)))?;
        account.single_use_token = Some(token);
        account.updated_at = Utc::now();
        persist_state(&self.file_path, &state).await?;
        Ok(())
    }

    /// Redeem a single-use token of the expected kind.
    ///
    /// Match, expiry check and clear are one state transition under the
    /// write lock: of N concurrent redeemers exactly one wins, the rest see
    /// `TokenNotFound`. A kind mismatch is also `TokenNotFound`, so a reset
    /// token presented as a login token gives nothing away.
    pub async fn consume_token(&self, value: &str, kind: TokenKind) -> Result<CustomerAccount> {
        let mut state = self.state.write().await;
        let account_id = state
            .accounts
            .values()
            .find(|account| {
                account
                    .single_use_token
                    .as_ref()
                    .map(|token| token.value == value && token.kind == kind)
                    .unwrap_or(false)
            })
            .map(|account| account.id)
            .ok_or(Error::TokenNotFound)?;

        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(Error::TokenNotFound)?;
        let token = account.single_use_token.as_ref().ok_or(Error::TokenNotFound)?;
        if token.is_expired(Utc::now()) {
            return Err(Error::TokenExpired);
        }

        account.single_use_token = None;
        account.updated_at = Utc::now();
        let account = account.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(account)
    }

    pub async fn record_login(
        &self,
        account_id: Uuid,
        method: AuthMethod,
    ) -> Result<CustomerAccount> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| Error::Storage(format!("Account '{}' not found", account_id)))?;
        let now = Utc::now();
        account.preferred_auth_method = Some(method);
        account.last_login_at = Some(now);
        account.updated_at = now;
        let account = account.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(account)
    }
}

async fn load_state(path: &Path) -> Result<AccountState> {
    if !path.exists() {
        return Ok(AccountState::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to read account state: {}", err)))?;
    if content.trim().is_empty() {
        return Ok(AccountState::default());
    }
    let stored: StoredAccountState = serde_json::from_str(&content)
        .map_err(|err| Error::Storage(format!("Failed to parse account state: {}", err)))?;
    Ok(stored.into())
}

async fn persist_state(path: &Path, state: &AccountState) -> Result<()> {
    let content = serde_json::to_string_pretty(&StoredAccountState::from(state))
        .map_err(|err| Error::Storage(format!("Failed to serialize account state: {}", err)))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|err| Error::Storage(format!("Failed to write account state: {}", err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;

    async fn build_store() -> (FileAccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileAccountStore::new(temp_dir.path().join("data"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn upsert_is_find_or_create() {
        let (store, _temp_dir) = build_store().await;
        let first_customer = Uuid::new_v4();
        let a = store
            .upsert_by_email("jane@example.com", first_customer)
            .await
            .unwrap();
        let b = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        // The original anchor stays; later matches do not move it.
        assert_eq!(b.customer_id, first_customer);
    }

    #[tokio::test]
    async fn consume_clears_the_token_slot() {
        let (store, _temp_dir) = build_store().await;
        let account = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        let token = SingleUseToken::issue(TokenKind::MagicLink);
        store.store_token(account.id, token.clone()).await.unwrap();

        let consumed = store
            .consume_token(&token.value, TokenKind::MagicLink)
            .await
            .unwrap();
        assert_eq!(consumed.id, account.id);
        assert!(consumed.single_use_token.is_none());

        let second = store.consume_token(&token.value, TokenKind::MagicLink).await;
        assert!(matches!(second, Err(Error::TokenNotFound)));
    }

    #[tokio::test]
    async fn consume_rejects_kind_mismatch() {
        let (store, _temp_dir) = build_store().await;
        let account = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        let token = SingleUseToken::issue(TokenKind::PasswordReset);
        store.store_token(account.id, token.clone()).await.unwrap();

        let result = store.consume_token(&token.value, TokenKind::MagicLink).await;
        assert!(matches!(result, Err(Error::TokenNotFound)));

        // The slot is untouched and still works for its real purpose.
        let result = store
            .consume_token(&token.value, TokenKind::PasswordReset)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn consume_reports_expiry() {
        let (store, _temp_dir) = build_store().await;
        let account = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        let mut token = SingleUseToken::issue(TokenKind::MagicLink);
        token.expires_at = Utc::now() - Duration::minutes(1);
        store.store_token(account.id, token.clone()).await.unwrap();

        let result = store.consume_token(&token.value, TokenKind::MagicLink).await;
        assert!(matches!(result, Err(Error::TokenExpired)));
    }

    #[tokio::test]
    async fn new_token_invalidates_the_previous_one() {
        let (store, _temp_dir) = build_store().await;
        let account = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        let old = SingleUseToken::issue(TokenKind::MagicLink);
        store.store_token(account.id, old.clone()).await.unwrap();
        let new = SingleUseToken::issue(TokenKind::MagicLink);
        store.store_token(account.id, new.clone()).await.unwrap();

        let stale = store.consume_token(&old.value, TokenKind::MagicLink).await;
        assert!(matches!(stale, Err(Error::TokenNotFound)));
        let fresh = store.consume_token(&new.value, TokenKind::MagicLink).await;
        assert!(fresh.is_ok());
    }

    #[tokio::test]
    async fn concurrent_consumers_get_one_winner() {
        let (store, _temp_dir) = build_store().await;
        let account = store
            .upsert_by_email("jane@example.com", Uuid::new_v4())
            .await
            .unwrap();
        let token = SingleUseToken::issue(TokenKind::MagicLink);
        store.store_token(account.id, token.clone()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let value = token.value.clone();
            handles.push(tokio::spawn(async move {
                store.consume_token(&value, TokenKind::MagicLink).await
            }));
        }

        let mut wins = 0;
        let mut misses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(Error::TokenNotFound) => misses += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(misses, 7);
    }

    #[tokio::test]
    async fn state_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");

        let account_id = {
            let store = FileAccountStore::new(dir.clone()).await.unwrap();
            let account = store
                .upsert_by_email("jane@example.com", Uuid::new_v4())
                .await
                .unwrap();
            store
                .set_password_hash(account.id, "$argon2id$placeholder".to_string())
                .await
                .unwrap();
            account.id
        };

        let store = FileAccountStore::new(dir).await.unwrap();
        let reloaded = store.find_by_email("jane@example.com").await.unwrap();
        assert_eq!(reloaded.id, account_id);
        assert!(reloaded.has_password());
    }
}
