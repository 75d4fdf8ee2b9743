//! Customer account model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::SingleUseToken;

/// How a customer last authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    MagicLink,
    Password,
    Clerk,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MagicLink => "magic_link",
            Self::Password => "password",
            Self::Clerk => "clerk",
        }
    }
}

/// A portal account, keyed by normalized email.
///
/// `customer_id` is the directory record the account was first created from.
/// It survives as the fallback business context when the account has no
/// explicit links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub clerk_user_id: Option<String>,
    pub single_use_token: Option<SingleUseToken>,
    pub preferred_auth_method: Option<AuthMethod>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerAccount {
    /// Create a fresh account for a normalized email, anchored to the
    /// directory record that matched it.
    pub fn new(email: impl Into<String>, customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            email: email.into(),
            password_hash: None,
            clerk_user_id: None,
            single_use_token: None,
            preferred_auth_method: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// The shape that leaves the service. Hashes and pending tokens never do.
    pub fn to_summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            email: self.email.clone(),
            preferred_auth_method: self.preferred_auth_method,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// Sanitized account view for wire responses.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub email: String,
    pub preferred_auth_method: Option<AuthMethod>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_starts_without_credentials() {
        let customer_id = Uuid::new_v4();
        let account = CustomerAccount::new("jane@example.com", customer_id);
        assert_eq!(account.customer_id, customer_id);
        assert!(!account.has_password());
        assert!(account.clerk_user_id.is_none());
        assert!(account.single_use_token.is_none());
        assert!(account.last_login_at.is_none());
    }

    #[test]
    fn summary_carries_no_secrets() {
        let mut account = CustomerAccount::new("jane@example.com", Uuid::new_v4());
        account.password_hash = Some("$argon2id$secret".to_string());
        let summary = account.to_summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("single_use_token").is_none());
        assert_eq!(json["email"], "jane@example.com");
    }
}
