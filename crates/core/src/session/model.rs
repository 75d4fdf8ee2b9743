//! Session model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AuthMethod;

/// A stored session row, keyed at rest by the hash of its bearer token.
///
/// The context fields default when absent so rows written before sessions
/// carried a business context still load. New sessions always get a context
/// when one is resolvable; old rows are repaired lazily on their next check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub account_id: Uuid,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub active_customer_id: Option<Uuid>,
    #[serde(default)]
    pub active_business_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
