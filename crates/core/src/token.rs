//! Single-use token issuance
//!
//! Magic-link and password-reset tokens share one storage slot on the
//! account, discriminated by kind so one can never be replayed as the other.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Magic-link tokens stay valid for a day.
pub const MAGIC_LINK_TTL_HOURS: i64 = 24;
/// Reset tokens are short-lived.
pub const PASSWORD_RESET_TTL_HOURS: i64 = 1;

/// What a single-use token is allowed to be consumed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    MagicLink,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MagicLink => "magic_link",
            Self::PasswordReset => "password_reset",
        }
    }

    fn ttl(self) -> Duration {
        match self {
            Self::MagicLink => Duration::hours(MAGIC_LINK_TTL_HOURS),
            Self::PasswordReset => Duration::hours(PASSWORD_RESET_TTL_HOURS),
        }
    }
}

/// A one-time credential stored on a customer account. Issuing a new one
/// overwrites the previous one, which implicitly invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleUseToken {
    pub kind: TokenKind,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl SingleUseToken {
    /// Issue a fresh token of the given kind with its fixed expiry.
    ///
    /// The value is two concatenated 128-bit random values rendered without
    /// separators, so it survives URL query strings and email clients
    /// unmangled.
    pub fn issue(kind: TokenKind) -> Self {
        let value = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self {
            kind,
            value,
            expires_at: Utc::now() + kind.ttl(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
