//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Deliberately carries no detail: "no such account" and "wrong
    /// password" must stay indistinguishable to the caller.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No account holds the presented single-use token. Also covers kind
    /// mismatches, so a reset token can never act as a login token.
    #[error("Invalid or expired token")]
    TokenNotFound,

    /// The token matched but its expiry has passed.
    #[error("Invalid or expired token")]
    TokenExpired,

    #[error("No matching customer found for this email")]
    NoMatchingCustomer,

    #[error("Account already has a password")]
    AlreadyHasPassword,

    #[error("No access to business")]
    NoAccessToBusiness,

    #[error("Notification dispatch failed: {0}")]
    Notification(String),

    #[error("Password hashing error: {0}")]
    Hash(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}
