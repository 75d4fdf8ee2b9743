//! Core library for the customer portal identity service
//!
//! This crate contains the domain logic for authenticating end customers of
//! a multi-business platform, including:
//! - Customer accounts and single-use credentials (magic links, reset links)
//! - Password hashing
//! - Business/customer directory lookups and link resolution
//! - Bearer sessions with an active business context
//! - The authentication flows tying the above together

pub mod account;
pub mod directory;
pub mod error;
pub mod flows;
pub mod notify;
pub mod password;
pub mod session;
pub mod token;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
