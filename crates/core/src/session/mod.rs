//! Session module
//!
//! Bearer sessions for authenticated customers. The raw token leaves the
//! service exactly once, at issuance; only its hash is ever stored.

mod model;
mod store;

pub use model::Session;
pub use store::FileSessionStore;
