//! Customer account module
//!
//! Accounts are the portal-side identities customers authenticate as. They
//! are distinct from the CustomerRecords businesses keep in the directory.

mod model;
mod store;

pub use model::{AccountSummary, AuthMethod, CustomerAccount};
pub use store::FileAccountStore;
