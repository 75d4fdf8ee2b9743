//! Business directory module
//!
//! This module holds the read-mostly directory the portal authenticates
//! against: the businesses on the platform, the customer records each
//! business keeps, portal invites, and the links tying portal accounts to
//! those records.

mod model;
mod store;

pub use model::{
    ActiveContext, AvailableContext, Business, CustomerBusinessLink, CustomerRecord,
    CustomerSummary, PortalInvite,
};
pub use store::FileDirectoryStore;
