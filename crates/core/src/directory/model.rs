//! Directory model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A business on the platform whose customers can use the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A customer as one business knows them. The same person can appear as
/// several records under different businesses, matched up by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub business_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    pub fn to_summary(&self) -> CustomerSummary {
        CustomerSummary {
            id: self.id,
            business_id: self.business_id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Wire view of a customer record.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub business_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ties a portal account to a customer record at a business. Links created
/// implicitly during authentication are never primary; primary status is an
/// explicit choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerBusinessLink {
    pub id: Uuid,
    pub account_id: Uuid,
    pub customer_id: Uuid,
    pub business_id: Uuid,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// An invitation a business sent to one of its customers. The portal only
/// ever marks these accepted; creating them happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalInvite {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// One line of the business picker: a link joined with display info.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableContext {
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub business_name: String,
    pub is_primary: bool,
}

/// The business a session is currently acting within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContext {
    pub customer_id: Uuid,
    pub business_id: Uuid,
}
