//! File-backed directory store
//!
//! Same storage shape as the account store: one JSON file, an in-memory map
//! cache behind a tokio `RwLock`, full rewrite after each mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

use super::model::{
    ActiveContext, AvailableContext, Business, CustomerBusinessLink, CustomerRecord, PortalInvite,
};

#[derive(Debug, Default)]
struct DirectoryState {
    businesses: HashMap<Uuid, Business>,
    customers: HashMap<Uuid, CustomerRecord>,
    links: HashMap<Uuid, CustomerBusinessLink>,
    invites: HashMap<Uuid, PortalInvite>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredDirectoryState {
    businesses: Vec<Business>,
    customers: Vec<CustomerRecord>,
    links: Vec<CustomerBusinessLink>,
    invites: Vec<PortalInvite>,
}

impl From<StoredDirectoryState> for DirectoryState {
    fn from(value: StoredDirectoryState) -> Self {
        Self {
            businesses: value
                .businesses
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
            customers: value
                .customers
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
            links: value
                .links
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
            invites: value
                .invites
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
        }
    }
}

impl From<&DirectoryState> for StoredDirectoryState {
    fn from(value: &DirectoryState) -> Self {
        Self {
            businesses: value.businesses.values().cloned().collect(),
            customers: value.customers.values().cloned().collect(),
            links: value.links.values().cloned().collect(),
            invites: value.invites.values().cloned().collect(),
        }
    }
}

#[derive(Clone)]
pub struct FileDirectoryStore {
    state: Arc<RwLock<DirectoryState>>,
    file_path: PathBuf,
}

impl FileDirectoryStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|err| Error::Storage(format!("Failed to create data directory: {}", err)))?;

        let file_path = base_dir.join("directory.json");
        let state = load_state(&file_path).await?;

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            file_path,
        })
    }

    pub async fn insert_business(&self, name: &str) -> Result<Business> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Business name cannot be empty".to_string(),
            ));
        }
        let business = Business {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.state.write().await;
        state.businesses.insert(business.id, business.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(business)
    }

    pub async fn insert_customer(
        &self,
        business_id: Uuid,
        email: &str,
        full_name: Option<String>,
    ) -> Result<CustomerRecord> {
        let mut state = self.state.write().await;
        if !state.businesses.contains_key(&business_id) {
            return Err(Error::InvalidInput(format!(
                "Business '{}' not found",
                business_id
            )));
        }
        let now = Utc::now();
        let record = CustomerRecord {
            id: Uuid::new_v4(),
            business_id,
            email: email.trim().to_lowercase(),
            full_name,
            created_at: now,
            updated_at: now,
        };
        state.customers.insert(record.id, record.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(record)
    }

    pub async fn insert_invite(
        &self,
        business_id: Uuid,
        customer_id: Uuid,
        email: &str,
    ) -> Result<PortalInvite> {
        let invite = PortalInvite {
            id: Uuid::new_v4(),
            business_id,
            customer_id,
            email: email.trim().to_lowercase(),
            token: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            accepted_at: None,
        };
        let mut state = self.state.write().await;
        state.invites.insert(invite.id, invite.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(invite)
    }

    pub async fn get_business(&self, business_id: Uuid) -> Option<Business> {
        let state = self.state.read().await;
        state.businesses.get(&business_id).cloned()
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> Option<CustomerRecord> {
        let state = self.state.read().await;
        state.customers.get(&customer_id).cloned()
    }

    /// All customer records carrying this email, most recently updated
    /// first. Ties break on id so the order is stable across runs.
    pub async fn customers_by_email(&self, email: &str) -> Vec<CustomerRecord> {
        let state = self.state.read().await;
        let mut records: Vec<CustomerRecord> = state
            .customers
            .values()
            .filter(|record| record.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        records.sort_by(|left, right| {
            right
                .updated_at
                .cmp(&left.updated_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        records
    }

    pub async fn latest_customer_by_email(&self, email: &str) -> Option<CustomerRecord> {
        self.customers_by_email(email).await.into_iter().next()
    }

    /// Create the missing links between an account and every customer record
    /// matching its email. Implicit links are never primary. Returns how
    /// many links were created; calling this again is a no-op.
    pub async fn ensure_links(&self, account_id: Uuid, email: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut matching: Vec<(Uuid, Uuid, DateTime<Utc>)> = state
            .customers
            .values()
            .filter(|record| record.email.eq_ignore_ascii_case(email))
            .map(|record| (record.id, record.business_id, record.created_at))
            .collect();
        // Link oldest record first so the no-primary default context does
        // not depend on map iteration order.
        matching.sort_by(|left, right| left.2.cmp(&right.2).then_with(|| left.0.cmp(&right.0)));

        let mut created = 0;
        for (customer_id, business_id, _) in matching {
            let exists = state.links.values().any(|link| {
                link.account_id == account_id && link.customer_id == customer_id
            });
            if exists {
                continue;
            }
            let link = CustomerBusinessLink {
                id: Uuid::new_v4(),
                account_id,
                customer_id,
                business_id,
                is_primary: false,
                created_at: Utc::now(),
            };
            state.links.insert(link.id, link);
            created += 1;
        }

        if created > 0 {
            persist_state(&self.file_path, &state).await?;
        }
        Ok(created)
    }

    /// Make one of the account's links primary and demote the rest. At most
    /// one link per account is primary at any time.
    pub async fn set_primary_link(&self, account_id: Uuid, business_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let has_target = state
            .links
            .values()
            .any(|link| link.account_id == account_id && link.business_id == business_id);
        if !has_target {
            return Err(Error::NoAccessToBusiness);
        }
        for link in state.links.values_mut() {
            if link.account_id == account_id {
                link.is_primary = link.business_id == business_id;
            }
        }
        persist_state(&self.file_path, &state).await?;
        Ok(())
    }

    /// The business picker for an account: every link joined with business
    /// display info, primary first, then link age, then id. Links pointing
    /// at a vanished business are skipped rather than failing the whole
    /// listing.
    pub async fn available_contexts(&self, account_id: Uuid) -> Vec<AvailableContext> {
        let state = self.state.read().await;
        let mut links: Vec<&CustomerBusinessLink> = state
            .links
            .values()
            .filter(|link| link.account_id == account_id)
            .collect();
        links.sort_by(|left, right| {
            right
                .is_primary
                .cmp(&left.is_primary)
                .then_with(|| left.created_at.cmp(&right.created_at))
                .then_with(|| left.id.cmp(&right.id))
        });

        let mut contexts = Vec::with_capacity(links.len());
        for link in links {
            if let Some(business) = state.businesses.get(&link.business_id) {
                contexts.push(AvailableContext {
                    business_id: link.business_id,
                    customer_id: link.customer_id,
                    business_name: business.name.clone(),
                    is_primary: link.is_primary,
                });
            }
        }
        contexts
    }

    /// Pick the context a fresh session starts in: the primary link, else
    /// the oldest link, else the account's originating customer record.
    /// `None` only when even the fallback record is gone.
    pub async fn default_context(
        &self,
        account_id: Uuid,
        fallback_customer_id: Uuid,
    ) -> Option<ActiveContext> {
        let contexts = self.available_contexts(account_id).await;
        if let Some(first) = contexts.first() {
            return Some(ActiveContext {
                customer_id: first.customer_id,
                business_id: first.business_id,
            });
        }

        let state = self.state.read().await;
        state
            .customers
            .get(&fallback_customer_id)
            .map(|record| ActiveContext {
                customer_id: record.id,
                business_id: record.business_id,
            })
    }

    /// Whether the account has a link to this business, and through which
    /// customer record.
    pub async fn context_for_business(
        &self,
        account_id: Uuid,
        business_id: Uuid,
    ) -> Option<ActiveContext> {
        self.available_contexts(account_id)
            .await
            .into_iter()
            .find(|context| context.business_id == business_id)
            .map(|context| ActiveContext {
                customer_id: context.customer_id,
                business_id: context.business_id,
            })
    }

    /// Mark every open invite for this email accepted. Returns how many
    /// were closed.
    pub async fn accept_pending_invites(&self, email: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut accepted = 0;
        for invite in state.invites.values_mut() {
            if invite.accepted_at.is_none() && invite.email.eq_ignore_ascii_case(email) {
                invite.accepted_at = Some(now);
                accepted += 1;
            }
        }
        if accepted > 0 {
            persist_state(&self.file_path, &state).await?;
        }
        Ok(accepted)
    }

    /// Mark the invite carrying this token accepted. Unknown or already
    /// accepted tokens return `None`; invite acceptance is best-effort.
    pub async fn accept_invite_by_token(&self, token: &str) -> Result<Option<PortalInvite>> {
        let mut state = self.state.write().await;
        let invite_id = state
            .invites
            .values()
            .find(|invite| invite.token == token && invite.accepted_at.is_none())
            .map(|invite| invite.id);
        let Some(invite_id) = invite_id else {
            return Ok(None);
        };
        let invite = state
            .invites
            .get_mut(&invite_id)
            .ok_or_else(|| Error::Storage("Invite disappeared during accept".to_string()))?;
        invite.accepted_at = Some(Utc::now());
        let invite = invite.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(Some(invite))
    }
}

async fn load_state(path: &Path) -> Result<DirectoryState> {
    if !path.exists() {
        return Ok(DirectoryState::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Storage(format!("Failed to read directory state: {}", err)))?;
    if content.trim().is_empty() {
        return Ok(DirectoryState::default());
    }
    let stored: StoredDirectoryState = serde_json::from_str(&content)
        .map_err(|err| Error::Storage(format!("Failed to parse directory state: {}", err)))?;
    Ok(stored.into())
}

async fn persist_state(path: &Path, state: &DirectoryState) -> Result<()> {
    let content = serde_json::to_string_pretty(&StoredDirectoryState::from(state))
        .map_err(|err| Error::Storage(format!("Failed to serialize directory state: {}", err)))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|err| Error::Storage(format!("Failed to write directory state: {}", err)))?;
    Ok(())
}
