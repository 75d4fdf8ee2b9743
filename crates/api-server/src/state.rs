//! Application state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portal_core::account::FileAccountStore;
use portal_core::directory::FileDirectoryStore;
use portal_core::flows::AuthFlows;
use portal_core::notify;
use portal_core::session::FileSessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    flows: Arc<AuthFlows>,
    data_dir: PathBuf,
}

impl AppState {
    /// Create a new AppState with the given data directory, reading the
    /// mailer and link base from the environment.
    pub async fn new(data_dir: PathBuf) -> portal_core::Result<Self> {
        let accounts = FileAccountStore::new(data_dir.clone()).await?;
        let directory = FileDirectoryStore::new(data_dir.clone()).await?;
        let sessions = FileSessionStore::new(data_dir.clone()).await?;
        let mailer = notify::mailer_from_env();
        let base_url = std::env::var("PORTAL_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let flows = AuthFlows::new(accounts, directory, sessions, mailer, base_url);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                flows: Arc::new(flows),
                data_dir,
            }),
        })
    }

    /// Build state around pre-assembled flows. Used by tests that want to
    /// seed the underlying stores directly.
    pub fn with_flows(data_dir: PathBuf, flows: AuthFlows) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                flows: Arc::new(flows),
                data_dir,
            }),
        }
    }

    /// Get reference to the authentication flows
    pub fn flows(&self) -> &AuthFlows {
        &self.inner.flows
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }
}
