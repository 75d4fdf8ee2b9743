//! Notification dispatch
//!
//! Outbound email goes through the `Mailer` trait. Production posts to a
//! delivery webhook; without one configured, messages are logged instead so
//! local development still shows the links.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::{Error, Result};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// Posts messages as JSON to a delivery webhook.
pub struct HttpMailer {
    client: reqwest::Client,
    webhook_url: String,
}

impl HttpMailer {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Failed to reach mail webhook: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Notification(format!(
                "Mail webhook returned HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Logs messages instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<()> {
        info!(to, subject, "email dispatch (log only)");
        Ok(())
    }
}

/// Pick the mailer from the environment: `PORTAL_EMAIL_WEBHOOK_URL` set
/// means real delivery, otherwise log-only.
pub fn mailer_from_env() -> Arc<dyn Mailer> {
    match std::env::var("PORTAL_EMAIL_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(HttpMailer::new(url)),
        _ => Arc::new(LogMailer),
    }
}

pub fn magic_link_email(link: &str) -> (String, String) {
    (
        "Your sign-in link".to_string(),
        format!(
            "<p>Click the link below to sign in to your customer portal.</p>\
             <p><a href=\"{link}\">Sign in</a></p>\
             <p>This link can be used once and expires in 24 hours. If you did \
             not request it, you can ignore this email.</p>"
        ),
    )
}

pub fn password_reset_email(link: &str) -> (String, String) {
    (
        "Reset your password".to_string(),
        format!(
            "<p>Click the link below to choose a new password.</p>\
             <p><a href=\"{link}\">Reset password</a></p>\
             <p>This link can be used once and expires in 1 hour. If you did \
             not request it, you can ignore this email.</p>"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer
            .send("jane@example.com", "Hello", "<p>Hi</p>")
            .await
            .is_ok());
    }

    #[test]
    fn email_bodies_embed_the_link() {
        let (subject, html) = magic_link_email("https://portal.test/verify?token=abc");
        assert!(subject.contains("sign-in"));
        assert!(html.contains("https://portal.test/verify?token=abc"));

        let (_, html) = password_reset_email("https://portal.test/reset?token=xyz");
        assert!(html.contains("token=xyz"));
    }
}
