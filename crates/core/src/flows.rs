//! Authentication flows
//!
//! One method per customer-facing flow: magic link request/verify, password
//! register/login/reset, Clerk linking, session check, logout and business
//! switching. Flows return typed outcomes; turning them into HTTP bodies is
//! the server's job.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::account::{AuthMethod, CustomerAccount, FileAccountStore};
use crate::directory::{AvailableContext, CustomerRecord, FileDirectoryStore};
use crate::notify::{self, Mailer};
use crate::password;
use crate::session::{FileSessionStore, Session};
use crate::token::{SingleUseToken, TokenKind};
use crate::{Error, Result};

/// Lowercase, trimmed, and minimally shaped. Every flow entry point goes
/// through this before touching a store.
pub fn normalize_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(Error::InvalidInput("Invalid email address".to_string()));
    }
    Ok(normalized)
}

/// Everything a session-aware response needs: the stored session row, the
/// account, the active customer record if the context resolves, and the
/// business picker.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: Session,
    pub account: CustomerAccount,
    pub customer: Option<CustomerRecord>,
    pub available_businesses: Vec<AvailableContext>,
}

/// A successful interactive authentication: the one and only time the raw
/// bearer token is visible.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub view: SessionView,
}

/// Outcome of a magic-link request. Shape is identical whether or not the
/// email matched anything; `email_sent` is false on dispatch failure too.
#[derive(Debug, Clone, Copy)]
pub struct MagicLinkRequested {
    pub email_sent: bool,
}

/// A Clerk identity tied to a portal account. Deliberately carries no
/// session token: on this branch the external IdP owns the session.
#[derive(Debug, Clone)]
pub struct ClerkLink {
    pub account: CustomerAccount,
    pub customer: Option<CustomerRecord>,
    pub available_businesses: Vec<AvailableContext>,
}

/// Outcome of a Clerk verification.
#[derive(Debug, Clone)]
pub enum ClerkVerify {
    /// The subject is already linked to an account.
    Verified(ClerkLink),
    /// The subject was unknown but the supplied email matched; linked now.
    Linked(ClerkLink),
    /// Nothing to go on; the caller must supply an email to link with.
    NeedsLinking,
}

pub struct AuthFlows {
    accounts: FileAccountStore,
    directory: FileDirectoryStore,
    sessions: FileSessionStore,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl AuthFlows {
    pub fn new(
        accounts: FileAccountStore,
        directory: FileDirectoryStore,
        sessions: FileSessionStore,
        mailer: Arc<dyn Mailer>,
        base_url: String,
    ) -> Self {
        Self {
            accounts,
            directory,
            sessions,
            mailer,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Issue and email a magic link. The outcome never says whether the
    /// email matched a customer; that fact only reaches the logs.
    pub async fn request_magic_link(
        &self,
        email: &str,
        redirect_url: Option<&str>,
    ) -> Result<MagicLinkRequested> {
        let email = normalize_email(email)?;
        let Some(latest) = self.directory.latest_customer_by_email(&email).await else {
            info!(email = %email, "magic link requested for unknown customer email");
            return Ok(MagicLinkRequested { email_sent: false });
        };

        let account = self.accounts.upsert_by_email(&email, latest.id).await?;
        let token = SingleUseToken::issue(TokenKind::MagicLink);
        self.accounts.store_token(account.id, token.clone()).await?;

        let link = self.magic_link_url(&token.value, redirect_url);
        let (subject, html) = notify::magic_link_email(&link);
        match self.mailer.send(&email, &subject, &html).await {
            Ok(()) => Ok(MagicLinkRequested { email_sent: true }),
            Err(err) => {
                // The token stays issued; the customer can retry delivery
                // without invalidating anything.
                warn!(error = %err, "magic link dispatch failed");
                Ok(MagicLinkRequested { email_sent: false })
            }
        }
    }

    /// Redeem a magic link and open a session.
    pub async fn verify_magic_link(&self, token: &str) -> Result<AuthSession> {
        let account = self
            .accounts
            .consume_token(token, TokenKind::MagicLink)
            .await?;
        let accepted = self.directory.accept_pending_invites(&account.email).await?;
        if accepted > 0 {
            info!(account_id = %account.id, accepted, "accepted pending invites");
        }
        self.open_session(account, AuthMethod::MagicLink).await
    }

    /// Set a password on a new or passwordless account and open a session.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        invite_token: Option<&str>,
    ) -> Result<AuthSession> {
        let email = normalize_email(email)?;
        password::validate_password(password)?;

        let Some(latest) = self.directory.latest_customer_by_email(&email).await else {
            return Err(Error::NoMatchingCustomer);
        };
        if let Some(existing) = self.accounts.find_by_email(&email).await {
            if existing.has_password() {
                return Err(Error::AlreadyHasPassword);
            }
        }

        let password_hash = password::hash_password(password)?;
        let account = self.accounts.upsert_by_email(&email, latest.id).await?;
        let account = self
            .accounts
            .set_password_hash(account.id, password_hash)
            .await?;

        if let Some(token) = invite_token {
            match self.directory.accept_invite_by_token(token).await? {
                Some(invite) => {
                    info!(invite_id = %invite.id, "invite accepted during registration")
                }
                None => warn!("registration carried an unknown or spent invite token"),
            }
        }

        self.open_session(account, AuthMethod::Password).await
    }

    /// Password login. Unknown email, passwordless account and wrong
    /// password are all the same `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email)?;
        let account = self
            .accounts
            .find_by_email(&email)
            .await
            .ok_or(Error::InvalidCredentials)?;
        let Some(hash) = account.password_hash.as_deref() else {
            return Err(Error::InvalidCredentials);
        };
        if !password::verify_password(password, hash) {
            return Err(Error::InvalidCredentials);
        }

        let accepted = self.directory.accept_pending_invites(&account.email).await?;
        if accepted > 0 {
            info!(account_id = %account.id, accepted, "accepted pending invites");
        }
        self.open_session(account, AuthMethod::Password).await
    }

    /// Tie a Clerk subject to the account for an email, creating the
    /// account if needed. No portal session is issued on this path.
    pub async fn clerk_link(&self, subject: &str, email: &str) -> Result<ClerkLink> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(Error::InvalidInput(
                "Clerk subject cannot be empty".to_string(),
            ));
        }
        let email = normalize_email(email)?;

        let Some(latest) = self.directory.latest_customer_by_email(&email).await else {
            return Err(Error::NoMatchingCustomer);
        };
        let account = self.accounts.upsert_by_email(&email, latest.id).await?;
        let account = self.accounts.set_clerk_user(account.id, subject).await?;
        self.directory.ensure_links(account.id, &account.email).await?;
        let account = self
            .accounts
            .record_login(account.id, AuthMethod::Clerk)
            .await?;

        Ok(self.clerk_view(account).await)
    }

    /// Resolve a Clerk subject to a portal account, falling back to an
    /// email link when the subject is new.
    pub async fn clerk_verify(&self, subject: &str, email: Option<&str>) -> Result<ClerkVerify> {
        if let Some(account) = self.accounts.find_by_clerk_user(subject.trim()).await {
            return Ok(ClerkVerify::Verified(self.clerk_view(account).await));
        }
        if let Some(email) = email {
            return Ok(ClerkVerify::Linked(self.clerk_link(subject, email).await?));
        }
        Ok(ClerkVerify::NeedsLinking)
    }

    /// Issue and email a password reset link. Generic outcome either way.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email)?;
        let Some(account) = self.accounts.find_by_email(&email).await else {
            info!(email = %email, "password reset requested for unknown account");
            return Ok(());
        };

        let token = SingleUseToken::issue(TokenKind::PasswordReset);
        self.accounts.store_token(account.id, token.clone()).await?;

        let link = self.reset_link_url(&token.value);
        let (subject, html) = notify::password_reset_email(&link);
        if let Err(err) = self.mailer.send(&email, &subject, &html).await {
            warn!(error = %err, "password reset dispatch failed");
        }
        Ok(())
    }

    /// Redeem a reset token and store the new password. Length is checked
    /// before the token is consumed so a typo does not burn the link.
    /// Existing sessions are left untouched.
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        password::validate_password(new_password)?;
        let account = self
            .accounts
            .consume_token(token, TokenKind::PasswordReset)
            .await?;
        let password_hash = password::hash_password(new_password)?;
        self.accounts
            .set_password_hash(account.id, password_hash)
            .await?;
        info!(account_id = %account.id, "password reset completed");
        Ok(())
    }

    /// Revoke a session if a token was presented. Always succeeds.
    pub async fn logout(&self, token: Option<&str>) -> Result<bool> {
        match token {
            Some(raw) => self.sessions.revoke(raw).await,
            None => Ok(false),
        }
    }

    /// Resolve a bearer token to a session view. `None` covers missing,
    /// unknown and expired tokens alike. Sessions that predate business
    /// contexts get one assigned here, once, and keep it.
    pub async fn check_session(&self, token: &str) -> Result<Option<SessionView>> {
        let Some(mut session) = self.sessions.validate(token).await else {
            return Ok(None);
        };
        let Some(account) = self.accounts.get(session.account_id).await else {
            warn!(account_id = %session.account_id, "session points at a missing account");
            return Ok(None);
        };

        if session.active_business_id.is_none() || session.active_customer_id.is_none() {
            if let Some(context) = self
                .directory
                .default_context(account.id, account.customer_id)
                .await
            {
                session = self
                    .sessions
                    .set_active_context(&session.token_hash, context)
                    .await?;
                info!(account_id = %account.id, "assigned business context to legacy session");
            }
        }

        Ok(Some(self.view_for(session, account).await))
    }

    /// Move a session to another business the account is linked to.
    /// `Ok(None)` means the bearer token did not resolve to a session.
    pub async fn switch_business(
        &self,
        token: &str,
        business_id: Uuid,
    ) -> Result<Option<SessionView>> {
        let Some(session) = self.sessions.validate(token).await else {
            return Ok(None);
        };
        let Some(account) = self.accounts.get(session.account_id).await else {
            return Ok(None);
        };
        let Some(context) = self
            .directory
            .context_for_business(account.id, business_id)
            .await
        else {
            return Err(Error::NoAccessToBusiness);
        };

        let session = self
            .sessions
            .set_active_context(&session.token_hash, context)
            .await?;
        Ok(Some(self.view_for(session, account).await))
    }

    /// Post-authentication tail shared by every interactive flow: ensure
    /// links, record the login, pick a starting context, mint the session.
    async fn open_session(
        &self,
        account: CustomerAccount,
        method: AuthMethod,
    ) -> Result<AuthSession> {
        self.directory.ensure_links(account.id, &account.email).await?;
        let account = self.accounts.record_login(account.id, method).await?;

        let context = self
            .directory
            .default_context(account.id, account.customer_id)
            .await;
        if context.is_none() {
            warn!(account_id = %account.id, "no resolvable business context for new session");
        }

        let (token, session) = self.sessions.issue(account.id, method, context).await?;
        let view = self.view_for(session, account).await;
        Ok(AuthSession { token, view })
    }

    async fn view_for(&self, session: Session, account: CustomerAccount) -> SessionView {
        let available_businesses = self.directory.available_contexts(account.id).await;
        let customer = match session.active_customer_id {
            Some(customer_id) => self.directory.get_customer(customer_id).await,
            None => None,
        };
        SessionView {
            session,
            account,
            customer,
            available_businesses,
        }
    }

    async fn clerk_view(&self, account: CustomerAccount) -> ClerkLink {
        let available_businesses = self.directory.available_contexts(account.id).await;
        let context = self
            .directory
            .default_context(account.id, account.customer_id)
            .await;
        let customer = match context {
            Some(ctx) => self.directory.get_customer(ctx.customer_id).await,
            None => None,
        };
        ClerkLink {
            account,
            customer,
            available_businesses,
        }
    }

    fn magic_link_url(&self, token: &str, redirect_url: Option<&str>) -> String {
        let mut link = format!(
            "{}/auth/verify?token={}",
            self.base_url,
            urlencoding::encode(token)
        );
        if let Some(redirect) = redirect_url {
            link.push_str("&redirect=");
            link.push_str(&urlencoding::encode(redirect));
        }
        link
    }

    fn reset_link_url(&self, token: &str) -> String {
        format!(
            "{}/auth/reset?token={}",
            self.base_url,
            urlencoding::encode(token)
        )
    }
}
