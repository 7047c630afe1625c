//! # Identity Gate
//!
//! Decides whether the dashboard may start streaming. A credential from the
//! identity provider is decoded, its email checked against the allow-list, and
//! on success the user is cached and an `Authenticated` state is published on
//! a watch channel. Whoever owns the stream manager listens on that channel;
//! the gate itself never touches streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::allow_list::is_allowed;
use super::session::{SessionStore, SessionUser};
use super::token::{verify, IdentityClaim};
use super::AuthError;
use crate::configs::DashboardConfig;
use crate::surface::PageView;

/// Published authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No user. The login screen is up.
    SignedOut,
    /// A user passed the gate.
    Authenticated(SessionUser),
}

impl AuthState {
    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            AuthState::SignedOut => None,
        }
    }
}

/// The external identity provider: renders the sign-in affordance and hands
/// back signed tokens through the host's credential callback.
pub trait IdentityProvider: Send + Sync {
    /// Registers `client_id` and renders the sign-in affordance.
    fn render_sign_in(&self, client_id: &str);
    /// Revokes the provider's automatic re-sign-in hint.
    fn disable_auto_select(&self);
}

/// See the module docs.
pub struct IdentityGate {
    client_id: String,
    allow_list: Vec<String>,
    dev_bypass: bool,
    banner_timeout: Duration,
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn IdentityProvider>,
    page: Arc<dyn PageView>,
    state: watch::Sender<AuthState>,
    banner_seq: Arc<AtomicU64>,
}

impl IdentityGate {
    /// Builds a gate from the static config and its collaborators.
    pub fn new(
        config: &DashboardConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        page: Arc<dyn PageView>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            client_id: config.google_client_id.clone(),
            allow_list: config.allowed_emails.clone(),
            dev_bypass: config.dev_bypass_enabled(),
            banner_timeout: config.banner_timeout(),
            store,
            provider,
            page,
            state,
            banner_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The current state.
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Resolves the initial state: dev bypass, then a cached session, then
    /// the provider's sign-in affordance.
    pub fn start(&self) -> AuthState {
        if self.dev_bypass {
            log::warn!("[AUTH] Dev mode on a loopback host, authentication bypassed");
            self.publish(AuthState::Authenticated(SessionUser::developer()));
        } else if self.restore_session().is_none() {
            self.provider.render_sign_in(&self.client_id);
        }
        self.current()
    }

    /// Treats a cached user as authenticated without re-verifying it.
    pub fn restore_session(&self) -> Option<IdentityClaim> {
        let user = match self.store.load() {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[AUTH] Ignoring unreadable session cache: {}", e);
                return None;
            }
        };
        log::info!("[AUTH] Session restored for: {}", user.email);
        let claim = user.claim();
        self.publish(AuthState::Authenticated(user));
        Some(claim)
    }

    /// Credential callback: decode, check, persist, publish.
    ///
    /// On any error the banner is shown and nothing is persisted or published.
    pub fn handle_credential(&self, signed_token: &str) -> Result<SessionUser, AuthError> {
        let claim = match verify(signed_token) {
            Ok(claim) => claim,
            Err(e) => {
                log::error!("[AUTH] Authentication error: {}", e);
                self.show_error("Authentication failed. Please try again.");
                return Err(e);
            }
        };

        if !is_allowed(&claim.email, &self.allow_list) {
            let err = AuthError::AccessDenied { email: claim.email };
            log::warn!("[AUTH] {}", err);
            self.show_error(&err.to_string());
            return Err(err);
        }

        let user = SessionUser::from_claim(claim, signed_token);
        if let Err(e) = self.store.save(&user) {
            log::warn!("[AUTH] Could not persist session: {}", e);
        }
        log::info!("[AUTH] User logged in: {}", user.email);
        self.publish(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Clears the cached session and the provider's auto-select hint.
    pub fn sign_out(&self) {
        let email = self.current().user().map(|u| u.email.clone()).unwrap_or_default();
        log::info!("[AUTH] User logged out: {}", email);
        if let Err(e) = self.store.clear() {
            log::warn!("[AUTH] Could not clear session cache: {}", e);
        }
        self.provider.disable_auto_select();
        self.publish(AuthState::SignedOut);
    }

    fn publish(&self, next: AuthState) {
        self.state.send_replace(next);
    }

    /// Shows `message` in the banner and hides it again after the timeout,
    /// unless a newer message replaced it meanwhile.
    fn show_error(&self, message: &str) {
        self.page.show_banner(message);
        let seq = self.banner_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let page = Arc::clone(&self.page);
        let banner_seq = Arc::clone(&self.banner_seq);
        let timeout = self.banner_timeout;
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if banner_seq.load(Ordering::SeqCst) == seq {
                page.hide_banner();
            }
        });
    }
}
