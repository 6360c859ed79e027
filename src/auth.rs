//! Native sign-in orchestration.
//!
//! One attempt walks `Idle → CapabilityInvoked → TokenReceived →
//! BackendExchanging → SessionPersisted → Redirecting` and falls back to
//! `Idle` however it ends. The native capability and the backend exchange are
//! suspend points; nothing else in an attempt awaits.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::affordance::LoginAffordance;
use crate::error::{AuthError, CapabilityError, ExchangeError};
use crate::secret::Secret;
use crate::session::{Persistence, Session, SessionStore};

/// Successful result of the native sign-in capability.
#[derive(Debug)]
pub struct AuthResult {
    identity_token: Secret<String>,
    email: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

impl AuthResult {
    pub fn new(identity_token: Secret<String>) -> Self {
        Self {
            identity_token,
            email: None,
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn identity_token(&self) -> &Secret<String> {
        &self.identity_token
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

/// What the native capability returned when it did not error.
#[derive(Debug)]
pub enum SignInResponse {
    Authorized(AuthResult),
    /// The user dismissed the provider UI
    Cancelled,
}

/// OS-brokered federated sign-in.
///
/// `sign_in` is user-paced and may suspend indefinitely.
#[async_trait]
pub trait SignInCapability: Send + Sync {
    async fn sign_in(&self) -> Result<SignInResponse, CapabilityError>;

    /// Forgets the previously chosen account so the next `sign_in` prompts.
    async fn sign_out(&self) -> Result<(), CapabilityError>;
}

/// Backend endpoint that trades an identity token for a session.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, identity_token: &Secret<String>) -> Result<Session, ExchangeError>;
}

/// Progress of the current sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    CapabilityInvoked,
    TokenReceived,
    BackendExchanging,
    SessionPersisted,
    Redirecting,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Idle => "idle",
            AuthState::CapabilityInvoked => "capability_invoked",
            AuthState::TokenReceived => "token_received",
            AuthState::BackendExchanging => "backend_exchanging",
            AuthState::SessionPersisted => "session_persisted",
            AuthState::Redirecting => "redirecting",
        };
        f.write_str(name)
    }
}

/// How an attempt ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Session stored; the page should navigate to `redirect`
    SignedIn {
        redirect: Url,
        persistence: Persistence,
    },
    /// The user backed out or no identity token came back
    Cancelled,
    /// Another attempt was already in flight
    Ignored,
}

/// Holds the state machine for one attempt and resets it to `Idle` on drop,
/// whichever way the attempt exits.
struct Attempt<'a> {
    state: &'a Mutex<AuthState>,
}

impl<'a> Attempt<'a> {
    fn begin(state: &'a Mutex<AuthState>) -> Option<Self> {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != AuthState::Idle {
            return None;
        }
        *current = AuthState::CapabilityInvoked;
        Some(Self { state })
    }

    fn advance(&self, next: AuthState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(state = %next, "sign-in attempt advanced");
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = AuthState::Idle;
    }
}

/// Runs sign-in attempts, one at a time.
pub struct AuthBridge {
    capability: Arc<dyn SignInCapability>,
    exchange: Arc<dyn TokenExchange>,
    sessions: Arc<SessionStore>,
    exchange_timeout: Duration,
    state: Mutex<AuthState>,
}

impl fmt::Debug for AuthBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBridge")
            .field("state", &self.state())
            .field("exchange_timeout", &self.exchange_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthBridge {
    pub fn new(
        capability: Arc<dyn SignInCapability>,
        exchange: Arc<dyn TokenExchange>,
        sessions: Arc<SessionStore>,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            capability,
            exchange,
            sessions,
            exchange_timeout,
            state: Mutex::new(AuthState::Idle),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Runs one sign-in attempt for a detected login activation.
    ///
    /// Returns [`SignInOutcome::Ignored`] without side effects while another
    /// attempt is in flight. Cancellation is an outcome, not an error.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Capability`] if the capability is unavailable or fails
    /// - [`AuthError::Exchange`] if the backend rejects the token or is unreachable
    /// - [`AuthError::Timeout`] if the backend does not answer in time
    pub async fn sign_in(&self, affordance: &LoginAffordance) -> Result<SignInOutcome, AuthError> {
        let Some(attempt) = Attempt::begin(&self.state) else {
            debug!("sign-in already in flight; activation ignored");
            return Ok(SignInOutcome::Ignored);
        };

        // Forget the last account so the chooser always shows.
        match self.capability.sign_out().await {
            Ok(()) => {}
            Err(e @ CapabilityError::Unavailable(_)) => return Err(e.into()),
            Err(e) => warn!(error = %e, "clearing previous federated session failed"),
        }

        let result = match self.capability.sign_in().await? {
            SignInResponse::Authorized(result) => result,
            SignInResponse::Cancelled => {
                info!("native sign-in cancelled by user");
                return Ok(SignInOutcome::Cancelled);
            }
        };
        if result.identity_token().is_blank() {
            info!("native sign-in returned no identity token; treating as cancelled");
            return Ok(SignInOutcome::Cancelled);
        }
        attempt.advance(AuthState::TokenReceived);
        info!(email = ?result.email(), "identity token received");

        attempt.advance(AuthState::BackendExchanging);
        let session = tokio::time::timeout(
            self.exchange_timeout,
            self.exchange.exchange(result.identity_token()),
        )
        .await
        .map_err(|_| AuthError::Timeout(self.exchange_timeout))??;

        let persistence = self.sessions.save(&session).await;
        attempt.advance(AuthState::SessionPersisted);

        attempt.advance(AuthState::Redirecting);
        let redirect = affordance.return_url().clone();
        info!(redirect = %redirect, ?persistence, "sign-in complete");

        Ok(SignInOutcome::SignedIn {
            redirect,
            persistence,
        })
    }

    /// Signs out natively and drops the stored session.
    ///
    /// The session is cleared even if the native call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let native = self.capability.sign_out().await;
        self.sessions.clear().await;
        match native {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "native sign-out failed; local session cleared anyway");
                Err(e.into())
            }
        }
    }
}

/// Receives the result of sign-in attempts run by a [`SignInWorker`].
pub trait SignInObserver: Send + Sync {
    /// Navigate the page to the post-login destination.
    fn redirect(&self, url: &Url);

    /// Show a failure to the user.
    fn report_failure(&self, message: &str);
}

/// Consumes login activations sent by the navigation layer and the in-page
/// hooks, running them through an [`AuthBridge`] one at a time.
///
/// Activations that arrive while an attempt runs are discarded once it
/// finishes.
pub struct SignInWorker {
    bridge: Arc<AuthBridge>,
    requests: mpsc::UnboundedReceiver<LoginAffordance>,
    observer: Arc<dyn SignInObserver>,
}

impl SignInWorker {
    pub fn new(
        bridge: Arc<AuthBridge>,
        requests: mpsc::UnboundedReceiver<LoginAffordance>,
        observer: Arc<dyn SignInObserver>,
    ) -> Self {
        Self {
            bridge,
            requests,
            observer,
        }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) {
        while self.process_next().await {}
        debug!("sign-in worker stopped");
    }

    /// Waits for one activation and runs it to completion.
    ///
    /// Returns false once every sender is gone.
    pub async fn process_next(&mut self) -> bool {
        let Some(affordance) = self.requests.recv().await else {
            return false;
        };
        self.handle(&affordance).await;

        let skipped = self.drain_duplicates();
        if skipped > 0 {
            debug!(skipped, "duplicate login activations ignored");
        }
        true
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn handle(&self, affordance: &LoginAffordance) {
        match self.bridge.sign_in(affordance).await {
            Ok(SignInOutcome::SignedIn { redirect, .. }) => self.observer.redirect(&redirect),
            Ok(SignInOutcome::Cancelled) | Ok(SignInOutcome::Ignored) => {}
            Err(e) => {
                error!(error = %e, "sign-in attempt failed");
                self.observer.report_failure(&e.user_message());
            }
        }
    }

    fn drain_duplicates(&mut self) -> usize {
        let mut skipped = 0;
        while self.requests.try_recv().is_ok() {
            skipped += 1;
        }
        skipped
    }
}
