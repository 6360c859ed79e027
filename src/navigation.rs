//! Host-level navigation decisions.
//!
//! [`NavigationInterceptor::decide`] is the single decision point for every
//! navigation the embedded surface is about to perform. It is synchronous and
//! bounded: any sign-in work it triggers is handed off through a channel and
//! runs elsewhere.
//!
//! Precedence (first match wins):
//!
//! 1. Foreign host: `Allow` (or `Cancel` for a blocked identity-provider host)
//! 2. Login entry point: `Cancel`, then native sign-in out of band
//! 3. Home host without the tag: `Substitute` with the tagged URL
//! 4. Otherwise: `Allow`

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::affordance::{LoginAffordance, LoginMatcher};
use crate::config::ShellConfig;
use crate::error::ConfigError;
use crate::rewrite::{host_in_domain, RequiredParam};
use crate::trail::{DecisionKind, DecisionTrail};

/// What caused a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    /// An anchor was activated
    LinkClick,
    /// Script assigned the location
    Programmatic,
    /// The surface loads a document (initial load, reload, host-issued load)
    FullLoad,
    /// `history.pushState` / `replaceState`
    HistoryMutation,
    /// `window.open` or a target=_blank link
    NewWindow,
    /// The app was opened with a URL from outside
    DeepLink,
}

impl fmt::Display for NavigationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationTrigger::LinkClick => write!(f, "link-click"),
            NavigationTrigger::Programmatic => write!(f, "programmatic"),
            NavigationTrigger::FullLoad => write!(f, "full-load"),
            NavigationTrigger::HistoryMutation => write!(f, "history-mutation"),
            NavigationTrigger::NewWindow => write!(f, "new-window"),
            NavigationTrigger::DeepLink => write!(f, "deep-link"),
        }
    }
}

/// One navigation occurrence. Immutable; consumed by exactly one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    target: String,
    trigger: NavigationTrigger,
    domain: Option<String>,
}

impl NavigationRequest {
    pub fn new(target: impl Into<String>, trigger: NavigationTrigger) -> Self {
        let target = target.into();
        let domain = Url::parse(&target)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        Self {
            target,
            trigger,
            domain,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn trigger(&self) -> NavigationTrigger {
        self.trigger
    }

    /// Host of the target, if it parses as an absolute URL.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// Why a navigation was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The target is the login entry point; native sign-in takes over
    NativeSignIn(LoginAffordance),
    /// The target is an identity-provider host the surface must never load
    IdentityProvider,
}

/// Terminal outcome of a navigation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Proceed unchanged
    Allow,
    /// Stop; nothing replaces it
    Cancel(CancelReason),
    /// Stop and issue this navigation instead
    Substitute(NavigationRequest),
}

impl Disposition {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Disposition::Allow => DecisionKind::Allowed,
            Disposition::Cancel(CancelReason::NativeSignIn(_)) => DecisionKind::SignInDiverted,
            Disposition::Cancel(CancelReason::IdentityProvider) => DecisionKind::Blocked,
            Disposition::Substitute(_) => DecisionKind::Substituted,
        }
    }
}

/// Pure decision logic for a single navigation.
#[derive(Debug, Clone)]
pub struct NavigationInterceptor {
    rule: RequiredParam,
    login: LoginMatcher,
    blocked_hosts: Vec<String>,
}

impl NavigationInterceptor {
    pub fn new(rule: RequiredParam, login: LoginMatcher, blocked_hosts: Vec<String>) -> Self {
        Self {
            rule,
            login,
            blocked_hosts,
        }
    }

    pub fn from_config(config: &ShellConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            RequiredParam::from_config(config),
            LoginMatcher::from_config(config)?,
            config.auth.blocked_hosts.clone(),
        ))
    }

    pub fn rule(&self) -> &RequiredParam {
        &self.rule
    }

    pub fn login_matcher(&self) -> &LoginMatcher {
        &self.login
    }

    /// Decides the fate of one navigation.
    ///
    /// Unparseable targets are allowed unchanged. A substitution is only
    /// produced when the rewritten target no longer needs tagging, so
    /// re-evaluating it always ends in `Allow`.
    pub fn decide(&self, request: &NavigationRequest) -> Disposition {
        let url = match Url::parse(request.target()) {
            Ok(url) => url,
            Err(e) => {
                debug!(target = request.target(), error = %e, "unparseable navigation allowed");
                return Disposition::Allow;
            }
        };

        if !self.rule.is_home(&url) {
            if self.is_blocked(&url) {
                return Disposition::Cancel(CancelReason::IdentityProvider);
            }
            return Disposition::Allow;
        }

        if let Some(affordance) = self.login.match_url(&url) {
            return Disposition::Cancel(CancelReason::NativeSignIn(affordance));
        }

        if self.rule.matches_url(&url) {
            let tagged = self.rule.apply_url(&url);
            if self.rule.matches_url(&tagged) {
                warn!(target = request.target(), "tagging did not take; allowing as-is");
                return Disposition::Allow;
            }
            return Disposition::Substitute(NavigationRequest::new(
                String::from(tagged),
                request.trigger(),
            ));
        }

        Disposition::Allow
    }

    fn is_blocked(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            self.blocked_hosts
                .iter()
                .any(|blocked| host_in_domain(host, blocked))
        })
    }
}

/// Ordered navigation queue in front of the embedded surface.
///
/// Requests are evaluated in arrival order. A substitution is pushed to the
/// front of the queue and re-evaluated before anything queued after the
/// original request, so an old URL and its rewrite can never race. Sign-in
/// diversions are sent to the sign-in worker without blocking the decision.
#[derive(Debug)]
pub struct Navigator {
    interceptor: NavigationInterceptor,
    pending: Mutex<VecDeque<NavigationRequest>>,
    sign_in: mpsc::UnboundedSender<LoginAffordance>,
    trail: Arc<DecisionTrail>,
}

impl Navigator {
    pub fn new(
        interceptor: NavigationInterceptor,
        sign_in: mpsc::UnboundedSender<LoginAffordance>,
    ) -> Self {
        Self {
            interceptor,
            pending: Mutex::new(VecDeque::new()),
            sign_in,
            trail: Arc::new(DecisionTrail::new()),
        }
    }

    pub fn interceptor(&self) -> &NavigationInterceptor {
        &self.interceptor
    }

    pub fn trail(&self) -> Arc<DecisionTrail> {
        Arc::clone(&self.trail)
    }

    /// Evaluates one navigation right now, as a host delegate callback would.
    ///
    /// Records the decision and dispatches sign-in for login diversions. The
    /// caller performs `Substitute` by loading the new target, which comes
    /// back through this method and is allowed.
    pub fn decide(&self, request: &NavigationRequest) -> Disposition {
        let disposition = self.interceptor.decide(request);
        self.trail
            .record(request.trigger(), request.target(), disposition.kind());

        match &disposition {
            Disposition::Allow => {
                debug!(trigger = %request.trigger(), domain = ?request.domain(), "navigation allowed");
            }
            Disposition::Substitute(next) => {
                debug!(
                    trigger = %request.trigger(),
                    from = request.target(),
                    to = next.target(),
                    "navigation re-issued with tag"
                );
            }
            Disposition::Cancel(CancelReason::NativeSignIn(affordance)) => {
                info!(return_url = %affordance.return_url(), "login entry diverted to native sign-in");
                if self.sign_in.send(affordance.clone()).is_err() {
                    warn!("sign-in worker is not running; login activation dropped");
                }
            }
            Disposition::Cancel(CancelReason::IdentityProvider) => {
                info!(domain = ?request.domain(), "identity-provider navigation blocked");
            }
        }

        disposition
    }

    /// Queues a navigation for [`drain`](Self::drain).
    pub fn request(&self, request: NavigationRequest) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(request);
    }

    /// Queues a URL the app was opened with.
    pub fn open_deep_link(&self, url: &str) {
        self.request(NavigationRequest::new(url, NavigationTrigger::DeepLink));
    }

    /// Evaluates everything queued and returns the navigations that may
    /// proceed, in order.
    ///
    /// The queue stays locked for the whole pass: a concurrent drain waits
    /// until every substitution has been re-evaluated, and requests queued
    /// meanwhile are picked up by the next pass.
    pub fn drain(&self) -> Vec<NavigationRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut committed = Vec::new();

        while let Some(request) = pending.pop_front() {
            match self.decide(&request) {
                Disposition::Allow => committed.push(request),
                Disposition::Substitute(next) => pending.push_front(next),
                Disposition::Cancel(_) => {}
            }
        }

        committed
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
