//! Per-page installation of the in-page hooks.
//!
//! A page can signal "ready" any number of times. [`PageController::install`]
//! claims each hook family in the page's [`InjectionGuard`] before installing
//! it, so repeated calls on one page instance are no-ops. The guard lives in
//! the page instance; a full load starts with a fresh one and gets everything
//! installed again.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::affordance::{Classified, Element, LoginAffordance, LoginMatcher};
use crate::config::ShellConfig;
use crate::error::ConfigError;
use crate::logging::PageLog;
use crate::navigation::NavigationTrigger;
use crate::page::{ClickVerdict, NavigateVerdict, PageHook, PageSurface};
use crate::push::{PushBridge, PushOutcome};
use crate::rewrite::RequiredParam;
use crate::session::{Persistence, Restore, Session, SessionStore};

/// Independently guarded pieces of in-page behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookFamily {
    /// Capture-phase click listener
    Click,
    /// `pushState` / `replaceState` wrapper
    History,
    /// `location` assignment wrapper
    Location,
    /// `window.open` wrapper
    WindowOpen,
    /// One-time tagging of the URL the page was loaded with
    InitialUrl,
    /// One-time session restore or sync
    Session,
    /// One-time push registration, when the shell has a push capability
    Push,
}

impl HookFamily {
    /// Families that register a hook with the page.
    pub const LISTENERS: [HookFamily; 4] = [
        HookFamily::Click,
        HookFamily::History,
        HookFamily::Location,
        HookFamily::WindowOpen,
    ];
}

impl fmt::Display for HookFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookFamily::Click => "click",
            HookFamily::History => "history",
            HookFamily::Location => "location",
            HookFamily::WindowOpen => "window-open",
            HookFamily::InitialUrl => "initial-url",
            HookFamily::Session => "session",
            HookFamily::Push => "push",
        };
        f.write_str(name)
    }
}

/// Which hook families a page instance already has.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InjectionGuard {
    installed: BTreeSet<HookFamily>,
}

impl InjectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `family` installed. Returns false if it already was.
    pub fn claim(&mut self, family: HookFamily) -> bool {
        self.installed.insert(family)
    }

    pub fn is_installed(&self, family: HookFamily) -> bool {
        self.installed.contains(&family)
    }
}

/// The in-page half of the interceptor and the sign-in bridge.
///
/// Uses the same [`RequiredParam`] and [`LoginMatcher`] as the native
/// interceptor, so a URL the hooks tag is one the interceptor allows.
pub struct InPageHooks {
    rule: RequiredParam,
    login: LoginMatcher,
    sign_in: mpsc::UnboundedSender<LoginAffordance>,
}

impl fmt::Debug for InPageHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InPageHooks")
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl InPageHooks {
    pub fn new(
        rule: RequiredParam,
        login: LoginMatcher,
        sign_in: mpsc::UnboundedSender<LoginAffordance>,
    ) -> Self {
        Self {
            rule,
            login,
            sign_in,
        }
    }

    fn divert(&self, affordance: LoginAffordance) -> LoginAffordance {
        if self.sign_in.send(affordance.clone()).is_err() {
            tracing::warn!("sign-in worker is not running; login activation dropped");
        }
        affordance
    }
}

impl PageHook for InPageHooks {
    fn on_click(&self, page_url: &Url, path: &[Element]) -> ClickVerdict {
        match self.login.classify(page_url, path) {
            Classified::Login(affordance) => ClickVerdict::Divert(self.divert(affordance)),
            Classified::Link { href } => match self.rule.rewrite_href(page_url, &href) {
                Some(tagged) => ClickVerdict::Rewrite(tagged),
                None => ClickVerdict::PassThrough,
            },
            Classified::Inert => ClickVerdict::PassThrough,
        }
    }

    fn on_history(&self, page_url: &Url, url: &str) -> String {
        self.rule
            .rewrite_href(page_url, url)
            .unwrap_or_else(|| url.to_string())
    }

    fn on_navigate(&self, page_url: &Url, url: &str, trigger: NavigationTrigger) -> NavigateVerdict {
        let Ok(resolved) = page_url.join(url) else {
            return NavigateVerdict::Proceed(url.to_string());
        };
        if let Some(affordance) = self.login.match_url(&resolved) {
            tracing::debug!(%trigger, "in-page navigation diverted to native sign-in");
            return NavigateVerdict::Divert(self.divert(affordance));
        }
        NavigateVerdict::Proceed(self.rule.apply_url(&resolved).into())
    }
}

/// What one [`PageController::install`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Families installed by this call, in installation order
    pub installed: Vec<HookFamily>,
    /// Auto-login destination, if the page was a login page with a stored session
    pub redirect: Option<Url>,
    /// Result of push registration, if it ran and did not fail
    pub push: Option<PushOutcome>,
}

impl InstallReport {
    /// True if the call found everything already installed.
    pub fn is_noop(&self) -> bool {
        self.installed.is_empty()
    }
}

/// Installs in-page behavior and owns the session lifecycle of a page.
pub struct PageController {
    hooks: Arc<InPageHooks>,
    sessions: Arc<SessionStore>,
    rule: RequiredParam,
    login_pages: Vec<String>,
    push: Option<Arc<PushBridge>>,
}

impl fmt::Debug for PageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageController")
            .field("login_pages", &self.login_pages)
            .field("push", &self.push.is_some())
            .finish_non_exhaustive()
    }
}

impl PageController {
    pub fn new(
        hooks: Arc<InPageHooks>,
        sessions: Arc<SessionStore>,
        rule: RequiredParam,
        login_pages: Vec<String>,
    ) -> Self {
        Self {
            hooks,
            sessions,
            rule,
            login_pages,
            push: None,
        }
    }

    /// Registers for push notifications once per page instance.
    pub fn with_push(mut self, push: Arc<PushBridge>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn from_config(
        config: &ShellConfig,
        sessions: Arc<SessionStore>,
        sign_in: mpsc::UnboundedSender<LoginAffordance>,
    ) -> Result<Self, ConfigError> {
        let rule = RequiredParam::from_config(config);
        let hooks = InPageHooks::new(rule.clone(), LoginMatcher::from_config(config)?, sign_in);
        Ok(Self::new(
            Arc::new(hooks),
            sessions,
            rule,
            config.auth.login_pages.clone(),
        ))
    }

    /// Installs everything this page instance does not have yet.
    ///
    /// Safe to call on every "page ready" signal. The first call on a page
    /// instance tags the initial URL in place, registers one hook per
    /// listener family, restores (login page) or syncs (other pages) the
    /// session, and finally runs push registration if configured. Later
    /// calls on the same instance do nothing.
    pub async fn install<P: PageSurface>(&self, page: &mut P) -> InstallReport {
        let log = PageLog::new(page.page_id());
        let mut report = InstallReport::default();

        if page.guard_mut().claim(HookFamily::InitialUrl) {
            let current = page.current_url();
            if self.rule.matches_url(&current) {
                let tagged = self.rule.apply_url(&current);
                page.replace_history_entry(tagged.as_str());
                log.debug(format_args!("initial URL tagged in place"));
            }
            report.installed.push(HookFamily::InitialUrl);
        }

        for family in HookFamily::LISTENERS {
            if page.guard_mut().claim(family) {
                let hook: Arc<dyn PageHook> = self.hooks.clone();
                page.install_hook(family, hook);
                report.installed.push(family);
            }
        }

        if page.guard_mut().claim(HookFamily::Session) {
            report.redirect = self.restore(page).await;
            report.installed.push(HookFamily::Session);
        }

        if let Some(push) = &self.push {
            if page.guard_mut().claim(HookFamily::Push) {
                match push.register().await {
                    Ok(outcome) => report.push = Some(outcome),
                    Err(e) => log.error(format_args!("push registration failed: {}", e)),
                }
                report.installed.push(HookFamily::Push);
            }
        }

        if report.is_noop() {
            log.debug(format_args!("already installed; nothing to do"));
        } else {
            log.info(format_args!("installed {} hook families", report.installed.len()));
        }
        report
    }

    /// Stores a session in both locations.
    pub async fn save(&self, session: &Session) -> Persistence {
        self.sessions.save(session).await
    }

    /// Drops the session from both locations.
    pub async fn clear(&self) {
        self.sessions.clear().await;
    }

    /// Reconciles the session with the current page.
    ///
    /// On a login page, a stored session sends the page to the home root
    /// (returned), and a missing one clears any stale cached copy. On other
    /// pages, a session the site put in the fast cache is copied to durable
    /// storage.
    pub async fn restore<P: PageSurface>(&self, page: &mut P) -> Option<Url> {
        let log = PageLog::new(page.page_id());
        let current = page.current_url();

        if !self.is_login_page(&current) {
            if let Some(persistence) = self.sessions.sync().await {
                log.debug(format_args!("cached session synced ({:?})", persistence));
            }
            return None;
        }

        match self.sessions.restore().await {
            Restore::AutoLogin { redirect, .. } => {
                log.info(format_args!("stored session found on login page; leaving"));
                page.load(redirect.as_str());
                Some(redirect)
            }
            Restore::NoSession => None,
        }
    }

    fn is_login_page(&self, url: &Url) -> bool {
        if !self.rule.is_home(url) {
            return false;
        }
        let path = url.path().trim_end_matches('/');
        self.login_pages
            .iter()
            .any(|page| page.trim_end_matches('/').eq_ignore_ascii_case(path))
    }
}
