//! The embedded page as seen by the injection layer.
//!
//! [`PageSurface`] is the narrow interface the [`PageController`] needs from a
//! page instance. [`HeadlessPage`] is an in-memory page that routes full loads
//! through a [`Navigator`] and runs installed hooks for clicks, history edits,
//! location assignments and `window.open`, the way a rendering engine would.
//!
//! [`PageController`]: crate::PageController

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::affordance::{Element, LoginAffordance};
use crate::auth::SignInObserver;
use crate::inject::{HookFamily, InjectionGuard};
use crate::logging::PageLog;
use crate::navigation::{NavigationRequest, NavigationTrigger, Navigator};

/// Identifies one page instance. A full load always yields a new id.
pub type PageId = u64;

static NEXT_PAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_page_id() -> PageId {
    NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a click hook wants done with a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickVerdict {
    /// Let the page handle the click normally
    PassThrough,
    /// Cancel the default action and navigate here instead
    Rewrite(String),
    /// Cancel the default action; native sign-in takes over
    Divert(LoginAffordance),
}

/// What a location or `window.open` hook wants done with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigateVerdict {
    /// Navigate to this (possibly rewritten) target
    Proceed(String),
    /// Drop the navigation; native sign-in takes over
    Divert(LoginAffordance),
}

/// In-page behavior installed into a page instance.
pub trait PageHook: Send + Sync {
    /// Called in the capture phase with the click target first, then its
    /// ancestors.
    fn on_click(&self, page_url: &Url, path: &[Element]) -> ClickVerdict;

    /// Returns the URL a `pushState`/`replaceState` call should record.
    fn on_history(&self, page_url: &Url, url: &str) -> String;

    /// Called for location assignment and `window.open`.
    fn on_navigate(&self, page_url: &Url, url: &str, trigger: NavigationTrigger)
        -> NavigateVerdict;
}

/// Page operations the injection layer relies on.
pub trait PageSurface {
    fn page_id(&self) -> PageId;

    fn current_url(&self) -> Url;

    /// Guard scoped to this page instance.
    fn guard_mut(&mut self) -> &mut InjectionGuard;

    fn install_hook(&mut self, family: HookFamily, hook: Arc<dyn PageHook>);

    /// Rewrites the current history entry without navigating.
    fn replace_history_entry(&mut self, url: &str);

    /// Starts a full navigation through the host.
    fn load(&mut self, url: &str);

    fn alert(&mut self, message: &str);
}

/// Something the sign-in worker asked the page to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Redirect(Url),
    Failure(String),
}

/// Collects sign-in results until the page picks them up with
/// [`HeadlessPage::pump`].
#[derive(Debug, Default)]
pub struct PageInbox {
    events: Mutex<VecDeque<PageEvent>>,
}

impl PageInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<PageEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn push(&self, event: PageEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }
}

impl SignInObserver for PageInbox {
    fn redirect(&self, url: &Url) {
        self.push(PageEvent::Redirect(url.clone()));
    }

    fn report_failure(&self, message: &str) {
        self.push(PageEvent::Failure(message.to_string()));
    }
}

/// In-memory page hosted behind a [`Navigator`].
pub struct HeadlessPage {
    navigator: Arc<Navigator>,
    id: PageId,
    url: Url,
    guard: InjectionGuard,
    hooks: BTreeMap<HookFamily, Vec<Arc<dyn PageHook>>>,
    history: Vec<String>,
    loads: Vec<String>,
    alerts: Vec<String>,
}

impl std::fmt::Debug for HeadlessPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessPage")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("guard", &self.guard)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl HeadlessPage {
    /// Opens a page and performs the first full load of `initial`.
    ///
    /// The load goes through the navigator like any other, so the committed
    /// URL may differ from `initial`.
    pub fn open(navigator: Arc<Navigator>, initial: Url) -> Self {
        let mut page = Self {
            navigator,
            id: next_page_id(),
            url: initial.clone(),
            guard: InjectionGuard::new(),
            hooks: BTreeMap::new(),
            history: Vec::new(),
            loads: Vec::new(),
            alerts: Vec::new(),
        };
        page.load(initial.as_str());
        page
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Recorded history entries of the current page instance, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Every document committed into this surface, across page instances.
    pub fn loads(&self) -> &[String] {
        &self.loads
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Number of hooks registered for a family on the current page instance.
    pub fn listener_count(&self, family: HookFamily) -> usize {
        self.hooks.get(&family).map_or(0, Vec::len)
    }

    /// Reloads the current document, creating a new page instance.
    pub fn reload(&mut self) {
        let url = self.url.to_string();
        self.navigate(&url, NavigationTrigger::FullLoad);
    }

    /// Dispatches a click on `path[0]` (ancestors follow).
    ///
    /// Hooks run in registration order; the first one that does not pass the
    /// click through decides. Without a decision the nearest anchor is
    /// followed.
    pub fn click(&mut self, path: &[Element]) -> ClickVerdict {
        let verdict = self
            .hooks_for(HookFamily::Click)
            .iter()
            .map(|hook| hook.on_click(&self.url, path))
            .fold(ClickVerdict::PassThrough, |decided, next| match decided {
                ClickVerdict::PassThrough => next,
                decided => decided,
            });

        match &verdict {
            ClickVerdict::Rewrite(target) => {
                let target = target.clone();
                self.navigate(&target, NavigationTrigger::LinkClick);
            }
            ClickVerdict::Divert(_) => {
                self.log().debug(format_args!("click diverted to native sign-in"));
            }
            ClickVerdict::PassThrough => {
                let href = path
                    .iter()
                    .find(|e| e.tag() == "a" && e.href().is_some())
                    .and_then(Element::href)
                    .and_then(|href| self.url.join(href).ok());
                if let Some(target) = href {
                    self.navigate(target.as_str(), NavigationTrigger::LinkClick);
                }
            }
        }
        verdict
    }

    /// `history.pushState`: records a new entry without loading.
    pub fn push_state(&mut self, url: &str) {
        if let Some(resolved) = self.history_target(url) {
            self.history.push(resolved.to_string());
            self.url = resolved;
        }
    }

    /// `history.replaceState`: rewrites the current entry without loading.
    pub fn replace_state(&mut self, url: &str) {
        if let Some(resolved) = self.history_target(url) {
            self.set_current_entry(resolved);
        }
    }

    /// Script assigns `location.href`.
    pub fn assign_location(&mut self, url: &str) {
        if let Some(target) = self.navigate_target(url, NavigationTrigger::Programmatic) {
            self.navigate(&target, NavigationTrigger::Programmatic);
        }
    }

    /// `window.open`; the shell keeps it in the same surface.
    pub fn window_open(&mut self, url: &str) {
        if let Some(target) = self.navigate_target(url, NavigationTrigger::NewWindow) {
            self.navigate(&target, NavigationTrigger::NewWindow);
        }
    }

    /// Applies sign-in results delivered since the last call.
    pub fn pump(&mut self, inbox: &PageInbox) {
        for event in inbox.take() {
            match event {
                PageEvent::Redirect(url) => self.navigate(url.as_str(), NavigationTrigger::Programmatic),
                PageEvent::Failure(message) => self.alert(&message),
            }
        }
    }

    fn navigate(&mut self, url: &str, trigger: NavigationTrigger) {
        self.navigator.request(NavigationRequest::new(url, trigger));
        for request in self.navigator.drain() {
            self.commit(&request);
        }
    }

    fn commit(&mut self, request: &NavigationRequest) {
        let Ok(url) = Url::parse(request.target()) else {
            self.log().warn(format_args!("committed target is not a URL; ignored"));
            return;
        };
        self.id = next_page_id();
        self.guard = InjectionGuard::new();
        self.hooks.clear();
        self.history = vec![url.to_string()];
        self.loads.push(url.to_string());
        self.url = url;
        self.log()
            .debug(format_args!("page loaded ({})", request.trigger()));
    }

    fn hooks_for(&self, family: HookFamily) -> Vec<Arc<dyn PageHook>> {
        self.hooks.get(&family).cloned().unwrap_or_default()
    }

    fn history_target(&self, url: &str) -> Option<Url> {
        let recorded = self
            .hooks_for(HookFamily::History)
            .iter()
            .fold(url.to_string(), |current, hook| hook.on_history(&self.url, &current));
        self.url.join(&recorded).ok()
    }

    fn navigate_target(&self, url: &str, trigger: NavigationTrigger) -> Option<String> {
        let family = match trigger {
            NavigationTrigger::NewWindow => HookFamily::WindowOpen,
            _ => HookFamily::Location,
        };
        let mut target = url.to_string();
        for hook in self.hooks_for(family) {
            match hook.on_navigate(&self.url, &target, trigger) {
                NavigateVerdict::Proceed(next) => target = next,
                NavigateVerdict::Divert(_) => return None,
            }
        }
        self.url.join(&target).ok().map(String::from)
    }

    fn set_current_entry(&mut self, url: Url) {
        match self.history.last_mut() {
            Some(entry) => *entry = url.to_string(),
            None => self.history.push(url.to_string()),
        }
        self.url = url;
    }

    fn log(&self) -> PageLog {
        PageLog::new(self.id)
    }
}

impl PageSurface for HeadlessPage {
    fn page_id(&self) -> PageId {
        self.id
    }

    fn current_url(&self) -> Url {
        self.url.clone()
    }

    fn guard_mut(&mut self) -> &mut InjectionGuard {
        &mut self.guard
    }

    fn install_hook(&mut self, family: HookFamily, hook: Arc<dyn PageHook>) {
        self.hooks.entry(family).or_default().push(hook);
    }

    fn replace_history_entry(&mut self, url: &str) {
        match self.url.join(url) {
            Ok(resolved) => self.set_current_entry(resolved),
            Err(_) => self
                .log()
                .warn(format_args!("history entry left unchanged: unresolvable URL")),
        }
    }

    fn load(&mut self, url: &str) {
        self.navigate(url, NavigationTrigger::FullLoad);
    }

    fn alert(&mut self, message: &str) {
        self.log().info(format_args!("alert shown"));
        self.alerts.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::navigation::NavigationInterceptor;
    use tokio::sync::mpsc;

    fn page_at(url: &str) -> HeadlessPage {
        let (tx, _rx) = mpsc::unbounded_channel();
        let interceptor = NavigationInterceptor::from_config(&ShellConfig::default()).unwrap();
        HeadlessPage::open(Arc::new(Navigator::new(interceptor, tx)), Url::parse(url).unwrap())
    }

    #[test]
    fn open_goes_through_interceptor() {
        let p = page_at("https://app.my-coach-finder.com/coaches");

        assert_eq!(p.url().as_str(), "https://app.my-coach-finder.com/coaches?os=apple");
        assert_eq!(p.loads().len(), 1);
    }

    #[test]
    fn full_load_creates_new_instance_but_history_does_not() {
        let mut p = page_at("https://app.my-coach-finder.com/");
        let first = p.page_id();

        p.push_state("/coaches?os=apple");
        assert_eq!(p.page_id(), first);
        assert_eq!(p.history().len(), 2);

        p.reload();
        assert_ne!(p.page_id(), first);
        assert_eq!(p.history().len(), 1);
    }

    #[test]
    fn unhooked_click_follows_nearest_anchor() {
        let mut p = page_at("https://app.my-coach-finder.com/");

        let verdict = p.click(&[Element::new("span"), Element::new("a").with_href("/about")]);

        assert_eq!(verdict, ClickVerdict::PassThrough);
        assert_eq!(p.url().as_str(), "https://app.my-coach-finder.com/about?os=apple");
    }

    #[test]
    fn replace_history_entry_does_not_load() {
        let mut p = page_at("https://app.my-coach-finder.com/?os=apple");
        let id = p.page_id();

        p.replace_history_entry("/?os=apple&tab=1");

        assert_eq!(p.page_id(), id);
        assert_eq!(p.loads().len(), 1);
        assert_eq!(p.history(), ["https://app.my-coach-finder.com/?os=apple&tab=1"]);
    }

    #[test]
    fn inbox_failures_become_alerts() {
        let mut p = page_at("https://app.my-coach-finder.com/");
        let inbox = PageInbox::new();
        inbox.report_failure("Login failed: nope");
        inbox.redirect(&Url::parse("https://app.my-coach-finder.com/me").unwrap());

        p.pump(&inbox);

        assert_eq!(p.alerts(), ["Login failed: nope"]);
        assert_eq!(p.url().as_str(), "https://app.my-coach-finder.com/me?os=apple");
        assert!(inbox.take().is_empty());
    }
}
