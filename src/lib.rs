//! Navigation control and native sign-in for hybrid web shells.
//!
//! A shell embeds a web surface that displays one home site. This crate
//! decides what happens to every navigation in that surface and bridges the
//! site's login button to the platform's native sign-in:
//!
//! - **Tagging**: every navigation to the home domain must carry a required
//!   query parameter (`os=<platform>`). [`RequiredParam`] is the one
//!   idempotent rule both the host and the in-page hooks apply.
//! - **Interception**: [`NavigationInterceptor`] gives each navigation exactly
//!   one terminal [`Disposition`]; [`Navigator`] evaluates requests in order
//!   and re-evaluates substitutions before anything queued later.
//! - **Sign-in**: [`AuthBridge`] runs the native capability, exchanges the
//!   identity token with the backend and stores the session.
//! - **Sessions**: [`SessionStore`] keeps the page's fast cache and durable
//!   storage consistent across reloads.
//! - **Injection**: [`PageController`] installs the in-page hooks once per page
//!   instance, however often the page signals readiness.
//! - **Push**: [`PushBridge`] leaves the device push token in the page's fast
//!   cache for the site to register.
//!
//! # Core Types
//!
//! - [`ShellConfig`]: home origin, platform, paths, storage keys
//! - [`Secret<T>`]: redacting wrapper for identity and access tokens
//! - [`DecisionTrail`]: record of every navigation decision, URLs redacted
//!
//! # Examples
//!
//! ```
//! use shell_bridge::{Disposition, NavigationInterceptor, NavigationRequest, NavigationTrigger, ShellConfig};
//!
//! let config = ShellConfig::default();
//! let interceptor = NavigationInterceptor::from_config(&config).expect("valid config");
//!
//! let request = NavigationRequest::new(
//!     "https://app.my-coach-finder.com/coaches",
//!     NavigationTrigger::LinkClick,
//! );
//! match interceptor.decide(&request) {
//!     Disposition::Substitute(next) => {
//!         assert_eq!(next.target(), "https://app.my-coach-finder.com/coaches?os=apple");
//!         // The substitute is allowed when it comes back around.
//!         assert_eq!(interceptor.decide(&next), Disposition::Allow);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

#![forbid(unsafe_code)]

pub mod affordance;
pub mod auth;
pub mod config;
mod error;
pub mod http;
pub mod inject;
mod logging;
pub mod navigation;
pub mod page;
pub mod push;
pub mod rewrite;
mod secret;
pub mod session;
pub mod storage;
pub mod trail;

pub use affordance::{Classified, Element, LoginAffordance, LoginMatcher};
pub use auth::{
    AuthBridge, AuthResult, AuthState, SignInCapability, SignInObserver, SignInOutcome,
    SignInResponse, SignInWorker, TokenExchange,
};
pub use config::{Platform, ShellConfig};
pub use error::{
    AuthError, CapabilityError, ConfigError, Error, ExchangeError, PushError, StorageError,
};
pub use http::HttpTokenExchange;
pub use inject::{HookFamily, InPageHooks, InjectionGuard, InstallReport, PageController};
pub use logging::PageLog;
pub use navigation::{
    CancelReason, Disposition, NavigationInterceptor, NavigationRequest, NavigationTrigger,
    Navigator,
};
pub use page::{
    ClickVerdict, HeadlessPage, NavigateVerdict, PageEvent, PageHook, PageId, PageInbox,
    PageSurface,
};
pub use push::{PushBridge, PushCapability, PushOutcome, PushPermission};
pub use rewrite::{RequiredParam, RewriteRule};
pub use secret::Secret;
pub use session::{
    DurableStore, FastCache, MemoryStore, Persistence, Restore, Session, SessionStore,
};
pub use storage::JsonFileStore;
pub use trail::{DecisionKind, DecisionRecord, DecisionTrail};
