//! Native sign-in demonstration.
//!
//! This example wires the sign-in bridge to a simulated platform capability
//! and a simulated backend, then clicks the site's "Continue with Google"
//! button:
//! 1. The click is diverted to native sign-in
//! 2. The identity token is exchanged for a session
//! 3. The session lands in both stores
//! 4. The page is sent to the `return_url` of the button
//!
//! Run with: `cargo run --example native_sign_in`

use std::sync::Arc;

use async_trait::async_trait;
use shell_bridge::{
    AuthBridge, AuthResult, CapabilityError, Element, ExchangeError, FastCache, HeadlessPage,
    MemoryStore, NavigationInterceptor, Navigator, PageController, PageInbox, Secret, Session,
    SessionStore, ShellConfig, SignInCapability, SignInResponse, SignInWorker, TokenExchange,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Stands in for the OS account picker.
struct SimulatedProvider;

#[async_trait]
impl SignInCapability for SimulatedProvider {
    async fn sign_in(&self) -> Result<SignInResponse, CapabilityError> {
        Ok(SignInResponse::Authorized(
            AuthResult::new(Secret::new("eyJhbGciOiJSUzI1NiJ9.demo".to_string()))
                .with_email("coach@example.com")
                .with_display_name("Sam Coach"),
        ))
    }

    async fn sign_out(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// Stands in for `POST /auth/google/native`.
struct SimulatedBackend;

#[async_trait]
impl TokenExchange for SimulatedBackend {
    async fn exchange(&self, _identity_token: &Secret<String>) -> Result<Session, ExchangeError> {
        shell_bridge::http::parse_exchange_body(
            br#"{"access_token":"session-123","user":{"email":"coach@example.com"}}"#,
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ShellConfig::default();
    let cache = Arc::new(FastCache::new());
    let durable = Arc::new(MemoryStore::new());
    let sessions = Arc::new(SessionStore::new(
        cache.clone(),
        durable.clone(),
        config.storage.clone(),
        config.home_url()?,
    ));

    let (sign_in_tx, sign_in_rx) = mpsc::unbounded_channel();
    let navigator = Arc::new(Navigator::new(
        NavigationInterceptor::from_config(&config)?,
        sign_in_tx.clone(),
    ));
    let bridge = Arc::new(AuthBridge::new(
        Arc::new(SimulatedProvider),
        Arc::new(SimulatedBackend),
        sessions.clone(),
        config.exchange_timeout(),
    ));
    let inbox = Arc::new(PageInbox::new());
    let mut worker = SignInWorker::new(bridge, sign_in_rx, inbox.clone());
    let controller = PageController::from_config(&config, sessions, sign_in_tx)?;

    println!("=== Login page ===");
    let mut page = HeadlessPage::open(
        navigator.clone(),
        Url::parse("https://app.my-coach-finder.com/auth/login")?,
    );
    controller.install(&mut page).await;
    println!("   on {}", page.url());

    println!("\n=== Click \"Continue with Google\" ===");
    let verdict = page.click(&[
        Element::new("svg"),
        Element::new("a")
            .with_href("/auth/google/login?return_url=%2Fcoaches%2F42")
            .with_attr("data-provider", "google"),
    ]);
    println!("   click verdict: {:?}", verdict);

    worker.process_next().await;
    page.pump(&inbox);

    println!("\n=== After sign-in ===");
    println!("   on {}", page.url());
    println!("   fast cache token present: {}", cache.get("token").is_some());
    println!("   durable keys: {:?}", durable.snapshot().keys().collect::<Vec<_>>());
    println!("   alerts: {:?}", page.alerts());

    Ok(())
}
