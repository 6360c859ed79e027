//! Session restore demonstration.
//!
//! This example persists a session to a JSON file, then simulates a fresh
//! launch that opens the login page:
//! 1. A stored session sends the login page straight to the home root
//! 2. After sign-out, the login page stays put and the stale cache is gone
//!
//! Run with: `cargo run --example session_restore`

use std::sync::Arc;

use shell_bridge::{
    FastCache, HeadlessPage, JsonFileStore, NavigationInterceptor, Navigator, PageController,
    Secret, Session, SessionStore, ShellConfig,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

struct Shell {
    navigator: Arc<Navigator>,
    controller: PageController,
    cache: Arc<FastCache>,
}

fn launch(config: &ShellConfig, store: Arc<JsonFileStore>) -> Result<Shell, shell_bridge::Error> {
    let (sign_in_tx, _sign_in_rx) = mpsc::unbounded_channel();
    let cache = Arc::new(FastCache::new());
    let sessions = Arc::new(SessionStore::new(
        cache.clone(),
        store,
        config.storage.clone(),
        config.home_url()?,
    ));
    Ok(Shell {
        navigator: Arc::new(Navigator::new(
            NavigationInterceptor::from_config(config)?,
            sign_in_tx.clone(),
        )),
        controller: PageController::from_config(config, sessions, sign_in_tx)?,
        cache,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ShellConfig::default();
    let path = std::env::temp_dir().join("shell-bridge-demo").join("prefs.json");
    let store = Arc::new(JsonFileStore::new(&path));
    let login = Url::parse("https://app.my-coach-finder.com/auth/login")?;

    println!("=== First launch: sign in ===");
    let first = launch(&config, store.clone())?;
    first
        .controller
        .save(&Session::new(Secret::new("session-123".to_string()), r#"{"id":1}"#))
        .await;
    println!("   session written to {}", path.display());

    println!("\n=== Second launch: open the login page ===");
    let second = launch(&config, store.clone())?;
    let mut page = HeadlessPage::open(second.navigator.clone(), login.clone());
    let report = second.controller.install(&mut page).await;
    println!("   auto-login redirect: {:?}", report.redirect.map(String::from));
    println!("   now on {}", page.url());

    println!("\n=== Sign out, third launch ===");
    second.controller.clear().await;
    let third = launch(&config, store)?;
    third.cache.set("token", "stale");
    let mut page = HeadlessPage::open(third.navigator.clone(), login);
    let report = third.controller.install(&mut page).await;
    println!("   auto-login redirect: {:?}", report.redirect);
    println!("   now on {}", page.url());
    println!("   stale cache cleared: {}", third.cache.is_empty());

    Ok(())
}
