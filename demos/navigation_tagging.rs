//! Navigation tagging demonstration.
//!
//! This example walks a page through the navigation surfaces the shell
//! controls and prints every decision the host interceptor made:
//! 1. Initial load of an untagged URL
//! 2. Link clicks, with and without in-page hooks
//! 3. Single-page history edits (no reload)
//! 4. `window.open` and a blocked identity-provider redirect
//!
//! Run with: `cargo run --example navigation_tagging`

use std::sync::Arc;

use shell_bridge::{
    Element, FastCache, HeadlessPage, MemoryStore, NavigationInterceptor, Navigator,
    PageController, SessionStore, ShellConfig,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ShellConfig::default();
    let (sign_in_tx, _sign_in_rx) = mpsc::unbounded_channel();
    let navigator = Arc::new(Navigator::new(
        NavigationInterceptor::from_config(&config)?,
        sign_in_tx.clone(),
    ));
    let sessions = Arc::new(SessionStore::new(
        Arc::new(FastCache::new()),
        Arc::new(MemoryStore::new()),
        config.storage.clone(),
        config.home_url()?,
    ));
    let controller = PageController::from_config(&config, sessions, sign_in_tx)?;

    println!("=== Initial load ===");
    let mut page = HeadlessPage::open(navigator.clone(), Url::parse("https://app.my-coach-finder.com/")?);
    println!("   landed on {}", page.url());

    println!("\n=== Click before hooks are installed ===");
    page.click(&[Element::new("a").with_href("/coaches")]);
    println!("   landed on {}", page.url());

    println!("\n=== Click with hooks installed ===");
    let report = controller.install(&mut page).await;
    println!("   installed: {:?}", report.installed);
    page.click(&[Element::new("span"), Element::new("a").with_href("/auth/register")]);
    println!("   landed on {}", page.url());

    println!("\n=== History edits ===");
    controller.install(&mut page).await;
    page.push_state("/auth/register/step-2");
    println!("   history: {:?}", page.history());
    println!("   loads so far: {}", page.loads().len());

    println!("\n=== window.open and identity-provider redirect ===");
    page.window_open("https://www.my-coach-finder.com/blog");
    println!("   landed on {}", page.url());
    page.assign_location("https://accounts.google.com/o/oauth2/v2/auth");
    println!("   still on {}", page.url());

    println!("\n=== Decision trail ===");
    for record in navigator.trail().records() {
        println!("   {}", record);
    }

    Ok(())
}
