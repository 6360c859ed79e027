//! Injection and session lifecycle across page instances.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{url, GrantedPush, Harness, RecordingExchange};
use shell_bridge::{
    DurableStore, Element, HeadlessPage, HookFamily, PageController, PageSurface, PushBridge,
    PushOutcome,
};

fn controller(h: &Harness) -> PageController {
    PageController::from_config(&h.config, h.sessions.clone(), h.sign_in_tx.clone()).unwrap()
}

#[tokio::test]
async fn repeated_install_registers_each_listener_once() {
    let mut h = Harness::new();
    let mut rx = h.take_receiver();
    let controller = controller(&h);
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/"));

    let first = controller.install(&mut page).await;
    let second = controller.install(&mut page).await;

    assert_eq!(first.installed.len(), 6);
    assert!(second.is_noop());
    for family in HookFamily::LISTENERS {
        assert_eq!(page.listener_count(family), 1, "{} installed twice", family);
    }

    page.click(&[Element::new("a").with_href("/auth/google/login")]);
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err(), "one click must dispatch one sign-in");
}

#[tokio::test]
async fn full_load_gets_a_fresh_installation() {
    let h = Harness::new();
    let controller = controller(&h);
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/"));
    controller.install(&mut page).await;
    let first_id = page.page_id();

    page.reload();
    assert_ne!(page.page_id(), first_id);
    assert_eq!(page.listener_count(HookFamily::Click), 0);

    let report = controller.install(&mut page).await;
    assert!(!report.is_noop());
    assert_eq!(page.listener_count(HookFamily::Click), 1);
}

#[tokio::test]
async fn spa_navigation_stays_tagged_without_reloading() {
    let h = Harness::new();
    let controller = controller(&h);
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/"));
    controller.install(&mut page).await;
    let id = page.page_id();

    page.push_state("/coaches/3");
    page.replace_state("/coaches/3?tab=reviews");

    assert_eq!(page.page_id(), id);
    assert_eq!(page.loads().len(), 1);
    assert_eq!(
        page.history(),
        [
            "https://app.my-coach-finder.com/?os=apple",
            "https://app.my-coach-finder.com/coaches/3?tab=reviews&os=apple",
        ]
    );
}

#[tokio::test]
async fn durable_session_on_login_page_redirects_home_without_exchange() {
    let h = Harness::new();
    h.durable.set("auth_token", "T").await.unwrap();
    h.durable.set("auth_user", "{}").await.unwrap();
    let exchange = Arc::new(RecordingExchange::granting("unused"));
    let controller = controller(&h);

    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/login"),
    );
    let report = controller.install(&mut page).await;

    assert_eq!(report.redirect, Some(url("https://app.my-coach-finder.com/")));
    assert_eq!(page.url().as_str(), "https://app.my-coach-finder.com/?os=apple");
    assert_eq!(h.cache.get("token").as_deref(), Some("T"));
    assert_eq!(h.durable.read_count(), 2);

    // The home page installs and syncs without touching the backend.
    controller.install(&mut page).await;
    assert_eq!(exchange.call_count(), 0);
    assert_eq!(h.durable.read_count(), 2);
}

#[tokio::test]
async fn stale_cache_on_login_page_is_cleared() {
    let h = Harness::new();
    h.cache.set("token", "stale");
    h.cache.set("user", "{}");
    let controller = controller(&h);

    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/signup"),
    );
    let report = controller.install(&mut page).await;

    assert_eq!(report.redirect, None);
    assert!(h.cache.is_empty());
    assert_eq!(page.url().as_str(), "https://app.my-coach-finder.com/auth/signup?os=apple");
}

#[tokio::test]
async fn broken_durable_storage_shows_login_page() {
    let h = Harness::new();
    h.durable.broken.store(true, Ordering::SeqCst);
    let controller = controller(&h);

    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/login"),
    );
    let report = controller.install(&mut page).await;

    assert_eq!(report.redirect, None);
    assert_eq!(page.loads().len(), 1);
}

#[tokio::test]
async fn web_login_session_is_synced_to_durable_storage() {
    let h = Harness::new();
    let controller = controller(&h);
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/"));
    controller.install(&mut page).await;

    // The site writes its own session, then the user navigates on.
    h.cache.set("token", "web-T");
    h.cache.set("user", r#"{"id":3}"#);
    page.assign_location("/dashboard");
    controller.install(&mut page).await;

    assert_eq!(h.durable.value("auth_token").as_deref(), Some("web-T"));
    assert_eq!(h.durable.value("auth_user").as_deref(), Some(r#"{"id":3}"#));
}

#[tokio::test]
async fn controller_save_and_clear_reach_both_stores() {
    let h = Harness::new();
    let controller = controller(&h);
    let session = shell_bridge::Session::new(shell_bridge::Secret::new("S".to_string()), "{}");

    controller.save(&session).await;
    assert_eq!(h.cache.get("token").as_deref(), Some("S"));
    assert_eq!(h.durable.value("auth_token").as_deref(), Some("S"));

    controller.clear().await;
    assert!(h.cache.is_empty());
    assert_eq!(h.durable.value("auth_token"), None);
}

#[tokio::test]
async fn push_token_is_registered_once_per_page_instance() {
    let h = Harness::new();
    let device = Arc::new(GrantedPush::default());
    let push = PushBridge::new(device.clone(), h.cache.clone(), &h.config.storage, h.config.platform);
    let controller = controller(&h).with_push(Arc::new(push));
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/"));

    let first = controller.install(&mut page).await;
    let second = controller.install(&mut page).await;

    assert_eq!(first.installed.last(), Some(&HookFamily::Push));
    assert_eq!(first.push, Some(PushOutcome::Registered));
    assert!(second.is_noop());
    assert_eq!(device.registrations.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.get("fcm_token").as_deref(), Some("device-token-1"));
    assert_eq!(h.cache.get("device_platform").as_deref(), Some("ios"));

    page.reload();
    controller.install(&mut page).await;
    assert_eq!(device.registrations.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.get("fcm_token").as_deref(), Some("device-token-2"));
}

#[tokio::test]
async fn push_token_survives_login_page_cleanup() {
    let h = Harness::new();
    let push = PushBridge::new(
        Arc::new(GrantedPush::default()),
        h.cache.clone(),
        &h.config.storage,
        h.config.platform,
    );
    let controller = controller(&h).with_push(Arc::new(push));
    h.cache.set("token", "stale");
    let mut page = HeadlessPage::open(h.navigator.clone(), url("https://app.my-coach-finder.com/auth/login"));

    let report = controller.install(&mut page).await;

    assert_eq!(report.redirect, None);
    assert_eq!(h.cache.get("token"), None);
    assert!(h.cache.get("fcm_token").is_some());
}
