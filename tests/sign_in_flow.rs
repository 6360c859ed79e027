//! End-to-end sign-in: login activation in the page, native capability,
//! backend exchange, session write and redirect.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{url, Harness, RecordingExchange, ScriptedCapability};
use shell_bridge::{
    AuthState, ClickVerdict, Element, ExchangeError, HeadlessPage, LoginAffordance, PageController,
    PageEvent, PageInbox, SignInOutcome, SignInWorker,
};
use tokio::sync::mpsc;

fn login_link(return_url: &str) -> Vec<Element> {
    vec![
        Element::new("img"),
        Element::new("span").with_class("btn-label"),
        Element::new("a").with_href(format!("/auth/google/login?return_url={}", return_url)),
    ]
}

#[tokio::test]
async fn login_click_signs_in_and_lands_on_return_url() {
    let mut h = Harness::new();
    let capability = Arc::new(ScriptedCapability::returning("id-token"));
    let exchange = Arc::new(RecordingExchange::granting("T"));
    let inbox = Arc::new(PageInbox::new());
    let mut worker = SignInWorker::new(
        h.bridge(capability.clone(), exchange.clone()),
        h.take_receiver(),
        inbox.clone(),
    );
    let controller =
        PageController::from_config(&h.config, h.sessions.clone(), h.sign_in_tx.clone()).unwrap();

    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/login"),
    );
    controller.install(&mut page).await;

    let verdict = page.click(&login_link("%2Fcoaches%2F7"));
    assert!(matches!(verdict, ClickVerdict::Divert(_)));
    assert!(worker.process_next().await);
    page.pump(&inbox);

    assert_eq!(page.url().as_str(), "https://app.my-coach-finder.com/coaches/7?os=apple");
    assert_eq!(h.cache.get("token").as_deref(), Some("T"));
    assert_eq!(h.durable.value("auth_token").as_deref(), Some("T"));
    assert_eq!(exchange.call_count(), 1);
    assert_eq!(capability.sign_outs.load(Ordering::SeqCst), 1);
    assert!(page.alerts().is_empty());
}

#[tokio::test]
async fn cancelled_sign_in_changes_nothing() {
    let mut h = Harness::new();
    let exchange = Arc::new(RecordingExchange::granting("T"));
    let inbox = Arc::new(PageInbox::new());
    let mut worker = SignInWorker::new(
        h.bridge(Arc::new(ScriptedCapability::cancelling()), exchange.clone()),
        h.take_receiver(),
        inbox.clone(),
    );
    let controller =
        PageController::from_config(&h.config, h.sessions.clone(), h.sign_in_tx.clone()).unwrap();

    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/login"),
    );
    controller.install(&mut page).await;
    let loads_before = page.loads().len();

    page.click(&login_link("%2Fme"));
    assert!(worker.process_next().await);
    page.pump(&inbox);

    assert_eq!(page.loads().len(), loads_before);
    assert!(page.alerts().is_empty());
    assert!(h.cache.is_empty());
    assert_eq!(h.durable.value("auth_token"), None);
    assert_eq!(exchange.call_count(), 0);
}

#[tokio::test]
async fn backend_rejection_is_shown_to_the_user() {
    let mut h = Harness::new();
    let exchange = Arc::new(RecordingExchange::failing(ExchangeError::Status {
        status: 401,
        body: "Invalid Google token".to_string(),
    }));
    let inbox = Arc::new(PageInbox::new());
    let mut worker = SignInWorker::new(
        h.bridge(Arc::new(ScriptedCapability::returning("id-token")), exchange.clone()),
        h.take_receiver(),
        inbox.clone(),
    );
    let mut page = HeadlessPage::open(
        h.navigator.clone(),
        url("https://app.my-coach-finder.com/auth/login?os=apple"),
    );

    // No hooks installed: the host interceptor alone diverts the navigation.
    page.assign_location("/auth/google/login");
    assert!(worker.process_next().await);
    page.pump(&inbox);

    assert_eq!(page.alerts(), ["Login failed: Invalid Google token"]);
    assert!(h.cache.is_empty());
    assert_eq!(page.url().as_str(), "https://app.my-coach-finder.com/auth/login?os=apple");
}

#[tokio::test]
async fn second_activation_during_exchange_is_ignored() {
    let h = Harness::new();
    let exchange = Arc::new(RecordingExchange::gated("T"));
    let bridge = h.bridge(Arc::new(ScriptedCapability::returning("id-token")), exchange.clone());
    let affordance = LoginAffordance::new(url("https://app.my-coach-finder.com/"));

    let first = {
        let bridge = bridge.clone();
        let affordance = affordance.clone();
        tokio::spawn(async move { bridge.sign_in(&affordance).await })
    };
    exchange.entered.notified().await;
    assert_eq!(bridge.state(), AuthState::BackendExchanging);

    let second = bridge.sign_in(&affordance).await.unwrap();
    assert_eq!(second, SignInOutcome::Ignored);

    exchange.release();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SignInOutcome::SignedIn { .. }));
    assert_eq!(exchange.call_count(), 1);
    assert_eq!(bridge.state(), AuthState::Idle);
}

#[tokio::test]
async fn worker_drops_activations_queued_during_an_attempt() {
    let h = Harness::new();
    let exchange = Arc::new(RecordingExchange::granting("T"));
    let inbox = Arc::new(PageInbox::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = SignInWorker::new(
        h.bridge(Arc::new(ScriptedCapability::returning("id-token")), exchange.clone()),
        rx,
        inbox.clone(),
    );

    let affordance = LoginAffordance::new(url("https://app.my-coach-finder.com/me"));
    tx.send(affordance.clone()).unwrap();
    tx.send(affordance).unwrap();
    drop(tx);
    worker.run().await;

    assert_eq!(exchange.call_count(), 1);
    assert_eq!(
        inbox.take(),
        vec![PageEvent::Redirect(url("https://app.my-coach-finder.com/me"))]
    );
}

#[tokio::test]
async fn sign_out_clears_both_stores() {
    let h = Harness::new();
    let capability = Arc::new(ScriptedCapability::returning("id-token"));
    let bridge = h.bridge(capability.clone(), Arc::new(RecordingExchange::granting("T")));
    let affordance = LoginAffordance::new(url("https://app.my-coach-finder.com/"));

    bridge.sign_in(&affordance).await.unwrap();
    assert_eq!(h.durable.value("auth_token").as_deref(), Some("T"));

    bridge.sign_out().await.unwrap();

    assert!(h.cache.is_empty());
    assert_eq!(h.durable.value("auth_token"), None);
    assert_eq!(h.durable.value("auth_user"), None);
    assert_eq!(capability.sign_outs.load(Ordering::SeqCst), 2);
}
