//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use url::Url;

use shell_bridge::{
    AuthBridge, AuthResult, CapabilityError, DurableStore, ExchangeError, FastCache, LoginAffordance,
    MemoryStore, NavigationInterceptor, Navigator, PushCapability, PushError, PushPermission,
    Secret, Session, SessionStore, ShellConfig, SignInCapability, SignInResponse, StorageError,
    TokenExchange,
};

pub const HOME: &str = "https://app.my-coach-finder.com/";

/// Native capability that plays back queued responses.
#[derive(Default)]
pub struct ScriptedCapability {
    responses: Mutex<Vec<Result<SignInResponse, CapabilityError>>>,
    pub sign_ins: AtomicUsize,
    pub sign_outs: AtomicUsize,
}

impl ScriptedCapability {
    pub fn returning(token: &str) -> Self {
        let capability = Self::default();
        capability.push(Ok(SignInResponse::Authorized(
            AuthResult::new(Secret::new(token.to_string()))
                .with_email("coach@example.com")
                .with_display_name("Sam Coach"),
        )));
        capability
    }

    pub fn cancelling() -> Self {
        let capability = Self::default();
        capability.push(Ok(SignInResponse::Cancelled));
        capability
    }

    pub fn push(&self, response: Result<SignInResponse, CapabilityError>) {
        self.responses.lock().unwrap().insert(0, response);
    }
}

#[async_trait]
impl SignInCapability for ScriptedCapability {
    async fn sign_in(&self) -> Result<SignInResponse, CapabilityError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Ok(SignInResponse::Cancelled))
    }

    async fn sign_out(&self) -> Result<(), CapabilityError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend that answers `{access_token, user}` and counts calls.
///
/// With a gate set, each exchange waits for `release()` after signalling
/// `entered`, so tests can act while an exchange is in flight.
pub struct RecordingExchange {
    access_token: String,
    failure: Option<ExchangeError>,
    gate: Option<Arc<Notify>>,
    pub entered: Arc<Notify>,
    pub calls: AtomicUsize,
}

impl RecordingExchange {
    pub fn granting(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            failure: None,
            gate: None,
            entered: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ExchangeError) -> Self {
        Self {
            failure: Some(error),
            ..Self::granting("")
        }
    }

    pub fn gated(access_token: &str) -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::granting(access_token)
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for RecordingExchange {
    async fn exchange(&self, _identity_token: &Secret<String>) -> Result<Session, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(Session::new(
            Secret::new(self.access_token.clone()),
            r#"{"email":"coach@example.com","name":"Sam Coach"}"#,
        ))
    }
}

/// Durable store that counts reads and can be switched to fail.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub reads: AtomicUsize,
    pub broken: std::sync::atomic::AtomicBool,
}

impl CountingStore {
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.snapshot().get(key).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("preferences offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.remove(key).await
    }
}

/// Push service whose permission is already granted; hands out numbered tokens.
#[derive(Default)]
pub struct GrantedPush {
    pub registrations: AtomicUsize,
}

#[async_trait]
impl PushCapability for GrantedPush {
    async fn permission(&self) -> Result<PushPermission, PushError> {
        Ok(PushPermission::Granted)
    }

    async fn request(&self) -> Result<PushPermission, PushError> {
        Ok(PushPermission::Granted)
    }

    async fn register(&self) -> Result<Secret<String>, PushError> {
        let n = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Secret::new(format!("device-token-{}", n)))
    }
}

/// One shell's worth of wiring around in-memory collaborators.
pub struct Harness {
    pub config: ShellConfig,
    pub cache: Arc<FastCache>,
    pub durable: Arc<CountingStore>,
    pub sessions: Arc<SessionStore>,
    pub navigator: Arc<Navigator>,
    pub sign_in_tx: mpsc::UnboundedSender<LoginAffordance>,
    pub sign_in_rx: Option<mpsc::UnboundedReceiver<LoginAffordance>>,
}

impl Harness {
    pub fn new() -> Self {
        let config = ShellConfig::default();
        let cache = Arc::new(FastCache::new());
        let durable = Arc::new(CountingStore::default());
        let sessions = Arc::new(SessionStore::new(
            cache.clone(),
            durable.clone(),
            config.storage.clone(),
            home(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let interceptor = NavigationInterceptor::from_config(&config).expect("default config");
        let navigator = Arc::new(Navigator::new(interceptor, tx.clone()));

        Self {
            config,
            cache,
            durable,
            sessions,
            navigator,
            sign_in_tx: tx,
            sign_in_rx: Some(rx),
        }
    }

    pub fn bridge(
        &self,
        capability: Arc<dyn SignInCapability>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Arc<AuthBridge> {
        Arc::new(AuthBridge::new(
            capability,
            exchange,
            self.sessions.clone(),
            self.config.exchange_timeout(),
        ))
    }

    pub fn take_receiver(&mut self) -> mpsc::UnboundedReceiver<LoginAffordance> {
        self.sign_in_rx.take().expect("receiver already taken")
    }
}

pub fn home() -> Url {
    Url::parse(HOME).unwrap()
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}
