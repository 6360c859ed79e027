//! Session persistence across page reloads.
//!
//! The session lives in two places: the page's fast cache (what the web
//! content reads) and a durable store that survives reloads and relaunches.
//! Writes go to both; reads prefer the cache and refill it from durable
//! storage. Durable-storage failures are logged and read as "no session".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::secret::Secret;

/// An authenticated session: backend access token plus the user profile JSON.
#[derive(Debug)]
pub struct Session {
    access_token: Secret<String>,
    user_profile: String,
}

impl Session {
    pub fn new(access_token: Secret<String>, user_profile: impl Into<String>) -> Self {
        Self {
            access_token,
            user_profile: user_profile.into(),
        }
    }

    pub fn access_token(&self) -> &Secret<String> {
        &self.access_token
    }

    /// Serialized user profile, as handed to the web content.
    pub fn user_profile(&self) -> &str {
        &self.user_profile
    }

    /// Parses the profile JSON, if it is valid JSON.
    pub fn user_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.user_profile).ok()
    }

    fn from_parts(token: Option<String>, user: Option<String>) -> Option<Self> {
        match (token, user) {
            (Some(token), Some(user)) if !token.trim().is_empty() && !user.is_empty() => {
                Some(Self::new(Secret::new(token), user))
            }
            _ => None,
        }
    }
}

/// In-page, non-durable key/value storage.
///
/// Synchronous, like the page storage it models; a fresh page instance starts
/// with an empty cache.
#[derive(Debug, Default)]
pub struct FastCache {
    entries: Mutex<HashMap<String, String>>,
}

impl FastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cross-reload, cross-launch key/value storage outside the page.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-lifetime [`DurableStore`], for hosts without persistent storage
/// and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Whether a write reached durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Written to the fast cache and acknowledged by durable storage
    Durable,
    /// Only the fast cache holds it; durable storage failed
    CacheOnly,
}

/// Outcome of restoring on a login page.
#[derive(Debug)]
pub enum Restore {
    /// A durable session was found and cached; leave the login page
    AutoLogin {
        /// The restored session
        session: Session,
        /// Where to go (the home root)
        redirect: Url,
    },
    /// Nothing to restore; both stores are now empty
    NoSession,
}

/// Keeps the fast cache and durable storage consistent.
pub struct SessionStore {
    cache: Arc<FastCache>,
    durable: Arc<dyn DurableStore>,
    keys: StorageConfig,
    home_root: Url,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.keys)
            .field("home_root", &self.home_root.as_str())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(
        cache: Arc<FastCache>,
        durable: Arc<dyn DurableStore>,
        keys: StorageConfig,
        home_root: Url,
    ) -> Self {
        Self {
            cache,
            durable,
            keys,
            home_root,
        }
    }

    pub fn cache(&self) -> &Arc<FastCache> {
        &self.cache
    }

    /// Writes the session to the fast cache, then to durable storage.
    ///
    /// The cache write is immediate; the returned future completes once
    /// durable storage has acknowledged (or failed, which is logged).
    pub async fn save(&self, session: &Session) -> Persistence {
        self.write_cache(session);
        debug!("session written to fast cache");

        match self.write_durable(session).await {
            Ok(()) => {
                debug!("session written to durable storage");
                Persistence::Durable
            }
            Err(e) => {
                warn!(error = %e, "durable session write failed; session kept in fast cache only");
                Persistence::CacheOnly
            }
        }
    }

    /// Removes the session from both locations. Never fails.
    pub async fn clear(&self) {
        self.cache.remove(&self.keys.cache_token_key);
        self.cache.remove(&self.keys.cache_user_key);

        for key in [&self.keys.durable_token_key, &self.keys.durable_user_key] {
            if let Err(e) = self.durable.remove(key).await {
                warn!(key = %key, error = %e, "durable session removal failed");
            }
        }
        debug!("session cleared");
    }

    /// Restores the session at the start of a login-page view.
    ///
    /// Durable storage decides, with a single read: a durable session is
    /// copied into the fast cache and the caller should redirect to the home
    /// root. Without one, both locations are cleared so a stale cached token
    /// cannot coexist with the login page.
    pub async fn restore(&self) -> Restore {
        let had_cached = self.read_cache().is_some();

        match self.read_durable().await {
            Some(session) => {
                self.write_cache(&session);
                info!(refilled = !had_cached, "session restored on login page");
                Restore::AutoLogin {
                    session,
                    redirect: self.home_root.clone(),
                }
            }
            None => {
                if had_cached {
                    info!("stale cached session dropped on login page");
                }
                self.clear().await;
                Restore::NoSession
            }
        }
    }

    /// Reads the session: fast cache first, durable storage as fallback.
    ///
    /// A durable hit refills the cache.
    pub async fn lookup(&self) -> Option<Session> {
        if let Some(session) = self.read_cache() {
            return Some(session);
        }

        let session = self.read_durable().await?;
        self.write_cache(&session);
        debug!("fast cache refilled from durable storage");
        Some(session)
    }

    /// Copies a session the web content placed in the fast cache into
    /// durable storage. Used on ordinary (non-login) pages.
    ///
    /// Returns `None` when the cache holds no session.
    pub async fn sync(&self) -> Option<Persistence> {
        let session = self.read_cache()?;
        match self.write_durable(&session).await {
            Ok(()) => Some(Persistence::Durable),
            Err(e) => {
                warn!(error = %e, "durable session sync failed");
                Some(Persistence::CacheOnly)
            }
        }
    }

    fn read_cache(&self) -> Option<Session> {
        Session::from_parts(
            self.cache.get(&self.keys.cache_token_key),
            self.cache.get(&self.keys.cache_user_key),
        )
    }

    fn write_cache(&self, session: &Session) {
        self.cache
            .set(&self.keys.cache_token_key, session.access_token().expose_secret());
        self.cache
            .set(&self.keys.cache_user_key, session.user_profile());
    }

    async fn read_durable(&self) -> Option<Session> {
        let token = self.durable_get(&self.keys.durable_token_key).await?;
        let user = self.durable_get(&self.keys.durable_user_key).await?;
        Session::from_parts(Some(token), Some(user))
    }

    async fn durable_get(&self, key: &str) -> Option<String> {
        match self.durable.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "durable session read failed; treating as absent");
                None
            }
        }
    }

    async fn write_durable(&self, session: &Session) -> Result<(), StorageError> {
        self.durable
            .set(
                &self.keys.durable_token_key,
                session.access_token().expose_secret(),
            )
            .await?;
        self.durable
            .set(&self.keys.durable_user_key, session.user_profile())
            .await
    }
}
