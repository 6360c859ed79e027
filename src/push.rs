//! Push-notification registration for the page.
//!
//! The site registers the device with its own backend. The shell only obtains
//! the device token from the native push service and leaves it, together with
//! the device platform, in the page's fast cache where the site looks for it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{Platform, StorageConfig};
use crate::error::PushError;
use crate::secret::Secret;
use crate::session::FastCache;

/// Whether the user lets the app receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPermission {
    Granted,
    Denied,
    /// Not decided yet; asking will show the system prompt
    Prompt,
}

/// OS push-notification service.
///
/// `request` is user-paced when it shows the system prompt.
#[async_trait]
pub trait PushCapability: Send + Sync {
    async fn permission(&self) -> Result<PushPermission, PushError>;

    async fn request(&self) -> Result<PushPermission, PushError>;

    /// Registers the device and returns its push token.
    async fn register(&self) -> Result<Secret<String>, PushError>;
}

/// How a registration attempt ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The token and platform are in the fast cache
    Registered,
    /// Permission was not granted; nothing was registered
    Declined,
}

/// Delivers the device push token into the page's fast cache.
pub struct PushBridge {
    capability: Arc<dyn PushCapability>,
    cache: Arc<FastCache>,
    token_key: String,
    platform_key: String,
    device_platform: &'static str,
}

impl fmt::Debug for PushBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushBridge")
            .field("token_key", &self.token_key)
            .field("device_platform", &self.device_platform)
            .finish_non_exhaustive()
    }
}

impl PushBridge {
    pub fn new(
        capability: Arc<dyn PushCapability>,
        cache: Arc<FastCache>,
        keys: &StorageConfig,
        platform: Platform,
    ) -> Self {
        Self {
            capability,
            cache,
            token_key: keys.push_token_key.clone(),
            platform_key: keys.device_platform_key.clone(),
            device_platform: platform.device_platform(),
        }
    }

    /// Asks for permission if it is not granted yet, registers, and writes
    /// the token and device platform into the fast cache.
    ///
    /// A refused permission is [`PushOutcome::Declined`], not an error. The
    /// cache is only written once a non-empty token is in hand.
    pub async fn register(&self) -> Result<PushOutcome, PushError> {
        let mut permission = self.capability.permission().await?;
        debug!(?permission, "push permission checked");

        if permission != PushPermission::Granted {
            permission = self.capability.request().await?;
            debug!(?permission, "push permission requested");
        }
        if permission != PushPermission::Granted {
            info!("push notifications declined");
            return Ok(PushOutcome::Declined);
        }

        let token = self.capability.register().await?;
        if token.is_blank() {
            return Err(PushError::Registration("push service returned an empty token".to_string()));
        }

        self.cache.set(&self.token_key, token.expose_secret());
        self.cache.set(&self.platform_key, self.device_platform);
        info!(platform = self.device_platform, "push token stored for the page");
        Ok(PushOutcome::Registered)
    }
}
