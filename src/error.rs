use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the shell bridge.
///
/// Most components fail open (malformed URLs pass through, storage errors read
/// as "no session"), so only configuration and sign-in failures reach callers.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A sign-in attempt failed
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Durable storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Push registration failed
    #[error(transparent)]
    Push(#[from] PushError),
}

/// Failure to load or validate a [`ShellConfig`](crate::ShellConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("failed to read config file {path}: {message}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        message: String,
    },
    /// The file is not valid TOML for the config schema
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },
    /// The configured home origin is not an absolute http(s) URL
    #[error("home origin '{0}' is not an absolute http(s) URL")]
    InvalidHomeOrigin(String),
    /// The home domain is empty or does not cover the home origin's host
    #[error("home domain '{domain}' does not cover home origin host '{host}'")]
    DomainMismatch {
        /// Configured home domain
        domain: String,
        /// Host of the configured home origin
        host: String,
    },
}

/// Failure of the durable key/value store.
///
/// Never propagated out of [`SessionStore`](crate::SessionStore): it is logged
/// and treated as absence.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store is not reachable
    #[error("durable storage unavailable: {0}")]
    Unavailable(String),
    /// Reading or writing the backing file failed
    #[error("durable storage I/O failed: {0}")]
    Io(String),
    /// The backing file holds data that cannot be decoded
    #[error("durable storage is corrupt: {0}")]
    Corrupt(String),
}

/// Failure reported by the native sign-in capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The native bridge is not ready (plugin missing, no presenting view)
    #[error("native sign-in is unavailable: {0}")]
    Unavailable(String),
    /// The provider SDK reported an error
    #[error("native sign-in failed: {0}")]
    Failed(String),
}

/// Failure reported by the native push-notification capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The push plugin is not present in this build
    #[error("push notifications are unavailable: {0}")]
    Unavailable(String),
    /// Registration with the push service failed
    #[error("push registration failed: {0}")]
    Registration(String),
}

/// Failure of the backend token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Textual response body
        body: String,
    },
    /// The request never produced a response
    #[error("backend request failed: {0}")]
    Network(String),
    /// The success body could not be decoded
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

/// Terminal failure of a single sign-in attempt.
///
/// User cancellation is not an error; it is reported as
/// [`SignInOutcome::Cancelled`](crate::SignInOutcome::Cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The native capability failed or is not available
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// The backend exchange failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    /// The backend exchange did not complete in time
    #[error("backend exchange timed out after {0:?}")]
    Timeout(Duration),
}

impl AuthError {
    /// Message shown to the user when the attempt is surfaced.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Exchange(ExchangeError::Status { body, .. }) => {
                format!("Login failed: {}", body)
            }
            other => format!("Login error: {}", other),
        }
    }
}
