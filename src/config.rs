//! Shell configuration.
//!
//! Every field has a default, so an empty TOML document (or a missing file)
//! yields a working configuration for the stock home site.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

/// Top-level configuration for one shell build.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Origin the shell is purpose-built to display, e.g. `https://app.example.com`
    #[serde(default = "default_home_origin")]
    pub home_origin: String,
    /// Registrable domain whose hosts must carry the tag parameter
    #[serde(default = "default_home_domain")]
    pub home_domain: String,
    /// Platform this shell runs on; selects the tag value
    #[serde(default)]
    pub platform: Platform,
    /// Name of the mandatory query parameter
    #[serde(default = "default_tag_param")]
    pub tag_param: String,
    /// Sign-in related paths and rules
    #[serde(default)]
    pub auth: AuthConfig,
    /// Session storage keys
    #[serde(default)]
    pub storage: StorageConfig,
    /// Identity advertised in the user agent
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            home_origin: default_home_origin(),
            home_domain: default_home_domain(),
            platform: Platform::default(),
            tag_param: default_tag_param(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// Platform the shell is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// iOS / iPadOS
    #[default]
    Apple,
    /// Android
    Android,
}

impl Platform {
    /// Value of the tag parameter for this platform.
    pub fn tag(self) -> &'static str {
        match self {
            Platform::Apple => "apple",
            Platform::Android => "android",
        }
    }

    /// Value the site expects under the device-platform storage key.
    pub fn device_platform(self) -> &'static str {
        match self {
            Platform::Apple => "ios",
            Platform::Android => "android",
        }
    }

    /// Label used in the user-agent product token.
    pub fn label(self) -> &'static str {
        match self {
            Platform::Apple => "iOS",
            Platform::Android => "Android",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Path of the federated-login entry point on the home site
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Path of the backend endpoint that trades an identity token for a session
    #[serde(default = "default_exchange_path")]
    pub exchange_path: String,
    /// Paths of pages that show the login form
    #[serde(default = "default_login_pages")]
    pub login_pages: Vec<String>,
    /// `data-provider` attribute value that marks a login affordance
    #[serde(default = "default_marker_provider")]
    pub marker_provider: Option<String>,
    /// CSS classes that mark a login affordance
    #[serde(default)]
    pub marker_classes: Vec<String>,
    /// Identity-provider hosts the embedded surface may never load
    #[serde(default = "default_blocked_hosts")]
    pub blocked_hosts: Vec<String>,
    /// Upper bound for the backend exchange
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            exchange_path: default_exchange_path(),
            login_pages: default_login_pages(),
            marker_provider: default_marker_provider(),
            marker_classes: Vec::new(),
            blocked_hosts: default_blocked_hosts(),
            exchange_timeout_secs: default_exchange_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Fast-cache key of the access token
    #[serde(default = "default_cache_token_key")]
    pub cache_token_key: String,
    /// Fast-cache key of the user profile JSON
    #[serde(default = "default_cache_user_key")]
    pub cache_user_key: String,
    /// Durable key of the access token
    #[serde(default = "default_durable_token_key")]
    pub durable_token_key: String,
    /// Durable key of the user profile JSON
    #[serde(default = "default_durable_user_key")]
    pub durable_user_key: String,
    /// Fast-cache key of the push device token
    #[serde(default = "default_push_token_key")]
    pub push_token_key: String,
    /// Fast-cache key of the device platform name
    #[serde(default = "default_device_platform_key")]
    pub device_platform_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_token_key: default_cache_token_key(),
            cache_user_key: default_cache_user_key(),
            durable_token_key: default_durable_token_key(),
            durable_user_key: default_durable_user_key(),
            push_token_key: default_push_token_key(),
            device_platform_key: default_device_platform_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_app_version(),
        }
    }
}

impl ShellConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ShellConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.home_url()?;
        Ok(config)
    }

    /// Returns the parsed home origin.
    ///
    /// # Errors
    ///
    /// Fails if the origin is not an absolute http(s) URL or if its host is not
    /// covered by `home_domain`.
    pub fn home_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.home_origin)
            .map_err(|_| ConfigError::InvalidHomeOrigin(self.home_origin.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidHomeOrigin(self.home_origin.clone()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidHomeOrigin(self.home_origin.clone()))?;
        if !crate::rewrite::host_in_domain(host, &self.home_domain) {
            return Err(ConfigError::DomainMismatch {
                domain: self.home_domain.clone(),
                host: host.to_string(),
            });
        }
        Ok(url)
    }

    /// Tag value for the configured platform.
    pub fn tag_value(&self) -> &'static str {
        self.platform.tag()
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.exchange_timeout_secs)
    }

    /// Appends the shell's product token to the engine's user agent.
    ///
    /// ```
    /// use shell_bridge::ShellConfig;
    ///
    /// let config = ShellConfig::default();
    /// let ua = config.user_agent("Mozilla/5.0 (iPhone)");
    /// assert!(ua.ends_with("MyCoachFinder-iOS/1.0"));
    /// ```
    pub fn user_agent(&self, base: &str) -> String {
        let token = format!(
            "{}-{}/{}",
            self.identity.app_name,
            self.platform.label(),
            self.identity.version
        );
        if base.contains(&token) {
            return base.to_string();
        }
        format!("{} {}", base.trim_end(), token)
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_home_origin() -> String {
    "https://app.my-coach-finder.com".to_string()
}

fn default_home_domain() -> String {
    "my-coach-finder.com".to_string()
}

fn default_tag_param() -> String {
    "os".to_string()
}

fn default_login_path() -> String {
    "/auth/google/login".to_string()
}

fn default_exchange_path() -> String {
    "/auth/google/native".to_string()
}

fn default_login_pages() -> Vec<String> {
    vec!["/auth/login".to_string(), "/auth/signup".to_string()]
}

fn default_marker_provider() -> Option<String> {
    Some("google".to_string())
}

fn default_blocked_hosts() -> Vec<String> {
    vec!["accounts.google.com".to_string()]
}

fn default_exchange_timeout() -> u64 {
    15
}

fn default_cache_token_key() -> String {
    "token".to_string()
}

fn default_cache_user_key() -> String {
    "user".to_string()
}

fn default_durable_token_key() -> String {
    "auth_token".to_string()
}

fn default_durable_user_key() -> String {
    "auth_user".to_string()
}

fn default_push_token_key() -> String {
    "fcm_token".to_string()
}

fn default_device_platform_key() -> String {
    "device_platform".to_string()
}

fn default_app_name() -> String {
    "MyCoachFinder".to_string()
}

fn default_app_version() -> String {
    "1.0".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads configuration from a TOML file.
///
/// A missing file yields the defaults and a warning, so a shell can start
/// before any configuration has been written.
pub fn load(path: &Path) -> Result<ShellConfig, ConfigError> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(ShellConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let config: ShellConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.home_url()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ShellConfig::from_toml_str("").expect("defaults are valid");

        assert_eq!(config.home_domain, "my-coach-finder.com");
        assert_eq!(config.tag_param, "os");
        assert_eq!(config.tag_value(), "apple");
        assert_eq!(config.auth.login_path, "/auth/google/login");
        assert_eq!(config.storage.durable_token_key, "auth_token");
        assert_eq!(config.exchange_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn platform_selects_tag() {
        let config = ShellConfig::from_toml_str("platform = \"android\"").expect("valid");
        assert_eq!(config.tag_value(), "android");
        assert_eq!(config.platform.label(), "Android");
        assert_eq!(config.platform.device_platform(), "android");
        assert_eq!(Platform::Apple.device_platform(), "ios");
    }

    #[test]
    fn push_keys_default_to_site_names() {
        let config = ShellConfig::from_toml_str("[storage]\npush_token_key = \"device_token\"").expect("valid");

        assert_eq!(config.storage.push_token_key, "device_token");
        assert_eq!(config.storage.device_platform_key, "device_platform");
        assert_eq!(ShellConfig::default().storage.push_token_key, "fcm_token");
    }

    #[test]
    fn nested_sections_override_fields() {
        let toml = r#"
            home_origin = "https://app.example.com"
            home_domain = "example.com"

            [auth]
            login_path = "/sso/start"
            blocked_hosts = []
            exchange_timeout_secs = 5
        "#;
        let config = ShellConfig::from_toml_str(toml).expect("valid");

        assert_eq!(config.auth.login_path, "/sso/start");
        assert!(config.auth.blocked_hosts.is_empty());
        assert_eq!(config.auth.exchange_path, "/auth/google/native");
        assert_eq!(config.exchange_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_origin_outside_home_domain() {
        let toml = r#"
            home_origin = "https://app.other.org"
            home_domain = "example.com"
        "#;
        let err = ShellConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::DomainMismatch { .. }));
    }

    #[test]
    fn rejects_non_http_origin() {
        let err = ShellConfig::from_toml_str("home_origin = \"file:///index.html\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHomeOrigin(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load(Path::new("/nonexistent/shell-bridge.toml")).expect("defaults");
        assert_eq!(config.home_origin, "https://app.my-coach-finder.com");
    }

    #[test]
    fn user_agent_is_appended_once() {
        let config = ShellConfig::default();
        let once = config.user_agent("Mozilla/5.0");
        let twice = config.user_agent(&once);

        assert_eq!(once, "Mozilla/5.0 MyCoachFinder-iOS/1.0");
        assert_eq!(once, twice);
    }
}
