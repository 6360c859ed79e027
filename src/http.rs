//! Backend token exchange over HTTP.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenExchange;
use crate::config::ShellConfig;
use crate::error::{ConfigError, ExchangeError};
use crate::rewrite::RequiredParam;
use crate::secret::Secret;
use crate::session::Session;

/// Query parameter carrying the identity token.
pub const ID_TOKEN_PARAM: &str = "id_token";

/// Success body of the exchange endpoint.
///
/// Older backends answer with `token`, newer ones with `access_token`.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

impl ExchangeResponse {
    fn into_session(self) -> Result<Session, ExchangeError> {
        let token = self
            .access_token
            .filter(|t| !t.trim().is_empty())
            .or(self.token.filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| ExchangeError::Decode("response carries no access token".to_string()))?;

        let user = match self.user {
            Some(value) if !value.is_null() => value,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        };
        let profile =
            serde_json::to_string(&user).map_err(|e| ExchangeError::Decode(e.to_string()))?;

        Ok(Session::new(Secret::new(token), profile))
    }
}

/// Decodes a successful exchange body into a [`Session`].
pub fn parse_exchange_body(bytes: &[u8]) -> Result<Session, ExchangeError> {
    serde_json::from_slice::<ExchangeResponse>(bytes)
        .map_err(|e| ExchangeError::Decode(e.to_string()))?
        .into_session()
}

/// Builds the error for a non-success response; the body is kept as text so
/// the user sees what the backend said.
pub fn format_status_error(status: u16, body: &[u8]) -> ExchangeError {
    ExchangeError::Status {
        status,
        body: String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// [`TokenExchange`] against the home backend.
///
/// Posts to `{home_origin}{exchange_path}?os=<platform>&id_token=<token>` once,
/// with no body. The caller bounds the wait.
#[derive(Clone)]
pub struct HttpTokenExchange {
    http: reqwest::Client,
    endpoint: Url,
}

impl fmt::Debug for HttpTokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenExchange")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTokenExchange {
    pub fn new(endpoint: Url, user_agent: &str) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    /// Builds the exchange for the configured home origin.
    ///
    /// The endpoint is a home-domain request like any other and carries the
    /// platform tag. `base_user_agent` is the engine's agent string; the
    /// shell's product token is appended.
    pub fn from_config(config: &ShellConfig, base_user_agent: &str) -> Result<Self, crate::Error> {
        let home = config.home_url()?;
        let endpoint = home
            .join(&config.auth.exchange_path)
            .map_err(|_| ConfigError::InvalidHomeOrigin(config.home_origin.clone()))?;
        let endpoint = RequiredParam::from_config(config).apply_url(&endpoint);
        Self::new(endpoint, &config.user_agent(base_user_agent))
            .map_err(|e| crate::Error::Auth(e.into()))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Request URL for a token. Contains the token; never log it.
    pub fn request_url(&self, identity_token: &Secret<String>) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(ID_TOKEN_PARAM, identity_token.expose_secret());
        url
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, identity_token: &Secret<String>) -> Result<Session, ExchangeError> {
        let response = self
            .http
            .post(self.request_url(identity_token))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Network(e.without_url().to_string()))?;
        debug!(status = status.as_u16(), endpoint = %self.endpoint, "token exchange answered");

        if !status.is_success() {
            warn!(status = status.as_u16(), "token exchange rejected");
            return Err(format_status_error(status.as_u16(), &bytes));
        }
        parse_exchange_body(&bytes)
    }
}
