// Relay configuration.
//
// Fixed protocol constants (upstream endpoints, impersonated client
// identity, default provider/model pair) plus the environment-driven
// parts: the upstream bearer token, an optional chat-call timeout, and
// URL overrides used by tests and staging deployments.

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONNECTION, CONTENT_TYPE,
    HOST, USER_AGENT,
};

/// Upstream chat-completions endpoint.
pub const UPSTREAM_CHAT_URL: &str = "https://backend.raycast.com/api/v1/ai/chat_completions";

/// Upstream model-listing endpoint.
pub const UPSTREAM_MODELS_URL: &str = "https://backend.raycast.com/api/v1/ai/models";

/// Host header sent on every upstream call.
pub const UPSTREAM_HOST: &str = "backend.raycast.com";

/// The upstream only answers requests that look like they come from the
/// desktop client, so every call carries its user-agent string.
pub const IMPERSONATED_USER_AGENT: &str =
    "Raycast/1.96.3 (macOS Version 15.5 (Build 24F5068b))";

/// Provider half of the fallback pair used when a model id cannot be resolved.
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Model half of the fallback pair used when a model id cannot be resolved.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-latest";

/// How long a fetched model directory stays fresh.
pub const MODEL_CACHE_TTL_SECS: i64 = 6 * 60 * 60;

/// Bounded timeout for the model-listing fetch.
pub const MODEL_FETCH_TIMEOUT_SECS: u64 = 10;

/// All errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: RAYCAST_BEARER_TOKEN")]
    MissingBearerToken,

    #[error("bearer token is not a valid header value")]
    InvalidBearerToken,
}

/// Runtime configuration, constructed once at startup and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream chat-completions URL. Overridable for tests.
    pub chat_url: String,
    /// Upstream model-listing URL. Overridable for tests.
    pub models_url: String,
    /// Optional timeout for the chat call, in milliseconds. Unset means the
    /// transport defaults apply.
    pub chat_timeout_ms: Option<u64>,
    headers: HeaderMap,
}

impl Config {
    /// Build a config with the fixed upstream endpoints and the given token.
    ///
    /// The upstream header set is validated here so the request path never
    /// has to deal with header construction failures.
    pub fn new(bearer_token: impl AsRef<str>) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static(UPSTREAM_HOST));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(IMPERSONATED_USER_AGENT));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer_token.as_ref()))
                .map_err(|_| ConfigError::InvalidBearerToken)?,
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        Ok(Self {
            chat_url: UPSTREAM_CHAT_URL.to_string(),
            models_url: UPSTREAM_MODELS_URL.to_string(),
            chat_timeout_ms: None,
            headers,
        })
    }

    /// Load configuration from the environment.
    ///
    /// `RAYCAST_BEARER_TOKEN` is required. `RAYRELAY_CHAT_URL`,
    /// `RAYRELAY_MODELS_URL` and `RAYRELAY_TIMEOUT_MS` are optional
    /// overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("RAYCAST_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingBearerToken)?;

        let mut config = Self::new(token)?;
        if let Ok(url) = std::env::var("RAYRELAY_CHAT_URL") {
            config.chat_url = url;
        }
        if let Ok(url) = std::env::var("RAYRELAY_MODELS_URL") {
            config.models_url = url;
        }
        if let Ok(ms) = std::env::var("RAYRELAY_TIMEOUT_MS") {
            config.chat_timeout_ms = ms.parse().ok();
        }
        Ok(config)
    }

    /// The fixed header set sent on every upstream call.
    pub fn upstream_headers(&self) -> HeaderMap {
        self.headers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_fixed_header_set() {
        let config = Config::new("secret-token").unwrap();
        let headers = config.upstream_headers();

        assert_eq!(headers.get(HOST).unwrap(), UPSTREAM_HOST);
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(USER_AGENT).unwrap(), IMPERSONATED_USER_AGENT);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret-token");
        assert_eq!(headers.get(CONNECTION).unwrap(), "close");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn new_defaults_to_fixed_upstream_urls() {
        let config = Config::new("t").unwrap();
        assert_eq!(config.chat_url, UPSTREAM_CHAT_URL);
        assert_eq!(config.models_url, UPSTREAM_MODELS_URL);
        assert_eq!(config.chat_timeout_ms, None);
    }

    #[test]
    fn new_rejects_token_with_control_characters() {
        let err = Config::new("bad\ntoken").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBearerToken));
    }
}
