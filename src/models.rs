// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

//! Model directory cache.
//!
//! The upstream's model listing maps caller-visible model ids to the
//! provider/model pair the chat endpoint wants. The listing changes
//! rarely, so it is cached with a TTL; a failed refresh degrades to the
//! stale directory, or to a synthesized single-entry default when no
//! fetch has ever succeeded. Fetch errors are logged, never surfaced to
//! the request that triggered them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::{
    Config, DEFAULT_MODEL, DEFAULT_PROVIDER, MODEL_CACHE_TTL_SECS, MODEL_FETCH_TIMEOUT_SECS,
};

/// One upstream model-listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    pub model: String,
    pub provider: String,
}

/// An immutable snapshot of the model directory. Refreshes build a new
/// snapshot and swap it in wholesale; readers keep whatever `Arc` they
/// hold.
#[derive(Debug, Clone)]
pub struct ModelDirectory {
    pub models: HashMap<String, ModelEntry>,
    pub expires_at: DateTime<Utc>,
}

impl ModelDirectory {
    /// An empty, already-expired directory. The cache starts here.
    fn empty() -> Self {
        Self::with_models(HashMap::new())
    }

    /// A directory holding the given entries, already expired.
    pub fn with_models(models: HashMap<String, ModelEntry>) -> Self {
        Self {
            models,
            expires_at: Utc::now(),
        }
    }

    fn fresh(models: HashMap<String, ModelEntry>, ttl: Duration) -> Self {
        Self {
            models,
            expires_at: Utc::now() + ttl,
        }
    }

    /// The fallback directory used when no fetch has ever succeeded:
    /// a single entry for the default provider/model pair.
    fn default_only() -> Self {
        let mut models = HashMap::new();
        models.insert(
            DEFAULT_MODEL.to_string(),
            ModelEntry {
                model: DEFAULT_MODEL.to_string(),
                provider: DEFAULT_PROVIDER.to_string(),
            },
        );
        Self::with_models(models)
    }
}

/// All errors the model fetch can produce.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("error fetching models: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model listing returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from model listing endpoint")]
    Empty,

    #[error("error parsing model listing: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fetches the upstream model listing. The trait exists so the cache can
/// be tested without a network.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch(&self) -> Result<HashMap<String, ModelEntry>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct UpstreamModelListing {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

/// Real fetcher: GET on the model-listing endpoint with the fixed
/// upstream header set and a bounded timeout.
pub struct HttpModelFetcher {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl HttpModelFetcher {
    pub fn new(client: reqwest::Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ModelFetcher for HttpModelFetcher {
    async fn fetch(&self) -> Result<HashMap<String, ModelEntry>, FetchError> {
        tracing::debug!(url = %self.config.models_url, "fetching model directory");

        let response = self
            .client
            .get(&self.config.models_url)
            .headers(self.config.upstream_headers())
            .timeout(StdDuration::from_secs(MODEL_FETCH_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }

        let listing: UpstreamModelListing = serde_json::from_str(&body)?;
        let mut models = HashMap::with_capacity(listing.models.len());
        for entry in listing.models {
            models.insert(entry.model.clone(), entry);
        }
        tracing::info!(count = models.len(), "fetched model directory");
        Ok(models)
    }
}

/// TTL'd cache over a `ModelFetcher`.
///
/// Concurrent cold misses may each trigger a fetch; the write section is
/// only the snapshot swap, so the last fetch to finish wins.
pub struct ModelCache {
    directory: RwLock<Arc<ModelDirectory>>,
    fetcher: Arc<dyn ModelFetcher>,
    ttl: Duration,
}

impl ModelCache {
    pub fn new(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self::with_ttl(fetcher, Duration::seconds(MODEL_CACHE_TTL_SECS))
    }

    pub fn with_ttl(fetcher: Arc<dyn ModelFetcher>, ttl: Duration) -> Self {
        Self {
            directory: RwLock::new(Arc::new(ModelDirectory::empty())),
            fetcher,
            ttl,
        }
    }

    /// The current directory: the cached snapshot while fresh and
    /// non-empty, a refreshed one otherwise. Never fails; a refresh error
    /// falls back to the stale snapshot, or to the default directory when
    /// nothing was ever fetched.
    pub async fn get(&self) -> Arc<ModelDirectory> {
        {
            let current = self.directory.read().await;
            if Utc::now() < current.expires_at && !current.models.is_empty() {
                return Arc::clone(&current);
            }
        }

        match self.refresh().await {
            Ok(directory) => directory,
            Err(err) => {
                tracing::warn!(error = %err, "model fetch failed, serving fallback");
                let current = self.directory.read().await;
                if !current.models.is_empty() {
                    return Arc::clone(&current);
                }
                Arc::new(ModelDirectory::default_only())
            }
        }
    }

    /// Resolve a caller-visible model id to the upstream provider/model
    /// pair, falling back to the fixed default pair for unknown ids.
    pub async fn resolve(&self, model_id: &str) -> (String, String) {
        let directory = self.get().await;
        match directory.models.get(model_id) {
            Some(entry) => (entry.provider.clone(), entry.model.clone()),
            None => (DEFAULT_PROVIDER.to_string(), DEFAULT_MODEL.to_string()),
        }
    }

    /// Expire the snapshot, then refetch. Returns the entry count of the
    /// directory that is current afterwards.
    pub async fn force_refresh(&self) -> usize {
        {
            let mut slot = self.directory.write().await;
            let mut expired = (**slot).clone();
            expired.expires_at = Utc::now();
            *slot = Arc::new(expired);
        }
        self.get().await.models.len()
    }

    async fn refresh(&self) -> Result<Arc<ModelDirectory>, FetchError> {
        let models = self.fetcher.fetch().await?;
        let directory = Arc::new(ModelDirectory::fresh(models, self.ttl));
        let mut slot = self.directory.write().await;
        *slot = Arc::clone(&directory);
        tracing::info!(
            count = directory.models.len(),
            expires_at = %directory.expires_at,
            "model directory cache updated"
        );
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fetcher that replays a scripted sequence of results and counts
    /// calls.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        results: Mutex<VecDeque<Result<HashMap<String, ModelEntry>, FetchError>>>,
    }

    impl ScriptedFetcher {
        fn new(
            results: Vec<Result<HashMap<String, ModelEntry>, FetchError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                results: Mutex::new(results.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelFetcher for ScriptedFetcher {
        async fn fetch(&self) -> Result<HashMap<String, ModelEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Empty))
        }
    }

    fn one_entry(id: &str, provider: &str) -> HashMap<String, ModelEntry> {
        let mut models = HashMap::new();
        models.insert(
            id.to_string(),
            ModelEntry {
                model: id.to_string(),
                provider: provider.to_string(),
            },
        );
        models
    }

    #[tokio::test]
    async fn get_within_ttl_hits_cache() {
        let fetcher = ScriptedFetcher::new(vec![Ok(one_entry("gpt-4o", "openai"))]);
        let cache = ModelCache::new(Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

        let first = cache.get().await;
        let second = cache.get().await;

        assert_eq!(fetcher.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn fetch_failure_serves_stale_directory() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(one_entry("gpt-4o", "openai")),
            Err(FetchError::Empty),
        ]);
        let cache = ModelCache::with_ttl(
            Arc::clone(&fetcher) as Arc<dyn ModelFetcher>,
            Duration::seconds(0),
        );

        let first = cache.get().await;
        let second = cache.get().await;

        assert_eq!(fetcher.calls(), 2);
        assert!(second.models.contains_key("gpt-4o"));
        assert_eq!(first.models.len(), second.models.len());
    }

    #[tokio::test]
    async fn cold_fetch_failure_synthesizes_default_directory() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Empty)]);
        let cache = ModelCache::new(Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

        let directory = cache.get().await;
        assert_eq!(directory.models.len(), 1);
        let entry = directory.models.get(DEFAULT_MODEL).unwrap();
        assert_eq!(entry.provider, DEFAULT_PROVIDER);
    }

    #[tokio::test]
    async fn resolve_known_and_unknown_ids() {
        let fetcher = ScriptedFetcher::new(vec![Ok(one_entry("gpt-4o", "openai"))]);
        let cache = ModelCache::new(Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

        assert_eq!(
            cache.resolve("gpt-4o").await,
            ("openai".to_string(), "gpt-4o".to_string())
        );
        assert_eq!(
            cache.resolve("no-such-model").await,
            (DEFAULT_PROVIDER.to_string(), DEFAULT_MODEL.to_string())
        );
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn force_refresh_refetches_within_ttl() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(one_entry("gpt-4o", "openai")),
            Ok(one_entry("o3", "openai")),
        ]);
        let cache = ModelCache::new(Arc::clone(&fetcher) as Arc<dyn ModelFetcher>);

        cache.get().await;
        let count = cache.force_refresh().await;

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(count, 1);
        assert!(cache.get().await.models.contains_key("o3"));
    }

    #[tokio::test]
    async fn http_fetcher_sends_impersonated_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/ai/models"))
            .and(header("authorization", "Bearer test-token"))
            .and(header(
                "user-agent",
                crate::config::IMPERSONATED_USER_AGENT,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"model": "gpt-4o", "provider": "openai"},
                    {"model": "claude-3-7-sonnet-latest", "provider": "anthropic"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::new("test-token").unwrap();
        config.models_url = format!("{}/api/v1/ai/models", server.uri());
        let fetcher = HttpModelFetcher::new(reqwest::Client::new(), Arc::new(config));

        let models = fetcher.fetch().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models.get("gpt-4o").unwrap().provider, "openai");
    }

    #[tokio::test]
    async fn http_fetcher_reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let mut config = Config::new("t").unwrap();
        config.models_url = server.uri();
        let fetcher = HttpModelFetcher::new(reqwest::Client::new(), Arc::new(config));

        match fetcher.fetch().await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_fetcher_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let mut config = Config::new("t").unwrap();
        config.models_url = server.uri();
        let fetcher = HttpModelFetcher::new(reqwest::Client::new(), Arc::new(config));

        assert!(matches!(fetcher.fetch().await, Err(FetchError::Empty)));
    }
}
