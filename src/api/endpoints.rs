// MediaFetch - Resilient Media Download Core for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Remote endpoint configuration
//!
//! The app ships without a fixed backend address. At startup (and whenever the
//! app returns to the foreground) it downloads a small JSON document naming the
//! API base URLs currently in service:
//!
//! ```json
//! { "apiBaseUrls": ["https://a.example", "https://b.example"] }
//! { "apiBaseUrl": "https://a.example" }
//! ```
//!
//! [`EndpointResolver`] caches the parsed list for the process lifetime and
//! never fails: an unreachable or malformed document degrades to a hardcoded
//! two-entry fallback list.
//!
//! # Concurrency
//! The cache lives behind a `tokio::sync::Mutex` that stays locked for the
//! duration of a fetch, so callers arriving mid-fetch wait for that fetch and
//! then read its result instead of issuing their own request.

use crate::api::transport::{HttpRequest, HttpTransport};
use crate::error::{FetchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Preferred local backend (Android emulator host loopback)
pub const FALLBACK_LOCAL_URL: &str = "http://10.0.2.2:3000";

/// Stable production backend, last resort
pub const FALLBACK_PRODUCTION_URL: &str = "https://api.mediafetch.app";

/// Where the endpoint list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSourceKind {
    Remote,
    Fallback,
}

/// Ordered, non-empty list of candidate API base URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub primary_urls: Vec<String>,
    pub source: EndpointSourceKind,
    pub fetched_at: DateTime<Utc>,
}

impl EndpointConfig {
    /// Hardcoded configuration used when the remote document is unusable
    pub fn fallback(fetched_at: DateTime<Utc>) -> Self {
        Self {
            primary_urls: vec![
                FALLBACK_LOCAL_URL.to_string(),
                FALLBACK_PRODUCTION_URL.to_string(),
            ],
            source: EndpointSourceKind::Fallback,
            fetched_at,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == EndpointSourceKind::Fallback
    }
}

/// Shape of the remote configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEndpointDocument {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub api_base_urls: Option<Vec<String>>,
}

impl RemoteEndpointDocument {
    /// Validate and normalize the document into an ordered URL list
    ///
    /// `apiBaseUrls` entries come first, then `apiBaseUrl`. Blank and
    /// non-http(s) entries are dropped, trailing slashes trimmed and
    /// duplicates removed (first occurrence wins).
    pub fn into_urls(self) -> Result<Vec<String>> {
        if self.api_base_url.is_none() && self.api_base_urls.is_none() {
            return Err(FetchError::InvalidEndpointConfig(
                "document has neither apiBaseUrl nor apiBaseUrls".to_string(),
            ));
        }

        let mut urls: Vec<String> = Vec::new();
        let candidates = self
            .api_base_urls
            .unwrap_or_default()
            .into_iter()
            .chain(self.api_base_url);

        for candidate in candidates {
            if let Some(normalized) = normalize_base_url(&candidate) {
                if !urls.contains(&normalized) {
                    urls.push(normalized);
                }
            } else {
                debug!(url = %candidate, "Ignoring unusable base URL");
            }
        }

        if urls.is_empty() {
            return Err(FetchError::InvalidEndpointConfig(
                "document contains no usable base URL".to_string(),
            ));
        }

        Ok(urls)
    }
}

/// Normalize a base URL, returning `None` if it is not an http(s) URL
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = url::Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    Some(trimmed.trim_end_matches('/').to_string())
}

/// Source of the remote configuration document
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn fetch(&self) -> Result<RemoteEndpointDocument>;
}

/// Fetches the configuration document over HTTP
pub struct RemoteEndpointSource {
    config_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl RemoteEndpointSource {
    pub fn new<S: Into<String>>(config_url: S, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config_url: config_url.into(),
            transport,
        }
    }
}

#[async_trait]
impl EndpointSource for RemoteEndpointSource {
    async fn fetch(&self) -> Result<RemoteEndpointDocument> {
        let response = self
            .transport
            .send(HttpRequest::get(self.config_url.clone()))
            .await
            .map_err(|e| FetchError::ConfigUnavailable(e.to_string()))?;

        if !response.is_success() {
            return Err(FetchError::ConfigUnavailable(format!(
                "config document returned HTTP {}",
                response.status
            )));
        }

        response
            .json()
            .map_err(|e| FetchError::InvalidEndpointConfig(e.to_string()))
    }
}

/// Clock used to timestamp fetched configurations
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Process-scoped cache of the endpoint configuration
///
/// Constructed once at startup and shared by reference with the HTTP client
/// and the download orchestrator.
pub struct EndpointResolver {
    source: Arc<dyn EndpointSource>,
    clock: Clock,
    cache: Mutex<Option<EndpointConfig>>,
}

impl EndpointResolver {
    pub fn new(source: Arc<dyn EndpointSource>) -> Self {
        Self::with_clock(source, Arc::new(Utc::now))
    }

    pub fn with_clock(source: Arc<dyn EndpointSource>, clock: Clock) -> Self {
        Self {
            source,
            clock,
            cache: Mutex::new(None),
        }
    }

    /// Get the cached configuration, fetching it on first use
    ///
    /// Never fails; see [`EndpointConfig::fallback`].
    pub async fn get_endpoints(&self) -> EndpointConfig {
        let mut cache = self.cache.lock().await;
        if let Some(ref config) = *cache {
            return config.clone();
        }

        let config = self.load().await;
        *cache = Some(config.clone());
        config
    }

    /// Discard the cache and fetch the document again
    ///
    /// Called when the app regains the foreground, since the document can
    /// change without an app update.
    pub async fn refresh(&self) -> EndpointConfig {
        let mut cache = self.cache.lock().await;
        cache.take();

        let config = self.load().await;
        *cache = Some(config.clone());
        config
    }

    /// Ordered candidate list (convenience for callers that only need URLs)
    pub async fn candidate_urls(&self) -> Vec<String> {
        self.get_endpoints().await.primary_urls
    }

    async fn load(&self) -> EndpointConfig {
        let fetched = match self.source.fetch().await {
            Ok(document) => document.into_urls(),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(urls) => {
                info!(count = urls.len(), "Loaded remote endpoint configuration");
                EndpointConfig {
                    primary_urls: urls,
                    source: EndpointSourceKind::Remote,
                    fetched_at: (self.clock)(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Endpoint configuration unavailable, using fallback list");
                EndpointConfig::fallback((self.clock)())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        documents: std::sync::Mutex<Vec<Result<RemoteEndpointDocument>>>,
        delay: Duration,
    }

    impl CountingSource {
        fn new(documents: Vec<Result<RemoteEndpointDocument>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                documents: std::sync::Mutex::new(documents),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl EndpointSource for CountingSource {
        async fn fetch(&self) -> Result<RemoteEndpointDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut docs = self.documents.lock().unwrap();
            if docs.is_empty() {
                Err(FetchError::ConfigUnavailable("no more documents".into()))
            } else {
                docs.remove(0)
            }
        }
    }

    fn doc_list(urls: &[&str]) -> RemoteEndpointDocument {
        RemoteEndpointDocument {
            api_base_url: None,
            api_base_urls: Some(urls.iter().map(|u| u.to_string()).collect()),
        }
    }

    #[test]
    fn test_document_normalization() {
        let doc = RemoteEndpointDocument {
            api_base_url: Some("https://b.example/".into()),
            api_base_urls: Some(vec![
                "https://a.example/".into(),
                "  ".into(),
                "ftp://nope.example".into(),
                "https://a.example".into(),
            ]),
        };

        assert_eq!(
            doc.into_urls().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_document_single_url() {
        let doc: RemoteEndpointDocument =
            serde_json::from_str(r#"{"apiBaseUrl":"http://good.example"}"#).unwrap();
        assert_eq!(doc.into_urls().unwrap(), vec!["http://good.example".to_string()]);
    }

    #[test]
    fn test_document_without_url_fields_is_invalid() {
        let doc: RemoteEndpointDocument = serde_json::from_str(r#"{"other":1}"#).unwrap();
        assert!(matches!(
            doc.into_urls(),
            Err(FetchError::InvalidEndpointConfig(_))
        ));

        let empty = doc_list(&["not a url"]);
        assert!(empty.into_urls().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_document_uses_fallback() {
        let source = Arc::new(CountingSource::new(vec![Err(FetchError::ConfigUnavailable(
            "dns failure".into(),
        ))]));
        let resolver = EndpointResolver::new(source);

        let config = resolver.get_endpoints().await;
        assert!(config.is_fallback());
        assert_eq!(
            config.primary_urls,
            vec![FALLBACK_LOCAL_URL.to_string(), FALLBACK_PRODUCTION_URL.to_string()]
        );
    }

    #[tokio::test]
    async fn test_cached_after_first_fetch() {
        let source = Arc::new(CountingSource::new(vec![Ok(doc_list(&["https://a.example"]))]));
        let resolver = EndpointResolver::new(source.clone());

        let first = resolver.get_endpoints().await;
        let second = resolver.get_endpoints().await;

        assert_eq!(first.primary_urls, second.primary_urls);
        assert_eq!(first.source, EndpointSourceKind::Remote);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let mut source = CountingSource::new(vec![Ok(doc_list(&["https://a.example"]))]);
        source.delay = Duration::from_millis(50);
        let source = Arc::new(source);
        let resolver = Arc::new(EndpointResolver::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.get_endpoints().await })
            })
            .collect();

        for handle in handles {
            let config = handle.await.unwrap();
            assert_eq!(config.primary_urls, vec!["https://a.example".to_string()]);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let source = Arc::new(CountingSource::new(vec![
            Ok(doc_list(&["https://old.example"])),
            Ok(doc_list(&["https://new.example"])),
        ]));
        let fixed = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let resolver = EndpointResolver::with_clock(source.clone(), Arc::new(move || fixed));

        assert_eq!(resolver.candidate_urls().await, vec!["https://old.example".to_string()]);
        let refreshed = resolver.refresh().await;
        assert_eq!(refreshed.primary_urls, vec!["https://new.example".to_string()]);
        assert_eq!(refreshed.fetched_at, fixed);
        assert_eq!(resolver.candidate_urls().await, vec!["https://new.example".to_string()]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
