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


//! HTTP transport abstraction
//!
//! Every network call of the core goes through [`HttpTransport`]: the endpoint
//! resolver, the fallback client and the chunked media transfer. Production
//! code uses [`ReqwestTransport`]; tests substitute in-memory transports.
//!
//! # Configuration
//! [`ClientConfig`] carries timeout and user agent for the underlying
//! `reqwest::Client`. Streaming requests are built without a total timeout
//! because the download orchestrator applies its own wall-clock limit.

use crate::error::{FetchError, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Default request timeout in seconds for JSON API calls
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum bytes of an error body kept for diagnostics
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

/// Configuration for the HTTP transport
/// Provides a builder pattern for client customization
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: format!("MediaFetch/{} (mediafetch-core)", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// HTTP method subset used by the API surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single outbound request against an absolute URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub json_body: Option<Value>,
}

impl HttpRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json<S: Into<String>>(url: S, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            json_body: Some(body),
        }
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Fully buffered response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::InvalidApiResponse {
            message: format!("Parse error: {} at col {}", e, e.column()),
            response_body: Some(body_snippet(&self.body)),
        })
    }

    /// Server-provided error message (`{error}` or `{message}`), if any
    pub fn error_message(&self) -> Option<String> {
        extract_server_message(&self.body)
    }

    /// Convert a non-success response into the matching error
    ///
    /// A server-provided message yields `ServerRejected` (passed through to
    /// the user verbatim); anything else becomes `ApiRequestFailed`.
    pub fn into_error(self, endpoint: Option<String>) -> FetchError {
        match self.error_message() {
            Some(message) => FetchError::server_rejected(self.status, message, endpoint),
            None => FetchError::api_failed(
                format!("HTTP {}", self.status),
                Some(self.status),
                endpoint,
            ),
        }
    }
}

/// Chunk stream of a streaming response
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Streaming response: status and headers are available before the body
pub struct StreamResponse {
    pub status: u16,
    /// Content-Length header, if the server sent one
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain a (non-success) body into memory, keeping at most a few KiB
    pub async fn read_error_body(mut self) -> HttpResponse {
        let mut body = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(bytes) => {
                    body.extend_from_slice(&bytes);
                    if body.len() >= MAX_ERROR_BODY_BYTES {
                        body.truncate(MAX_ERROR_BODY_BYTES);
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        HttpResponse {
            status: self.status,
            body,
        }
    }
}

/// Transport seam for all HTTP traffic of the core
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer the whole response body
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Send a request and return the body as a chunk stream
    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse>;
}

/// Pull `error` or `message` out of a JSON error body
pub fn extract_server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
}

fn body_snippet(body: &[u8]) -> String {
    let end = body.len().min(800);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// reqwest-backed transport used in production
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    /// Client for buffered API calls (with total timeout)
    client: Client,
    /// Client for media streams (connect timeout only)
    stream_client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::InvalidInput(format!("Invalid user agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(headers.clone())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let stream_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            stream_client,
        })
    }

    fn build(client: &Client, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.json_body {
            builder = builder.json(body);
        }
        builder
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = Self::build(&self.client, &request).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse> {
        let response = Self::build(&self.stream_client, &request).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length().filter(|len| *len > 0);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(FetchError::from))
            .boxed();

        Ok(StreamResponse {
            status,
            content_length,
            body,
        })
    }
}
