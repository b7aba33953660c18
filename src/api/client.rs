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


//! Multi-endpoint HTTP client
//!
//! [`FallbackHttpClient`] sends every API call through the ordered candidate
//! list of the [`EndpointResolver`]. Candidates are tried strictly one after
//! another: the first success status wins, a non-success status or a
//! transport error moves on to the next base URL. When the list is exhausted
//! the caller receives [`FetchError::AllEndpointsFailed`] carrying every
//! per-endpoint failure and the last underlying cause.
//!
//! Requests are never raced. Some calls have side effects on the backend
//! (starting an extraction), so at most one backend sees a given request at
//! a time.

use crate::api::endpoints::EndpointResolver;
use crate::api::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{FetchError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single failed attempt against one base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointFailure {
    pub base_url: String,
    pub error: String,
    /// Whether the failure was a connection-level problem
    pub network_class: bool,
}

/// Successful response together with the base URL that produced it
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    pub base_url: String,
    pub response: HttpResponse,
    /// Candidates that failed before `base_url` answered
    pub failures: Vec<EndpointFailure>,
}

impl FallbackResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.response.json()
    }
}

/// API client that walks the endpoint list in order
pub struct FallbackHttpClient {
    resolver: Arc<EndpointResolver>,
    transport: Arc<dyn HttpTransport>,
}

impl FallbackHttpClient {
    pub fn new(resolver: Arc<EndpointResolver>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    pub fn resolver(&self) -> &Arc<EndpointResolver> {
        &self.resolver
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Ordered candidate base URLs
    pub async fn candidates(&self) -> Vec<String> {
        self.resolver.candidate_urls().await
    }

    /// Send a request built per candidate against `base + path`
    ///
    /// `build` receives the absolute URL for the current candidate.
    pub async fn request<F>(&self, path: &str, build: F) -> Result<FallbackResponse>
    where
        F: Fn(String) -> HttpRequest,
    {
        let transport = Arc::clone(&self.transport);
        let (base_url, response, failures) = self
            .try_each(path, |url| {
                let transport = Arc::clone(&transport);
                let request = build(url);
                async move { send_checked(transport.as_ref(), request, path).await }
            })
            .await?;

        Ok(FallbackResponse {
            base_url,
            response,
            failures,
        })
    }

    /// Like [`request`](Self::request), decoding the body as JSON
    ///
    /// A body that does not decode counts as a failure of that candidate
    /// and the next one is tried.
    async fn request_json<T, F>(&self, path: &str, build: F) -> Result<(T, FallbackResponse)>
    where
        T: DeserializeOwned,
        F: Fn(String) -> HttpRequest,
    {
        let transport = Arc::clone(&self.transport);
        let (base_url, (data, response), failures) = self
            .try_each(path, |url| {
                let transport = Arc::clone(&transport);
                let request = build(url);
                async move {
                    let response = send_checked(transport.as_ref(), request, path).await?;
                    let data = response.json::<T>()?;
                    Ok((data, response))
                }
            })
            .await?;

        Ok((
            data,
            FallbackResponse {
                base_url,
                response,
                failures,
            },
        ))
    }

    /// GET `path` with query parameters and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<(T, FallbackResponse)> {
        self.request_json(path, |url| {
            query
                .iter()
                .fold(HttpRequest::get(url), |req, (k, v)| req.with_query(*k, *v))
        })
        .await
    }

    /// POST a JSON body to `path` and decode the JSON response
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<(T, FallbackResponse)> {
        self.request_json(path, |url| HttpRequest::post_json(url, body.clone()))
            .await
    }

    /// Run `op` against each candidate URL (`base + path`) until one succeeds
    ///
    /// Returns the winning base URL, the operation's value and the failures
    /// recorded before it.
    pub async fn try_each<T, F, Fut>(
        &self,
        path: &str,
        mut op: F,
    ) -> Result<(String, T, Vec<EndpointFailure>)>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let candidates = self.candidates().await;
        let mut failures = Vec::with_capacity(candidates.len());
        let mut last_error = None;

        for (index, base_url) in candidates.into_iter().enumerate() {
            let url = format!("{}{}", base_url, path);
            debug!(base_url = %base_url, attempt = index + 1, path, "Trying endpoint");

            match op(url).await {
                Ok(value) => return Ok((base_url, value, failures)),
                Err(e) => {
                    warn!(
                        base_url = %base_url,
                        path,
                        error = %e,
                        "Endpoint failed, trying next"
                    );
                    failures.push(EndpointFailure {
                        base_url,
                        error: e.to_string(),
                        network_class: e.is_network_class(),
                    });
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| FetchError::internal("endpoint list was empty"));
        Err(FetchError::AllEndpointsFailed {
            failures,
            last: Box::new(last),
        })
    }
}

/// Send one request; a non-success status becomes the matching error
async fn send_checked(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    path: &str,
) -> Result<HttpResponse> {
    let response = transport.send(request).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_error(Some(path.to_string())))
    }
}
