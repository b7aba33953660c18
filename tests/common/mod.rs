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


//! In-memory backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mediafetch_core::api::endpoints::{EndpointSource, RemoteEndpointDocument};
use mediafetch_core::api::transport::{HttpRequest, HttpResponse, HttpTransport, StreamResponse};
use mediafetch_core::download::{DownloadConfig, DownloadProgress, DownloadState, ProgressCallback};
use mediafetch_core::{CoreConfig, FetchError, MediaCore, Result};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MIB: usize = 1024 * 1024;

/// Endpoint document with a fixed URL list
pub struct StaticSource(pub Vec<String>);

#[async_trait]
impl EndpointSource for StaticSource {
    async fn fetch(&self) -> Result<RemoteEndpointDocument> {
        Ok(RemoteEndpointDocument {
            api_base_url: None,
            api_base_urls: Some(self.0.clone()),
        })
    }
}

/// What a single media stream request answers with
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// `chunks` chunks of `chunk_size` zero bytes
    Body {
        chunk_size: usize,
        chunks: usize,
        content_length: Option<u64>,
    },
    /// Connection refused before any response
    ConnectError,
    /// Non-success status with a JSON body
    Status(u16, serde_json::Value),
}

impl StreamScript {
    pub fn body(bytes: usize) -> Self {
        StreamScript::Body {
            chunk_size: bytes,
            chunks: 1,
            content_length: Some(bytes as u64),
        }
    }
}

/// Fake backend keyed by host name
pub struct FakeBackend {
    unreachable: HashSet<String>,
    info_unreachable: HashSet<String>,
    info_broken: HashSet<String>,
    filesize: Option<u64>,
    streams: Mutex<VecDeque<StreamScript>>,
    pub sends: Mutex<Vec<String>>,
    pub opens: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(filesize: Option<u64>) -> Self {
        Self {
            unreachable: HashSet::new(),
            info_unreachable: HashSet::new(),
            info_broken: HashSet::new(),
            filesize,
            streams: Mutex::new(VecDeque::new()),
            sends: Mutex::new(Vec::new()),
            opens: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// `/api/video-info` on `host` refuses the connection; streams still work
    pub fn info_unreachable(mut self, host: &str) -> Self {
        self.info_unreachable.insert(host.to_string());
        self
    }

    /// `/api/video-info` on `host` answers 500; streams still work
    pub fn info_broken(mut self, host: &str) -> Self {
        self.info_broken.insert(host.to_string());
        self
    }

    /// Queue stream answers; the last one repeats once the queue drains
    pub fn streams(self, scripts: Vec<StreamScript>) -> Self {
        *self.streams.lock().unwrap() = scripts.into();
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    fn host_of(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn check_reachable(&self, url: &str) -> Result<String> {
        let host = Self::host_of(url);
        if self.unreachable.contains(&host) {
            return Err(FetchError::network_error(
                format!("connect ECONNREFUSED {}", host),
                true,
            ));
        }
        Ok(host)
    }

    fn next_script(&self) -> StreamScript {
        let mut queue = self.streams.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(StreamScript::ConnectError)
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.sends.lock().unwrap().push(request.url.clone());
        let host = self.check_reachable(&request.url)?;
        let is_info = request.url.ends_with("/api/video-info");

        if is_info && self.info_unreachable.contains(&host) {
            return Err(FetchError::network_error(
                format!("connect ETIMEDOUT {}", host),
                true,
            ));
        }
        if is_info && self.info_broken.contains(&host) {
            return Ok(HttpResponse {
                status: 500,
                body: json!({ "error": "extraction failed" }).to_string().into_bytes(),
            });
        }

        let body = if is_info {
            json!({
                "title": "Test Clip",
                "author": "Tester",
                "thumbnail": "https://img.example/t.jpg",
                "duration": 212,
                "filesize": self.filesize.unwrap_or(0),
            })
        } else if request.url.ends_with("/api/search") {
            json!({
                "results": [{
                    "id": "abc",
                    "title": "Test Clip",
                    "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                }]
            })
        } else {
            json!({ "error": "not found" })
        };

        Ok(HttpResponse {
            status: 200,
            body: body.to_string().into_bytes(),
        })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse> {
        self.opens.lock().unwrap().push(request.url.clone());
        self.check_reachable(&request.url)?;

        match self.next_script() {
            StreamScript::ConnectError => Err(FetchError::network_error(
                "socket hang up (ECONNRESET)",
                true,
            )),
            StreamScript::Status(status, body) => Ok(StreamResponse {
                status,
                content_length: None,
                body: stream::iter(vec![Ok(body.to_string().into_bytes())]).boxed(),
            }),
            StreamScript::Body {
                chunk_size,
                chunks,
                content_length,
            } => Ok(StreamResponse {
                status: 200,
                content_length,
                body: stream::iter(0..chunks)
                    .map(move |_| Ok(vec![0u8; chunk_size]))
                    .boxed(),
            }),
        }
    }
}

/// Download settings without waits
pub fn fast_download_config() -> DownloadConfig {
    DownloadConfig::builder()
        .max_retries(3)
        .retry_backoff(Duration::ZERO)
        .settle_delay(Duration::ZERO)
        .ticker_interval(Duration::ZERO)
        .build()
}

pub fn build_core(dir: &Path, backend: Arc<FakeBackend>, urls: &[&str]) -> MediaCore {
    let config = CoreConfig::new(dir).with_download_config(fast_download_config());
    let source = StaticSource(urls.iter().map(|u| u.to_string()).collect());
    MediaCore::with_parts(config, backend, Arc::new(source))
}

/// Collects every progress event
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<DownloadProgress>>>,
}

impl Recorder {
    pub fn callback(&self) -> ProgressCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |progress: DownloadProgress| events.lock().unwrap().push(progress))
    }

    pub fn events(&self) -> Vec<DownloadProgress> {
        self.events.lock().unwrap().clone()
    }

    pub fn fractions(&self) -> Vec<f64> {
        self.events().iter().map(|e| e.fraction).collect()
    }

    pub fn count_state(&self, state: DownloadState) -> usize {
        self.events().iter().filter(|e| e.state == state).count()
    }
}

pub fn assert_monotonic(fractions: &[f64]) {
    for pair in fractions.windows(2) {
        assert!(
            pair[1] >= pair[0],
            "progress went backwards: {} -> {}",
            pair[0],
            pair[1]
        );
    }
}
