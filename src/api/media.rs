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


//! Typed calls against the media API
//!
//! All calls go through [`FallbackHttpClient`], so they inherit its ordered
//! endpoint fallback. Responses keep the base URL that answered so a
//! following download can stick to the same backend.

use crate::api::client::{EndpointFailure, FallbackHttpClient};
use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const VIDEO_INFO_PATH: &str = "/api/video-info";
pub const SEARCH_PATH: &str = "/api/search";
pub const AUTOCOMPLETE_PATH: &str = "/api/autocomplete";

/// Duration as reported by the backend: seconds or a preformatted string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaDuration {
    Seconds(f64),
    Text(String),
}

/// Response of `POST /api/video-info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<MediaDuration>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl VideoInfo {
    /// Expected size in bytes; `0` means the backend does not know
    pub fn expected_size(&self) -> Option<u64> {
        self.filesize.filter(|size| *size > 0)
    }
}

/// Video info plus the backend that produced it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoResponse {
    pub info: VideoInfo,
    pub base_url: String,
    pub failures: Vec<EndpointFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub duration: Option<MediaDuration>,
}

/// List payloads come either bare or wrapped in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Bare(Vec<T>),
    Results { results: Vec<T> },
    Suggestions { suggestions: Vec<T> },
}

impl<T> ListPayload<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListPayload::Bare(items) => items,
            ListPayload::Results { results } => results,
            ListPayload::Suggestions { suggestions } => suggestions,
        }
    }
}

fn require_non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FetchError::invalid_input(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

/// Media API wrapper
pub struct MediaApi {
    client: FallbackHttpClient,
}

impl MediaApi {
    pub fn new(client: FallbackHttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FallbackHttpClient {
        &self.client
    }

    /// Fetch title, author and (when known) size for a source URL
    pub async fn get_video_info(&self, source_url: &str) -> Result<VideoInfoResponse> {
        let source_url = require_non_empty(source_url, "url")?;
        let (info, response) = self
            .client
            .post_json::<VideoInfo>(VIDEO_INFO_PATH, json!({ "url": source_url }))
            .await?;

        Ok(VideoInfoResponse {
            info,
            base_url: response.base_url,
            failures: response.failures,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = require_non_empty(query, "query")?;
        let (payload, _) = self
            .client
            .get_json::<ListPayload<SearchResult>>(SEARCH_PATH, &[("q", query)])
            .await?;
        Ok(payload.into_vec())
    }

    pub async fn autocomplete(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let (payload, _) = self
            .client
            .get_json::<ListPayload<String>>(AUTOCOMPLETE_PATH, &[("q", query)])
            .await?;
        Ok(payload.into_vec())
    }
}
