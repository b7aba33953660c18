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


//! Chunked transfer of a streaming response into a file
//!
//! The body is written through a `BufWriter` with periodic flushes. There is
//! no resume: the caller always hands over a fresh target path, and a
//! response that ends before its announced Content-Length is reported as a
//! dropped connection so the orchestrator retries from zero.

use crate::api::transport::{HttpRequest, HttpTransport, StreamResponse};
use crate::error::{FetchError, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Flush every 1MB
const DATA_FLUSH_SZ: u64 = 1024 * 1024;

/// Write the response body to `path`, reporting cumulative bytes per chunk
///
/// The file is created (or truncated) before the first chunk is read.
pub async fn write_stream_to_file<F>(
    response: StreamResponse,
    path: &Path,
    mut on_bytes: F,
) -> Result<u64>
where
    F: FnMut(u64),
{
    let expected = response.content_length;
    let mut body = response.body;

    let file = File::create(path)
        .await
        .map_err(|e| FetchError::from_file_io("create download file", e))?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);

    let mut written: u64 = 0;
    let mut next_flush = DATA_FLUSH_SZ;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::from_file_io("write download file", e))?;
        written += chunk.len() as u64;

        if written >= next_flush {
            writer
                .flush()
                .await
                .map_err(|e| FetchError::from_file_io("flush download file", e))?;
            next_flush = written + DATA_FLUSH_SZ;
        }

        on_bytes(written);
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::from_file_io("flush download file", e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| FetchError::from_file_io("sync download file", e))?;

    if let Some(expected) = expected {
        if written < expected {
            return Err(FetchError::DownloadFailed(format!(
                "connection closed after {} of {} bytes",
                written, expected
            )));
        }
    }

    debug!(path = %path.display(), bytes = written, "Transfer finished");
    Ok(written)
}

/// Open the first request whose backend accepts the connection
///
/// Requests are tried in order. A network-class failure moves on to the
/// next one; any other failure is returned as is. Returns the index of the
/// request that connected.
pub async fn open_first_reachable(
    transport: &dyn HttpTransport,
    requests: Vec<HttpRequest>,
) -> Result<(usize, StreamResponse)> {
    let mut last_error = None;

    for (index, request) in requests.into_iter().enumerate() {
        let url = request.url.clone();
        match transport.open_stream(request).await {
            Ok(response) => return Ok((index, response)),
            Err(e) if e.is_network_class() => {
                debug!(url = %url, error = %e, "Stream endpoint unreachable, trying next");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| FetchError::internal("no stream candidates")))
}

/// Open a streaming request and write its body to `path`
///
/// `requests` are alternatives for the same download on different
/// backends; see [`open_first_reachable`]. The wall-clock `limit` covers
/// connecting, headers and the whole body regardless of bytes in flight. A
/// non-success status is turned into the matching error, keeping any
/// server-provided message. `on_open` receives the index of the request
/// that connected and the Content-Length (if any) before the first chunk.
pub async fn download_to_file<O, F>(
    transport: &dyn HttpTransport,
    requests: Vec<HttpRequest>,
    path: &Path,
    limit: Duration,
    on_open: O,
    on_bytes: F,
) -> Result<u64>
where
    O: FnOnce(usize, Option<u64>),
    F: FnMut(u64),
{
    let endpoint = requests
        .first()
        .map(|request| {
            url::Url::parse(&request.url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| request.url.clone())
        })
        .unwrap_or_default();

    let transfer = async {
        let (index, response) = open_first_reachable(transport, requests).await?;
        if !response.is_success() {
            let status = response.status;
            debug!(status, endpoint = %endpoint, "Download request rejected");
            return Err(response.read_error_body().await.into_error(Some(endpoint)));
        }

        on_open(index, response.content_length);
        write_stream_to_file(response, path, on_bytes).await
    };

    match tokio::time::timeout(limit, transfer).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(limit.as_secs())),
    }
}
