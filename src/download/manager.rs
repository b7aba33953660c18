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


//! Download orchestration for a single media file
//!
//! [`DownloadOrchestrator::download`] drives one file through an explicit
//! state machine:
//!
//! ```text
//! Idle -> SizeProbe -> CleaningStale -> Transferring -> Verifying -> Done
//!              \              \               \             \
//!               +--------------+---------------+-------------+--> Retrying | Failed
//! ```
//!
//! - **SizeProbe** asks `/api/video-info` for the expected size and learns
//!   which backend answers. Failure only disables exact progress.
//! - **CleaningStale** deletes whatever occupies the target path and its
//!   `.part` file. Downloads never resume.
//! - **Transferring** streams the body into the `.part` file under a 10
//!   minute wall-clock limit. The backend that answered the probe goes
//!   first, then the remaining candidates in order for as long as they
//!   refuse the connection.
//! - **Verifying** checks the kind-specific size floor, moves the `.part`
//!   file to the target path, waits a short settle delay and checks
//!   existence again.
//!
//! Network-class failures restart the whole attempt after a fixed backoff, up
//! to `max_retries` extra attempts. Any other failure is terminal. Before an
//! error propagates (or a retry starts) the partial file is removed.

use crate::api::media::MediaApi;
use crate::api::transport::HttpRequest;
use crate::download::progress::{
    DownloadState, MediaKind, ProgressCallback, ProgressReporter, ProgressTicker,
};
use crate::download::stream::download_to_file;
use crate::error::{FetchError, Result};
use crate::file::manager::FileManager;
use crate::file::metadata_index::MetadataLinker;
use crate::file::paths::{extract_source_id, partial_path, target_path};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Quality requested when the caller does not pick one
pub const DEFAULT_QUALITY: &str = "best";

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory for downloaded files
    pub output_directory: PathBuf,

    /// Extra attempts after the first one for network-class errors
    pub max_retries: u32,

    /// Fixed delay before a retry
    pub retry_backoff: Duration,

    /// Wall-clock limit for one transfer
    pub transfer_timeout: Duration,

    /// Delay before the final existence check
    pub settle_delay: Duration,

    /// Minimum plausible size of a video file
    pub min_video_bytes: u64,

    /// Minimum plausible size of an audio file
    pub min_audio_bytes: u64,

    /// Interval of the progress ticker while waiting for first bytes
    pub ticker_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            transfer_timeout: Duration::from_secs(10 * 60),
            settle_delay: Duration::from_millis(500),
            min_video_bytes: 100 * 1024,
            min_audio_bytes: 10 * 1024,
            ticker_interval: Duration::from_secs(1),
        }
    }
}

impl DownloadConfig {
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder::default()
    }

    pub fn min_size(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Video => self.min_video_bytes,
            MediaKind::Audio => self.min_audio_bytes,
        }
    }
}

/// Builder for DownloadConfig
#[derive(Debug, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn output_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_directory = dir.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn min_sizes(mut self, video: u64, audio: u64) -> Self {
        self.config.min_video_bytes = video;
        self.config.min_audio_bytes = audio;
        self
    }

    pub fn ticker_interval(mut self, interval: Duration) -> Self {
        self.config.ticker_interval = interval;
        self
    }

    pub fn build(self) -> DownloadConfig {
        self.config
    }
}

/// What the caller wants downloaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub source_url: String,
    pub title: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub quality: Option<String>,
    /// Recorded as provenance; derived from the URL when absent
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl DownloadRequest {
    pub fn new<U: Into<String>, T: Into<String>>(source_url: U, title: T, kind: MediaKind) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            kind,
            quality: None,
            source_id: None,
            thumbnail: None,
        }
    }

    pub fn with_quality<S: Into<String>>(mut self, quality: S) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_source_id<S: Into<String>>(mut self, source_id: S) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_thumbnail<S: Into<String>>(mut self, thumbnail: S) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            return Err(FetchError::invalid_input("source url must not be empty"));
        }
        Ok(())
    }
}

/// Per-download state owned by the orchestrator for one `download` call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub id: String,
    pub source_url: String,
    pub suggested_title: String,
    pub kind: MediaKind,
    pub target_path: PathBuf,
    pub expected_size_bytes: Option<u64>,
    pub max_downloaded_bytes_seen: u64,
    pub last_reported_progress: f64,
    pub retry_count: u32,
    pub state: DownloadState,
}

impl DownloadTask {
    fn new(request: &DownloadRequest, target_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: request.source_url.clone(),
            suggested_title: request.title.clone(),
            kind: request.kind,
            target_path,
            expected_size_bytes: None,
            max_downloaded_bytes_seen: 0,
            last_reported_progress: 0.0,
            retry_count: 0,
            state: DownloadState::Idle,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}

/// Result of a finished download
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    /// Base URL the file was streamed from
    pub base_url: String,
    pub attempts: u32,
    pub metadata_recorded: bool,
    pub task: DownloadTask,
}

/// Removes a target path from the in-flight set when dropped
struct InFlightGuard<'a> {
    paths: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(paths: &'a Mutex<HashSet<PathBuf>>, path: &Path) -> Result<Self> {
        let mut set = paths.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(path.to_path_buf()) {
            return Err(FetchError::DownloadInProgress(path.display().to_string()));
        }
        Ok(Self {
            paths,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.paths.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.path);
    }
}

/// Drives single-file downloads
pub struct DownloadOrchestrator {
    api: Arc<MediaApi>,
    linker: Option<Arc<MetadataLinker>>,
    files: FileManager,
    config: DownloadConfig,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl DownloadOrchestrator {
    pub fn new(api: Arc<MediaApi>, config: DownloadConfig) -> Self {
        Self {
            api,
            linker: None,
            files: FileManager::new(config.output_directory.clone()),
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Record provenance of finished downloads
    pub fn with_metadata_linker(mut self, linker: Arc<MetadataLinker>) -> Self {
        self.linker = Some(linker);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Target path a request would be written to
    pub fn target_path_for(&self, request: &DownloadRequest) -> PathBuf {
        target_path(&self.config.output_directory, &request.title, request.kind)
    }

    /// Download one file, retrying network-class failures
    pub async fn download(
        &self,
        request: DownloadRequest,
        callback: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome> {
        request.validate()?;
        self.files
            .ensure_directory_exists(&self.config.output_directory)
            .await?;

        let target = self.target_path_for(&request);
        let _guard = InFlightGuard::acquire(&self.in_flight, &target)?;

        let mut task = DownloadTask::new(&request, target);
        let reporter = ProgressReporter::new(
            task.id.clone(),
            request.title.clone(),
            request.kind,
            callback,
        );

        info!(
            task_id = %task.id,
            kind = %request.kind,
            path = %task.target_path.display(),
            "Starting download"
        );

        loop {
            reporter.begin_attempt(task.attempt());

            match self.run_attempt(&mut task, &request, &reporter).await {
                Ok((size_bytes, base_url)) => {
                    let metadata_recorded = self.record_metadata(&task, &request).await;

                    task.state = DownloadState::Done;
                    reporter.complete();
                    task.last_reported_progress = reporter.snapshot().fraction;

                    info!(
                        task_id = %task.id,
                        bytes = size_bytes,
                        attempts = task.attempt(),
                        "Download complete"
                    );

                    return Ok(DownloadOutcome {
                        file_name: file_name_of(&task.target_path),
                        path: task.target_path.clone(),
                        size_bytes,
                        base_url,
                        attempts: task.attempt(),
                        metadata_recorded,
                        task,
                    });
                }
                Err(e) => {
                    self.remove_partial(&task.target_path).await;
                    task.last_reported_progress = reporter.snapshot().fraction;

                    let retryable = e.is_network_class();
                    if retryable && task.retry_count < self.config.max_retries {
                        warn!(
                            task_id = %task.id,
                            attempt = task.attempt(),
                            error = %e,
                            "Download attempt failed, retrying"
                        );
                        task.retry_count += 1;
                        task.state = DownloadState::Retrying;
                        reporter.retrying(e.to_string());

                        if !self.config.retry_backoff.is_zero() {
                            tokio::time::sleep(self.config.retry_backoff).await;
                        }
                        continue;
                    }

                    let error = if retryable {
                        FetchError::RetriesExhausted {
                            attempts: task.attempt(),
                            last: Box::new(e),
                        }
                    } else {
                        e
                    };

                    warn!(
                        task_id = %task.id,
                        attempts = task.attempt(),
                        retryable,
                        error = %error,
                        "Download failed"
                    );
                    task.state = DownloadState::Failed;
                    reporter.fail(error.user_message());
                    return Err(error);
                }
            }
        }
    }

    /// One full attempt: probe, clean, transfer, verify
    async fn run_attempt(
        &self,
        task: &mut DownloadTask,
        request: &DownloadRequest,
        reporter: &ProgressReporter,
    ) -> Result<(u64, String)> {
        task.state = DownloadState::SizeProbe;
        reporter.set_state(DownloadState::SizeProbe);
        let answered = self.probe_size(task, request).await;
        let bases = stream_order(answered, self.api.client().candidates().await);

        task.state = DownloadState::CleaningStale;
        reporter.set_state(DownloadState::CleaningStale);
        let partial = partial_path(&task.target_path);
        self.files.safe_delete(&task.target_path).await?;
        self.files.safe_delete(&partial).await?;

        task.state = DownloadState::Transferring;
        reporter.start_transfer(task.expected_size_bytes);

        let quality = request.quality.as_deref().unwrap_or(DEFAULT_QUALITY);
        let requests = bases
            .iter()
            .map(|base| {
                HttpRequest::get(format!("{}{}", base, request.kind.download_path()))
                    .with_query("url", request.source_url.as_str())
                    .with_query("quality", quality)
            })
            .collect();

        let mut ticker = Some(ProgressTicker::spawn(
            reporter.clone(),
            self.config.ticker_interval,
        ));
        let expected = task.expected_size_bytes;
        let mut max_seen = 0u64;
        let mut streamed_from = 0usize;

        let transfer = download_to_file(
            self.api.client().transport().as_ref(),
            requests,
            &partial,
            self.config.transfer_timeout,
            |index, content_length| {
                streamed_from = index;
                reporter.set_total(content_length.or(expected));
            },
            |written| {
                if let Some(mut t) = ticker.take() {
                    t.cancel();
                }
                max_seen = max_seen.max(written);
                reporter.on_bytes(written);
            },
        )
        .await;

        drop(ticker);
        task.max_downloaded_bytes_seen = task.max_downloaded_bytes_seen.max(max_seen);
        let written = transfer?;
        let base_url = bases.get(streamed_from).cloned().unwrap_or_default();
        debug!(
            task_id = %task.id,
            bytes = written,
            base_url = %base_url,
            "Transfer finished"
        );

        task.state = DownloadState::Verifying;
        reporter.verifying();
        let size = self.verify(task).await?;

        Ok((size, base_url))
    }

    /// Best-effort size lookup; returns the base URL that answered, if any
    async fn probe_size(
        &self,
        task: &mut DownloadTask,
        request: &DownloadRequest,
    ) -> Option<String> {
        match self.api.get_video_info(&request.source_url).await {
            Ok(response) => {
                task.expected_size_bytes = response.info.expected_size();
                debug!(
                    task_id = %task.id,
                    expected = ?task.expected_size_bytes,
                    base_url = %response.base_url,
                    "Size probe succeeded"
                );
                Some(response.base_url)
            }
            Err(e) => {
                let answered = first_answering_endpoint(&e);
                debug!(
                    task_id = %task.id,
                    error = %e,
                    answered = ?answered,
                    "Size probe failed, size unknown"
                );
                answered
            }
        }
    }

    async fn verify(&self, task: &DownloadTask) -> Result<u64> {
        let partial = partial_path(&task.target_path);
        let size = FileManager::get_file_size(&partial).await?;
        let minimum = self.config.min_size(task.kind);
        if size < minimum {
            warn!(task_id = %task.id, size, minimum, "Downloaded file below size floor");
            self.remove_partial(&task.target_path).await;
            return Err(FetchError::FileTooSmall {
                actual: size,
                minimum,
            });
        }

        self.files.promote(&partial, &task.target_path).await?;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        if !FileManager::file_exists(&task.target_path).await {
            return Err(FetchError::FileMissing(task.target_path.display().to_string()));
        }

        Ok(size)
    }

    /// Delete the `.part` file and anything at the target path
    async fn remove_partial(&self, target: &Path) {
        for path in [partial_path(target), target.to_path_buf()] {
            if let Err(e) = self.files.safe_delete(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }

    /// Returns whether an index entry was written; never fails the download
    async fn record_metadata(&self, task: &DownloadTask, request: &DownloadRequest) -> bool {
        let Some(ref linker) = self.linker else {
            return false;
        };

        let source_id = request
            .source_id
            .clone()
            .or_else(|| extract_source_id(&request.source_url))
            .unwrap_or_else(|| request.source_url.clone());

        match linker
            .record_download(
                &file_name_of(&task.target_path),
                &source_id,
                request.thumbnail.clone(),
                request.kind,
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to record download metadata");
                false
            }
        }
    }
}

/// First backend that answered at the HTTP level, even with an error
fn first_answering_endpoint(error: &FetchError) -> Option<String> {
    match error {
        FetchError::AllEndpointsFailed { failures, .. } => failures
            .iter()
            .find(|f| !f.network_class)
            .map(|f| f.base_url.clone()),
        _ => None,
    }
}

/// Base URLs to stream from: the answering one first, then the rest in order
fn stream_order(answered: Option<String>, candidates: Vec<String>) -> Vec<String> {
    let mut bases: Vec<String> = answered.into_iter().collect();
    for candidate in candidates {
        if !bases.contains(&candidate) {
            bases.push(candidate);
        }
    }
    bases
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
