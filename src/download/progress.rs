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


//! Download progress tracking and reporting
//!
//! Two regimes feed the reported fraction:
//! - *Known total* (Content-Length or a probed size): bytes written / total.
//! - *Unknown total*: [`estimate_progress`] maps cumulative megabytes onto
//!   fixed, kind-specific breakpoints that approach but never reach 0.99.
//!
//! [`ProgressReporter`] owns the fraction for one download. It only ever
//! moves forward, nudges itself by a small epsilon while bytes keep arriving
//! so the UI never looks stalled, and invokes the callback only on real
//! change. [`ProgressTicker`] advances the fraction a little while the
//! connection is still waiting for its first bytes.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const MIB: f64 = 1024.0 * 1024.0;

/// Upper bound for any fraction reported before the transfer has finished
pub const TRANSFER_PROGRESS_CAP: f64 = 0.99;

/// Minimal forward step while bytes keep arriving without estimate change
pub const PROGRESS_EPSILON: f64 = 0.0005;

/// Bytes that must arrive between two epsilon steps
const EPSILON_STEP_BYTES: u64 = 512 * 1024;

/// Epsilon steps stop just below the transfer cap
const EPSILON_CEILING: f64 = 0.985;

/// Per-tick advance while waiting for the first bytes
const TICKER_STEP: f64 = 0.01;

/// The waiting ticker never pushes progress beyond this
const TICKER_CEILING: f64 = 0.05;

/// Kind of media being downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }

    /// Streaming download path on the backend
    pub fn download_path(&self) -> &'static str {
        match self {
            MediaKind::Video => "/api/download/video",
            MediaKind::Audio => "/api/download/audio",
        }
    }

    /// `(megabytes, fraction)` breakpoints used when the total is unknown
    fn breakpoints(&self) -> &'static [(f64, f64)] {
        match self {
            MediaKind::Video => &[
                (0.0, 0.0),
                (10.0, 0.10),
                (50.0, 0.50),
                (100.0, 0.80),
                (200.0, 0.95),
            ],
            MediaKind::Audio => &[
                (0.0, 0.0),
                (2.0, 0.10),
                (5.0, 0.50),
                (10.0, 0.80),
                (20.0, 0.95),
            ],
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = FetchError;

    /// Accepts the kind name or its file extension, case-insensitively
    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.trim().to_lowercase().as_str() {
            "video" | "mp4" => Ok(MediaKind::Video),
            "audio" | "mp3" => Ok(MediaKind::Audio),
            other => Err(FetchError::invalid_input(format!(
                "Unknown media kind: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimate the completed fraction of a transfer
///
/// With a known total this is `bytes / total`; otherwise the fraction comes
/// from the kind's breakpoints, interpolated linearly, and past the last
/// breakpoint approaches 0.99 asymptotically. The result never exceeds
/// [`TRANSFER_PROGRESS_CAP`] and is non-decreasing in `bytes_written`.
pub fn estimate_progress(bytes_written: u64, known_total: Option<u64>, kind: MediaKind) -> f64 {
    if let Some(total) = known_total.filter(|t| *t > 0) {
        return (bytes_written as f64 / total as f64).min(TRANSFER_PROGRESS_CAP);
    }

    let mb = bytes_written as f64 / MIB;
    let points = kind.breakpoints();

    for pair in points.windows(2) {
        let (lo_mb, lo_frac) = pair[0];
        let (hi_mb, hi_frac) = pair[1];
        if mb <= hi_mb {
            let t = (mb - lo_mb) / (hi_mb - lo_mb);
            return lo_frac + t * (hi_frac - lo_frac);
        }
    }

    let (last_mb, last_frac) = points[points.len() - 1];
    let headroom = TRANSFER_PROGRESS_CAP - last_frac;
    let tail = 1.0 - (-(mb - last_mb) / last_mb).exp();
    // Strictly below the cap for any finite size
    (last_frac + headroom * tail).min(TRANSFER_PROGRESS_CAP - f64::EPSILON)
}

/// Lifecycle of a single download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    Idle,
    /// Looking up the expected size (best effort)
    SizeProbe,
    /// Removing a file left at the target path
    CleaningStale,
    Transferring,
    /// Checking size floor and existence of the finished file
    Verifying,
    /// Waiting before a fresh attempt after a network-class error
    Retrying,
    Done,
    Failed,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Done | DownloadState::Failed)
    }
}

/// Progress snapshot for a single download
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub task_id: String,
    pub title: String,
    pub kind: MediaKind,

    /// Completed fraction (0.0 - 1.0), exactly 1.0 only when done
    pub fraction: f64,

    /// Bytes written by the current attempt
    pub bytes_downloaded: u64,

    /// Total bytes if known
    pub total_bytes: Option<u64>,

    /// Moving-average speed in bytes per second
    pub download_speed: f64,

    /// 1-based attempt number
    pub attempt: u32,

    pub state: DownloadState,

    /// Optional error message if state is Failed or Retrying
    pub error_message: Option<String>,
}

impl DownloadProgress {
    pub fn new(task_id: String, title: String, kind: MediaKind) -> Self {
        Self {
            task_id,
            title,
            kind,
            fraction: 0.0,
            bytes_downloaded: 0,
            total_bytes: None,
            download_speed: 0.0,
            attempt: 1,
            state: DownloadState::Idle,
            error_message: None,
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }

    /// Format download speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.download_speed / 1_000_000.0)
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    }

    pub fn display_string(&self) -> String {
        match self.state {
            DownloadState::Transferring => {
                let total = self
                    .total_bytes
                    .map(Self::bytes_string)
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "{}: {:.1}% ({} / {}) - {}",
                    self.title,
                    self.percent(),
                    Self::bytes_string(self.bytes_downloaded),
                    total,
                    self.speed_string()
                )
            }
            DownloadState::Retrying => format!(
                "{}: Retrying (attempt {}) - {}",
                self.title,
                self.attempt + 1,
                self.error_message.as_deref().unwrap_or("network error")
            ),
            DownloadState::Failed => format!(
                "{}: Failed - {}",
                self.title,
                self.error_message.as_deref().unwrap_or("Unknown error")
            ),
            DownloadState::Done => format!("{}: Completed", self.title),
            state => format!("{}: {:?} {:.1}%", self.title, state, self.percent()),
        }
    }
}

/// Callback type for progress updates
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Speed tracker with moving average
///
/// Sliding window over `(time, position)` samples to smooth out network
/// fluctuations.
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,

    /// Time window for averaging (default 10 seconds)
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,
    position: u64,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        while let Some(sample) = self.samples.front() {
            if now.duration_since(sample.timestamp) > self.window_duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable progress state of one download
#[derive(Debug)]
struct ProgressTracker {
    progress: DownloadProgress,
    speed_tracker: SpeedTracker,
    /// Byte count at the last epsilon step
    last_step_bytes: u64,
}

impl ProgressTracker {
    fn advance_to(&mut self, fraction: f64) -> bool {
        if fraction > self.progress.fraction {
            self.progress.fraction = fraction;
            true
        } else {
            false
        }
    }
}

/// Shared handle to the progress of one download
///
/// Cloned into the ticker task. Callbacks run while the internal lock is
/// held so observers always see values in order; they must not block.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Mutex<ProgressTracker>>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(
        task_id: String,
        title: String,
        kind: MediaKind,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressTracker {
                progress: DownloadProgress::new(task_id, title, kind),
                speed_tracker: SpeedTracker::new(),
                last_step_bytes: 0,
            })),
            callback,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressTracker> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, tracker: &ProgressTracker) {
        if let Some(ref callback) = self.callback {
            callback(tracker.progress.clone());
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> DownloadProgress {
        self.lock().progress.clone()
    }

    /// Enter a new state and report it
    pub fn set_state(&self, state: DownloadState) {
        let mut tracker = self.lock();
        tracker.progress.state = state;
        if state != DownloadState::Retrying {
            tracker.progress.error_message = None;
        }
        self.emit(&tracker);
    }

    /// Reset per-attempt counters; the reported fraction is kept
    pub fn begin_attempt(&self, attempt: u32) {
        let mut tracker = self.lock();
        tracker.progress.attempt = attempt;
        tracker.progress.bytes_downloaded = 0;
        tracker.progress.total_bytes = None;
        tracker.progress.download_speed = 0.0;
        tracker.last_step_bytes = 0;
        tracker.speed_tracker.reset();
    }

    /// Start transferring with the given total (if known)
    pub fn start_transfer(&self, total_bytes: Option<u64>) {
        let mut tracker = self.lock();
        tracker.progress.total_bytes = total_bytes.filter(|t| *t > 0);
        tracker.progress.state = DownloadState::Transferring;
        self.emit(&tracker);
    }

    /// Update the known total once response headers are in, without emitting
    pub fn set_total(&self, total_bytes: Option<u64>) {
        self.lock().progress.total_bytes = total_bytes.filter(|t| *t > 0);
    }

    /// Record the cumulative byte count of the current attempt
    ///
    /// Emits only when the fraction moved.
    pub fn on_bytes(&self, bytes_written: u64) {
        let mut tracker = self.lock();
        tracker.progress.bytes_downloaded = bytes_written;
        tracker.speed_tracker.add_position(bytes_written);
        tracker.progress.download_speed = tracker.speed_tracker.average_speed();

        let known_total = tracker.progress.total_bytes;
        let estimate = estimate_progress(bytes_written, known_total, tracker.progress.kind);
        let mut changed = tracker.advance_to(estimate);

        if changed {
            tracker.last_step_bytes = bytes_written;
        } else if known_total.is_none()
            && bytes_written.saturating_sub(tracker.last_step_bytes) >= EPSILON_STEP_BYTES
        {
            let stepped = (tracker.progress.fraction + PROGRESS_EPSILON).min(EPSILON_CEILING);
            changed = tracker.advance_to(stepped);
            tracker.last_step_bytes = bytes_written;
        }

        if changed {
            self.emit(&tracker);
        }
    }

    /// Advance a little while nothing has arrived yet
    ///
    /// Returns `false` once bytes are flowing or the waiting ceiling is
    /// reached, so the ticker can stop.
    pub fn nudge(&self) -> bool {
        let mut tracker = self.lock();
        if tracker.progress.bytes_downloaded > 0 || tracker.progress.state.is_terminal() {
            return false;
        }
        if tracker.progress.fraction >= TICKER_CEILING {
            return false;
        }
        let next = (tracker.progress.fraction + TICKER_STEP).min(TICKER_CEILING);
        if tracker.advance_to(next) {
            self.emit(&tracker);
        }
        true
    }

    /// Transfer finished, the file is being checked
    pub fn verifying(&self) {
        let mut tracker = self.lock();
        tracker.progress.state = DownloadState::Verifying;
        tracker.advance_to(TRANSFER_PROGRESS_CAP);
        self.emit(&tracker);
    }

    /// Report a failed attempt that will be retried
    pub fn retrying(&self, message: String) {
        let mut tracker = self.lock();
        tracker.progress.state = DownloadState::Retrying;
        tracker.progress.error_message = Some(message);
        self.emit(&tracker);
    }

    pub fn complete(&self) {
        let mut tracker = self.lock();
        tracker.progress.fraction = 1.0;
        tracker.progress.state = DownloadState::Done;
        tracker.progress.error_message = None;
        self.emit(&tracker);
    }

    pub fn fail(&self, message: String) {
        let mut tracker = self.lock();
        tracker.progress.state = DownloadState::Failed;
        tracker.progress.error_message = Some(message);
        self.emit(&tracker);
    }
}

/// Low-frequency timer advancing progress until the first bytes arrive
///
/// Aborted on [`cancel`](Self::cancel) or drop.
pub struct ProgressTicker {
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn spawn(reporter: ProgressReporter, interval: Duration) -> Self {
        if interval.is_zero() {
            return Self { handle: None };
        }

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            // First tick completes immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                if !reporter.nudge() {
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}
