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


//! Download orchestration and streaming
//!
//! - [`manager`] - the per-file state machine with bounded retry
//! - [`stream`] - chunked transfer into a file under a wall-clock limit
//! - [`progress`] - progress estimation, reporting and the waiting ticker

pub mod manager;
pub mod progress;
pub mod stream;

// Re-export commonly used types
pub use manager::{
    DownloadConfig, DownloadOrchestrator, DownloadOutcome, DownloadRequest, DownloadTask,
};
pub use progress::{estimate_progress, DownloadProgress, DownloadState, MediaKind, ProgressCallback};
