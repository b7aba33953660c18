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


//! MediaFetch core
//!
//! Download orchestration for the MediaFetch mobile app: backend endpoint
//! discovery with fallback, multi-endpoint API calls, resilient media
//! transfers with monotonic progress, persona-rotating extraction and a
//! self-healing index linking downloaded files to their source metadata.
//!
//! # Modules
//! - [`api`] - endpoint resolution, fallback HTTP client and media API calls
//! - [`download`] - download orchestration, transfer and progress estimation
//! - [`extraction`] - extractor invocation with persona fallback
//! - [`file`] - path sanitization, file operations and the metadata index
//! - [`app`] - the [`MediaCore`] facade wiring everything together
//! - [`mobile_bridge`] - C FFI consumed by the React Native host

pub mod api;
pub mod app;
pub mod download;
pub mod error;
pub mod extraction;
pub mod file;
pub mod mobile_bridge;

pub use app::{CoreConfig, MediaCore};
pub use error::{FetchError, Result};
