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


//! Downloads directory management
//!
//! - [`paths`] - deterministic target paths and source id extraction
//! - [`manager`] - delete/size/atomic-write helpers
//! - [`metadata_index`] - provenance index of finished downloads

pub mod manager;
pub mod metadata_index;
pub mod paths;

// Re-export commonly used types
pub use manager::FileManager;
pub use metadata_index::{DownloadMetadataEntry, DownloadedFile, MetadataLinker};
pub use paths::{extract_source_id, sanitize_filename, target_path};
