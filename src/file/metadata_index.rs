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


//! Download provenance index
//!
//! [`MetadataLinker`] keeps a JSON side file next to the downloads that maps
//! each file name to where it came from:
//!
//! ```json
//! {
//!   "Song.mp3": {
//!     "sourceId": "dQw4w9WgXcQ",
//!     "thumbnailRef": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
//!     "kind": "audio",
//!     "downloadedAtMillis": 1735689600000
//!   }
//! }
//! ```
//!
//! Every listing reconciles the index against the directory: entries whose
//! file is gone are dropped and the pruned index is written back. Files
//! without an entry are still listed, just without provenance.
//!
//! Writes go through a temp file and a rename under an async lock, so a crash
//! mid-write never leaves a truncated index behind.

use crate::download::progress::MediaKind;
use crate::error::{FetchError, Result};
use crate::file::manager::FileManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Index file name inside the downloads directory
pub const METADATA_INDEX_FILE: &str = ".downloads_metadata.json";

/// Provenance of one downloaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadMetadataEntry {
    pub source_id: String,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
    pub kind: MediaKind,
    pub downloaded_at_millis: i64,
}

/// File name -> provenance
pub type MetadataIndex = BTreeMap<String, DownloadMetadataEntry>;

/// A file in the downloads directory with its provenance, if recorded
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub metadata: Option<DownloadMetadataEntry>,
}

/// Maintains the provenance index of a downloads directory
#[derive(Debug)]
pub struct MetadataLinker {
    files: FileManager,
    index_path: PathBuf,
    lock: Mutex<()>,
}

impl MetadataLinker {
    pub fn new(download_dir: PathBuf) -> Self {
        let index_path = download_dir.join(METADATA_INDEX_FILE);
        Self {
            files: FileManager::new(download_dir),
            index_path,
            lock: Mutex::new(()),
        }
    }

    pub fn download_dir(&self) -> &Path {
        self.files.download_dir()
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Record where a finished download came from
    pub async fn record_download(
        &self,
        file_name: &str,
        source_id: &str,
        thumbnail_ref: Option<String>,
        kind: MediaKind,
    ) -> Result<()> {
        validate_file_name(file_name)?;

        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await;
        index.insert(
            file_name.to_string(),
            DownloadMetadataEntry {
                source_id: source_id.to_string(),
                thumbnail_ref,
                kind,
                downloaded_at_millis: Utc::now().timestamp_millis(),
            },
        );
        self.save_index(&index).await?;

        debug!(file = file_name, source_id, "Recorded download metadata");
        Ok(())
    }

    /// List downloaded files with their metadata, pruning orphaned entries
    pub async fn list_with_metadata(&self) -> Result<Vec<DownloadedFile>> {
        let _guard = self.lock.lock().await;
        let file_names = self.files.list_media_files().await?;
        let mut index = self.load_index().await;

        let before = index.len();
        index.retain(|name, _| file_names.iter().any(|f| f == name));
        let pruned = before - index.len();
        if pruned > 0 {
            info!(pruned, "Pruned orphaned download metadata");
            self.save_index(&index).await?;
        }

        let mut listing = Vec::with_capacity(file_names.len());
        for file_name in file_names {
            let path = self.download_dir().join(&file_name);
            // File may vanish between listing and stat
            let size_bytes = match FileManager::get_file_size(&path).await {
                Ok(size) => size,
                Err(FetchError::FileMissing(_)) => continue,
                Err(e) => return Err(e),
            };
            listing.push(DownloadedFile {
                metadata: index.get(&file_name).cloned(),
                file_name,
                path,
                size_bytes,
            });
        }

        Ok(listing)
    }

    /// Metadata of a single file
    pub async fn get(&self, file_name: &str) -> Option<DownloadMetadataEntry> {
        let _guard = self.lock.lock().await;
        self.load_index().await.remove(file_name)
    }

    /// Delete a downloaded file and its index entry
    ///
    /// Returns whether an index entry existed.
    pub async fn remove_download(&self, file_name: &str) -> Result<bool> {
        validate_file_name(file_name)?;

        let _guard = self.lock.lock().await;
        self.files
            .safe_delete(&self.download_dir().join(file_name))
            .await?;

        let mut index = self.load_index().await;
        let existed = index.remove(file_name).is_some();
        if existed {
            self.save_index(&index).await?;
        }
        Ok(existed)
    }

    /// Read the index; a missing or corrupted file reads as empty
    async fn load_index(&self) -> MetadataIndex {
        let bytes = match tokio::fs::read(&self.index_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MetadataIndex::new(),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %self.index_path.display(),
                    "Failed to read metadata index"
                );
                return MetadataIndex::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    error = %e,
                    path = %self.index_path.display(),
                    "Metadata index is corrupted, starting empty"
                );
                MetadataIndex::new()
            }
        }
    }

    async fn save_index(&self, index: &MetadataIndex) -> Result<()> {
        self.files
            .ensure_directory_exists(self.files.download_dir())
            .await?;
        let contents = serde_json::to_vec_pretty(index)?;
        self.files.atomic_write(&self.index_path, &contents).await
    }
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return Err(FetchError::InvalidPath(format!(
            "not a plain file name: {:?}",
            file_name
        )));
    }
    Ok(())
}
