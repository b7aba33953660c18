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


//! File operations for the downloads directory
//!
//! # Key Operations
//! - Delete with retry (another app may briefly hold the file)
//! - Existence and size checks used by download verification
//! - Directory creation
//! - Atomic write (temp file + rename) for the metadata index
//! - Listing finished media files

use crate::error::{FetchError, Result};
use crate::file::paths::is_media_file;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// File manager for the downloads directory
#[derive(Debug, Clone)]
pub struct FileManager {
    download_dir: PathBuf,
}

impl FileManager {
    pub fn new(download_dir: PathBuf) -> Self {
        Self { download_dir }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Delete a file, retrying briefly; a missing file is not an error
    pub async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::safe_delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => return Err(e),
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    async fn safe_delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FetchError::from_file_io(
                &format!("Delete failed: {}", path.display()),
                e,
            )),
        }
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if Self::file_exists(path).await {
            return Ok(());
        }

        fs::create_dir_all(path).await.map_err(|e| {
            FetchError::from_file_io(&format!("Failed to create directory {}", path.display()), e)
        })
    }

    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Get file size in bytes
    pub async fn get_file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::FileMissing(path.display().to_string())
            } else {
                FetchError::from_file_io(&format!("Failed to get file size {}", path.display()), e)
            }
        })?;

        Ok(metadata.len())
    }

    /// Atomic write: write to temp file, sync, then rename over `path`
    pub async fn atomic_write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, contents).await.map_err(|e| {
            FetchError::from_file_io(
                &format!("Failed to write temp file {}", temp_path.display()),
                e,
            )
        })?;

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|e| FetchError::from_file_io("Failed to open temp file for sync", e))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::from_file_io("Failed to sync temp file", e))?;
        drop(file);

        fs::rename(&temp_path, path).await.map_err(|e| {
            FetchError::from_file_io(
                &format!(
                    "Failed to rename temp file {} to {}",
                    temp_path.display(),
                    path.display()
                ),
                e,
            )
        })
    }

    /// Move a verified download into place, replacing any file at `to`
    pub async fn promote(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::FileMissing(from.display().to_string())
            } else {
                FetchError::from_file_io(
                    &format!("Failed to move {} into place", from.display()),
                    e,
                )
            }
        })
    }

    /// File names of finished media files in the downloads directory
    ///
    /// A missing directory lists as empty.
    pub async fn list_media_files(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.download_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FetchError::from_file_io("Failed to list downloads", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FetchError::from_file_io("Failed to list downloads", e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if let Some(name) = entry.file_name().to_str() {
                if is_file && is_media_file(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
