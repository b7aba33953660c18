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


//! Metadata index behavior across downloads and external file changes

mod common;

use common::{build_core, FakeBackend, StreamScript};
use mediafetch_core::download::{DownloadRequest, MediaKind};
use mediafetch_core::file::metadata_index::{MetadataLinker, METADATA_INDEX_FILE};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_index_heals_after_external_delete() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(None).streams(vec![StreamScript::body(64 * 1024)]));
    let core = build_core(dir.path(), backend, &["http://api.example"]);

    let first = core
        .download(
            DownloadRequest::new("https://youtu.be/aaaaaaaaaaa", "First", MediaKind::Audio),
            None,
        )
        .await
        .unwrap();
    let second = core
        .download(
            DownloadRequest::new("https://youtu.be/bbbbbbbbbbb", "Second", MediaKind::Audio)
                .with_source_id("custom-id"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(core.list_downloads().await.unwrap().len(), 2);

    // Removed behind the app's back
    std::fs::remove_file(&first.path).unwrap();

    let files = core.list_downloads().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, second.file_name);
    assert_eq!(files[0].metadata.as_ref().unwrap().source_id, "custom-id");

    // A fresh linker sees the pruned index on disk
    let linker = MetadataLinker::new(dir.path().to_path_buf());
    assert!(linker.get(&first.file_name).await.is_none());
    assert!(linker.get(&second.file_name).await.is_some());
    assert!(dir.path().join(METADATA_INDEX_FILE).exists());
}

#[tokio::test]
async fn test_delete_download_removes_file_and_entry() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(None).streams(vec![StreamScript::body(64 * 1024)]));
    let core = build_core(dir.path(), backend, &["http://api.example"]);

    let outcome = core
        .download(
            DownloadRequest::new("https://youtu.be/ccccccccccc", "Gone", MediaKind::Audio),
            None,
        )
        .await
        .unwrap();

    assert!(core.delete_download(&outcome.file_name).await.unwrap());
    assert!(!outcome.path.exists());
    assert!(core.list_downloads().await.unwrap().is_empty());
    assert!(!core.delete_download(&outcome.file_name).await.unwrap());
}
