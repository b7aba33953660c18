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


//! Download orchestration against an in-memory backend

mod common;

use common::{assert_monotonic, build_core, FakeBackend, Recorder, StreamScript, MIB};
use mediafetch_core::download::{
    DownloadProgress, DownloadRequest, DownloadState, MediaKind, ProgressCallback,
};
use mediafetch_core::file::paths::partial_path;
use mediafetch_core::FetchError;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const SOURCE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const BACKEND: &str = "http://api.example";

fn video_request(title: &str) -> DownloadRequest {
    DownloadRequest::new(SOURCE_URL, title, MediaKind::Video)
}

#[tokio::test]
async fn test_known_size_reaches_exactly_one() {
    let dir = tempdir().unwrap();
    let size = 4 * MIB;
    let backend = Arc::new(FakeBackend::new(Some(size as u64)).streams(vec![
        StreamScript::Body {
            chunk_size: 256 * 1024,
            chunks: 16,
            content_length: Some(size as u64),
        },
    ]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let recorder = Recorder::default();

    let outcome = core
        .download(video_request("Known Size"), Some(recorder.callback()))
        .await
        .unwrap();

    assert_eq!(outcome.size_bytes, size as u64);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.metadata_recorded);
    assert_eq!(outcome.task.expected_size_bytes, Some(size as u64));

    let fractions = recorder.fractions();
    assert_monotonic(&fractions);
    let events = recorder.events();
    let last = events.last().unwrap();
    assert_eq!(last.state, DownloadState::Done);
    assert_eq!(last.fraction, 1.0);
    assert!(events[..events.len() - 1].iter().all(|e| e.fraction < 1.0));
}

#[tokio::test]
async fn test_unknown_size_follows_estimate_curve() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(None).streams(vec![StreamScript::Body {
        chunk_size: MIB,
        chunks: 150,
        content_length: None,
    }]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let recorder = Recorder::default();

    let outcome = core
        .download(video_request("Unknown Size"), Some(recorder.callback()))
        .await
        .unwrap();
    assert_eq!(outcome.size_bytes, 150 * MIB as u64);

    let events = recorder.events();
    assert_monotonic(&recorder.fractions());

    let at = |mib: u64| -> f64 {
        events
            .iter()
            .filter(|e| {
                e.state == DownloadState::Transferring && e.bytes_downloaded <= mib * MIB as u64
            })
            .map(|e| e.fraction)
            .fold(0.0, f64::max)
    };
    assert!((at(10) - 0.10).abs() < 0.01);
    assert!((at(50) - 0.50).abs() < 0.01);
    assert!((at(100) - 0.80).abs() < 0.01);

    let transfer_max = at(150);
    assert!(transfer_max > 0.85 && transfer_max < 0.9);

    let done = events.iter().position(|e| e.state == DownloadState::Done).unwrap();
    assert!(events[..done].iter().any(|e| e.fraction >= 0.95));
    assert_eq!(events[done].fraction, 1.0);
}

#[tokio::test]
async fn test_too_small_file_is_deleted_without_metadata() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(None).streams(vec![StreamScript::body(10 * 1024)]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let request = video_request("Tiny");
    let target = core.orchestrator().target_path_for(&request);

    let err = core.download(request, None).await.unwrap_err();

    match err {
        FetchError::FileTooSmall { actual, minimum } => {
            assert_eq!(actual, 10 * 1024);
            assert_eq!(minimum, 100 * 1024);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!target.exists());
    assert_eq!(backend.open_count(), 1);
    assert!(core.list_downloads().await.unwrap().is_empty());
}

/// Observes the files of one download from inside the progress callback
#[derive(Default)]
struct DiskWatch {
    /// Whether the `.part` file existed while bytes were arriving, per event
    partial_present: Vec<bool>,
    /// Whether anything was left on disk, per Retrying event
    leftovers_at_retry: Vec<bool>,
    /// Whether the target path existed while transferring, per event
    target_during_transfer: Vec<bool>,
}

fn watch_disk(target: PathBuf) -> (Arc<Mutex<DiskWatch>>, ProgressCallback) {
    let watch = Arc::new(Mutex::new(DiskWatch::default()));
    let seen = Arc::clone(&watch);
    let partial = partial_path(&target);
    let callback: ProgressCallback = Arc::new(move |progress: DownloadProgress| {
        let mut seen = seen.lock().unwrap();
        match progress.state {
            DownloadState::Transferring if progress.bytes_downloaded > 0 => {
                seen.partial_present.push(partial.exists());
                seen.target_during_transfer.push(target.exists());
            }
            DownloadState::Retrying => {
                seen.leftovers_at_retry.push(target.exists() || partial.exists());
            }
            _ => {}
        }
    });
    (watch, callback)
}

#[tokio::test]
async fn test_network_failures_retry_then_give_up() {
    let dir = tempdir().unwrap();
    // Every attempt writes 128 KiB, then the connection drops
    let backend = Arc::new(FakeBackend::new(Some(MIB as u64)).streams(vec![
        StreamScript::Body {
            chunk_size: 64 * 1024,
            chunks: 2,
            content_length: Some(MIB as u64),
        },
    ]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let request = video_request("Flaky");
    let target = core.orchestrator().target_path_for(&request);
    let (watch, callback) = watch_disk(target.clone());

    let err = core.download(request, Some(callback)).await.unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 4, .. }));
    assert_eq!(backend.open_count(), 4);

    let watch = watch.lock().unwrap();
    assert!(!watch.partial_present.is_empty());
    assert!(watch.partial_present.iter().all(|present| *present));
    assert_eq!(watch.leftovers_at_retry, vec![false, false, false]);
    assert!(!target.exists());
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn test_connection_refused_retries_every_attempt() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(
        FakeBackend::new(Some(MIB as u64)).streams(vec![StreamScript::ConnectError]),
    );
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);

    let err = core
        .download(video_request("Refused"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 4, .. }));
    assert_eq!(backend.open_count(), 4);
}

#[tokio::test]
async fn test_in_progress_download_is_not_listed() {
    let dir = tempdir().unwrap();
    let size = 512 * 1024;
    let backend = Arc::new(FakeBackend::new(Some(size as u64)).streams(vec![
        StreamScript::Body {
            chunk_size: 128 * 1024,
            chunks: 4,
            content_length: Some(size as u64),
        },
    ]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let request = video_request("Partial");
    let target = core.orchestrator().target_path_for(&request);
    let (watch, callback) = watch_disk(target.clone());

    core.download(request, Some(callback)).await.unwrap();

    let watch = watch.lock().unwrap();
    assert!(!watch.target_during_transfer.is_empty());
    assert!(watch.target_during_transfer.iter().all(|exists| !exists));
    assert!(watch.partial_present.iter().all(|present| *present));
    assert!(target.exists());
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn test_truncated_transfer_recovers_on_retry() {
    let dir = tempdir().unwrap();
    let size = 2 * MIB;
    let backend = Arc::new(FakeBackend::new(Some(size as u64)).streams(vec![
        StreamScript::Body {
            chunk_size: MIB,
            chunks: 1,
            content_length: Some(size as u64),
        },
        StreamScript::body(size),
    ]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let request = video_request("Resumed");
    let target = core.orchestrator().target_path_for(&request);
    let (watch, callback) = watch_disk(target.clone());

    let outcome = core.download(request, Some(callback)).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(watch.lock().unwrap().leftovers_at_retry, vec![false]);
    assert!(!partial_path(&target).exists());
    assert_eq!(outcome.size_bytes, size as u64);
    assert_eq!(backend.open_count(), 2);
}

#[tokio::test]
async fn test_rejection_is_terminal_and_keeps_server_text() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(Some(MIB as u64)).streams(vec![StreamScript::Status(
        429,
        json!({ "error": "Daily limit reached. Open the video in your browser instead." }),
    )]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let recorder = Recorder::default();

    let err = core
        .download(video_request("Limited"), Some(recorder.callback()))
        .await
        .unwrap_err();

    assert_eq!(backend.open_count(), 1);
    assert_eq!(
        err.user_message(),
        "Daily limit reached. Open the video in your browser instead."
    );
    let last = recorder.events().pop().unwrap();
    assert_eq!(last.state, DownloadState::Failed);
    assert_eq!(
        last.error_message.as_deref(),
        Some("Daily limit reached. Open the video in your browser instead.")
    );
    assert_eq!(recorder.count_state(DownloadState::Retrying), 0);
}

#[tokio::test]
async fn test_stale_file_is_replaced() {
    let dir = tempdir().unwrap();
    let size = 300 * 1024;
    let backend =
        Arc::new(FakeBackend::new(Some(size as u64)).streams(vec![StreamScript::body(size)]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);
    let request = video_request("Stale");
    let target = core.orchestrator().target_path_for(&request);
    std::fs::write(&target, vec![7u8; 5 * MIB]).unwrap();

    let outcome = core.download(request, None).await.unwrap();

    assert_eq!(outcome.path, target);
    let bytes = std::fs::read(&target).unwrap();
    assert_eq!(bytes.len(), size);
    assert!(bytes.iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_finished_download_is_listed_with_source() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new(None).streams(vec![StreamScript::body(200 * 1024)]));
    let core = build_core(dir.path(), Arc::clone(&backend), &[BACKEND]);

    let request = video_request("Listed").with_thumbnail("https://img.example/t.jpg");
    let outcome = core.download(request, None).await.unwrap();

    let files = core.list_downloads().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, outcome.file_name);
    let metadata = files[0].metadata.as_ref().unwrap();
    assert_eq!(metadata.source_id, "dQw4w9WgXcQ");
    assert_eq!(metadata.thumbnail_ref.as_deref(), Some("https://img.example/t.jpg"));
    assert_eq!(metadata.kind, MediaKind::Video);
}
