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


//! Deterministic file naming for downloads
//!
//! A download's target path is `<directory>/<sanitized title>.<ext>`. The
//! same title and kind always map to the same path, which is what lets the
//! orchestrator clean up stale files and guard against concurrent writers.

use crate::download::progress::MediaKind;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Byte budget for a file stem, leaving room for the extension
const MAX_STEM_BYTES: usize = 200;

/// Suffix of files still being transferred
pub const PARTIAL_EXTENSION: &str = "part";

lazy_static! {
    /// `watch?v=ID`, `youtu.be/ID`, `shorts/ID`, `embed/ID`, `live/ID`
    static ref SOURCE_ID_PATTERN: Option<Regex> = Regex::new(
        r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]{6,})"
    )
    .ok();
}

/// Sanitize a title into a filename stem
///
/// Characters that are invalid on common filesystems are replaced with
/// look-alikes or `_`, runs of whitespace collapse to one space, and
/// leading/trailing dots and spaces are stripped.
pub fn sanitize_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_space = false;

    for c in name.chars() {
        let replaced = replace_char(c);
        if replaced.is_whitespace() {
            if !last_was_space && !result.is_empty() {
                result.push(' ');
            }
            last_was_space = true;
        } else {
            result.push(replaced);
            last_was_space = false;
        }
    }

    let trimmed = result.trim().trim_matches('.').trim();
    let mut result = truncate_component(trimmed, MAX_STEM_BYTES);

    if cfg!(target_os = "windows") {
        result = handle_windows_reserved_names(&result);
    }

    if result.is_empty() {
        result = "download".to_string();
    }

    result
}

fn replace_char(c: char) -> char {
    match c {
        '<' => '＜',
        '>' => '＞',
        ':' => '_',
        '"' => '\'',
        '|' => '⏐',
        '?' => '？',
        '*' => '✱',
        '/' => '∕',
        '\\' => '_',
        '\0' => '_',
        '\n' | '\r' | '\t' => ' ',
        c if c.is_control() => '_',
        c => c,
    }
}

fn handle_windows_reserved_names(name: &str) -> String {
    let upper = name.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    if reserved
        .iter()
        .any(|r| upper == *r || upper.starts_with(&format!("{}.", r)))
    {
        return format!("_{}", name);
    }
    name.to_string()
}

/// Truncate text to fit within a byte limit on a char boundary
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    text[..index].trim_end().to_string()
}

/// File name (sanitized title plus the kind's extension)
pub fn target_file_name(title: &str, kind: MediaKind) -> String {
    format!("{}.{}", sanitize_filename(title), kind.extension())
}

/// Deterministic target path of a download
pub fn target_path(directory: &Path, title: &str, kind: MediaKind) -> PathBuf {
    directory.join(target_file_name(title, kind))
}

/// In-progress file a download streams into before it is verified
///
/// The `.part` suffix keeps it out of [`is_media_file`] listings.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.{}", name, PARTIAL_EXTENSION))
}

/// Extract the source video id from common URL shapes
pub fn extract_source_id(source_url: &str) -> Option<String> {
    SOURCE_ID_PATTERN
        .as_ref()?
        .captures(source_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether a file name looks like a finished download
pub fn is_media_file(file_name: &str) -> bool {
    if file_name.starts_with('.') {
        return false;
    }
    let lower = file_name.to_lowercase();
    [MediaKind::Video, MediaKind::Audio]
        .iter()
        .any(|kind| lower.ends_with(&format!(".{}", kind.extension())))
}

/// Default downloads directory for desktop use
pub fn get_default_download_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("Downloads").join("MediaFetch"),
        None => PathBuf::from("./downloads"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("AC/DC: Live?"), "AC∕DC_ Live？");
        assert_eq!(sanitize_filename("  many   spaces\there  "), "many spaces here");
        assert_eq!(sanitize_filename("...hidden."), "hidden");
        assert_eq!(sanitize_filename("\"quoted\""), "'quoted'");
        assert_eq!(sanitize_filename("///"), "∕∕∕");
        assert_eq!(sanitize_filename("   "), "download");
    }

    #[test]
    fn test_target_path_is_deterministic() {
        let dir = Path::new("/data/downloads");
        let a = target_path(dir, "My Song | Official", MediaKind::Audio);
        let b = target_path(dir, "My Song | Official", MediaKind::Audio);
        assert_eq!(a, b);
        assert_eq!(a, dir.join("My Song ⏐ Official.mp3"));
        assert_eq!(
            target_path(dir, "Clip", MediaKind::Video),
            dir.join("Clip.mp4")
        );
    }

    #[test]
    fn test_partial_path_is_not_listed() {
        let target = Path::new("/downloads/Clip.mp4");
        let partial = partial_path(target);
        assert_eq!(partial, PathBuf::from("/downloads/Clip.mp4.part"));
        assert!(!is_media_file("Clip.mp4.part"));
        assert!(is_media_file("Clip.mp4"));
    }

    #[test]
    fn test_truncate_component() {
        let long = "é".repeat(150);
        let truncated = truncate_component(&long, 201);
        assert!(truncated.len() <= 201);
        assert!(truncated.chars().all(|c| c == 'é'));

        let stem = sanitize_filename(&"x".repeat(500));
        assert_eq!(stem.len(), MAX_STEM_BYTES);
    }

    #[test]
    fn test_extract_source_id() {
        assert_eq!(
            extract_source_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_source_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_source_id("https://youtube.com/shorts/abcDEF_123"),
            Some("abcDEF_123".to_string())
        );
        assert_eq!(
            extract_source_id("https://www.youtube.com/embed/xyz-98765"),
            Some("xyz-98765".to_string())
        );
        assert_eq!(extract_source_id("https://example.com/video.mp4"), None);
    }

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file("song.mp3"));
        assert!(is_media_file("Clip.MP4"));
        assert!(!is_media_file(".downloads_metadata.json"));
        assert!(!is_media_file(".partial.mp4"));
        assert!(!is_media_file("notes.txt"));
    }
}
