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


//! Extraction subprocess invocation
//!
//! [`ExtractorRunner`] is the seam between the fallback engine and the
//! external extraction tool. [`YtDlpRunner`] spawns yt-dlp once per persona
//! attempt with persona-specific client and user agent, bounded retries and
//! socket timeout, fixed referer/accept-language headers and the configured
//! upstream proxy.

use crate::download::progress::MediaKind;
use crate::error::{FetchError, Result};
use crate::extraction::persona::Persona;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

const REFERER_HEADER: &str = "Referer:https://www.youtube.com/";
const ACCEPT_LANGUAGE_HEADER: &str = "Accept-Language:en-US,en;q=0.9";

/// What the extraction tool is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOperation {
    /// Structured metadata (title, uploader, sizes)
    Metadata,
    /// Metadata fetch used only to classify reachability
    Probe,
    /// Direct media URL(s) for the given kind and quality
    Stream { kind: MediaKind, quality: String },
}

impl ExtractionOperation {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractionOperation::Metadata => "metadata",
            ExtractionOperation::Probe => "probe",
            ExtractionOperation::Stream { .. } => "stream",
        }
    }
}

/// One subprocess call
#[derive(Debug, Clone)]
pub struct ExtractorInvocation {
    pub source_url: String,
    pub persona: Persona,
    pub operation: ExtractionOperation,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

/// Raw result of a subprocess call that ran to completion
#[derive(Debug, Clone, Default)]
pub struct ExtractorOutput {
    /// `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExtractorOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr and stdout combined, for signature matching
    pub fn diagnostic_text(&self) -> String {
        match (self.stderr.trim(), self.stdout.trim()) {
            ("", out) => out.to_string(),
            (err, "") => err.to_string(),
            (err, out) => format!("{}\n{}", err, out),
        }
    }
}

/// Runs the extraction tool
#[async_trait]
pub trait ExtractorRunner: Send + Sync {
    /// Run one invocation
    ///
    /// `Err` means the tool could not be run to completion (spawn failure,
    /// timeout); a non-zero exit is an `Ok` output.
    async fn run(&self, invocation: &ExtractorInvocation) -> Result<ExtractorOutput>;
}

/// yt-dlp format selector for a kind and requested quality
pub fn format_selector(kind: MediaKind, quality: &str) -> String {
    let quality = quality.trim().trim_end_matches('p');
    match kind {
        MediaKind::Audio => "bestaudio[ext=m4a]/bestaudio/best".to_string(),
        MediaKind::Video => match quality.parse::<u32>() {
            Ok(height) => format!(
                "best[height<={h}][ext=mp4]/best[height<={h}]/best",
                h = height
            ),
            Err(_) => "best[ext=mp4]/best".to_string(),
        },
    }
}

/// Subprocess runner for yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpRunner {
    binary: PathBuf,
}

impl YtDlpRunner {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    /// Command-line arguments for an invocation
    pub fn build_args(invocation: &ExtractorInvocation) -> Vec<String> {
        let socket_timeout = invocation.timeout.as_secs().max(1).to_string();
        let mut args: Vec<String> = vec![
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--extractor-args".into(),
            format!("youtube:player_client={}", invocation.persona.player_client),
            "--user-agent".into(),
            invocation.persona.user_agent.clone(),
            "--retries".into(),
            "1".into(),
            "--socket-timeout".into(),
            socket_timeout,
            "--add-header".into(),
            REFERER_HEADER.into(),
            "--add-header".into(),
            ACCEPT_LANGUAGE_HEADER.into(),
        ];

        if let Some(ref proxy) = invocation.proxy {
            args.push("--proxy".into());
            args.push(proxy.clone());
        }

        match invocation.operation {
            ExtractionOperation::Metadata | ExtractionOperation::Probe => {
                args.push("--dump-json".into());
            }
            ExtractionOperation::Stream { kind, ref quality } => {
                args.push("-f".into());
                args.push(format_selector(kind, quality));
                args.push("--get-url".into());
            }
        }

        args.push("--".into());
        args.push(invocation.source_url.clone());
        args
    }
}

#[async_trait]
impl ExtractorRunner for YtDlpRunner {
    async fn run(&self, invocation: &ExtractorInvocation) -> Result<ExtractorOutput> {
        let args = Self::build_args(invocation);
        debug!(
            persona = %invocation.persona.id,
            operation = invocation.operation.name(),
            "Spawning extractor"
        );

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(&args)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(invocation.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FetchError::ExtractorUnavailable(format!(
                    "{}: {}",
                    self.binary.display(),
                    e
                )))
            }
            Err(_) => return Err(FetchError::Timeout(invocation.timeout.as_secs())),
        };

        Ok(ExtractorOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(operation: ExtractionOperation, proxy: Option<&str>) -> ExtractorInvocation {
        ExtractorInvocation {
            source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            persona: Persona::new("android", "android", "UA/1.0"),
            operation,
            timeout: Duration::from_secs(15),
            proxy: proxy.map(str::to_string),
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_metadata_args() {
        let args = YtDlpRunner::build_args(&invocation(ExtractionOperation::Metadata, None));

        assert!(args.contains(&"--dump-json".to_string()));
        assert!(has_pair(&args, "--extractor-args", "youtube:player_client=android"));
        assert!(has_pair(&args, "--user-agent", "UA/1.0"));
        assert!(has_pair(&args, "--retries", "1"));
        assert!(has_pair(&args, "--socket-timeout", "15"));
        assert!(has_pair(&args, "--add-header", REFERER_HEADER));
        assert!(has_pair(&args, "--add-header", ACCEPT_LANGUAGE_HEADER));
        assert!(!args.contains(&"--proxy".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_stream_args_with_proxy() {
        let args = YtDlpRunner::build_args(&invocation(
            ExtractionOperation::Stream {
                kind: MediaKind::Video,
                quality: "720p".into(),
            },
            Some("socks5://127.0.0.1:1080"),
        ));

        assert!(has_pair(&args, "--proxy", "socks5://127.0.0.1:1080"));
        assert!(has_pair(&args, "-f", "best[height<=720][ext=mp4]/best[height<=720]/best"));
        assert!(args.contains(&"--get-url".to_string()));
        assert!(!args.contains(&"--dump-json".to_string()));
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(format_selector(MediaKind::Video, "best"), "best[ext=mp4]/best");
        assert_eq!(format_selector(MediaKind::Audio, "320"), "bestaudio[ext=m4a]/bestaudio/best");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let runner = YtDlpRunner::new("/nonexistent/yt-dlp-binary");
        let err = runner
            .run(&invocation(ExtractionOperation::Probe, None))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ExtractorUnavailable(_)));
    }

    #[test]
    fn test_diagnostic_text() {
        let output = ExtractorOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "ERROR: boom\n".into(),
        };
        assert_eq!(output.diagnostic_text(), "ERROR: boom");
        assert!(!output.success());
    }
}
