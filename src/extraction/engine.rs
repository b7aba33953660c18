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


//! Persona fallback for the extraction tool
//!
//! For every request the engine walks the persona list in order, runs the
//! extraction tool once per persona and stops at the first success. Bot
//! detection does not end the walk early: a different persona may still get
//! through. Nothing is remembered between requests since upstream blocking
//! changes from one request to the next.
//!
//! [`ExtractionFallbackEngine::diagnose`] probes *every* persona and reports
//! whether the outbound IP looks globally blocked (every attempt rejected as
//! automated traffic).

use crate::download::progress::MediaKind;
use crate::error::{FetchError, Result};
use crate::extraction::classify::{AttemptOutcome, BotSignatureClassifier};
use crate::extraction::persona::{default_personas, Persona};
use crate::extraction::runner::{
    ExtractionOperation, ExtractorInvocation, ExtractorOutput, ExtractorRunner, YtDlpRunner,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest raw diagnostic kept per attempt
const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Extraction tool configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub binary: PathBuf,
    /// Upstream proxy applied to every invocation
    pub proxy: Option<String>,
    pub personas: Vec<Persona>,
    pub metadata_timeout: Duration,
    pub probe_timeout: Duration,
    pub stream_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            proxy: None,
            personas: default_personas(),
            metadata_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(20),
        }
    }
}

impl ExtractorConfig {
    /// Read `YTDLP_PATH` and `YTDLP_PROXY` (falling back to `PROXY_URL`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(binary) = non_blank("YTDLP_PATH") {
            config.binary = PathBuf::from(binary);
        }
        config.proxy = non_blank("YTDLP_PROXY").or_else(|| non_blank("PROXY_URL"));
        config
    }

    pub fn with_personas(mut self, personas: Vec<Persona>) -> Self {
        self.personas = personas;
        self
    }

    pub fn with_proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// Record of one persona attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionAttempt {
    pub persona: String,
    pub user_agent: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    /// Truncated tool output for failed attempts
    pub raw_diagnostic: Option<String>,
}

/// Metadata parsed from the tool's JSON dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMetadata {
    pub id: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_secs: Option<f64>,
    pub filesize: Option<u64>,
}

impl ExtractedMetadata {
    /// Parse yt-dlp's `--dump-json` output
    pub fn from_json(stdout: &str) -> Result<Self> {
        let line = stdout
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| FetchError::InvalidExtractorOutput("no JSON object in output".into()))?;
        let json: Value = serde_json::from_str(line)
            .map_err(|e| FetchError::InvalidExtractorOutput(e.to_string()))?;

        let text = |key: &str| json.get(key).and_then(Value::as_str).map(str::to_string);
        let title = text("title")
            .ok_or_else(|| FetchError::InvalidExtractorOutput("missing title".into()))?;

        Ok(Self {
            id: text("id"),
            title,
            author: text("uploader").or_else(|| text("channel")),
            thumbnail: text("thumbnail"),
            duration_secs: json.get("duration").and_then(Value::as_f64),
            filesize: json
                .get("filesize")
                .and_then(Value::as_u64)
                .or_else(|| json.get("filesize_approx").and_then(Value::as_u64))
                .filter(|size| *size > 0),
        })
    }
}

/// Direct media URL(s); separate video/audio streams yield two
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResolution {
    pub kind: MediaKind,
    pub urls: Vec<String>,
}

impl StreamResolution {
    fn from_output(stdout: &str, kind: MediaKind) -> Result<Self> {
        let urls: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("http://") || l.starts_with("https://"))
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(FetchError::InvalidExtractorOutput("no media URL in output".into()));
        }
        Ok(Self { kind, urls })
    }
}

/// Successful extraction with the attempts it took
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction<T> {
    pub value: T,
    /// Persona that succeeded
    pub persona: String,
    pub attempts: Vec<ExtractionAttempt>,
}

/// Result of probing every persona
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub source_url: String,
    pub checked_at: DateTime<Utc>,
    pub attempts: Vec<ExtractionAttempt>,
    pub success: usize,
    pub bot_detected: usize,
    pub other_error: usize,
    /// Every attempt was rejected as automated traffic
    pub is_blocked: bool,
}

impl DiagnosticReport {
    fn from_attempts(
        source_url: String,
        checked_at: DateTime<Utc>,
        attempts: Vec<ExtractionAttempt>,
    ) -> Self {
        let success = attempts.iter().filter(|a| a.outcome.is_success()).count();
        let bot_detected = attempts.iter().filter(|a| a.outcome.is_bot_detected()).count();
        let other_error = attempts.len() - success - bot_detected;
        Self {
            is_blocked: !attempts.is_empty() && bot_detected == attempts.len(),
            source_url,
            checked_at,
            attempts,
            success,
            bot_detected,
            other_error,
        }
    }
}

/// Persona fallback around an [`ExtractorRunner`]
pub struct ExtractionFallbackEngine {
    runner: Arc<dyn ExtractorRunner>,
    classifier: BotSignatureClassifier,
    config: ExtractorConfig,
}

impl ExtractionFallbackEngine {
    pub fn new(runner: Arc<dyn ExtractorRunner>, config: ExtractorConfig) -> Self {
        Self {
            runner,
            classifier: BotSignatureClassifier::default(),
            config,
        }
    }

    /// Engine backed by the yt-dlp binary named in `config`
    pub fn with_ytdlp(config: ExtractorConfig) -> Self {
        let runner = Arc::new(YtDlpRunner::new(config.binary.clone()));
        Self::new(runner, config)
    }

    pub fn personas(&self) -> &[Persona] {
        &self.config.personas
    }

    /// Title, author, duration and size of a source
    pub async fn extract_metadata(
        &self,
        source_url: &str,
    ) -> Result<Extraction<ExtractedMetadata>> {
        self.first_success(
            source_url,
            ExtractionOperation::Metadata,
            self.config.metadata_timeout,
            |output| ExtractedMetadata::from_json(&output.stdout),
        )
        .await
    }

    /// Direct media URL(s) for a source
    pub async fn resolve_stream(
        &self,
        source_url: &str,
        kind: MediaKind,
        quality: &str,
    ) -> Result<Extraction<StreamResolution>> {
        self.first_success(
            source_url,
            ExtractionOperation::Stream {
                kind,
                quality: quality.to_string(),
            },
            self.config.stream_timeout,
            |output| StreamResolution::from_output(&output.stdout, kind),
        )
        .await
    }

    /// Probe every persona and summarize reachability
    pub async fn diagnose(&self, source_url: &str) -> DiagnosticReport {
        let checked_at = Utc::now();
        let mut attempts = Vec::with_capacity(self.config.personas.len());

        for persona in &self.config.personas {
            let (attempt, _) = self
                .attempt(
                    source_url,
                    persona,
                    ExtractionOperation::Probe,
                    self.config.probe_timeout,
                    |output| ExtractedMetadata::from_json(&output.stdout),
                )
                .await;
            attempts.push(attempt);
        }

        let report = DiagnosticReport::from_attempts(source_url.to_string(), checked_at, attempts);
        info!(
            success = report.success,
            bot_detected = report.bot_detected,
            other_error = report.other_error,
            is_blocked = report.is_blocked,
            "Extraction diagnostic finished"
        );
        report
    }

    async fn first_success<T, P>(
        &self,
        source_url: &str,
        operation: ExtractionOperation,
        timeout: Duration,
        parse: P,
    ) -> Result<Extraction<T>>
    where
        P: Fn(&ExtractorOutput) -> Result<T>,
    {
        if source_url.trim().is_empty() {
            return Err(FetchError::invalid_input("source url must not be empty"));
        }

        let mut attempts = Vec::new();
        let mut last_error = String::from("no personas configured");

        for persona in &self.config.personas {
            let (attempt, value) = self
                .attempt(source_url, persona, operation.clone(), timeout, &parse)
                .await;

            match value {
                Some(value) => {
                    attempts.push(attempt);
                    info!(
                        persona = %persona.id,
                        operation = operation.name(),
                        attempts = attempts.len(),
                        "Extraction succeeded"
                    );
                    return Ok(Extraction {
                        value,
                        persona: persona.id.clone(),
                        attempts,
                    });
                }
                None => {
                    last_error = match attempt.outcome {
                        AttemptOutcome::OtherError(ref cause) => cause.clone(),
                        _ => format!("persona {} rejected as automated traffic", persona.id),
                    };
                    attempts.push(attempt);
                }
            }
        }

        let bot_detected = attempts.iter().filter(|a| a.outcome.is_bot_detected()).count();
        warn!(
            operation = operation.name(),
            attempts = attempts.len(),
            bot_detected,
            "Every persona failed"
        );
        Err(FetchError::ExtractionFailed {
            attempts: attempts.len(),
            bot_detected,
            last_error,
        })
    }

    /// Run one persona; returns the attempt record and the parsed value on success
    async fn attempt<T, P>(
        &self,
        source_url: &str,
        persona: &Persona,
        operation: ExtractionOperation,
        timeout: Duration,
        parse: P,
    ) -> (ExtractionAttempt, Option<T>)
    where
        P: Fn(&ExtractorOutput) -> Result<T>,
    {
        let invocation = ExtractorInvocation {
            source_url: source_url.to_string(),
            persona: persona.clone(),
            operation,
            timeout,
            proxy: self.config.proxy.clone(),
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        let result = self.runner.run(&invocation).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let (outcome, raw, value) = match result {
            Ok(output) if output.success() => match parse(&output) {
                Ok(value) => (AttemptOutcome::Success, None, Some(value)),
                Err(e) => (
                    AttemptOutcome::OtherError(e.to_string()),
                    Some(output.diagnostic_text()),
                    None,
                ),
            },
            Ok(output) => {
                let text = output.diagnostic_text();
                (self.classifier.classify_output(&output), Some(text), None)
            }
            Err(e) => {
                let text = e.to_string();
                (self.classifier.classify_failure(&text), Some(text), None)
            }
        };

        debug!(
            persona = %persona.id,
            operation = invocation.operation.name(),
            duration_ms,
            outcome = ?outcome,
            "Extraction attempt finished"
        );

        let attempt = ExtractionAttempt {
            persona: persona.id.clone(),
            user_agent: persona.user_agent.clone(),
            started_at,
            duration_ms,
            outcome,
            raw_diagnostic: raw.map(|text| truncate_chars(&text, MAX_DIAGNOSTIC_CHARS)),
        };
        (attempt, value)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
