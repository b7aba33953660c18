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


//! Attempt outcome classification
//!
//! Each persona attempt ends in a tagged [`AttemptOutcome`]. Telling an
//! automated-traffic rejection apart from other failures is a text match
//! against known signatures, kept here so the list can grow without touching
//! the fallback loop.

use crate::extraction::runner::ExtractorOutput;
use serde::{Deserialize, Serialize};

/// Lowercase phrases upstream uses when it rejects automated traffic
pub const BOT_DETECTION_SIGNATURES: &[&str] = &[
    "sign in to confirm you're not a bot",
    "sign in to confirm you\u{2019}re not a bot",
    "confirm you're not a robot",
    "not a bot",
    "unusual traffic",
    "automated queries",
    "http error 429",
];

/// Outcome of one persona attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "cause", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success,
    BotDetected,
    OtherError(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    pub fn is_bot_detected(&self) -> bool {
        matches!(self, AttemptOutcome::BotDetected)
    }
}

/// Classifies failure text by signature
#[derive(Debug, Clone)]
pub struct BotSignatureClassifier {
    signatures: Vec<String>,
}

impl Default for BotSignatureClassifier {
    fn default() -> Self {
        Self::new(BOT_DETECTION_SIGNATURES.iter().map(|s| s.to_string()))
    }
}

impl BotSignatureClassifier {
    fn new<I: IntoIterator<Item = String>>(signatures: I) -> Self {
        Self {
            signatures: signatures.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn is_bot_detection(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.signatures.iter().any(|sig| lower.contains(sig.as_str()))
    }

    /// Classify a failure from its diagnostic text
    pub fn classify_failure(&self, text: &str) -> AttemptOutcome {
        if self.is_bot_detection(text) {
            AttemptOutcome::BotDetected
        } else {
            AttemptOutcome::OtherError(first_error_line(text))
        }
    }

    /// Classify a non-zero exit of the extraction tool
    pub fn classify_output(&self, output: &ExtractorOutput) -> AttemptOutcome {
        let text = output.diagnostic_text();
        if text.is_empty() {
            return AttemptOutcome::OtherError(format!(
                "extractor exited with {}",
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            ));
        }
        self.classify_failure(&text)
    }
}

/// The line that carries the error, preferring yt-dlp's `ERROR:` lines
fn first_error_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| text.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("unknown error")
        .to_string()
}
