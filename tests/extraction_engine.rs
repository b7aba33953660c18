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


//! Persona rotation through the public extraction API

use async_trait::async_trait;
use mediafetch_core::extraction::runner::{ExtractorInvocation, ExtractorOutput};
use mediafetch_core::extraction::{
    default_personas, AttemptOutcome, ExtractionFallbackEngine, ExtractorConfig, ExtractorRunner,
};
use mediafetch_core::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BOT_TEXT: &str = "ERROR: [youtube] abc: Sign in to confirm you're not a bot";

/// Fails with bot detection for the first `blocked` calls, then succeeds
struct BlockedThenOk {
    blocked: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ExtractorRunner for BlockedThenOk {
    async fn run(&self, _invocation: &ExtractorInvocation) -> Result<ExtractorOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.blocked {
            return Ok(ExtractorOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: BOT_TEXT.to_string(),
            });
        }
        Ok(ExtractorOutput {
            exit_code: Some(0),
            stdout: r#"{"id":"abc","title":"Live Session","uploader":"Band"}"#.to_string(),
            stderr: String::new(),
        })
    }
}

fn build_engine(
    blocked: usize,
    persona_count: usize,
) -> (Arc<BlockedThenOk>, ExtractionFallbackEngine) {
    let runner = Arc::new(BlockedThenOk {
        blocked,
        calls: AtomicUsize::new(0),
    });
    let personas = default_personas().into_iter().take(persona_count).collect();
    let engine = ExtractionFallbackEngine::new(
        runner.clone(),
        ExtractorConfig::default().with_personas(personas),
    );
    (runner, engine)
}

#[tokio::test]
async fn test_third_persona_succeeds_after_two_bot_checks() {
    let (runner, engine) = build_engine(2, 3);
    let expected = engine.personas()[2].id.clone();

    let extraction = engine
        .extract_metadata("https://www.youtube.com/watch?v=abcdefgh")
        .await
        .unwrap();

    assert_eq!(extraction.persona, expected);
    assert_eq!(extraction.value.title, "Live Session");
    let outcomes: Vec<_> = extraction.attempts.iter().map(|a| a.outcome.clone()).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::BotDetected,
            AttemptOutcome::BotDetected,
            AttemptOutcome::Success
        ]
    );
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_diagnose_counts_and_blocked_flag() {
    let (_, engine) = build_engine(2, 3);
    let report = engine
        .diagnose("https://www.youtube.com/watch?v=abcdefgh")
        .await;
    assert_eq!(report.bot_detected, 2);
    assert_eq!(report.success, 1);
    assert!(!report.is_blocked);

    let (runner, engine) = build_engine(usize::MAX, 3);
    let report = engine
        .diagnose("https://www.youtube.com/watch?v=abcdefgh")
        .await;
    assert_eq!(report.bot_detected, 3);
    assert_eq!(report.success, 0);
    assert!(report.is_blocked);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
}
