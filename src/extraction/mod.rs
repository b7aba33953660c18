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


//! Extraction with persona fallback
//!
//! Used by the backend before any extraction-dependent work and by the
//! desktop CLI for local extraction and diagnostics.

pub mod classify;
pub mod engine;
pub mod persona;
pub mod runner;

pub use classify::{AttemptOutcome, BotSignatureClassifier};
pub use engine::{DiagnosticReport, ExtractionAttempt, ExtractionFallbackEngine, ExtractorConfig};
pub use persona::{default_personas, Persona};
pub use runner::{ExtractorRunner, YtDlpRunner};
