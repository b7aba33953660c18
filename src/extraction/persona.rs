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


//! Extractor personas
//!
//! A persona is the request fingerprint the extraction tool presents
//! upstream: a player-client identity plus the user agent that client would
//! send. Upstream bot detection keys on these, so a persona that is blocked
//! can sit next to one that still works.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Short identifier used in logs and diagnostic reports
    pub id: String,
    /// Value passed as `youtube:player_client=`
    pub player_client: String,
    pub user_agent: String,
}

impl Persona {
    pub fn new<I, P, U>(id: I, player_client: P, user_agent: U) -> Self
    where
        I: Into<String>,
        P: Into<String>,
        U: Into<String>,
    {
        Self {
            id: id.into(),
            player_client: player_client.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Built-in personas, most reliable first
///
/// The order is fixed. Routine requests walk it top to bottom so results
/// and logs are reproducible.
pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            "ios",
            "ios",
            "com.google.ios.youtube/19.45.4 (iPhone16,2; U; CPU iOS 18_1_0 like Mac OS X;)",
        ),
        Persona::new(
            "android",
            "android",
            "com.google.android.youtube/19.44.38 (Linux; U; Android 14) gzip",
        ),
        Persona::new(
            "tv",
            "tv",
            "Mozilla/5.0 (ChromiumStylePlatform) Cobalt/Version",
        ),
        Persona::new(
            "web_safari",
            "web_safari",
            concat!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 ",
                "(KHTML, like Gecko) Version/17.5 Safari/605.1.15"
            ),
        ),
        Persona::new(
            "mweb",
            "mweb",
            concat!(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 ",
                "(KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1"
            ),
        ),
    ]
}
