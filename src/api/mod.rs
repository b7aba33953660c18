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


//! Client-side API access
//!
//! - [`transport`] - HTTP seam and the reqwest implementation
//! - [`endpoints`] - remote endpoint configuration with fallback
//! - [`client`] - ordered multi-endpoint request execution
//! - [`media`] - video-info, search and autocomplete calls

pub mod client;
pub mod endpoints;
pub mod media;
pub mod transport;

// Re-export commonly used types
pub use client::{EndpointFailure, FallbackHttpClient, FallbackResponse};
pub use endpoints::{EndpointConfig, EndpointResolver, EndpointSource, RemoteEndpointSource};
pub use media::{MediaApi, SearchResult, VideoInfo};
pub use transport::{ClientConfig, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
