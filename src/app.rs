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


//! Core facade
//!
//! [`MediaCore`] is built once at startup. It owns the single
//! [`EndpointResolver`] and hands it by reference to the HTTP client and the
//! download orchestrator, so every component sees the same cached endpoint
//! list and a refresh takes effect everywhere.

use crate::api::client::FallbackHttpClient;
use crate::api::endpoints::{EndpointConfig, EndpointResolver, EndpointSource, RemoteEndpointSource};
use crate::api::media::{MediaApi, SearchResult, VideoInfoResponse};
use crate::api::transport::{ClientConfig, HttpTransport, ReqwestTransport};
use crate::download::manager::{
    DownloadConfig, DownloadOrchestrator, DownloadOutcome, DownloadRequest,
};
use crate::download::progress::ProgressCallback;
use crate::error::Result;
use crate::file::metadata_index::{DownloadedFile, MetadataLinker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default location of the remote endpoint document
pub const DEFAULT_ENDPOINT_CONFIG_URL: &str = "https://config.mediafetch.app/endpoints.json";

/// Everything needed to build a [`MediaCore`]
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub endpoint_config_url: String,
    pub download_dir: PathBuf,
    pub client: ClientConfig,
    /// `output_directory` is replaced by `download_dir`
    pub download: DownloadConfig,
}

impl CoreConfig {
    pub fn new<P: Into<PathBuf>>(download_dir: P) -> Self {
        Self {
            endpoint_config_url: DEFAULT_ENDPOINT_CONFIG_URL.to_string(),
            download_dir: download_dir.into(),
            client: ClientConfig::default(),
            download: DownloadConfig::default(),
        }
    }

    pub fn with_endpoint_config_url<S: Into<String>>(mut self, url: S) -> Self {
        self.endpoint_config_url = url.into();
        self
    }

    pub fn with_download_config(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    pub fn with_client_config(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}

/// Process-wide entry point used by the mobile bridge and the CLI
pub struct MediaCore {
    resolver: Arc<EndpointResolver>,
    api: Arc<MediaApi>,
    linker: Arc<MetadataLinker>,
    orchestrator: DownloadOrchestrator,
}

impl MediaCore {
    /// Build with the reqwest transport and the remote endpoint document
    pub fn new(config: CoreConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.client)?);
        let source = Arc::new(RemoteEndpointSource::new(
            config.endpoint_config_url.clone(),
            Arc::clone(&transport),
        ));
        Ok(Self::with_parts(config, transport, source))
    }

    /// Build with explicit transport and endpoint source
    pub fn with_parts(
        config: CoreConfig,
        transport: Arc<dyn HttpTransport>,
        source: Arc<dyn EndpointSource>,
    ) -> Self {
        let resolver = Arc::new(EndpointResolver::new(source));
        let api = Arc::new(MediaApi::new(FallbackHttpClient::new(
            Arc::clone(&resolver),
            transport,
        )));
        let linker = Arc::new(MetadataLinker::new(config.download_dir.clone()));

        let mut download = config.download;
        download.output_directory = config.download_dir;
        let orchestrator = DownloadOrchestrator::new(Arc::clone(&api), download)
            .with_metadata_linker(Arc::clone(&linker));

        info!(
            download_dir = %orchestrator.config().output_directory.display(),
            "Media core initialized"
        );

        Self {
            resolver,
            api,
            linker,
            orchestrator,
        }
    }

    pub fn resolver(&self) -> &Arc<EndpointResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    pub async fn endpoints(&self) -> EndpointConfig {
        self.resolver.get_endpoints().await
    }

    /// Re-fetch the endpoint document (call when the app regains foreground)
    pub async fn refresh_endpoints(&self) -> EndpointConfig {
        self.resolver.refresh().await
    }

    pub async fn get_video_info(&self, source_url: &str) -> Result<VideoInfoResponse> {
        self.api.get_video_info(source_url).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.api.search(query).await
    }

    pub async fn autocomplete(&self, query: &str) -> Result<Vec<String>> {
        self.api.autocomplete(query).await
    }

    pub async fn download(
        &self,
        request: DownloadRequest,
        callback: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome> {
        self.orchestrator.download(request, callback).await
    }

    pub async fn list_downloads(&self) -> Result<Vec<DownloadedFile>> {
        self.linker.list_with_metadata().await
    }

    pub async fn delete_download(&self, file_name: &str) -> Result<bool> {
        self.linker.remove_download(file_name).await
    }
}
