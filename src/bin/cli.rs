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


use anyhow::Context;
use clap::{Parser, Subcommand};
use mediafetch_core::download::{DownloadProgress, DownloadRequest, MediaKind, ProgressCallback};
use mediafetch_core::extraction::{ExtractionFallbackEngine, ExtractorConfig};
use mediafetch_core::file::paths::get_default_download_dir;
use mediafetch_core::{CoreConfig, MediaCore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediafetch-cli")]
#[command(about = "MediaFetch CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Directory downloads are written to
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// URL of the endpoint configuration document
    #[arg(long, global = true)]
    endpoint_config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved backend endpoints
    Endpoints,
    /// Fetch media information through the backend
    Info {
        url: String,
    },
    /// Search the catalogue
    Search {
        query: String,
    },
    /// Autocomplete a partial query
    Suggest {
        query: String,
    },
    /// Download a media item
    Download {
        url: String,
        /// Title used for the file name (defaults to the backend title)
        #[arg(short, long)]
        title: Option<String>,
        /// video or audio (mp4 and mp3 are accepted too)
        #[arg(short, long, default_value = "video")]
        kind: MediaKind,
        #[arg(short, long)]
        quality: Option<String>,
    },
    /// List downloaded files with metadata
    List,
    /// Delete a downloaded file
    Delete {
        file_name: String,
    },
    /// Extract metadata locally, rotating client personas
    Extract {
        url: String,
    },
    /// Try every persona once and report bot detection
    Diagnose {
        url: String,
    },
}

fn print_progress(progress: DownloadProgress) {
    eprintln!("[{:?}] {}", progress.state, progress.display_string());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract { url } => {
            let engine = ExtractionFallbackEngine::with_ytdlp(ExtractorConfig::from_env());
            let extraction = engine.extract_metadata(url).await?;
            println!(
                "Extracted with persona '{}' after {} attempt(s)",
                extraction.persona,
                extraction.attempts.len()
            );
            println!("{}", serde_json::to_string_pretty(&extraction.value)?);
            return Ok(());
        }
        Commands::Diagnose { url } => {
            let engine = ExtractionFallbackEngine::with_ytdlp(ExtractorConfig::from_env());
            let report = engine.diagnose(url).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        _ => {}
    }

    let download_dir = cli.dir.unwrap_or_else(get_default_download_dir);
    let mut config = CoreConfig::new(download_dir);
    if let Some(url) = cli.endpoint_config {
        config = config.with_endpoint_config_url(url);
    }
    let core = MediaCore::new(config).context("failed to initialize media core")?;

    match cli.command {
        Commands::Endpoints => {
            let endpoints = core.endpoints().await;
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
        }
        Commands::Info { url } => {
            let response = core.get_video_info(&url).await?;
            println!("Served by {}", response.base_url);
            for failure in &response.failures {
                println!("  skipped {}: {}", failure.base_url, failure.error);
            }
            println!("{}", serde_json::to_string_pretty(&response.info)?);
        }
        Commands::Search { query } => {
            for result in core.search(&query).await? {
                println!("{}", serde_json::to_string(&result)?);
            }
        }
        Commands::Suggest { query } => {
            for suggestion in core.autocomplete(&query).await? {
                println!("{}", suggestion);
            }
        }
        Commands::Download {
            url,
            title,
            kind,
            quality,
        } => {
            let title = match title {
                Some(title) => title,
                None => core.get_video_info(&url).await?.info.title,
            };
            let mut request = DownloadRequest::new(url, title, kind);
            if let Some(quality) = quality {
                request = request.with_quality(quality);
            }

            let callback: ProgressCallback = Arc::new(print_progress);
            let outcome = core
                .download(request, Some(callback))
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!(
                "Saved {} ({} bytes) after {} attempt(s)",
                outcome.path.display(),
                outcome.size_bytes,
                outcome.attempts
            );
        }
        Commands::List => {
            for file in core.list_downloads().await? {
                let source = file
                    .metadata
                    .as_ref()
                    .map(|m| m.source_id.as_str())
                    .unwrap_or("-");
                println!("{}\t{}\t{}", file.file_name, file.size_bytes, source);
            }
        }
        Commands::Delete { file_name } => {
            if core.delete_download(&file_name).await? {
                println!("Deleted {}", file_name);
            } else {
                println!("No such download: {}", file_name);
            }
        }
        Commands::Extract { .. } | Commands::Diagnose { .. } => {}
    }

    Ok(())
}
