//! Error types for MediaFetch
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (configuration, API, download, extraction,
//! file) so callers can decide between retrying, falling back and surfacing a
//! message to the user.
//!
//! ## Categories
//!
//! ### Configuration
//! - `ConfigUnavailable`, `InvalidEndpointConfig` - never reach the end user,
//!   the endpoint resolver recovers with its fallback list
//!
//! ### API / Endpoints
//! - `ServerRejected` - non-2xx with the server's `{error}`/`{message}` text
//! - `ApiRequestFailed` - non-2xx without an explanation in the body
//! - `AllEndpointsFailed` - every candidate base URL failed, wraps the last cause
//! - `InvalidApiResponse`, `NetworkError`
//!
//! ### Download
//! - `DownloadFailed`, `RetriesExhausted`, `DownloadInProgress`
//! - Verification: `FileTooSmall`, `FileMissing`
//!
//! ### Extraction (backend)
//! - `ExtractionFailed` - every persona failed
//! - `ExtractorUnavailable`, `InvalidExtractorOutput`
//!
//! ### File
//! - `FileIoError`, `PermissionDenied`, `InsufficientDiskSpace`, `InvalidPath`

use crate::api::client::EndpointFailure;
use thiserror::Error;

/// Result type alias using our FetchError type
pub type Result<T> = std::result::Result<T, FetchError>;

/// Message signatures that mark an error as network-class (retryable).
///
/// Matched case-insensitively against the error text. The last entry is the
/// Android/Java wording for a dropped socket.
pub const NETWORK_ERROR_SIGNATURES: &[&str] = &[
    "connection",
    "abort",
    "network",
    "timeout",
    "timed out",
    "econnreset",
    "software caused connection abort",
];

/// Generic message shown when no server-provided explanation exists
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "The service is currently unavailable. Please try again later.";

/// Main error type for MediaFetch
#[derive(Error, Debug)]
pub enum FetchError {
    // ===== Configuration Errors =====

    /// Remote endpoint document could not be fetched
    #[error("Endpoint configuration unavailable: {0}")]
    ConfigUnavailable(String),

    /// Remote endpoint document had no usable URL field
    #[error("Invalid endpoint configuration: {0}")]
    InvalidEndpointConfig(String),

    // ===== API Errors =====

    /// Server answered with a non-success status
    ///
    /// `message` is the server's `{error}` or `{message}` field when present
    /// and must reach the user unmodified (quota messages change what the
    /// user should do next).
    #[error("Server rejected request ({status}): {message}")]
    ServerRejected {
        status: u16,
        message: String,
        /// Request path that failed
        endpoint: Option<String>,
    },

    /// Non-success status without a server-provided explanation
    #[error("API request failed: {message}")]
    ApiRequestFailed {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
        /// Request path that failed
        endpoint: Option<String>,
    },

    /// Every candidate base URL failed
    #[error("All {} endpoints failed; last error: {last}", .failures.len())]
    AllEndpointsFailed {
        /// One entry per attempted base URL, in attempt order
        failures: Vec<EndpointFailure>,
        /// Last underlying cause
        last: Box<FetchError>,
    },

    /// API returned invalid or unexpected response format
    #[error("Invalid API response: {message}")]
    InvalidApiResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    // ===== Download Errors =====

    /// Generic download failure
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Completed file is below the minimum plausible size for its kind
    #[error("Downloaded file is too small ({actual} bytes, minimum {minimum} bytes)")]
    FileTooSmall { actual: u64, minimum: u64 },

    /// Completed file disappeared before it could be handed over
    #[error("Downloaded file is missing: {0}")]
    FileMissing(String),

    /// Another task is already writing to the same target path
    #[error("Download already in progress for {0}")]
    DownloadInProgress(String),

    /// Transient failures persisted through every retry
    #[error("Download failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },

    // ===== Extraction Errors =====

    /// Every persona failed to extract the source
    #[error(
        "Extraction failed after {attempts} attempts ({bot_detected} bot-detected): {last_error}"
    )]
    ExtractionFailed {
        attempts: usize,
        bot_detected: usize,
        last_error: String,
    },

    /// Extraction tool could not be spawned
    #[error("Extractor not available: {0}")]
    ExtractorUnavailable(String),

    /// Extraction tool exited cleanly but its output could not be parsed
    #[error("Invalid extractor output: {0}")]
    InvalidExtractorOutput(String),

    // ===== File/Storage Errors =====

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// File operation permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Insufficient disk space for operation
    #[error("Insufficient disk space: {0}")]
    InsufficientDiskSpace(String),

    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== General Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Core not initialized or otherwise unusable for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::string::FromUtf8Error> for FetchError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        FetchError::InternalError(format!("UTF-8 conversion error: {}", err))
    }
}

/// Check whether free-form error text carries a network-class signature
pub fn has_network_signature(message: &str) -> bool {
    let lower = message.to_lowercase();
    NETWORK_ERROR_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

// Helper methods for creating common errors
impl FetchError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        FetchError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        FetchError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        FetchError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a ServerRejected error
    pub fn server_rejected<S: Into<String>>(
        status: u16,
        message: S,
        endpoint: Option<String>,
    ) -> Self {
        FetchError::ServerRejected {
            status,
            message: message.into(),
            endpoint,
        }
    }

    /// Create an ApiRequestFailed error
    pub fn api_failed<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        FetchError::ApiRequestFailed {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    /// Map an I/O error from a file operation, keeping fatal kinds distinct
    pub fn from_file_io(context: &str, err: std::io::Error) -> Self {
        let message = format!("{}: {}", context, err);
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => FetchError::PermissionDenied(message),
            _ if err.to_string().to_lowercase().contains("no space left") => {
                FetchError::InsufficientDiskSpace(message)
            }
            _ => FetchError::FileIoError(message),
        }
    }

    /// Check if error is network-class and therefore worth retrying
    ///
    /// Typed variants are checked first; generic download/server messages
    /// fall back to the signature list in [`NETWORK_ERROR_SIGNATURES`].
    pub fn is_network_class(&self) -> bool {
        match self {
            FetchError::NetworkError { .. } | FetchError::Timeout(_) => true,
            FetchError::ReqwestError(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.is_request()
                    || e.is_body()
                    || has_network_signature(&e.to_string())
            }
            FetchError::IoError(e) => {
                use std::io::ErrorKind::*;
                matches!(
                    e.kind(),
                    ConnectionReset
                        | ConnectionAborted
                        | ConnectionRefused
                        | BrokenPipe
                        | TimedOut
                        | UnexpectedEof
                )
            }
            FetchError::DownloadFailed(message) => has_network_signature(message),
            FetchError::ServerRejected { message, .. } => has_network_signature(message),
            FetchError::ApiRequestFailed { message, .. } => has_network_signature(message),
            FetchError::AllEndpointsFailed { last, .. } => last.is_network_class(),
            _ => false,
        }
    }

    /// Check if error is terminal for a download (never retried)
    pub fn is_terminal(&self) -> bool {
        !self.is_network_class()
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            FetchError::FileIoError(_)
                | FetchError::PermissionDenied(_)
                | FetchError::InsufficientDiskSpace(_)
                | FetchError::InvalidPath(_)
                | FetchError::FileMissing(_)
        )
    }

    /// Server-provided explanation, if any cause in the chain carries one
    pub fn server_message(&self) -> Option<&str> {
        match self {
            FetchError::ServerRejected { message, .. } if !message.is_empty() => Some(message),
            FetchError::AllEndpointsFailed { last, .. } => last.server_message(),
            FetchError::RetriesExhausted { last, .. } => last.server_message(),
            _ => None,
        }
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Server-provided messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        if let Some(message) = self.server_message() {
            return message.to_string();
        }

        match self {
            FetchError::AllEndpointsFailed { .. } | FetchError::ConfigUnavailable(_) => {
                SERVICE_UNAVAILABLE_MESSAGE.to_string()
            }
            FetchError::RetriesExhausted { attempts, .. } => format!(
                concat!(
                    "Download failed after {} attempts due to a network problem. ",
                    "Please check your connection and try again."
                ),
                attempts
            ),
            FetchError::FileTooSmall { .. } | FetchError::FileMissing(_) => {
                "The download did not complete correctly. Please try again.".to_string()
            }
            FetchError::ExtractionFailed { .. } => {
                "This video could not be processed right now. Please try again later.".to_string()
            }
            FetchError::InsufficientDiskSpace(_) => {
                "Not enough storage space to save this download.".to_string()
            }
            FetchError::DownloadInProgress(_) => {
                "This item is already being downloaded.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

// ===== IMPLEMENTATION NOTES =====
//
// ## Retryable vs Non-Retryable Errors
//
// ### Retried by the download orchestrator (`is_network_class()`)
// - `NetworkError`, `Timeout`
// - reqwest connect/timeout/request/body failures
// - socket-level I/O kinds (reset, aborted, refused, broken pipe, EOF)
// - `DownloadFailed` / `ServerRejected` whose text carries a network signature
//
// ### Terminal
// - Verification failures (`FileTooSmall`, `FileMissing`)
// - Disk full, permission denied, other file errors
// - Server rejections without a network signature (quota, bad request)
//
// ## Logging
//
// Log errors with structured fields so retries can be correlated:
//   ```rust
//   warn!(error = %e, retryable = e.is_network_class(), attempt, "Download attempt failed");
//   ```
