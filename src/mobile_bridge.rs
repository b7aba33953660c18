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


//! C FFI bridge - Exposes the media core to the React Native host
//!
//! The Swift (iOS) and Kotlin/JNI (Android) shims call these functions and
//! hand the JSON results to JavaScript.
//!
//! # Architecture
//! JavaScript (React Native) → native module → C FFI → Rust
//!
//! # Response Format
//! All functions return JSON strings with this structure:
//! ```json
//! { "success": true, "data": { ... } }
//! ```
//! Or on error:
//! ```json
//! { "success": false, "error": "User facing message", "kind": "Debug variant" }
//! ```
//!
//! # Memory Management
//! Every string pointer returned from this module MUST be freed by the
//! caller using `rust_free_string()`.
//!
//! `rust_init_core()` must succeed before any other call; until then every
//! function answers with an error response.

use crate::app::{CoreConfig, MediaCore};
use crate::download::manager::{DownloadConfig, DownloadRequest};
use crate::download::progress::{DownloadProgress, ProgressCallback};
use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

lazy_static::lazy_static! {
    static ref RUNTIME: Option<tokio::runtime::Runtime> =
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("mediafetch-worker")
            .build()
            .ok();

    static ref CORE: RwLock<Option<Arc<MediaCore>>> = RwLock::new(None);
}

/// Host callback receiving a JSON-encoded `DownloadProgress`
///
/// The pointer is only valid for the duration of the call.
pub type ProgressFn = extern "C" fn(progress_json: *const c_char);

/// Configuration accepted by `rust_init_core()`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeConfig {
    download_dir: PathBuf,
    #[serde(default)]
    endpoint_config_url: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    retry_backoff_ms: Option<u64>,
}

impl BridgeConfig {
    fn into_core_config(self) -> CoreConfig {
        let mut config = CoreConfig::new(self.download_dir);
        if let Some(url) = self.endpoint_config_url {
            config = config.with_endpoint_config_url(url);
        }
        if let Some(user_agent) = self.user_agent {
            config.client.user_agent = user_agent;
        }

        let mut download = DownloadConfig::default();
        if let Some(max_retries) = self.max_retries {
            download.max_retries = max_retries;
        }
        if let Some(backoff) = self.retry_backoff_ms {
            download.retry_backoff = Duration::from_millis(backoff);
        }
        config.with_download_config(download)
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Safely convert C string pointer to Rust String
fn c_str_to_string(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(FetchError::InvalidInput("Null pointer received".to_string()));
    }
    // SAFETY: non-null pointer to a NUL-terminated string owned by the caller
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| FetchError::InvalidInput(format!("Invalid UTF-8: {}", e)))
    }
}

/// Convert Rust string to C string pointer
///
/// Caller MUST free the returned pointer using `rust_free_string()`
fn string_to_c_str(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => {
            // error_response() output never contains NUL bytes
            let error_json = error_response("String contains null bytes", "InternalError");
            CString::new(error_json)
                .map(CString::into_raw)
                .unwrap_or(std::ptr::null_mut())
        }
    }
}

fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

fn error_response(error: &str, kind: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error,
        "kind": kind
    })
    .to_string()
}

/// Error response carrying the user-facing message of a `FetchError`
fn fetch_error_response(error: &FetchError) -> String {
    let debug = format!("{:?}", error);
    let kind = debug
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("Unknown");
    error_response(&error.user_message(), kind)
}

/// Wrap a function call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> Result<String>,
{
    match panic::catch_unwind(panic::AssertUnwindSafe(f)) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => fetch_error_response(&e),
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            error_response(&format!("Rust panic: {}", panic_msg), "Panic")
        }
    }
}

fn runtime() -> Result<&'static tokio::runtime::Runtime> {
    RUNTIME
        .as_ref()
        .ok_or_else(|| FetchError::internal("Failed to create Tokio runtime"))
}

fn core() -> Result<Arc<MediaCore>> {
    let guard = CORE
        .read()
        .map_err(|_| FetchError::internal("Core lock poisoned"))?;
    guard
        .as_ref()
        .cloned()
        .ok_or_else(|| {
            FetchError::InvalidState("Core not initialized, call rust_init_core first".into())
        })
}

fn progress_forwarder(callback: ProgressFn) -> ProgressCallback {
    Arc::new(move |progress: DownloadProgress| {
        let Ok(json) = serde_json::to_string(&progress) else {
            return;
        };
        if let Ok(c_json) = CString::new(json) {
            callback(c_json.as_ptr());
        }
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Initialize the core
///
/// # Arguments
/// * `config_json` - `{"downloadDir": "...", "endpointConfigUrl"?: "...",
///   "userAgent"?: "...", "maxRetries"?: 3, "retryBackoffMs"?: 2000}`
///
/// Calling it again replaces the core; in-flight operations keep the old one.
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_init_core(config_json: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let _ = tracing_subscriber::fmt().with_target(false).try_init();

        let config_json = c_str_to_string(config_json)?;
        let config: BridgeConfig = serde_json::from_str(&config_json)
            .map_err(|e| FetchError::InvalidInput(format!("Invalid config JSON: {}", e)))?;
        let config = config.into_core_config();
        let download_dir = config.download_dir.clone();

        // reqwest clients must be built inside the runtime context
        let rt = runtime()?;
        let core = {
            let _enter = rt.enter();
            MediaCore::new(config)?
        };

        let mut slot = CORE
            .write()
            .map_err(|_| FetchError::internal("Core lock poisoned"))?;
        *slot = Some(Arc::new(core));
        info!(download_dir = %download_dir.display(), "Bridge initialized");

        Ok(success_response(serde_json::json!({
            "downloadDir": download_dir.to_string_lossy(),
            "version": env!("CARGO_PKG_VERSION"),
        })))
    });

    string_to_c_str(response)
}

/// Re-fetch the endpoint document
///
/// Intended for app foreground transitions. Never fails once the core is
/// initialized: an unreachable document yields the built-in fallback list.
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_refresh_endpoints() -> *mut c_char {
    let response = catch_panic(|| {
        let core = core()?;
        let endpoints = runtime()?.block_on(core.refresh_endpoints());
        Ok(success_response(endpoints))
    });

    string_to_c_str(response)
}

// ============================================================================
// MEDIA API
// ============================================================================

/// Fetch title, author, thumbnail, duration and size for a media URL
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_get_video_info(source_url: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let source_url = c_str_to_string(source_url)?;
        let core = core()?;
        let info = runtime()?.block_on(core.get_video_info(&source_url))?;
        Ok(success_response(info))
    });

    string_to_c_str(response)
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_search(query: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let query = c_str_to_string(query)?;
        let core = core()?;
        let results = runtime()?.block_on(core.search(&query))?;
        Ok(success_response(results))
    });

    string_to_c_str(response)
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_autocomplete(query: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let query = c_str_to_string(query)?;
        let core = core()?;
        let suggestions = runtime()?.block_on(core.autocomplete(&query))?;
        Ok(success_response(suggestions))
    });

    string_to_c_str(response)
}

// ============================================================================
// DOWNLOADS
// ============================================================================

/// Download a media item, blocking until it finishes or fails
///
/// # Arguments
/// * `request_json` - `{"sourceUrl": "...", "title": "...", "kind": "video"|"audio",
///   "quality"?: "...", "sourceId"?: "...", "thumbnail"?: "..."}`
/// * `progress_callback` - Optional, receives JSON-encoded progress snapshots
///   from a worker thread
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_download_media(
    request_json: *const c_char,
    progress_callback: Option<ProgressFn>,
) -> *mut c_char {
    let response = catch_panic(|| {
        let request_json = c_str_to_string(request_json)?;
        let request: DownloadRequest = serde_json::from_str(&request_json)
            .map_err(|e| FetchError::InvalidInput(format!("Invalid download request: {}", e)))?;
        let core = core()?;

        let callback = progress_callback.map(progress_forwarder);
        let outcome = runtime()?.block_on(core.download(request, callback))?;
        Ok(success_response(outcome))
    });

    string_to_c_str(response)
}

/// List downloaded files with their recorded metadata
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_list_downloads() -> *mut c_char {
    let response = catch_panic(|| {
        let core = core()?;
        let files = runtime()?.block_on(core.list_downloads())?;
        Ok(success_response(files))
    });

    string_to_c_str(response)
}

/// Delete a downloaded file and its metadata entry
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_delete_download(file_name: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let file_name = c_str_to_string(file_name)?;
        let core = core()?;
        let deleted = runtime()?.block_on(core.delete_download(&file_name))?;
        if !deleted {
            warn!(file = %file_name, "Delete requested for unknown download");
        }
        Ok(success_response(serde_json::json!({ "deleted": deleted })))
    });

    string_to_c_str(response)
}

// ============================================================================
// MEMORY MANAGEMENT
// ============================================================================

/// Free a string previously returned by any `rust_*` function
///
/// # Safety
/// This function MUST be called exactly once for each string returned by
/// any other Rust function. Calling it multiple times on the same pointer
/// will cause a double-free error.
#[no_mangle]
pub extern "C" fn rust_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn take(ptr: *mut c_char) -> serde_json::Value {
        assert!(!ptr.is_null());
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        rust_free_string(ptr);
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_success_response() {
        let response = success_response(serde_json::json!({"test": "data"}));
        assert!(response.contains("\"success\":true"));
        assert!(response.contains("\"test\":\"data\""));
    }

    #[test]
    fn test_error_response_uses_user_message() {
        let err = FetchError::server_rejected(429, "Rate limit reached".to_string(), None);
        let value: serde_json::Value = serde_json::from_str(&fetch_error_response(&err)).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Rate limit reached");
        assert_eq!(value["kind"], "ServerRejected");
    }

    #[test]
    fn test_catch_panic_normal() {
        let result = catch_panic(|| Ok("normal result".to_string()));
        assert_eq!(result, "normal result");
    }

    #[test]
    fn test_catch_panic_with_panic() {
        let result = catch_panic(|| -> Result<String> {
            panic!("test panic");
        });
        assert!(result.contains("\"success\":false"));
        assert!(result.contains("test panic"));
    }

    #[test]
    fn test_null_pointer_handling() {
        assert!(c_str_to_string(std::ptr::null()).is_err());

        let value = take(rust_get_video_info(std::ptr::null()));
        assert_eq!(value["success"], false);
    }

    #[test]
    fn test_bridge_config_parsing() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{"downloadDir":"/tmp/media","maxRetries":5,"retryBackoffMs":0}"#,
        )
        .unwrap();
        let core_config = config.into_core_config();
        assert_eq!(core_config.download_dir, PathBuf::from("/tmp/media"));
        assert_eq!(core_config.download.max_retries, 5);
        assert_eq!(core_config.download.retry_backoff, Duration::ZERO);
        assert_eq!(
            core_config.endpoint_config_url,
            crate::app::DEFAULT_ENDPOINT_CONFIG_URL
        );
    }

    #[test]
    fn test_invalid_config_json() {
        let input = CString::new("not json").unwrap();
        let value = take(rust_init_core(input.as_ptr()));
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "InvalidInput");
    }

    #[test]
    fn test_memory_safety() {
        let c_ptr = string_to_c_str("Memory test".to_string());
        assert!(!c_ptr.is_null());
        rust_free_string(c_ptr);
        rust_free_string(std::ptr::null_mut());
    }
}
