// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Retry policies with URL-based classification.
//!
//! Requests to the training service fall into two groups:
//!
//! - **Api**: tag listing, creation and deletion.  Small, sequential calls
//!   where an authentication failure must surface immediately.
//! - **Bulk**: image creation, listing and deletion (`…/images…`).  Large
//!   payloads issued many at a time, where rate limiting and timeouts are
//!   routine.
//!
//! # Retry Behavior
//!
//! Both scopes use the same retry count (`SYNTHSYNC_MAX_RETRIES`, default: 3)
//! and differ in which failures are retried:
//!
//! | Status | Api | Bulk |
//! |--------|-----|------|
//! | 401, 403 | never | never |
//! | 408, 429, 5xx | retry | retry |
//! | 409, 423 | never | retry |
//! | transport error | retry | retry |
//!
//! The request timeout is `SYNTHSYNC_TIMEOUT` seconds (default: 30).
//!
//! # Examples
//!
//! ```rust
//! use synthsync::{RetryScope, classify_url};
//!
//! let base = "https://example.cognitiveservices.azure.com/customvision/v3.3/training/projects/p";
//! assert_eq!(classify_url(&format!("{}/tags", base)), RetryScope::Api);
//! assert_eq!(classify_url(&format!("{}/images/files", base)), RetryScope::Bulk);
//! ```

use std::time::Duration;
use url::Url;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: u64 = 30;

/// Retry scope of a training service request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Tag and project calls; fail fast on authentication errors.
    Api,
    /// Image creation, listing and deletion; retry every transient failure.
    Bulk,
}

/// Classify a request URL by its path.
///
/// A URL whose path contains an `images` segment is [`RetryScope::Bulk`];
/// anything else, including URLs that do not parse, is [`RetryScope::Api`].
///
/// ```rust
/// use synthsync::{RetryScope, classify_url};
///
/// assert_eq!(classify_url("https://host/projects/p/images?skip=0&take=100"), RetryScope::Bulk);
/// assert_eq!(classify_url("https://host/projects/p/imagesets"), RetryScope::Api);
/// assert_eq!(classify_url("not a url"), RetryScope::Api);
/// ```
pub fn classify_url(url: &str) -> RetryScope {
    let is_bulk = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .map(|mut segments| segments.any(|segment| segment == "images"))
        })
        .unwrap_or(false);

    if is_bulk {
        RetryScope::Bulk
    } else {
        RetryScope::Api
    }
}

/// Maximum retries per request from `SYNTHSYNC_MAX_RETRIES`.
pub fn max_retries() -> u32 {
    std::env::var("SYNTHSYNC_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Request timeout from `SYNTHSYNC_TIMEOUT`.
pub fn request_timeout() -> Duration {
    let secs = std::env::var("SYNTHSYNC_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT);
    Duration::from_secs(secs)
}

/// Whether a response status should be retried in the given scope.
pub fn is_retryable(scope: &RetryScope, status: u16) -> bool {
    match (scope, status) {
        (_, 401 | 403) => false,
        (_, 408 | 429 | 500..=599) => true,
        (RetryScope::Bulk, 409 | 423) => true,
        _ => false,
    }
}

/// Build the retry policy installed on the HTTP client.
///
/// The reqwest retry builder takes a single retry count for every request;
/// the scopes differ only in which failures they classify as retryable.
pub fn create_retry_policy() -> reqwest::retry::Builder {
    reqwest::retry::for_host("*")
        .max_retries_per_request(max_retries())
        .classify_fn(|req_rep| {
            let scope = classify_url(&req_rep.uri().to_string());
            match req_rep.status() {
                Some(status) if is_retryable(&scope, status.as_u16()) => req_rep.retryable(),
                Some(_) => req_rep.success(),
                // No status code means a connection error, timeout or other
                // transport failure.
                None if req_rep.error().is_some() => req_rep.retryable(),
                None => req_rep.success(),
            }
        })
}

pub fn log_retry_configuration() {
    log::debug!(
        "Retry configuration - max_retries={}, timeout={}s",
        max_retries(),
        request_timeout().as_secs()
    );
}
