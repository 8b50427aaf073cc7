// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use std::path::PathBuf;

/// Error type for synthsync operations.
///
/// The first group of variants wraps failures from the libraries synthsync
/// builds on.  The second group is the ingestion and teardown taxonomy: those
/// variants are normally recorded in a report rather than returned, because a
/// single folder, capture, batch or page failing never aborts a run.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// UUID parsing error for project, tag or image identifiers.
    UuidError(uuid::Error),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// Error code and message reported by the training service.
    ApiError(String, String),
    /// Server returned an invalid or unexpected response.
    InvalidResponse,
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// Training key is empty or not provided.
    EmptyKey,
    /// The ingestion root directory could not be listed.
    RootUnreadable(PathBuf, std::io::Error),
    /// Annotation JSON could not be read or decoded.
    MalformedAnnotation(PathBuf, String),
    /// Remote lookup or creation of a tag failed.
    TagResolutionFailed(String, String),
    /// Image bytes or image dimensions could not be read.
    ImageLoadFailed(PathBuf, String),
    /// A create-images call failed or reported per-image errors.
    BatchUploadFailed(usize, String),
    /// Listing a page of images failed at the given offset.
    PageFetchFailed(usize, String),
    /// Deleting a batch of images failed.
    BatchDeleteFailed(usize, String),
    /// Deleting a tag failed.
    TagDeleteFailed(String, String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::UuidError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::UuidError(e) => write!(f, "Invalid identifier: {}", e),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::ApiError(code, msg) => write!(f, "Service error {}: {}", code, msg),
            Error::InvalidResponse => write!(f, "Invalid server response"),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            Error::EmptyKey => write!(f, "Training key is empty"),
            Error::RootUnreadable(path, e) => {
                write!(f, "Cannot read root directory {:?}: {}", path, e)
            }
            Error::MalformedAnnotation(path, msg) => {
                write!(f, "Malformed annotation {:?}: {}", path, msg)
            }
            Error::TagResolutionFailed(label, msg) => {
                write!(f, "Tag resolution failed for '{}': {}", label, msg)
            }
            Error::ImageLoadFailed(path, msg) => write!(f, "Image load failed {:?}: {}", path, msg),
            Error::BatchUploadFailed(chunk, msg) => {
                write!(f, "Upload of batch {} failed: {}", chunk, msg)
            }
            Error::PageFetchFailed(skip, msg) => {
                write!(f, "Fetching images at offset {} failed: {}", skip, msg)
            }
            Error::BatchDeleteFailed(count, msg) => {
                write!(f, "Deleting batch of {} images failed: {}", count, msg)
            }
            Error::TagDeleteFailed(name, msg) => {
                write!(f, "Deleting tag '{}' failed: {}", name, msg)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::UuidError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            Error::RootUnreadable(_, e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_display_carries_context() {
        let err = Error::TagResolutionFailed("cup".to_string(), "timeout".to_string());
        assert!(err.to_string().contains("cup"));
        assert!(err.to_string().contains("timeout"));

        let err = Error::PageFetchFailed(300, "503".to_string());
        assert!(err.to_string().contains("300"));

        let err = Error::MalformedAnnotation(PathBuf::from("/data/c"), "eof".to_string());
        assert!(err.to_string().contains("/data/c"));
    }

    #[test]
    fn test_source_for_wrapped_errors() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::RootUnreadable(PathBuf::from("/missing"), io);
        assert!(err.source().is_some());

        let err = Error::BatchUploadFailed(2, "boom".to_string());
        assert!(err.source().is_none());
    }
}
