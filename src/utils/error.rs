//! Error handling for ravendl

use crate::downloader::Handle;
use thiserror::Error;

/// Main error type for ravendl
#[derive(Debug, Error)]
pub enum RavenError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("yt-dlp library unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Failed to extract video info: {0}")]
    ExtractionError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Download handle {0} is already in use")]
    HandleInUse(Handle),

    #[error("No download session for handle {0}")]
    SessionNotFound(Handle),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}
