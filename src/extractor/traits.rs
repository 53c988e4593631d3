use crate::downloader::{DownloadEvent, DownloadRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How yt-dlp is reached
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Library first, subprocess when the library cannot initialize
    #[default]
    Auto,
    /// In-process yt-dlp library only
    Library,
    /// yt-dlp binary only
    Subprocess,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Library => write!(f, "library"),
            Self::Subprocess => write!(f, "subprocess"),
        }
    }
}

/// Events of one extraction: zero or more objects, then exactly one
/// `Finished`. Errors may appear anywhere before `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractEvent {
    Object(Value),
    Error(String),
    Finished,
}

/// Core trait for the two ways of talking to yt-dlp
///
/// Both variants share one contract so the rest of the application never
/// knows which one is active. The variant is chosen once, at construction.
#[async_trait]
pub trait FormatProvider: Send + Sync {
    /// Returns a unique identifier for this provider (e.g., "ytdlp-subprocess")
    fn id(&self) -> &'static str;

    /// Which variant this is. Never `Auto`.
    fn mode(&self) -> ProviderMode;

    /// Fetch metadata for `url`.
    ///
    /// Implementations must send exactly one `ExtractEvent::Finished` as
    /// their last event, whatever happens, including after `cancel` fires.
    async fn extract(
        &self,
        url: &str,
        is_playlist: bool,
        cancel: CancellationToken,
        events: mpsc::Sender<ExtractEvent>,
    );

    /// Run one download.
    ///
    /// Implementations must send exactly one terminal event
    /// (`Finished`, `Failed` or `Cancelled`) as their last event.
    async fn download(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
        events: mpsc::Sender<DownloadEvent>,
    );

    /// Whether `extract` and `download` react to their cancellation tokens
    fn supports_cancel(&self) -> bool;
}
