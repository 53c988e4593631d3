use crate::downloader::{DownloadEvent, DownloadExtras, Handle};
use crate::extractor::{FetchEvent, ProjectedFormatModel, SubmitKind};
use crate::history::HistoryEntry;
use std::path::PathBuf;

/// Commands sent from the front-end to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Fetch formats for a video or playlist
    Submit {
        url: String,
        kind: SubmitKind,
    },
    StartDownload {
        url: String,
        format_id: String,
        /// Falls back to the configured template
        output_template: Option<String>,
        /// Subtitle switches and ffmpeg override
        extras: DownloadExtras,
        handle: Handle,
    },
    /// Stop the running fetch and every running download
    StopProcess,
    Cancel(Handle),
    /// Forget a finished download
    Acknowledge(Handle),
    LoadHistory,
    ClearHistory,
    // System
    Shutdown,
}

/// Events sent from the backend to the front-end
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    // Fetch
    FetchStarted,
    FormatsUpdated(ProjectedFormatModel),
    FetchFinished {
        playlist_title: Option<String>,
        entry_count: usize,
    },

    // Download life-cycle
    DownloadProgress {
        percent: u8,
        handle: Handle,
    },
    DownloadFinished {
        handle: Handle,
        file_path: Option<PathBuf>,
    },
    DownloadFailed {
        handle: Handle,
        message: String,
    },
    DownloadCancelled {
        handle: Handle,
    },

    History(Vec<HistoryEntry>),

    // User-facing text: errors, warnings, notices
    Message(String),
}

impl From<FetchEvent> for BackendEvent {
    fn from(event: FetchEvent) -> Self {
        match event {
            FetchEvent::FormatsUpdated(model) => Self::FormatsUpdated(model),
            FetchEvent::Message(text) => Self::Message(text),
            FetchEvent::Finished {
                playlist_title,
                entry_count,
            } => Self::FetchFinished {
                playlist_title,
                entry_count,
            },
        }
    }
}

impl From<DownloadEvent> for BackendEvent {
    fn from(event: DownloadEvent) -> Self {
        match event {
            DownloadEvent::Progress { handle, percent } => Self::DownloadProgress { percent, handle },
            DownloadEvent::Finished { handle, file_path } => {
                Self::DownloadFinished { handle, file_path }
            }
            DownloadEvent::Failed { handle, message } => Self::DownloadFailed { handle, message },
            DownloadEvent::Cancelled { handle } => Self::DownloadCancelled { handle },
        }
    }
}
