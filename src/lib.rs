//! ravendl library

pub mod backend;
pub mod downloader;
pub mod extractor;
pub mod history;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use downloader::{DownloadEvent, DownloadOrchestrator, Handle};
pub use extractor::{
    FetchSession, FormatProvider, ProjectedFormatModel, ProviderMode, SubmitKind,
};
pub use history::{HistoryEntry, HistoryStore};
pub use utils::{AppSettings, RavenError};
