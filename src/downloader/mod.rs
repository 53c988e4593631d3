//! Download orchestration module

pub mod orchestrator;
pub mod progress;
pub mod session;

// Re-export for convenience
pub use orchestrator::DownloadOrchestrator;
pub use progress::{DownloadEvent, DownloadExtras, DownloadRequest, Handle};
pub use session::{DownloadSession, SessionState};
