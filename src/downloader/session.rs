//! Per-handle download bookkeeping

use super::progress::{DownloadEvent, Handle};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Session state
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Pending,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Pending
    }
}

/// One download, from start until the caller acknowledges its outcome
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub handle: Handle,
    pub url: String,
    pub format_id: String,
    pub output_template: String,
    /// 0-100
    pub progress: u8,
    pub state: SessionState,
    pub file_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl DownloadSession {
    pub fn new(handle: Handle, url: &str, format_id: &str, output_template: &str) -> Self {
        Self {
            handle,
            url: url.to_string(),
            format_id: format_id.to_string(),
            output_template: output_template.to_string(),
            progress: 0,
            state: SessionState::Pending,
            file_path: None,
            started_at: Utc::now(),
        }
    }

    /// Fold an event into the session. Events after a terminal state are
    /// ignored and `false` is returned.
    pub fn apply(&mut self, event: &DownloadEvent) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match event {
            DownloadEvent::Progress { percent, .. } => {
                self.state = SessionState::Running;
                self.progress = (*percent).min(100);
            }
            DownloadEvent::Finished { file_path, .. } => {
                self.state = SessionState::Succeeded;
                self.progress = 100;
                self.file_path = file_path.clone();
            }
            DownloadEvent::Failed { message, .. } => {
                self.state = SessionState::Failed(message.clone());
            }
            DownloadEvent::Cancelled { .. } => {
                self.state = SessionState::Cancelled;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut session = DownloadSession::new(1, "https://youtu.be/abc", "18", "%(id)s.%(ext)s");
        assert_eq!(session.state, SessionState::Pending);

        assert!(session.apply(&DownloadEvent::Progress { handle: 1, percent: 40 }));
        assert_eq!(session.state, SessionState::Running);
        assert_eq!(session.progress, 40);

        assert!(session.apply(&DownloadEvent::Finished {
            handle: 1,
            file_path: Some(PathBuf::from("/tmp/abc.mp4")),
        }));
        assert_eq!(session.state, SessionState::Succeeded);
        assert_eq!(session.progress, 100);

        // Terminal state sticks
        assert!(!session.apply(&DownloadEvent::Failed { handle: 1, message: "late".into() }));
        assert_eq!(session.state, SessionState::Succeeded);
    }

    #[test]
    fn test_failed_keeps_progress() {
        let mut session = DownloadSession::new(2, "u", "f", "t");
        session.apply(&DownloadEvent::Progress { handle: 2, percent: 63 });
        session.apply(&DownloadEvent::Failed { handle: 2, message: "HTTP 403".into() });
        assert_eq!(session.progress, 63);
        assert_eq!(session.state, SessionState::Failed("HTTP 403".into()));
        assert!(session.state.is_terminal());
    }
}
