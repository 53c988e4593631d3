//! Runs downloads through the active provider, keyed by caller handles

use super::progress::{DownloadEvent, DownloadExtras, DownloadRequest, Handle};
use super::session::{DownloadSession, SessionState};
use crate::extractor::FormatProvider;
use crate::utils::error::RavenError;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relay buffer between a provider and the orchestrator
const RELAY_CAPACITY: usize = 64;

struct ActiveDownload {
    session: DownloadSession,
    cancel: CancellationToken,
}

/// Download orchestrator
///
/// Any number of downloads may run concurrently. Every event carries the
/// handle it belongs to and each handle gets exactly one terminal event.
pub struct DownloadOrchestrator {
    provider: Arc<dyn FormatProvider>,
    working_dir: PathBuf,
    downloads: Arc<Mutex<HashMap<Handle, ActiveDownload>>>,
}

impl DownloadOrchestrator {
    pub fn new(provider: Arc<dyn FormatProvider>, working_dir: PathBuf) -> Self {
        Self {
            provider,
            working_dir,
            downloads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// Start a download without extra switches
    pub async fn start_download(
        &self,
        url: &str,
        format_id: &str,
        output_template: &str,
        handle: Handle,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<()> {
        self.start_download_with(
            url,
            format_id,
            output_template,
            DownloadExtras::default(),
            handle,
            events,
        )
        .await
    }

    /// Start a download. Events for `handle` are sent to `events`.
    ///
    /// Fails with `HandleInUse` while an earlier download with the same
    /// handle has not reached a terminal state. A terminal session under the
    /// same handle is replaced.
    pub async fn start_download_with(
        &self,
        url: &str,
        format_id: &str,
        output_template: &str,
        extras: DownloadExtras,
        handle: Handle,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let mut downloads = self.downloads.lock().await;
            if let Some(existing) = downloads.get(&handle) {
                if !existing.session.state.is_terminal() {
                    return Err(RavenError::HandleInUse(handle).into());
                }
            }
            let mut session = DownloadSession::new(handle, url, format_id, output_template);
            session.state = SessionState::Running;
            downloads.insert(
                handle,
                ActiveDownload {
                    session,
                    cancel: cancel.clone(),
                },
            );
        }

        let request = DownloadRequest {
            handle,
            url: url.to_string(),
            format_id: format_id.to_string(),
            output_template: output_template.to_string(),
            working_dir: self.working_dir.clone(),
            extras,
        };

        info!(
            "Starting download {} via {}: {} [{}]",
            handle,
            self.provider.id(),
            url,
            format_id
        );

        let provider = Arc::clone(&self.provider);
        let downloads = Arc::clone(&self.downloads);
        tokio::spawn(async move {
            let (relay_tx, mut relay_rx) = mpsc::channel(RELAY_CAPACITY);
            let worker = tokio::spawn(async move {
                provider.download(request, cancel, relay_tx).await;
            });

            let mut terminal_sent = false;
            while let Some(event) = relay_rx.recv().await {
                if event.handle() != handle {
                    warn!(
                        "Dropping event for handle {} on the channel of {}",
                        event.handle(),
                        handle
                    );
                    continue;
                }
                if terminal_sent {
                    debug!("Ignoring event after terminal for {}: {:?}", handle, event);
                    continue;
                }
                terminal_sent = event.is_terminal();
                Self::record(&downloads, &event).await;
                let _ = events.send(event).await;
            }

            if let Err(e) = worker.await {
                error!("Download worker for {} ended abnormally: {}", handle, e);
            }

            // Provider broke its contract; the caller still gets a terminal event
            if !terminal_sent {
                let event = DownloadEvent::Failed {
                    handle,
                    message: RavenError::DownloadError("ended without a result".into())
                        .to_string(),
                };
                Self::record(&downloads, &event).await;
                let _ = events.send(event).await;
            }
        });

        Ok(())
    }

    async fn record(downloads: &Mutex<HashMap<Handle, ActiveDownload>>, event: &DownloadEvent) {
        let mut downloads = downloads.lock().await;
        if let Some(active) = downloads.get_mut(&event.handle()) {
            active.session.apply(event);
        }
        match event {
            DownloadEvent::Finished { handle, file_path } => {
                info!("Download {} finished: {:?}", handle, file_path)
            }
            DownloadEvent::Failed { handle, message } => {
                error!("Download {} failed: {}", handle, message)
            }
            DownloadEvent::Cancelled { handle } => info!("Download {} cancelled", handle),
            DownloadEvent::Progress { .. } => {}
        }
    }

    /// Cancel every running download. Returns how many were signalled.
    ///
    /// Library-backed downloads cannot be interrupted, so this only logs in
    /// that mode.
    pub async fn stop_process(&self) -> usize {
        if !self.provider.supports_cancel() {
            warn!(
                "Stop requested but {} downloads cannot be interrupted",
                self.provider.id()
            );
            return 0;
        }

        let downloads = self.downloads.lock().await;
        let mut stopped = 0;
        for active in downloads.values() {
            if !active.session.state.is_terminal() && !active.cancel.is_cancelled() {
                active.cancel.cancel();
                stopped += 1;
            }
        }
        info!("Stop requested, signalled {} download(s)", stopped);
        stopped
    }

    /// Cancel one download
    pub async fn cancel(&self, handle: Handle) -> Result<()> {
        let downloads = self.downloads.lock().await;
        let active = downloads
            .get(&handle)
            .ok_or(RavenError::SessionNotFound(handle))?;

        if active.session.state.is_terminal() {
            debug!("Download {} already finished, nothing to cancel", handle);
            return Ok(());
        }
        if !self.provider.supports_cancel() {
            return Err(RavenError::OperationFailed(format!(
                "{} downloads cannot be cancelled",
                self.provider.id()
            ))
            .into());
        }

        active.cancel.cancel();
        Ok(())
    }

    /// Snapshot of one session
    pub async fn session(&self, handle: Handle) -> Option<DownloadSession> {
        self.downloads
            .lock()
            .await
            .get(&handle)
            .map(|a| a.session.clone())
    }

    /// Snapshot of every known session, ordered by handle
    pub async fn sessions(&self) -> Vec<DownloadSession> {
        let downloads = self.downloads.lock().await;
        let mut sessions: Vec<_> = downloads.values().map(|a| a.session.clone()).collect();
        sessions.sort_by_key(|s| s.handle);
        sessions
    }

    /// Forget a finished session and return it. Running sessions stay.
    pub async fn acknowledge(&self, handle: Handle) -> Option<DownloadSession> {
        let mut downloads = self.downloads.lock().await;
        match downloads.get(&handle) {
            Some(active) if active.session.state.is_terminal() => {
                downloads.remove(&handle).map(|a| a.session)
            }
            _ => None,
        }
    }

    /// Number of downloads not yet in a terminal state
    pub async fn active_count(&self) -> usize {
        self.downloads
            .lock()
            .await
            .values()
            .filter(|a| !a.session.state.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractEvent, ProviderMode};
    use async_trait::async_trait;

    /// Emits one progress step then waits for cancellation or finishes
    struct ScriptedProvider {
        wait_for_cancel: bool,
    }

    #[async_trait]
    impl FormatProvider for ScriptedProvider {
        fn id(&self) -> &'static str {
            "scripted"
        }

        fn mode(&self) -> ProviderMode {
            ProviderMode::Subprocess
        }

        async fn extract(
            &self,
            _url: &str,
            _is_playlist: bool,
            _cancel: CancellationToken,
            events: mpsc::Sender<ExtractEvent>,
        ) {
            let _ = events.send(ExtractEvent::Finished).await;
        }

        async fn download(
            &self,
            request: DownloadRequest,
            cancel: CancellationToken,
            events: mpsc::Sender<DownloadEvent>,
        ) {
            let handle = request.handle;
            let _ = events.send(DownloadEvent::Progress { handle, percent: 50 }).await;
            if self.wait_for_cancel {
                cancel.cancelled().await;
                let _ = events.send(DownloadEvent::Cancelled { handle }).await;
            } else {
                let _ = events
                    .send(DownloadEvent::Finished {
                        handle,
                        file_path: Some(request.working_dir.join("out.mp4")),
                    })
                    .await;
            }
        }

        fn supports_cancel(&self) -> bool {
            true
        }
    }

    /// Returns without sending anything
    struct SilentProvider;

    #[async_trait]
    impl FormatProvider for SilentProvider {
        fn id(&self) -> &'static str {
            "silent"
        }

        fn mode(&self) -> ProviderMode {
            ProviderMode::Library
        }

        async fn extract(
            &self,
            _url: &str,
            _is_playlist: bool,
            _cancel: CancellationToken,
            events: mpsc::Sender<ExtractEvent>,
        ) {
            let _ = events.send(ExtractEvent::Finished).await;
        }

        async fn download(
            &self,
            _request: DownloadRequest,
            _cancel: CancellationToken,
            _events: mpsc::Sender<DownloadEvent>,
        ) {
        }

        fn supports_cancel(&self) -> bool {
            false
        }
    }

    async fn drain_until_terminal(rx: &mut mpsc::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = event.is_terminal();
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_download_finishes() {
        let orchestrator = DownloadOrchestrator::new(
            Arc::new(ScriptedProvider { wait_for_cancel: false }),
            PathBuf::from("/downloads"),
        );
        let (tx, mut rx) = mpsc::channel(16);
        orchestrator
            .start_download("https://youtu.be/abc", "18", "%(id)s.%(ext)s", 7, tx)
            .await
            .unwrap();

        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(events[0], DownloadEvent::Progress { handle: 7, percent: 50 });
        assert_eq!(
            events[1],
            DownloadEvent::Finished {
                handle: 7,
                file_path: Some(PathBuf::from("/downloads/out.mp4"))
            }
        );

        // Sessions are recorded before the event is forwarded
        let session = orchestrator.acknowledge(7).await.unwrap();
        assert_eq!(session.state, SessionState::Succeeded);
        assert_eq!(session.progress, 100);
        assert!(orchestrator.session(7).await.is_none());
    }

    #[tokio::test]
    async fn test_handle_in_use() {
        let orchestrator = DownloadOrchestrator::new(
            Arc::new(ScriptedProvider { wait_for_cancel: true }),
            PathBuf::from("."),
        );
        let (tx, mut rx) = mpsc::channel(16);
        orchestrator
            .start_download("u", "f", "t", 1, tx.clone())
            .await
            .unwrap();

        let err = orchestrator
            .start_download("u", "f", "t", 1, tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RavenError>(),
            Some(RavenError::HandleInUse(1))
        ));

        orchestrator.cancel(1).await.unwrap();
        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(events.last(), Some(&DownloadEvent::Cancelled { handle: 1 }));
    }

    #[tokio::test]
    async fn test_stop_process_cancels_all() {
        let orchestrator = DownloadOrchestrator::new(
            Arc::new(ScriptedProvider { wait_for_cancel: true }),
            PathBuf::from("."),
        );
        let (tx, mut rx) = mpsc::channel(16);
        orchestrator.start_download("a", "f", "t", 1, tx.clone()).await.unwrap();
        orchestrator.start_download("b", "f", "t", 2, tx).await.unwrap();

        assert_eq!(orchestrator.stop_process().await, 2);

        let mut cancelled = Vec::new();
        while cancelled.len() < 2 {
            if let Some(DownloadEvent::Cancelled { handle }) = rx.recv().await {
                cancelled.push(handle);
            }
        }
        cancelled.sort();
        assert_eq!(cancelled, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_silent_provider_still_terminates() {
        let orchestrator = DownloadOrchestrator::new(Arc::new(SilentProvider), PathBuf::from("."));
        let (tx, mut rx) = mpsc::channel(4);
        orchestrator.start_download("u", "f", "t", 9, tx).await.unwrap();

        let events = drain_until_terminal(&mut rx).await;
        assert_eq!(
            events,
            vec![DownloadEvent::Failed {
                handle: 9,
                message: "Download failed: ended without a result".into()
            }]
        );
        assert_eq!(orchestrator.stop_process().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let orchestrator = DownloadOrchestrator::new(Arc::new(SilentProvider), PathBuf::from("."));
        assert!(orchestrator.cancel(42).await.is_err());
        assert!(orchestrator.session(42).await.is_none());
        assert!(orchestrator.acknowledge(42).await.is_none());
        assert_eq!(orchestrator.active_count().await, 0);
    }
}
