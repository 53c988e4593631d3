use super::messages::{BackendCommand, BackendEvent};
use crate::downloader::{DownloadEvent, DownloadExtras, DownloadOrchestrator, Handle};
use crate::extractor::{select_provider, FetchEvent, FetchSession, FormatProvider, SubmitKind};
use crate::history::{HistoryEntry, HistoryStore};
use crate::utils::config::AppSettings;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DOWNLOAD_CHANNEL_CAPACITY: usize = 64;
const FETCH_CHANNEL_CAPACITY: usize = 64;

pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    // Components
    settings: AppSettings,
    provider: Arc<dyn FormatProvider>,
    fetcher: Arc<Mutex<FetchSession>>,
    /// Token of the most recent fetch
    fetch_cancel: Option<CancellationToken>,
    orchestrator: Arc<DownloadOrchestrator>,
    history: HistoryStore,
}

impl BackendActor {
    /// Build the actor, selecting the provider from `settings.mode`
    pub async fn new(
        settings: AppSettings,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Result<Self> {
        let provider = select_provider(&settings)?;
        Ok(Self::with_provider(settings, provider, receiver, sender))
    }

    /// Build the actor around an existing provider
    pub fn with_provider(
        settings: AppSettings,
        provider: Arc<dyn FormatProvider>,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            Arc::clone(&provider),
            settings.download_location.clone(),
        ));
        let history = HistoryStore::new(settings.history_file.clone());
        let fetcher = Arc::new(Mutex::new(FetchSession::new(Arc::clone(&provider))));

        Self {
            receiver,
            sender,
            settings,
            provider,
            fetcher,
            fetch_cancel: None,
            orchestrator,
            history,
        }
    }

    pub fn provider(&self) -> &Arc<dyn FormatProvider> {
        &self.provider
    }

    pub async fn run(mut self) {
        info!("BackendActor started with {}", self.provider.id());

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::Submit { url, kind } => {
                    self.handle_submit(url, kind).await;
                }
                BackendCommand::StartDownload {
                    url,
                    format_id,
                    output_template,
                    extras,
                    handle,
                } => {
                    self.handle_start_download(url, format_id, output_template, extras, handle)
                        .await;
                }
                BackendCommand::StopProcess => {
                    self.stop_fetch();
                    self.orchestrator.stop_process().await;
                }
                BackendCommand::Cancel(handle) => {
                    if let Err(e) = self.orchestrator.cancel(handle).await {
                        self.message(e.to_string()).await;
                    }
                }
                BackendCommand::Acknowledge(handle) => {
                    self.orchestrator.acknowledge(handle).await;
                }
                BackendCommand::LoadHistory => {
                    let entries = self.history.load().await;
                    let _ = self.sender.send(BackendEvent::History(entries)).await;
                }
                BackendCommand::ClearHistory => match self.history.clear().await {
                    Ok(()) => {
                        let _ = self.sender.send(BackendEvent::History(Vec::new())).await;
                    }
                    Err(e) => self.message(format!("Failed to clear history: {}", e)).await,
                },
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    self.stop_fetch();
                    self.orchestrator.stop_process().await;
                    break;
                }
            }
        }
    }

    async fn message(&self, text: String) {
        let _ = self.sender.send(BackendEvent::Message(text)).await;
    }

    /// Signal the running fetch, if any
    fn stop_fetch(&self) {
        let Some(token) = &self.fetch_cancel else {
            return;
        };
        if token.is_cancelled() {
            return;
        }
        if !self.provider.supports_cancel() {
            warn!(
                "Stop requested but {} extractions cannot be interrupted",
                self.provider.id()
            );
            return;
        }
        info!("Stopping the running fetch");
        token.cancel();
    }

    async fn handle_submit(&mut self, url: String, kind: SubmitKind) {
        // One fetch at a time
        let Ok(mut fetcher) = Arc::clone(&self.fetcher).try_lock_owned() else {
            warn!("Fetch already running, ignoring {}", url);
            self.message("A fetch is already in progress".to_string()).await;
            return;
        };

        let cancel = CancellationToken::new();
        self.fetch_cancel = Some(cancel.clone());
        let _ = self.sender.send(BackendEvent::FetchStarted).await;

        let sender = self.sender.clone();
        let history = self.history.clone();
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(FETCH_CHANNEL_CAPACITY);
            let fetch = async {
                let summary = fetcher.run(&url, kind, cancel, &tx).await;
                drop(tx);
                // Free the session before the front-end hears the fetch ended
                drop(fetcher);
                summary
            };
            let forward = async {
                let mut finished = None;
                while let Some(event) = rx.recv().await {
                    match event {
                        FetchEvent::Finished { .. } => finished = Some(event),
                        other => {
                            let _ = sender.send(BackendEvent::from(other)).await;
                        }
                    }
                }
                finished
            };
            let (summary, finished) = tokio::join!(fetch, forward);

            let submitted = summary.target_url.as_deref().unwrap_or(&url);
            let entries = summary
                .models
                .iter()
                .map(|m| HistoryEntry::fetched(m, submitted));
            if let Err(e) = history.extend(entries).await {
                error!("Failed to record fetch history: {}", e);
            }

            if let Some(event) = finished {
                let _ = sender.send(BackendEvent::from(event)).await;
            }
        });
    }

    async fn handle_start_download(
        &self,
        url: String,
        format_id: String,
        output_template: Option<String>,
        extras: DownloadExtras,
        handle: Handle,
    ) {
        let template = self.settings.template_or_default(output_template.as_deref());
        let extras = extras.or_ffmpeg_location(self.settings.ffmpeg_dir());

        let (tx, rx) = mpsc::channel(DOWNLOAD_CHANNEL_CAPACITY);
        match self
            .orchestrator
            .start_download_with(&url, &format_id, &template, extras, handle, tx)
            .await
        {
            Ok(()) => {
                tokio::spawn(Self::relay_download(
                    rx,
                    url,
                    format_id,
                    self.sender.clone(),
                    self.history.clone(),
                ));
            }
            Err(e) => {
                warn!("Could not start download {}: {}", handle, e);
                self.message(e.to_string()).await;
            }
        }
    }

    /// Forward one download's events, recording its outcome first
    async fn relay_download(
        mut receiver: mpsc::Receiver<DownloadEvent>,
        url: String,
        format_id: String,
        sender: mpsc::Sender<BackendEvent>,
        history: HistoryStore,
    ) {
        while let Some(event) = receiver.recv().await {
            if event.is_terminal() {
                Self::record_download(&event, &url, &format_id, &history).await;
            }
            let _ = sender.send(BackendEvent::from(event)).await;
        }
    }

    async fn record_download(
        event: &DownloadEvent,
        url: &str,
        format_id: &str,
        history: &HistoryStore,
    ) {
        let handle = event.handle();
        let entry = match event {
            DownloadEvent::Finished { file_path, .. } => {
                HistoryEntry::downloaded(url, format_id, file_path.clone())
            }
            DownloadEvent::Failed { message, .. } => {
                HistoryEntry::unfinished(url, format_id, handle, Some(message.clone()))
            }
            DownloadEvent::Cancelled { .. } => {
                HistoryEntry::unfinished(url, format_id, handle, None)
            }
            DownloadEvent::Progress { .. } => return,
        };

        if let Err(e) = history.append(entry).await {
            error!("Failed to record download {}: {}", handle, e);
        }
    }
}
