//! One metadata fetch, from submitted URL to projected models

use crate::extractor::models::{PlaylistMetadata, VideoMetadata};
use crate::extractor::projector::{project, ProjectedFormatModel};
use crate::extractor::traits::{ExtractEvent, FormatProvider};
use crate::extractor::url::{classify_submission, SubmitKind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EXTRACT_CHANNEL_CAPACITY: usize = 32;

/// What a fetch reports while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    FormatsUpdated(ProjectedFormatModel),
    Message(String),
    Finished {
        playlist_title: Option<String>,
        entry_count: usize,
    },
}

/// Everything a finished fetch produced
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    /// URL handed to the provider, `None` when the submission was rejected
    pub target_url: Option<String>,
    pub playlist_title: Option<String>,
    pub entry_count: usize,
    pub models: Vec<ProjectedFormatModel>,
    pub messages: Vec<String>,
}

#[derive(Default)]
struct FetchState {
    playlist_title: Option<String>,
    n_entries: Option<usize>,
    models: Vec<ProjectedFormatModel>,
    messages: Vec<String>,
}

/// Drives a provider extraction and projects every object it yields
pub struct FetchSession {
    provider: Arc<dyn FormatProvider>,
}

impl FetchSession {
    pub fn new(provider: Arc<dyn FormatProvider>) -> Self {
        Self { provider }
    }

    /// Fetch `url` and report through `events`.
    ///
    /// Exactly one `FetchEvent::Finished` is sent, after every model, also
    /// when `cancel` stops the extraction early.
    pub async fn run(
        &mut self,
        url: &str,
        kind: SubmitKind,
        cancel: CancellationToken,
        events: &mpsc::Sender<FetchEvent>,
    ) -> FetchSummary {
        let target = match classify_submission(url, kind) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejected submission {}: {}", url, e);
                let message = e.to_string();
                let _ = events.send(FetchEvent::Message(message.clone())).await;
                let _ = events
                    .send(FetchEvent::Finished {
                        playlist_title: None,
                        entry_count: 0,
                    })
                    .await;
                return FetchSummary {
                    messages: vec![message],
                    ..Default::default()
                };
            }
        };

        let is_playlist = kind == SubmitKind::Playlist;
        info!(
            "Fetching {} ({}) via {}",
            target,
            if is_playlist { "playlist" } else { "video" },
            self.provider.id()
        );

        let (tx, mut rx) = mpsc::channel(EXTRACT_CHANNEL_CAPACITY);
        let producer = self.provider.extract(&target, is_playlist, cancel, tx);
        let consumer = async {
            let mut state = FetchState::default();
            while let Some(event) = rx.recv().await {
                match event {
                    ExtractEvent::Object(value) => {
                        Self::handle_object(&value, &mut state, events).await
                    }
                    ExtractEvent::Error(message) => {
                        state.messages.push(message.clone());
                        let _ = events.send(FetchEvent::Message(message)).await;
                    }
                    ExtractEvent::Finished => break,
                }
            }
            state
        };
        let ((), state) = tokio::join!(producer, consumer);

        let entry_count = state.n_entries.unwrap_or(state.models.len());
        info!(
            "Fetch of {} finished: {} video(s), {} message(s)",
            target,
            state.models.len(),
            state.messages.len()
        );
        let _ = events
            .send(FetchEvent::Finished {
                playlist_title: state.playlist_title.clone(),
                entry_count,
            })
            .await;

        FetchSummary {
            target_url: Some(target),
            playlist_title: state.playlist_title,
            entry_count,
            models: state.models,
            messages: state.messages,
        }
    }

    async fn handle_object(value: &Value, state: &mut FetchState, events: &mpsc::Sender<FetchEvent>) {
        if PlaylistMetadata::is_playlist_object(value) {
            match PlaylistMetadata::from_value(value) {
                Ok(playlist) => {
                    debug!(
                        "Playlist {:?} with {} entries",
                        playlist.title, playlist.entry_count
                    );
                    state.playlist_title = Some(playlist.title);
                    state.n_entries = Some(playlist.entry_count);
                    for entry in &playlist.entries {
                        Self::emit(project(entry), state, events).await;
                    }
                }
                Err(e) => Self::report(format!("Unreadable playlist metadata: {}", e), state, events).await,
            }
            return;
        }

        match VideoMetadata::from_value(value) {
            Ok(video) => {
                if let Some(title) = video.playlist_title.as_ref().filter(|t| !t.is_empty()) {
                    state.playlist_title.get_or_insert_with(|| title.clone());
                }
                if let Some(n) = video.n_entries {
                    state.n_entries.get_or_insert(n as usize);
                }
                Self::emit(project(&video), state, events).await;
            }
            Err(e) => Self::report(format!("Unreadable video metadata: {}", e), state, events).await,
        }
    }

    async fn emit(model: ProjectedFormatModel, state: &mut FetchState, events: &mpsc::Sender<FetchEvent>) {
        debug!(
            "Projected {} ({} video, {} audio tracks)",
            model.id,
            model.video.len(),
            model.audio.len()
        );
        state.models.push(model.clone());
        let _ = events.send(FetchEvent::FormatsUpdated(model)).await;
    }

    async fn report(message: String, state: &mut FetchState, events: &mpsc::Sender<FetchEvent>) {
        warn!("{}", message);
        state.messages.push(message.clone());
        let _ = events.send(FetchEvent::Message(message)).await;
    }
}
