//! In-process yt-dlp library provider
//!
//! The library is not safe to enter from several threads at once, so every
//! call runs on the blocking pool while holding one process-wide lock.

use crate::downloader::progress::percent_from;
use crate::downloader::{DownloadEvent, DownloadRequest};
use crate::extractor::traits::{ExtractEvent, FormatProvider, ProviderMode};
use crate::utils::error::RavenError;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Held for the duration of every library call
static LIBRARY_LOCK: Mutex<()> = Mutex::new(());

/// Options passed to the library's metadata extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractOptions {
    pub quiet: bool,
    pub no_warnings: bool,
    pub extract_flat: bool,
    pub noplaylist: bool,
}

impl ExtractOptions {
    pub fn for_request(is_playlist: bool) -> Self {
        Self {
            quiet: true,
            no_warnings: true,
            extract_flat: is_playlist,
            noplaylist: !is_playlist,
        }
    }
}

/// Options passed to the library's download
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOptions {
    pub format: String,
    pub outtmpl: String,
    /// yt-dlp resolves relative templates against `paths.home`
    pub paths: HashMap<String, PathBuf>,
    pub writesubtitles: bool,
    pub writeautomaticsub: bool,
    pub embedsubtitles: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub postprocessors: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_location: Option<PathBuf>,
}

impl DownloadOptions {
    pub fn from_request(request: &DownloadRequest) -> Self {
        let mut paths = HashMap::new();
        paths.insert("home".to_string(), request.working_dir.clone());

        let extras = &request.extras;
        let embed = extras.embeds_subtitles();
        let postprocessors = if embed {
            vec![json!({"key": "FFmpegEmbedSubtitle"})]
        } else {
            Vec::new()
        };

        Self {
            format: request.format_id.clone(),
            outtmpl: request.output_template.clone(),
            paths,
            writesubtitles: extras.writes_subtitles(),
            writeautomaticsub: extras.captions,
            embedsubtitles: embed,
            postprocessors,
            ffmpeg_location: extras.ffmpeg_location.clone(),
        }
    }
}

/// Result of a library download
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryDownloadOutcome {
    /// Zero on success
    pub return_code: i32,
    pub file_path: Option<PathBuf>,
    pub message: Option<String>,
}

/// The yt-dlp library capability
///
/// Calls block. Callers must serialize them.
pub trait YtDlpLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Library version string
    fn version(&self) -> Result<String>;

    /// One complete metadata object for `url`
    fn extract_info(&self, url: &str, options: &ExtractOptions) -> Result<Value>;

    /// Download `url`, reporting percentages through `progress`
    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<LibraryDownloadOutcome>;
}

/// Run `f` against the library on the blocking pool under the global lock
async fn with_library<T, F>(library: &Arc<dyn YtDlpLibrary>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn YtDlpLibrary) -> Result<T> + Send + 'static,
{
    let library = Arc::clone(library);
    tokio::task::spawn_blocking(move || {
        let _guard = LIBRARY_LOCK
            .lock()
            .map_err(|_| RavenError::OperationFailed("yt-dlp library lock poisoned".into()))?;
        f(library.as_ref())
    })
    .await
    .map_err(|e| RavenError::OperationFailed(format!("library worker failed: {}", e)))?
}

/// Format provider backed by an in-process yt-dlp library
pub struct LibraryProvider {
    library: Arc<dyn YtDlpLibrary>,
}

impl LibraryProvider {
    pub fn new(library: Arc<dyn YtDlpLibrary>) -> Self {
        info!("Using yt-dlp library via {}", library.name());
        Self { library }
    }

    pub fn library(&self) -> &Arc<dyn YtDlpLibrary> {
        &self.library
    }

    pub async fn version(&self) -> Result<String> {
        with_library(&self.library, |lib| lib.version()).await
    }
}

#[async_trait]
impl FormatProvider for LibraryProvider {
    fn id(&self) -> &'static str {
        "ytdlp-library"
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Library
    }

    async fn extract(
        &self,
        url: &str,
        is_playlist: bool,
        cancel: CancellationToken,
        events: mpsc::Sender<ExtractEvent>,
    ) {
        if cancel.is_cancelled() {
            warn!("Library extraction of {} cannot be cancelled, running anyway", url);
        }
        let options = ExtractOptions::for_request(is_playlist);
        let url_owned = url.to_string();
        debug!("Library extraction of {} with {:?}", url, options);

        let result =
            with_library(&self.library, move |lib| lib.extract_info(&url_owned, &options)).await;

        match result {
            Ok(value) => {
                let _ = events.send(ExtractEvent::Object(value)).await;
            }
            Err(e) => {
                error!("Library extraction failed for {}: {}", url, e);
                let _ = events.send(ExtractEvent::Error(e.to_string())).await;
            }
        }
        let _ = events.send(ExtractEvent::Finished).await;
    }

    async fn download(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
        events: mpsc::Sender<DownloadEvent>,
    ) {
        let handle = request.handle;
        let options = DownloadOptions::from_request(&request);
        let url = request.url.clone();
        let progress_events = events.clone();

        if cancel.is_cancelled() {
            warn!("Library download {} cannot be cancelled, running anyway", handle);
        }

        let result = with_library(&self.library, move |lib| {
            let mut last = None;
            let mut report = |percent: f64| {
                let percent = percent_from(percent);
                if last != Some(percent) {
                    last = Some(percent);
                    let _ = progress_events.blocking_send(DownloadEvent::Progress { handle, percent });
                }
            };
            lib.download(&url, &options, &mut report)
        })
        .await;

        let terminal = match result {
            Ok(outcome) if outcome.return_code == 0 => DownloadEvent::Finished {
                handle,
                file_path: outcome.file_path,
            },
            Ok(outcome) => {
                let reason = outcome
                    .message
                    .unwrap_or_else(|| format!("yt-dlp returned {}", outcome.return_code));
                DownloadEvent::Failed {
                    handle,
                    message: RavenError::DownloadError(reason).to_string(),
                }
            }
            Err(e) => DownloadEvent::Failed {
                handle,
                message: RavenError::DownloadError(e.to_string()).to_string(),
            },
        };
        let _ = events.send(terminal).await;
    }

    fn supports_cancel(&self) -> bool {
        false
    }
}
