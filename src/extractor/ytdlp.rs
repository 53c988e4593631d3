//! yt-dlp subprocess provider
//!
//! Runs the yt-dlp binary for both extraction and downloads. Metadata comes
//! from `-j` output read line by line; download progress comes from
//! `--newline` output.

use crate::downloader::progress::{parse_percent, OutputTracker};
use crate::downloader::{DownloadEvent, DownloadRequest};
use crate::extractor::reassembler::JsonReassembler;
use crate::extractor::traits::{ExtractEvent, FormatProvider, ProviderMode};
use crate::extractor::url::extract_playlist_url;
use crate::utils::error::RavenError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as AsyncCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Stderr lines kept for error messages
const STDERR_TAIL: usize = 20;

/// Format provider backed by the yt-dlp binary
pub struct SubprocessProvider {
    program: PathBuf,
    /// Arguments placed before yt-dlp's own, e.g. `-m yt_dlp` for python
    prefix_args: Vec<String>,
}

impl SubprocessProvider {
    /// Locate yt-dlp and build the provider.
    ///
    /// Search order:
    /// 1. Explicit path from settings
    /// 2. System PATH
    /// 3. Common installation paths
    pub fn new(configured: Option<&Path>) -> Result<Self> {
        let program = match configured {
            Some(path) if path.exists() => {
                info!("Using configured yt-dlp: {}", path.display());
                path.to_path_buf()
            }
            Some(path) => {
                warn!("Configured yt-dlp {:?} does not exist, searching", path);
                find_ytdlp().ok_or(RavenError::YtDlpNotFound)?
            }
            None => find_ytdlp().ok_or(RavenError::YtDlpNotFound)?,
        };

        Ok(Self {
            program,
            prefix_args: Vec::new(),
        })
    }

    /// Use an explicit command line, skipping discovery
    pub fn with_command(program: impl Into<PathBuf>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// yt-dlp arguments for metadata extraction
    pub fn extract_args(url: &str, is_playlist: bool) -> Vec<String> {
        if is_playlist {
            vec!["-j".to_string(), extract_playlist_url(url)]
        } else {
            vec![
                "-j".to_string(),
                "--no-playlist".to_string(),
                "--flat-playlist".to_string(),
                url.to_string(),
            ]
        }
    }

    /// yt-dlp arguments for a download
    pub fn download_args(request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "-f".to_string(),
            request.format_id.clone(),
            "-o".to_string(),
            request.output_template.clone(),
        ];

        let extras = &request.extras;
        if extras.subtitles {
            args.push("--write-subs".to_string());
        }
        if extras.captions {
            args.push("--write-auto-subs".to_string());
        }
        if extras.embeds_subtitles() {
            args.push("--embed-subs".to_string());
        }
        if let Some(location) = &extras.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }

        args.push(request.url.clone());
        args
    }

    fn command(&self, args: &[String]) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(
            "Command: {} {} {}",
            self.program.display(),
            self.prefix_args.join(" "),
            args.join(" ")
        );
        cmd
    }

    /// Installed yt-dlp version
    pub async fn version(&self) -> Result<String> {
        let output = AsyncCommand::new(&self.program)
            .args(&self.prefix_args)
            .arg("--version")
            .output()
            .await?;
        if !output.status.success() {
            return Err(RavenError::OperationFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl FormatProvider for SubprocessProvider {
    fn id(&self) -> &'static str {
        "ytdlp-subprocess"
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Subprocess
    }

    async fn extract(
        &self,
        url: &str,
        is_playlist: bool,
        cancel: CancellationToken,
        events: mpsc::Sender<ExtractEvent>,
    ) {
        if let Err(e) = self.run_extract(url, is_playlist, &cancel, &events).await {
            error!("yt-dlp extraction failed: {}", e);
            let _ = events.send(ExtractEvent::Error(e.to_string())).await;
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
        let terminal = match self.run_download(&request, &cancel, &events).await {
            Ok(event) => event,
            Err(e) => DownloadEvent::Failed {
                handle,
                message: RavenError::DownloadError(e.to_string()).to_string(),
            },
        };
        let _ = events.send(terminal).await;
    }

    fn supports_cancel(&self) -> bool {
        true
    }
}

impl SubprocessProvider {
    async fn run_extract(
        &self,
        url: &str,
        is_playlist: bool,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ExtractEvent>,
    ) -> Result<()> {
        let args = Self::extract_args(url, is_playlist);
        let mut child = self.command(&args).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RavenError::OperationFailed("yt-dlp stdout unavailable".into()))?;
        let stderr_task = collect_stderr(&mut child);

        let mut reassembler = JsonReassembler::new();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut objects = 0usize;
        loop {
            line.clear();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Cancelling extraction of {}", url);
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    return Err(RavenError::OperationFailed("extraction cancelled".into()).into());
                }
                read = reader.read_line(&mut line) => {
                    if read? == 0 {
                        break;
                    }
                    if let Some(object) = reassembler.push(&line) {
                        objects += 1;
                        if events.send(ExtractEvent::Object(object)).await.is_err() {
                            debug!("Extraction receiver gone, stopping yt-dlp");
                            let _ = child.kill().await;
                            let _ = child.wait().await;
                            return Ok(());
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = join_stderr(stderr_task).await;

        if !reassembler.is_empty() {
            warn!(
                "yt-dlp output ended with {} unparsed bytes",
                reassembler.pending().len()
            );
        }

        info!(
            "yt-dlp extraction exited with {} after {} object(s)",
            status, objects
        );

        if !status.success() {
            let message = if stderr.is_empty() {
                format!("yt-dlp exited with {}", status)
            } else {
                stderr.join("\n")
            };
            return Err(RavenError::ExtractionError(message).into());
        }
        Ok(())
    }

    async fn run_download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        events: &mpsc::Sender<DownloadEvent>,
    ) -> Result<DownloadEvent> {
        let handle = request.handle;
        tokio::fs::create_dir_all(&request.working_dir).await?;

        let args = Self::download_args(request);
        let mut cmd = self.command(&args);
        cmd.current_dir(&request.working_dir);
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RavenError::OperationFailed("yt-dlp stdout unavailable".into()))?;
        let stderr_task = collect_stderr(&mut child);

        let mut tracker = OutputTracker::default();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Cancelling download {}", handle);
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    return Ok(DownloadEvent::Cancelled { handle });
                }
                read = reader.read_line(&mut line) => {
                    if read? == 0 {
                        break;
                    }
                    if let Some(percent) = parse_percent(&line) {
                        let _ = events.send(DownloadEvent::Progress { handle, percent }).await;
                    }
                    tracker.observe(&line);
                }
            }
        }

        // stdout closed, the process is exiting
        let status = child.wait().await?;
        let stderr = join_stderr(stderr_task).await;

        if status.success() {
            Ok(DownloadEvent::Finished {
                handle,
                file_path: tracker.resolve(&request.working_dir),
            })
        } else {
            let message = stderr
                .iter()
                .rev()
                .find(|l| l.contains("ERROR"))
                .or_else(|| stderr.last())
                .cloned()
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            Ok(DownloadEvent::Failed {
                handle,
                message: RavenError::DownloadError(message).to_string(),
            })
        }
    }
}

fn collect_stderr(child: &mut Child) -> Option<JoinHandle<Vec<String>>> {
    let stderr = child.stderr.take()?;
    Some(tokio::spawn(read_tail(stderr)))
}

async fn read_tail<R: AsyncRead + Unpin>(stream: R) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut tail = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!("yt-dlp stderr: {}", line);
        if tail.len() == STDERR_TAIL {
            tail.remove(0);
        }
        tail.push(line);
    }
    tail
}

async fn join_stderr(task: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

// ============================================================
// yt-dlp Detection Functions
// ============================================================

/// Find the yt-dlp binary on PATH or in a common location
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Some(system) = find_in_path() {
        info!("Using system yt-dlp: {:?}", system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths() {
        info!("Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    warn!("yt-dlp not found anywhere");
    None
}

fn find_in_path() -> Option<PathBuf> {
    which::which("yt-dlp").ok().filter(|p| p.exists())
}

fn find_in_common_paths() -> Option<PathBuf> {
    let common_paths = [
        // macOS Homebrew (Apple Silicon)
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
        "/snap/bin/yt-dlp",
        // pip --user
        "~/.local/bin/yt-dlp",
    ];

    common_paths
        .iter()
        .map(|p| expand_home(p))
        .find(|p| p.exists() && is_executable(p))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
