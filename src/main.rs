//! ravendl - yt-dlp front-end
//!
//! Fetches the formats of a video or playlist, downloads a chosen format
//! with live progress, and keeps a history of both.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ravendl::backend::{BackendActor, BackendCommand, BackendEvent};
use ravendl::downloader::DownloadExtras;
use ravendl::extractor::{ytdlp, ProjectedFormatModel, ProviderMode, PythonYtDlp, SubmitKind};
use ravendl::utils::{self, format_filesize, AppSettings};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ravendl", version, about = "Fetch formats and download with yt-dlp")]
struct Args {
    /// How to reach yt-dlp (overrides the settings file)
    #[arg(long, global = true, value_enum)]
    mode: Option<ProviderMode>,

    /// Settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the video and audio formats of a URL
    Formats {
        url: String,
        /// Treat the URL as a playlist
        #[arg(long)]
        playlist: bool,
        /// Print the projected models as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download one format selector, e.g. "137+140"
    Download {
        url: String,
        #[arg(short, long)]
        format: String,
        /// yt-dlp output template
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, default_value_t = 1)]
        handle: u32,
        /// Write uploaded subtitles
        #[arg(long)]
        subs: bool,
        /// Write automatic captions
        #[arg(long)]
        auto_subs: bool,
        /// Embed written subtitles into the file
        #[arg(long)]
        embed_subs: bool,
        /// Directory holding ffmpeg
        #[arg(long)]
        ffmpeg_location: Option<PathBuf>,
    },
    /// Show or clear the history
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Report which yt-dlp variants are usable
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_env("RAVENDL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.config.unwrap_or_else(utils::get_settings_path);
    let mut settings = AppSettings::load(&config_path)?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }

    // Doctor works even when no provider can be built
    if let Command::Doctor = args.command {
        return doctor(&settings).await;
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(256);
    let actor = BackendActor::new(settings.clone(), cmd_rx, event_tx).await?;
    let backend = tokio::spawn(actor.run());

    let result = match args.command {
        Command::Formats { url, playlist, json } => {
            formats(&cmd_tx, event_rx, url, playlist, json).await
        }
        Command::Download {
            url,
            format,
            output,
            handle,
            subs,
            auto_subs,
            embed_subs,
            ffmpeg_location,
        } => {
            let extras = DownloadExtras {
                subtitles: subs,
                captions: auto_subs,
                embed_subtitles: embed_subs,
                ffmpeg_location,
            };
            download(&cmd_tx, event_rx, url, format, output, extras, handle).await
        }
        Command::History { clear } => history(&cmd_tx, event_rx, clear).await,
        Command::Doctor => doctor(&settings).await,
    };

    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
    let _ = backend.await;
    result
}

async fn formats(
    commands: &mpsc::Sender<BackendCommand>,
    mut events: mpsc::Receiver<BackendEvent>,
    url: String,
    playlist: bool,
    json: bool,
) -> Result<()> {
    let kind = if playlist {
        SubmitKind::Playlist
    } else {
        SubmitKind::Video
    };
    commands.send(BackendCommand::Submit { url, kind }).await?;

    let mut models = Vec::new();
    let mut failed = false;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nStopping...");
                commands.send(BackendCommand::StopProcess).await?;
                continue;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        match event {
            BackendEvent::FormatsUpdated(model) => {
                if !json {
                    print_model(&model);
                }
                models.push(model);
            }
            BackendEvent::Message(text) => {
                failed = true;
                eprintln!("{}", text);
            }
            BackendEvent::FetchFinished {
                playlist_title,
                entry_count,
            } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&models)?);
                } else if let Some(title) = playlist_title {
                    println!("Playlist: {} ({} entries)", title, entry_count);
                }
                break;
            }
            _ => {}
        }
    }

    if failed && models.is_empty() {
        bail!("no formats fetched");
    }
    Ok(())
}

fn print_model(model: &ProjectedFormatModel) {
    println!("{} [{}] {}", model.title, model.id, model.duration);
    if !model.uploader.is_empty() {
        println!("  by {} {}", model.uploader, model.upload_date);
    }

    let video = &model.video;
    if !video.is_empty() {
        println!("  video:");
    }
    for i in 0..video.len() {
        println!(
            "    {:>8}  {:<5} {:<12} {:<10} {:<14} {:>9.2} MB",
            video.format_ids()[i],
            video.extensions()[i],
            video.resolutions()[i],
            video.notes()[i],
            video.codecs()[i],
            video.sizes_mb()[i],
        );
    }

    let audio = &model.audio;
    if !audio.is_empty() {
        println!("  audio:");
    }
    for i in 0..audio.len() {
        println!(
            "    {:>8}  {:<5} {:<14} {:>7.1} kbps {:>9.2} MB",
            audio.format_ids()[i],
            audio.extensions()[i],
            audio.codecs()[i],
            audio.bitrates()[i],
            audio.sizes_mb()[i],
        );
    }

    // yt-dlp lists formats from worst to best
    let best = video
        .len()
        .checked_sub(1)
        .zip(audio.len().checked_sub(1))
        .and_then(|(v, a)| model.combined_selector(v, a));
    if let Some(selector) = best {
        println!("  best pair: -f {}", selector);
    }
}

async fn download(
    commands: &mpsc::Sender<BackendCommand>,
    mut events: mpsc::Receiver<BackendEvent>,
    url: String,
    format_id: String,
    output_template: Option<String>,
    extras: DownloadExtras,
    handle: u32,
) -> Result<()> {
    commands
        .send(BackendCommand::StartDownload {
            url,
            format_id,
            output_template,
            extras,
            handle,
        })
        .await?;

    let mut last_percent = None;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nStopping...");
                commands.send(BackendCommand::StopProcess).await?;
                continue;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            bail!("backend stopped unexpectedly");
        };

        match event {
            BackendEvent::DownloadProgress { percent, handle: h } if h == handle => {
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    eprint!("\r{:>3}%", percent);
                }
            }
            BackendEvent::DownloadFinished { handle: h, file_path } if h == handle => {
                eprintln!();
                match file_path {
                    Some(path) => {
                        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                        println!("Saved {} ({})", path.display(), format_filesize(size));
                    }
                    None => println!("Download finished"),
                }
                return Ok(());
            }
            BackendEvent::DownloadFailed { handle: h, message } if h == handle => {
                eprintln!();
                bail!("download failed: {}", message);
            }
            BackendEvent::DownloadCancelled { handle: h } if h == handle => {
                eprintln!();
                bail!("download cancelled");
            }
            BackendEvent::Message(text) => {
                // Rejected before the download started
                bail!(text);
            }
            _ => {}
        }
    }
}

async fn history(
    commands: &mpsc::Sender<BackendCommand>,
    mut events: mpsc::Receiver<BackendEvent>,
    clear: bool,
) -> Result<()> {
    let command = if clear {
        BackendCommand::ClearHistory
    } else {
        BackendCommand::LoadHistory
    };
    commands.send(command).await?;

    while let Some(event) = events.recv().await {
        match event {
            BackendEvent::History(entries) => {
                if clear {
                    println!("History cleared");
                }
                for entry in entries {
                    println!(
                        "{}  {:<10}  {}  {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        format!("{:?}", entry.status),
                        entry.title,
                        entry.url
                    );
                }
                return Ok(());
            }
            BackendEvent::Message(text) => bail!(text),
            _ => {}
        }
    }
    Ok(())
}

async fn doctor(settings: &AppSettings) -> Result<()> {
    println!("mode: {}", settings.mode);

    match PythonYtDlp::initialize(settings.python_path.as_deref()) {
        Ok(lib) => println!("library: yt_dlp via {}", lib.python_cmd()),
        Err(e) => println!("library: unavailable ({})", e),
    }

    let binary = settings
        .ytdlp_path
        .clone()
        .filter(|p| p.exists())
        .or_else(ytdlp::find_ytdlp);
    match binary {
        Some(path) => {
            let provider = ytdlp::SubprocessProvider::with_command(&path, Vec::new());
            match provider.version().await {
                Ok(version) => println!("subprocess: {} ({})", path.display(), version),
                Err(e) => println!("subprocess: {} (not runnable: {})", path.display(), e),
            }
        }
        None => println!("subprocess: yt-dlp not found"),
    }

    match settings.ffmpeg_dir() {
        Some(dir) => println!("ffmpeg: {}", dir.display()),
        None => println!("ffmpeg: yt-dlp default lookup"),
    }
    println!("downloads: {}", settings.download_location.display());
    println!("history: {}", settings.history_file.display());
    Ok(())
}
