//! Download events and yt-dlp progress output parsing

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Caller-assigned identifier of one download session
pub type Handle = u32;

/// Optional yt-dlp switches for one download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadExtras {
    /// Write the uploaded subtitles
    pub subtitles: bool,
    /// Write automatically generated captions
    pub captions: bool,
    /// Embed written subtitles into the media file
    pub embed_subtitles: bool,
    /// Directory holding the ffmpeg binary
    pub ffmpeg_location: Option<PathBuf>,
}

impl DownloadExtras {
    /// Any subtitle track is written
    pub fn writes_subtitles(&self) -> bool {
        self.subtitles || self.captions
    }

    /// Embedding only applies when subtitles are written
    pub fn embeds_subtitles(&self) -> bool {
        self.embed_subtitles && self.writes_subtitles()
    }

    /// Fill in the ffmpeg directory unless one was requested explicitly
    pub fn or_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        if self.ffmpeg_location.is_none() {
            self.ffmpeg_location = location;
        }
        self
    }
}

/// What a provider needs to run one download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub handle: Handle,
    pub url: String,
    /// yt-dlp format selector, e.g. "137+140" or "bestvideo+bestaudio"
    pub format_id: String,
    /// yt-dlp output template, e.g. "%(title)s.%(ext)s"
    pub output_template: String,
    /// Directory relative templates resolve against
    pub working_dir: PathBuf,
    pub extras: DownloadExtras,
}

/// Progress and terminal events of one download
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DownloadEvent {
    Progress { handle: Handle, percent: u8 },
    Finished { handle: Handle, file_path: Option<PathBuf> },
    Failed { handle: Handle, message: String },
    Cancelled { handle: Handle },
}

impl DownloadEvent {
    pub fn handle(&self) -> Handle {
        match self {
            Self::Progress { handle, .. }
            | Self::Finished { handle, .. }
            | Self::Failed { handle, .. }
            | Self::Cancelled { handle } => *handle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

// [download]  45.0% of 10.00MiB at  2.00MiB/s ETA 00:05
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+)%").unwrap());

static DESTINATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?:download|ExtractAudio)\]\s+Destination:\s+(.+)$").unwrap());
static MERGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\[Merger\]\s+Merging formats into\s+"(.+)"$"#).unwrap());
static ALREADY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded").unwrap());

/// Clamp to [0, 100] and round to a whole percent
pub fn percent_from(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

/// First `digits.digits%` in a line of yt-dlp output
pub fn parse_percent(line: &str) -> Option<u8> {
    let caps = PERCENT_RE.captures(line)?;
    let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
    Some(percent_from(value))
}

/// File path announced by a destination, merge or already-downloaded line.
///
/// Merge lines win over destination lines because they name the final file.
pub fn parse_output_path(line: &str) -> Option<OutputPath> {
    let line = line.trim_end();
    if let Some(caps) = MERGER_RE.captures(line) {
        return Some(OutputPath::Merged(PathBuf::from(&caps[1])));
    }
    if let Some(caps) = DESTINATION_RE.captures(line) {
        return Some(OutputPath::Destination(PathBuf::from(caps[1].trim())));
    }
    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(OutputPath::Destination(PathBuf::from(&caps[1])));
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputPath {
    Destination(PathBuf),
    Merged(PathBuf),
}

/// Tracks the best known output file across a download's lines
#[derive(Debug, Default)]
pub struct OutputTracker {
    path: Option<PathBuf>,
    merged: bool,
}

impl OutputTracker {
    pub fn observe(&mut self, line: &str) {
        match parse_output_path(line) {
            Some(OutputPath::Merged(p)) => {
                self.path = Some(p);
                self.merged = true;
            }
            Some(OutputPath::Destination(p)) if !self.merged => self.path = Some(p),
            _ => {}
        }
    }

    /// Final path, resolved against the download's working directory
    pub fn resolve(self, working_dir: &std::path::Path) -> Option<PathBuf> {
        self.path.map(|p| if p.is_relative() { working_dir.join(p) } else { p })
    }
}
