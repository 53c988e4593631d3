//! Application configuration

use crate::extractor::ProviderMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::app_paths::{get_downloads_dir, get_history_path};

/// Default yt-dlp output template
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Download location, also the working directory of yt-dlp downloads
    pub download_location: PathBuf,

    /// yt-dlp output template used when a download does not supply one
    pub output_template: String,

    /// How to reach yt-dlp
    pub mode: ProviderMode,

    /// Explicit yt-dlp binary, skips discovery
    pub ytdlp_path: Option<PathBuf>,

    /// Python interpreter carrying the yt_dlp module
    pub python_path: Option<String>,

    /// Directory holding ffmpeg, passed to yt-dlp for merging and embedding
    pub ffmpeg_location: Option<PathBuf>,

    /// Download history file
    pub history_file: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: get_downloads_dir(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            mode: ProviderMode::Auto,
            ytdlp_path: None,
            python_path: None,
            ffmpeg_location: None,
            history_file: get_history_path(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: AppSettings =
            serde_json::from_str(&json).context("Failed to parse settings")?;

        info!("Loaded settings from {:?}", path);
        Ok(settings.sanitized())
    }

    /// Write settings as pretty JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// Output template to use for a download request
    pub fn template_or_default(&self, requested: Option<&str>) -> String {
        match requested {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => self.output_template.clone(),
        }
    }

    /// ffmpeg directory for downloads.
    ///
    /// The configured location wins. Otherwise the directory of an existing
    /// `FFMPEG_BINARY` is used.
    pub fn ffmpeg_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.ffmpeg_location {
            return Some(dir.clone());
        }
        let binary = PathBuf::from(std::env::var_os("FFMPEG_BINARY")?);
        if !binary.exists() {
            debug!("FFMPEG_BINARY {:?} does not exist, ignoring", binary);
            return None;
        }
        binary.parent().map(Path::to_path_buf)
    }

    fn sanitized(mut self) -> Self {
        if self.output_template.trim().is_empty() {
            warn!("Empty output template in settings, using default");
            self.output_template = DEFAULT_OUTPUT_TEMPLATE.to_string();
        }
        self
    }
}
