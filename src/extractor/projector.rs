//! Flattens yt-dlp metadata into parallel arrays for UI binding

use crate::extractor::models::{RawFormatEntry, VideoMetadata};
use crate::utils::error::RavenError;
use crate::utils::format::format_duration;
use serde::Serialize;
use serde_json::Value;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Size in MB, zero when unknown
pub fn size_in_mb(bytes: Option<f64>) -> f64 {
    bytes.map(|b| b / BYTES_PER_MB).unwrap_or(0.0)
}

/// Video-track arrays. All have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoTracks {
    format_ids: Vec<String>,
    labels: Vec<String>,
    extensions: Vec<String>,
    notes: Vec<String>,
    resolutions: Vec<String>,
    codecs: Vec<String>,
    sizes_mb: Vec<f64>,
}

impl VideoTracks {
    fn push(&mut self, entry: &RawFormatEntry, codec: &str) {
        self.format_ids.push(entry.format_id.clone());
        self.labels.push(entry.format.clone());
        self.extensions.push(entry.ext.clone());
        self.notes.push(entry.format_note.clone());
        self.resolutions.push(entry.resolution.clone());
        self.codecs.push(codec.trim().to_string());
        self.sizes_mb.push(size_in_mb(entry.size_bytes()));
    }

    pub fn len(&self) -> usize {
        self.format_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.format_ids.is_empty()
    }

    pub fn format_ids(&self) -> &[String] {
        &self.format_ids
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn resolutions(&self) -> &[String] {
        &self.resolutions
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    pub fn sizes_mb(&self) -> &[f64] {
        &self.sizes_mb
    }
}

/// Audio-track arrays. All have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioTracks {
    codecs: Vec<String>,
    extensions: Vec<String>,
    format_ids: Vec<String>,
    bitrates: Vec<f64>,
    sizes_mb: Vec<f64>,
}

impl AudioTracks {
    fn push(&mut self, entry: &RawFormatEntry) {
        self.codecs
            .push(entry.acodec.as_deref().unwrap_or_default().trim().to_string());
        self.extensions.push(entry.ext.clone());
        self.format_ids.push(entry.format_id.clone());
        self.bitrates.push(entry.abr.unwrap_or(0.0));
        self.sizes_mb.push(size_in_mb(entry.size_bytes()));
    }

    pub fn len(&self) -> usize {
        self.format_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.format_ids.is_empty()
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn format_ids(&self) -> &[String] {
        &self.format_ids
    }

    pub fn bitrates(&self) -> &[f64] {
        &self.bitrates
    }

    pub fn sizes_mb(&self) -> &[f64] {
        &self.sizes_mb
    }
}

/// UI-facing model for one video
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectedFormatModel {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub uploader: String,
    pub upload_date: String,
    pub duration: String,
    pub duration_seconds: Option<f64>,
    pub webpage_url: Option<String>,
    pub video: VideoTracks,
    pub audio: AudioTracks,
}

impl ProjectedFormatModel {
    /// Format selector for a video track combined with an audio track,
    /// e.g. `"137+140"`
    pub fn combined_selector(&self, video_index: usize, audio_index: usize) -> Option<String> {
        let video = self.video.format_ids().get(video_index)?;
        let audio = self.audio.format_ids().get(audio_index)?;
        Some(format!("{}+{}", video, audio))
    }
}

/// Build a fresh model from one video's metadata.
///
/// An entry goes to the audio group when its resolution mentions "audio",
/// and to the video group when it has a real video codec. The two checks are
/// independent, so an entry may land in both or neither.
pub fn project(metadata: &VideoMetadata) -> ProjectedFormatModel {
    let mut model = ProjectedFormatModel {
        id: metadata.id.clone(),
        title: metadata.title.clone(),
        thumbnail: metadata.thumbnail.clone(),
        uploader: metadata.uploader.clone(),
        upload_date: metadata.upload_date.clone(),
        duration: metadata
            .duration_string
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format_duration(metadata.duration.unwrap_or(0.0))),
        duration_seconds: metadata.duration,
        webpage_url: metadata.canonical_url().map(str::to_string),
        ..Default::default()
    };

    for entry in &metadata.formats {
        if entry.is_audio_resolution() {
            model.audio.push(entry);
        }
        if entry.has_video() {
            if let Some(codec) = entry.vcodec.as_deref() {
                model.video.push(entry, codec);
            }
        }
    }

    model
}

/// Parse and project a raw JSON object
pub fn project_value(value: &Value) -> Result<ProjectedFormatModel, RavenError> {
    if !value.is_object() {
        return Err(RavenError::ExtractionError(
            "metadata is not a JSON object".to_string(),
        ));
    }
    let metadata = VideoMetadata::from_value(value)?;
    Ok(project(&metadata))
}
