//! Data structures for yt-dlp metadata

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One element of yt-dlp's `formats` list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormatEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub format_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub ext: String,
    /// Human label, e.g. "137 - 1920x1080 (1080p)"
    #[serde(deserialize_with = "lenient_string")]
    pub format: String,
    #[serde(deserialize_with = "lenient_string")]
    pub format_note: String,
    /// "1920x1080" or "audio only"
    #[serde(deserialize_with = "lenient_string")]
    pub resolution: String,
    /// "none" means the entry carries no video
    pub vcodec: Option<String>,
    /// "none" means the entry carries no audio
    pub acodec: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    pub audio_ext: Option<String>,
    /// Direct media URL, absent in flat extraction
    pub url: Option<String>,
}

impl RawFormatEntry {
    /// Size in bytes, exact when known, approximate otherwise
    pub fn size_bytes(&self) -> Option<f64> {
        self.filesize.or(self.filesize_approx)
    }

    pub fn has_video(&self) -> bool {
        is_real_codec(self.vcodec.as_deref())
    }

    /// Audio-only as reported by the resolution descriptor
    pub fn is_audio_resolution(&self) -> bool {
        self.resolution.contains("audio")
    }
}

fn is_real_codec(codec: Option<&str>) -> bool {
    matches!(codec.map(str::trim), Some(c) if !c.is_empty() && c != "none")
}

/// One video's extraction result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoMetadata {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub thumbnail: String,
    #[serde(deserialize_with = "lenient_string")]
    pub uploader: String,
    /// YYYYMMDD
    #[serde(deserialize_with = "lenient_string")]
    pub upload_date: String,
    pub duration_string: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub playlist_title: Option<String>,
    pub n_entries: Option<u64>,
    pub formats: Vec<RawFormatEntry>,
}

impl VideoMetadata {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    /// Canonical page URL for the video
    pub fn canonical_url(&self) -> Option<&str> {
        self.webpage_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.is_empty())
    }
}

/// Enclosing object returned by a playlist extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistMetadata {
    pub id: String,
    pub title: String,
    pub entry_count: usize,
    pub entries: Vec<VideoMetadata>,
}

impl PlaylistMetadata {
    /// True when the object wraps an `entries` array
    pub fn is_playlist_object(value: &Value) -> bool {
        value.get("entries").is_some_and(Value::is_array)
    }

    /// Split an enclosing playlist object into its member videos.
    ///
    /// Null entries (unavailable videos) are skipped; malformed ones are
    /// skipped with a warning.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Header {
            id: Option<String>,
            title: Option<String>,
            playlist_title: Option<String>,
            n_entries: Option<u64>,
            playlist_count: Option<u64>,
        }

        let header = Header::deserialize(value)?;
        let entries: Vec<VideoMetadata> = value
            .get("entries")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|v| !v.is_null())
                    .filter_map(|v| match VideoMetadata::from_value(v) {
                        Ok(video) => Some(video),
                        Err(e) => {
                            tracing::warn!("Skipping malformed playlist entry: {}", e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let entry_count = header
            .n_entries
            .or(header.playlist_count)
            .map(|n| n as usize)
            .unwrap_or(entries.len());

        Ok(Self {
            id: header.id.unwrap_or_default(),
            title: header
                .playlist_title
                .or(header.title)
                .unwrap_or_default(),
            entry_count,
            entries,
        })
    }
}

/// Accepts strings, numbers and null where yt-dlp is inconsistent
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_entry() {
        let entry: RawFormatEntry = serde_json::from_value(json!({
            "format_id": 18,
            "ext": "mp4",
            "resolution": null,
            "vcodec": "avc1.42001E",
            "acodec": "none",
            "filesize": null,
            "filesize_approx": 2048
        }))
        .unwrap();

        assert_eq!(entry.format_id, "18");
        assert_eq!(entry.resolution, "");
        assert!(entry.has_video());
        assert_eq!(entry.size_bytes(), Some(2048.0));
    }

    #[test]
    fn test_video_metadata_defaults() {
        let video = VideoMetadata::from_value(&json!({"title": "x"})).unwrap();
        assert_eq!(video.title, "x");
        assert!(video.uploader.is_empty());
        assert!(video.formats.is_empty());
        assert!(video.canonical_url().is_none());
    }

    #[test]
    fn test_playlist_split() {
        let value = json!({
            "title": "Uploads",
            "playlist_title": "My Mix",
            "entries": [
                {"id": "a", "title": "A", "url": "https://www.youtube.com/watch?v=a"},
                null,
                {"id": "b", "title": "B"}
            ]
        });

        assert!(PlaylistMetadata::is_playlist_object(&value));
        let playlist = PlaylistMetadata::from_value(&value).unwrap();
        assert_eq!(playlist.title, "My Mix");
        assert_eq!(playlist.entry_count, 2);
        assert_eq!(playlist.entries[0].canonical_url(), Some("https://www.youtube.com/watch?v=a"));
    }

    #[test]
    fn test_playlist_count_prefers_n_entries() {
        let value = json!({"title": "P", "n_entries": 40, "entries": [{"id": "a"}]});
        let playlist = PlaylistMetadata::from_value(&value).unwrap();
        assert_eq!(playlist.title, "P");
        assert_eq!(playlist.entry_count, 40);
    }
}
