//! Persistent history of fetched and downloaded videos

use crate::downloader::Handle;
use crate::extractor::ProjectedFormatModel;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Fetched,
    Downloaded,
    Failed,
    Cancelled,
}

/// One history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub duration: String,
    pub status: HistoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(url: &str, status: HistoryStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            title: String::new(),
            thumbnail: String::new(),
            duration: String::new(),
            status,
            format_id: None,
            file_path: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// A video whose formats were fetched
    pub fn fetched(model: &ProjectedFormatModel, submitted_url: &str) -> Self {
        let url = model.webpage_url.as_deref().unwrap_or(submitted_url);
        Self {
            title: model.title.clone(),
            thumbnail: model.thumbnail.clone(),
            duration: model.duration.clone(),
            ..Self::new(url, HistoryStatus::Fetched)
        }
    }

    /// A finished download
    pub fn downloaded(url: &str, format_id: &str, file_path: Option<PathBuf>) -> Self {
        Self {
            format_id: Some(format_id.to_string()),
            title: file_path
                .as_deref()
                .and_then(Path::file_stem)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path,
            ..Self::new(url, HistoryStatus::Downloaded)
        }
    }

    /// A download that failed or was cancelled
    pub fn unfinished(url: &str, format_id: &str, handle: Handle, message: Option<String>) -> Self {
        let status = if message.is_some() {
            HistoryStatus::Failed
        } else {
            HistoryStatus::Cancelled
        };
        Self {
            format_id: Some(format_id.to_string()),
            message: message.or_else(|| Some(format!("download {} cancelled", handle))),
            ..Self::new(url, status)
        }
    }
}

/// JSON file of history entries, rewritten wholesale on every change
#[derive(Debug, Clone)]
pub struct HistoryStore {
    file_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl HistoryStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// All entries, oldest first. A missing or unreadable file is empty.
    pub async fn load(&self) -> Vec<HistoryEntry> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Replace the file contents with `entries`
    pub async fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write(entries).await
    }

    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        self.extend(std::iter::once(entry)).await
    }

    /// Append several entries with a single rewrite
    pub async fn extend(&self, new_entries: impl IntoIterator<Item = HistoryEntry>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await;
        let before = entries.len();
        entries.extend(new_entries);
        if entries.len() == before {
            return Ok(());
        }
        self.write(&entries).await
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write(&[]).await
    }

    async fn read(&self) -> Vec<HistoryEntry> {
        let content = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read history {:?}: {}", self.file_path, e);
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring corrupt history {:?}: {}", self.file_path, e);
                Vec::new()
            }
        }
    }

    async fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize history")?;
        tokio::fs::write(&self.file_path, json)
            .await
            .with_context(|| format!("Failed to write history {:?}", self.file_path))?;
        debug!("Wrote {} history entries", entries.len());
        Ok(())
    }
}
