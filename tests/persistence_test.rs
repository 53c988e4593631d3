//! Settings and history survive a restart.

use futures::future::join_all;
use ravendl::extractor::{ProjectedFormatModel, ProviderMode};
use ravendl::history::{HistoryEntry, HistoryStatus, HistoryStore};
use ravendl::utils::{AppSettings, DEFAULT_OUTPUT_TEMPLATE};
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_settings_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");

    let settings = AppSettings {
        download_location: dir.path().join("videos"),
        output_template: "%(uploader)s/%(title)s.%(ext)s".into(),
        mode: ProviderMode::Library,
        ytdlp_path: Some(PathBuf::from("/opt/yt-dlp")),
        python_path: Some("python3.12".into()),
        ffmpeg_location: Some(PathBuf::from("/opt/ffmpeg/bin")),
        history_file: dir.path().join("history.json"),
    };
    settings.save(&path).unwrap();

    let loaded = AppSettings::load(&path).unwrap();
    assert_eq!(loaded.download_location, settings.download_location);
    assert_eq!(loaded.output_template, settings.output_template);
    assert_eq!(loaded.mode, ProviderMode::Library);
    assert_eq!(loaded.ytdlp_path, settings.ytdlp_path);
    assert_eq!(loaded.python_path.as_deref(), Some("python3.12"));
    assert_eq!(loaded.ffmpeg_dir(), Some(PathBuf::from("/opt/ffmpeg/bin")));
}

#[test]
fn test_settings_file_uses_lowercase_modes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"mode": "subprocess"}"#).unwrap();

    let loaded = AppSettings::load(&path).unwrap();
    assert_eq!(loaded.mode, ProviderMode::Subprocess);
    assert_eq!(loaded.output_template, DEFAULT_OUTPUT_TEMPLATE);

    std::fs::write(&path, r#"{"mode": "turbo"}"#).unwrap();
    assert!(AppSettings::load(&path).is_err());
}

#[tokio::test]
async fn test_history_survives_new_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");

    let model = ProjectedFormatModel {
        id: "abc".into(),
        title: "Demo".into(),
        duration: "03:32".into(),
        webpage_url: Some("https://www.youtube.com/watch?v=abc".into()),
        ..Default::default()
    };

    {
        let store = HistoryStore::new(&path);
        store
            .append(HistoryEntry::fetched(&model, "https://youtu.be/abc"))
            .await
            .unwrap();
        store
            .append(HistoryEntry::downloaded(
                "https://youtu.be/abc",
                "137+140",
                Some(dir.path().join("Demo.mp4")),
            ))
            .await
            .unwrap();
    }

    let reopened = HistoryStore::new(&path);
    let entries = reopened.load().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "Demo");
    assert_eq!(entries[0].duration, "03:32");
    assert_eq!(entries[1].status, HistoryStatus::Downloaded);
    assert_eq!(entries[1].format_id.as_deref(), Some("137+140"));
    assert_ne!(entries[0].id, entries[1].id);

    // Pretty JSON on disk
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\n  {"));
}

#[tokio::test]
async fn test_concurrent_appends_are_not_lost() {
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("history.json"));

    let writes = (0..20).map(|i| {
        let store = store.clone();
        async move {
            store
                .append(HistoryEntry::unfinished(
                    &format!("https://youtu.be/v{}", i),
                    "18",
                    i,
                    Some("HTTP Error 403".into()),
                ))
                .await
        }
    });
    for result in join_all(writes).await {
        tokio_test::assert_ok!(result);
    }

    let entries = store.load().await;
    assert_eq!(entries.len(), 20);
    assert!(entries.iter().all(|e| e.status == HistoryStatus::Failed));
}

#[tokio::test]
async fn test_save_overwrites_wholesale() {
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("history.json"));

    store
        .append(HistoryEntry::unfinished("https://youtu.be/a", "18", 1, None))
        .await
        .unwrap();
    let keep = HistoryEntry::downloaded("https://youtu.be/b", "22", None);
    store.save(std::slice::from_ref(&keep)).await.unwrap();

    assert_eq!(store.load().await, vec![keep]);
}
