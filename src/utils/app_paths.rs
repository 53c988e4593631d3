//! Application data path resolution
//!
//! Everything ravendl persists (settings, download history) lives in one
//! per-user directory:
//! - `$XDG_CONFIG_HOME/ravendl/` when the variable is set
//! - the platform config dir (`~/.config/ravendl/` on Linux) otherwise
//!
//! Downloads default to the platform Downloads directory, never a path
//! relative to the current working directory.

use std::path::PathBuf;
use tracing::{debug, warn};

const APP_DIR_NAME: &str = "ravendl";

/// Get the application data directory, creating it if needed.
pub fn get_app_data_dir() -> PathBuf {
    let dir = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME);

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create app data directory {:?}: {}", dir, e);
    }

    debug!("App data directory: {:?}", dir);
    dir
}

/// `<app data>/settings.json`
pub fn get_settings_path() -> PathBuf {
    get_app_data_dir().join("settings.json")
}

/// `<app data>/history.json`
pub fn get_history_path() -> PathBuf {
    get_app_data_dir().join("history.json")
}

/// Get the downloads directory.
///
/// Falls back to `~/Downloads`, then to the system temp dir.
pub fn get_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| {
            let tmp = std::env::temp_dir();
            warn!("Could not determine Downloads directory, using {:?}", tmp);
            tmp
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_and_history_share_app_dir() {
        let settings = get_settings_path();
        let history = get_history_path();
        assert_eq!(settings.parent(), history.parent());
        assert!(settings.ends_with("ravendl/settings.json"));
    }

    #[test]
    fn test_downloads_dir_is_absolute() {
        assert!(get_downloads_dir().is_absolute());
    }
}
