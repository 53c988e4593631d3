//! Utility modules for error handling, configuration and formatting

pub mod app_paths;
pub mod config;
pub mod error;
pub mod format;

// Re-export for convenience
pub use app_paths::{get_app_data_dir, get_downloads_dir, get_history_path, get_settings_path};
pub use config::{AppSettings, DEFAULT_OUTPUT_TEMPLATE};
pub use error::RavenError;
pub use format::{format_duration, format_filesize};
