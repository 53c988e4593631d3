//! Metadata extraction: URL handling, the two yt-dlp providers, stream
//! reassembly and projection

pub mod library;
pub mod models;
pub mod projector;
pub mod python;
pub mod reassembler;
pub mod session;
pub mod traits;
pub mod url;
pub mod ytdlp;

pub use library::{LibraryProvider, YtDlpLibrary};
pub use models::{PlaylistMetadata, RawFormatEntry, VideoMetadata};
pub use projector::{project, project_value, ProjectedFormatModel};
pub use python::PythonYtDlp;
pub use reassembler::JsonReassembler;
pub use session::{FetchEvent, FetchSession, FetchSummary};
pub use traits::{ExtractEvent, FormatProvider, ProviderMode};
pub use url::SubmitKind;
pub use ytdlp::SubprocessProvider;

use crate::utils::config::AppSettings;
use crate::utils::error::RavenError;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the provider for `settings.mode`. Chosen once per process.
pub fn select_provider(settings: &AppSettings) -> Result<Arc<dyn FormatProvider>> {
    let python = settings.python_path.clone();
    let ytdlp = settings.ytdlp_path.clone();
    choose_provider(
        settings.mode,
        move || {
            PythonYtDlp::initialize(python.as_deref())
                .map(|lib| Arc::new(lib) as Arc<dyn YtDlpLibrary>)
        },
        move || SubprocessProvider::new(ytdlp.as_deref()),
    )
}

/// Mode selection with injectable constructors.
///
/// `Auto` tries the library and falls back to the subprocess only when the
/// library is unavailable. `Library` never falls back. `Subprocess` never
/// touches the library.
pub fn choose_provider<L, S>(
    mode: ProviderMode,
    init_library: L,
    init_subprocess: S,
) -> Result<Arc<dyn FormatProvider>>
where
    L: FnOnce() -> Result<Arc<dyn YtDlpLibrary>, RavenError>,
    S: FnOnce() -> Result<SubprocessProvider>,
{
    let provider: Arc<dyn FormatProvider> = match mode {
        ProviderMode::Subprocess => Arc::new(init_subprocess()?),
        ProviderMode::Library => Arc::new(LibraryProvider::new(init_library()?)),
        ProviderMode::Auto => match init_library() {
            Ok(library) => Arc::new(LibraryProvider::new(library)),
            Err(RavenError::CapabilityUnavailable(reason)) => {
                warn!(
                    "yt-dlp library unavailable ({}), falling back to subprocess",
                    reason
                );
                Arc::new(init_subprocess()?)
            }
            Err(e) => return Err(e.into()),
        },
    };

    info!("Format provider: {} ({})", provider.id(), provider.mode());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::library::{DownloadOptions, ExtractOptions, LibraryDownloadOutcome};
    use serde_json::Value;

    struct NullLibrary;

    impl YtDlpLibrary for NullLibrary {
        fn name(&self) -> &str {
            "null"
        }

        fn version(&self) -> Result<String> {
            Ok("0".into())
        }

        fn extract_info(&self, _url: &str, _options: &ExtractOptions) -> Result<Value> {
            Ok(Value::Null)
        }

        fn download(
            &self,
            _url: &str,
            _options: &DownloadOptions,
            _progress: &mut dyn FnMut(f64),
        ) -> Result<LibraryDownloadOutcome> {
            Ok(LibraryDownloadOutcome::default())
        }
    }

    fn library_ok() -> Result<Arc<dyn YtDlpLibrary>, RavenError> {
        Ok(Arc::new(NullLibrary))
    }

    fn library_missing() -> Result<Arc<dyn YtDlpLibrary>, RavenError> {
        Err(RavenError::CapabilityUnavailable("No module named 'yt_dlp'".into()))
    }

    fn subprocess() -> Result<SubprocessProvider> {
        Ok(SubprocessProvider::with_command("yt-dlp", vec![]))
    }

    #[test]
    fn test_auto_prefers_library() {
        let provider = choose_provider(ProviderMode::Auto, library_ok, subprocess).unwrap();
        assert_eq!(provider.mode(), ProviderMode::Library);
        assert!(!provider.supports_cancel());
    }

    #[test]
    fn test_auto_falls_back_once() {
        let mut subprocess_calls = 0;
        let provider = choose_provider(ProviderMode::Auto, library_missing, || {
            subprocess_calls += 1;
            subprocess()
        })
        .unwrap();
        assert_eq!(provider.mode(), ProviderMode::Subprocess);
        assert_eq!(subprocess_calls, 1);
    }

    #[test]
    fn test_library_mode_fails_hard() {
        let result = choose_provider(ProviderMode::Library, library_missing, subprocess);
        assert!(result.is_err());
    }

    #[test]
    fn test_subprocess_mode_skips_library() {
        let provider = choose_provider(
            ProviderMode::Subprocess,
            || -> Result<Arc<dyn YtDlpLibrary>, RavenError> { panic!("library touched") },
            subprocess,
        )
        .unwrap();
        assert_eq!(provider.id(), "ytdlp-subprocess");
    }
}
