//! yt-dlp library capability hosted by a Python interpreter
//!
//! Each call runs a short script against the `yt_dlp` module and exchanges
//! JSON over argv and stdout.

use crate::extractor::library::{
    DownloadOptions, ExtractOptions, LibraryDownloadOutcome, YtDlpLibrary,
};
use crate::utils::error::RavenError;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

const VERSION_SCRIPT: &str = "import sys, yt_dlp.version; sys.stdout.write(yt_dlp.version.__version__)";

const EXTRACT_SCRIPT: &str = r#"
import json, sys
import yt_dlp
url, opts = sys.argv[1], json.loads(sys.argv[2])
try:
    with yt_dlp.YoutubeDL(opts) as ydl:
        info = ydl.sanitize_info(ydl.extract_info(url, download=False))
    sys.stdout.write(json.dumps(info))
except Exception as e:
    sys.stdout.write(json.dumps({"error": str(e)}))
    sys.exit(1)
"#;

const DOWNLOAD_SCRIPT: &str = r#"
import json, sys
import yt_dlp
url, opts = sys.argv[1], json.loads(sys.argv[2])

def emit(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()

def on_progress(d):
    if d.get("status") == "downloading":
        total = d.get("total_bytes") or d.get("total_bytes_estimate")
        if total:
            emit({"event": "progress", "percent": d.get("downloaded_bytes", 0) * 100.0 / total})
    elif d.get("status") == "finished" and d.get("filename"):
        emit({"event": "file", "path": d["filename"]})

def on_postprocess(d):
    path = (d.get("info_dict") or {}).get("filepath")
    if d.get("status") == "finished" and path:
        emit({"event": "file", "path": path})

opts.update(quiet=True, noprogress=True, progress_hooks=[on_progress],
            postprocessor_hooks=[on_postprocess])
try:
    with yt_dlp.YoutubeDL(opts) as ydl:
        code = ydl.download([url])
except Exception as e:
    emit({"event": "error", "message": str(e)})
    code = 1
sys.exit(code)
"#;

/// One line of download script output
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ScriptEvent {
    Progress { percent: f64 },
    File { path: PathBuf },
    Error { message: String },
}

/// yt-dlp reached through `python -c`
#[derive(Debug, Clone)]
pub struct PythonYtDlp {
    python_cmd: String,
    version: String,
}

impl PythonYtDlp {
    /// Verify that `yt_dlp` can be imported.
    ///
    /// Fails with `CapabilityUnavailable` when no interpreter is found or the
    /// module is missing.
    pub fn initialize(python_cmd: Option<&str>) -> Result<Self, RavenError> {
        let python_cmd = python_cmd
            .map(str::to_string)
            .unwrap_or_else(find_python);

        let output = Command::new(&python_cmd)
            .args(["-c", VERSION_SCRIPT])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RavenError::CapabilityUnavailable(format!("{}: {}", python_cmd, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("yt_dlp import failed");
            return Err(RavenError::CapabilityUnavailable(format!(
                "{}: {}",
                python_cmd,
                reason.trim()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("yt_dlp {} available through {}", version, python_cmd);
        Ok(Self { python_cmd, version })
    }

    pub fn python_cmd(&self) -> &str {
        &self.python_cmd
    }
}

impl YtDlpLibrary for PythonYtDlp {
    fn name(&self) -> &str {
        "python"
    }

    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn extract_info(&self, url: &str, options: &ExtractOptions) -> Result<Value> {
        let options = serde_json::to_string(options)?;
        debug!("python extract {} {}", url, options);

        let output = Command::new(&self.python_cmd)
            .args(["-c", EXTRACT_SCRIPT, url, &options])
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.python_cmd))?;

        let value: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            RavenError::ExtractionError(format!("unreadable yt_dlp output ({}): {}", e, stderr.trim()))
        })?;

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(RavenError::ExtractionError(message.to_string()).into());
        }
        if !output.status.success() {
            return Err(RavenError::ExtractionError(format!(
                "python exited with {}",
                output.status
            ))
            .into());
        }
        Ok(value)
    }

    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<LibraryDownloadOutcome> {
        let options = serde_json::to_string(options)?;
        debug!("python download {} {}", url, options);

        let mut child = Command::new(&self.python_cmd)
            .args(["-c", DOWNLOAD_SCRIPT, url, &options])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.python_cmd))?;

        let stderr_thread = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let mut outcome = LibraryDownloadOutcome::default();
        drain_script_events(&mut child, &mut outcome, progress)?;

        let status = child.wait()?;
        let stderr = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();

        outcome.return_code = status.code().unwrap_or(-1);
        if outcome.return_code != 0 && outcome.message.is_none() {
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
            outcome.message = last.map(|l| l.trim().to_string());
        }
        Ok(outcome)
    }
}

/// Read download script events until stdout closes.
///
/// A failed read kills and reaps the child before the error is returned.
fn drain_script_events(
    child: &mut Child,
    outcome: &mut LibraryDownloadOutcome,
    progress: &mut dyn FnMut(f64),
) -> Result<()> {
    let Some(stdout) = child.stdout.take() else {
        return Ok(());
    };

    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Lost python download output: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };
        match serde_json::from_str::<ScriptEvent>(&line) {
            Ok(ScriptEvent::Progress { percent }) => progress(percent),
            Ok(ScriptEvent::File { path }) => outcome.file_path = Some(path),
            Ok(ScriptEvent::Error { message }) => outcome.message = Some(message),
            Err(_) => debug!("python: {}", line),
        }
    }
    Ok(())
}

/// Interpreter to use when none is configured
pub fn find_python() -> String {
    if let Ok(custom) = std::env::var("RAVENDL_PYTHON") {
        return custom;
    }

    let candidates = ["python3", "python", "/opt/homebrew/bin/python3", "/usr/local/bin/python3"];
    for cmd in candidates {
        if which::which(cmd).is_ok() {
            return cmd.to_string();
        }
    }

    warn!("No python interpreter found on PATH");
    "python3".to_string()
}
