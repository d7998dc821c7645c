//! Unpack worker: out-of-process archive extraction.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::downloader::{CompletionSlot, WorkerOutcome};

/// Ceiling for a single extraction run.
const EXTRACTION_TIMEOUT_SECS: u64 = 3600;

/// Errors that can occur during archive extraction.
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("unsupported archive type: {0}")]
    Unsupported(String),

    #[error("extraction tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("extraction timed out after {0}s")]
    Timeout(u64),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracts one archive into a target directory on a spawned task.
///
/// Like download workers, terminal state is polled through `finished()`;
/// the worker is reaped by the tick loop, never awaited directly.
pub struct UnpackWorker {
    download_id: Uuid,
    completion: CompletionSlot,
    cancel_tx: watch::Sender<bool>,
}

impl UnpackWorker {
    pub fn spawn(download_id: Uuid, archive: PathBuf, target_dir: PathBuf) -> Self {
        let completion = CompletionSlot::new();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let slot = completion.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = extract_archive(&archive, &target_dir, EXTRACTION_TIMEOUT_SECS) => result,
                _ = cancel_rx.wait_for(|cancelled| *cancelled) => Err(UnpackError::ExtractionFailed(
                    "unpack cancelled".to_string(),
                )),
            };

            match result {
                Ok(()) => {
                    debug!("Extraction of {} finished", archive.display());
                    slot.succeed(target_dir).await;
                }
                Err(e) => {
                    warn!("Extraction of {} failed: {e}", archive.display());
                    slot.fail(e.to_string()).await;
                }
            }
        });

        Self {
            download_id,
            completion,
            cancel_tx,
        }
    }

    pub fn download_id(&self) -> Uuid {
        self.download_id
    }

    pub async fn finished(&self) -> bool {
        self.completion.is_set().await
    }

    pub async fn outcome(&self) -> Option<WorkerOutcome> {
        self.completion.get().await
    }

    pub async fn error(&self) -> Option<String> {
        self.completion
            .get()
            .await
            .and_then(|o| o.error().map(|e| e.to_string()))
    }

    /// Cooperative cancel; the worker still finishes through the error path.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Run the external extraction tool for the archive's format.
async fn extract_archive(
    archive: &Path,
    target_dir: &Path,
    timeout_secs: u64,
) -> Result<(), UnpackError> {
    let extension = archive
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    tokio::fs::create_dir_all(target_dir).await?;

    let target = target_dir.to_string_lossy().into_owned();
    let archive_arg = archive.to_string_lossy().into_owned();

    let (program, args): (&str, Vec<String>) = match extension.as_str() {
        "rar" => (
            "unrar",
            vec![
                "x".into(),
                "-o+".into(),
                "-y".into(),
                archive_arg.clone(),
                format!("{target}/"),
            ],
        ),
        "zip" => (
            "unzip",
            vec!["-o".into(), archive_arg.clone(), "-d".into(), target.clone()],
        ),
        "tar" => (
            "tar",
            vec![
                "-xf".into(),
                archive_arg.clone(),
                "-C".into(),
                target.clone(),
            ],
        ),
        other => return Err(UnpackError::Unsupported(other.to_string())),
    };

    match run_tool(program, &args, timeout_secs).await {
        Err(UnpackError::ToolNotFound(_)) => {
            // Fall back to 7z, which handles all three formats.
            let args = vec![
                "x".to_string(),
                "-y".to_string(),
                format!("-o{target}"),
                archive_arg,
            ];
            run_tool("7z", &args, timeout_secs).await
        }
        result => result,
    }
}

async fn run_tool(program: &str, args: &[String], timeout_secs: u64) -> Result<(), UnpackError> {
    debug!("Running {program} {}", args.join(" "));

    let output = match timeout(
        Duration::from_secs(timeout_secs),
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UnpackError::ToolNotFound(program.to_string()));
        }
        Ok(Err(e)) => return Err(UnpackError::Io(e)),
        Err(_) => return Err(UnpackError::Timeout(timeout_secs)),
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        Err(UnpackError::ExtractionFailed(format!(
            "{program} exited with {}: {tail}",
            output.status
        )))
    }
}
