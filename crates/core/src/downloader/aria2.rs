//! aria2 download agent backend.
//!
//! Transfers are delegated to an external aria2 process reachable over its
//! JSON-RPC interface. Rather than one status call per transfer, the
//! orchestrator fetches a single snapshot of every agent job per tick
//! ([`Aria2Client::tell_all`]) and fans it out to each active worker
//! ([`Aria2Downloader::apply_status`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use crate::config::Aria2Config;

use super::types::{CompletionSlot, DownloadProgress, DownloaderError};

/// JSON-RPC client for the aria2 control socket.
pub struct Aria2Client {
    client: Client,
    config: Aria2Config,
}

impl Aria2Client {
    /// Create a new aria2 client.
    pub fn new(config: Aria2Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Prepend the `token:<secret>` parameter aria2 expects when secured.
    fn with_token(&self, params: Vec<Value>) -> Vec<Value> {
        match self.config.secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                let mut all = Vec::with_capacity(params.len() + 1);
                all.push(json!(format!("token:{secret}")));
                all.extend(params);
                all
            }
            _ => params,
        }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, DownloaderError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "drover",
            "method": method,
            "params": self.with_token(params),
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloaderError::Timeout
                } else if e.is_connect() {
                    DownloaderError::ConnectionFailed(e.to_string())
                } else {
                    DownloaderError::Agent(e.to_string())
                }
            })?;

        let status = response.status();
        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| DownloaderError::Agent(format!("invalid RPC response: {e}")))?;

        if let Some(error) = rpc.error {
            return Err(DownloaderError::Agent(error.message));
        }

        rpc.result
            .ok_or_else(|| DownloaderError::Agent(format!("empty RPC result (HTTP {status})")))
    }

    /// Submit a transfer. Returns the agent's job id (gid).
    pub async fn add_uri(
        &self,
        uri: &str,
        dir: &Path,
        file_name: &str,
    ) -> Result<String, DownloaderError> {
        let options = json!({
            "dir": dir.to_string_lossy(),
            "out": file_name,
        });
        let result = self
            .call("aria2.addUri", vec![json!([uri]), options])
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DownloaderError::Agent("addUri returned no gid".to_string()))
    }

    /// Snapshot of every job the agent knows about: active, waiting and
    /// stopped. One call per tick serves all active workers.
    pub async fn tell_all(&self) -> Result<Vec<AgentJob>, DownloaderError> {
        let mut jobs = Vec::new();
        let active = self.call("aria2.tellActive", vec![]).await?;
        jobs.extend(parse_jobs(active)?);
        let waiting = self
            .call("aria2.tellWaiting", vec![json!(0), json!(1000)])
            .await?;
        jobs.extend(parse_jobs(waiting)?);
        let stopped = self
            .call("aria2.tellStopped", vec![json!(0), json!(1000)])
            .await?;
        jobs.extend(parse_jobs(stopped)?);
        Ok(jobs)
    }

    pub async fn pause(&self, gid: &str) -> Result<(), DownloaderError> {
        self.call("aria2.pause", vec![json!(gid)]).await.map(|_| ())
    }

    pub async fn unpause(&self, gid: &str) -> Result<(), DownloaderError> {
        self.call("aria2.unpause", vec![json!(gid)])
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, gid: &str) -> Result<(), DownloaderError> {
        self.call("aria2.remove", vec![json!(gid)])
            .await
            .map(|_| ())
    }
}

fn parse_jobs(value: Value) -> Result<Vec<AgentJob>, DownloaderError> {
    serde_json::from_value(value)
        .map_err(|e| DownloaderError::Agent(format!("invalid job list: {e}")))
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// One job as reported by the agent. aria2 serializes numbers as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJob {
    pub gid: String,
    pub status: String,
    #[serde(default)]
    total_length: String,
    #[serde(default)]
    completed_length: String,
    #[serde(default)]
    download_speed: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl AgentJob {
    pub fn total_length(&self) -> u64 {
        self.total_length.parse().unwrap_or(0)
    }

    pub fn completed_length(&self) -> u64 {
        self.completed_length.parse().unwrap_or(0)
    }

    pub fn download_speed(&self) -> u64 {
        self.download_speed.parse().unwrap_or(0)
    }
}

/// One transfer delegated to the agent.
pub struct Aria2Downloader {
    client: Arc<Aria2Client>,
    link: String,
    dest_dir: PathBuf,
    file_name: String,
    gid: RwLock<Option<String>>,
    completion: CompletionSlot,
    progress: watch::Sender<DownloadProgress>,
}

impl Aria2Downloader {
    pub fn new(
        client: Arc<Aria2Client>,
        link: String,
        dest_dir: PathBuf,
        file_name: String,
    ) -> Self {
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            client,
            link,
            dest_dir,
            file_name,
            gid: RwLock::new(None),
            completion: CompletionSlot::new(),
            progress,
        }
    }

    pub fn completion(&self) -> CompletionSlot {
        self.completion.clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Submit the transfer to the agent. Completion is reported later through
    /// the completion slot once the batched status poll sees the job settle.
    pub async fn start(&self) -> Result<Option<String>, DownloaderError> {
        let gid = self
            .client
            .add_uri(&self.link, &self.dest_dir, &self.file_name)
            .await?;
        debug!("aria2 accepted transfer of {} as gid {gid}", self.file_name);
        *self.gid.write().await = Some(gid.clone());
        Ok(Some(gid))
    }

    /// Fold one batched agent snapshot into this worker's state.
    ///
    /// The job being absent from the snapshot means the agent finished and
    /// purged it, which counts as success.
    pub async fn apply_status(&self, jobs: &[AgentJob]) {
        let gid = match self.gid.read().await.clone() {
            Some(gid) => gid,
            // Not submitted yet, nothing to match against.
            None => return,
        };

        if self.completion.is_set().await {
            return;
        }

        match jobs.iter().find(|j| j.gid == gid) {
            None => {
                debug!("gid {gid} no longer reported by agent, assuming complete");
                self.completion.succeed(self.dest_path()).await;
            }
            Some(job) => match job.status.as_str() {
                "complete" => {
                    self.completion.succeed(self.dest_path()).await;
                }
                "error" => {
                    let error = job
                        .error_message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "agent reported an error".to_string());
                    self.completion.fail(error).await;
                }
                "removed" => {
                    self.completion.fail("removed from the download agent").await;
                }
                _ => {
                    let _ = self.progress.send(DownloadProgress {
                        bytes_done: job.completed_length(),
                        bytes_total: job.total_length(),
                        speed: job.download_speed(),
                    });
                }
            },
        }
    }

    pub async fn cancel(&self) {
        if let Some(gid) = self.gid.read().await.clone() {
            if let Err(e) = self.client.remove(&gid).await {
                warn!("Failed to remove gid {gid} from agent: {e}");
            }
        }
    }

    pub async fn pause(&self) {
        if let Some(gid) = self.gid.read().await.clone() {
            if let Err(e) = self.client.pause(&gid).await {
                warn!("Failed to pause gid {gid}: {e}");
            }
        }
    }

    pub async fn resume(&self) {
        if let Some(gid) = self.gid.read().await.clone() {
            if let Err(e) = self.client.unpause(&gid).await {
                warn!("Failed to resume gid {gid}: {e}");
            }
        }
    }

    fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.file_name)
    }
}
