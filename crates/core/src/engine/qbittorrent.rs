//! qBittorrent Web API v2 engine implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::EngineConfig;

use super::{
    DownloadEngine, EngineError, EngineProvider, JobId, JobPayload, JobRecord, JobSnapshot,
    JobState,
};

/// qBittorrent client. Each instance owns its own connection pool and cookie jar.
pub struct QBittorrentEngine {
    client: Client,
    config: EngineConfig,
    /// Set after a successful login (the cookie itself lives in the client's jar).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentEngine {
    /// Create a new qBittorrent client.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), EngineError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(EngineError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(EngineError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), EngineError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    async fn invalidate_session(&self) {
        let mut session = self.session.write().await;
        *session = None;
    }

    /// Make an authenticated GET request.
    async fn get(&self, endpoint: &str) -> Result<String, EngineError> {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            // Session expired, retry once after login
            warn!("qBittorrent session expired, re-authenticating");
            self.invalidate_session().await;
            self.login().await?;

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(map_transport_error)?;
            return read_body(response).await;
        }

        read_body(response).await
    }

    /// Make an authenticated POST request with multipart data.
    ///
    /// Takes a builder because a multipart form can only be sent once.
    async fn post_multipart<F>(&self, endpoint: &str, build_form: F) -> Result<String, EngineError>
    where
        F: Fn() -> Result<multipart::Form, EngineError>,
    {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .post(&url)
            .multipart(build_form()?)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            self.invalidate_session().await;
            self.login().await?;

            let response = self
                .client
                .post(&url)
                .multipart(build_form()?)
                .send()
                .await
                .map_err(map_transport_error)?;
            return read_body(response).await;
        }

        read_body(response).await
    }
}

fn map_transport_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else if e.is_connect() {
        EngineError::ConnectionFailed(e.to_string())
    } else {
        EngineError::ApiError(e.to_string())
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, EngineError> {
    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        return Err(EngineError::AuthenticationFailed(
            "Session rejected after re-login".to_string(),
        ));
    }
    if !status.is_success() {
        return Err(EngineError::ApiError(format!("HTTP {}", status)));
    }

    response
        .text()
        .await
        .map_err(|e| EngineError::ApiError(e.to_string()))
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    dlspeed: i64,
    #[serde(default)]
    upspeed: i64,
    #[serde(default)]
    num_seeds: i64,
    #[serde(default)]
    num_leechs: i64,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    eta: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    category: String,
    /// Comma separated list.
    #[serde(default)]
    tags: String,
    #[serde(default = "unknown_availability")]
    availability: f64,
}

fn unknown_availability() -> f64 {
    -1.0
}

impl QBTorrentInfo {
    fn into_job_record(self) -> JobRecord {
        JobRecord {
            id: JobId::new(self.hash.to_lowercase()),
            name: self.name,
            state: parse_qb_state(&self.state),
            raw_state: self.state,
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            download_speed: self.dlspeed.max(0) as u64,
            upload_speed: self.upspeed.max(0) as u64,
            // qBittorrent reports 8640000 (100 days) for "infinite"
            eta_secs: if self.eta > 0 && self.eta < 8640000 {
                Some(self.eta as u64)
            } else {
                None
            },
            peers: self.num_leechs.max(0) as u32,
            seeds: self.num_seeds.max(0) as u32,
            ratio: self.ratio,
            category: if self.category.is_empty() {
                None
            } else {
                Some(self.category)
            },
            tags: self
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            added_at: timestamp_to_datetime(self.added_on),
            availability: self.availability,
            save_path: if self.save_path.is_empty() {
                None
            } else {
                Some(self.save_path)
            },
        }
    }
}

/// Parse qBittorrent state string to JobState.
fn parse_qb_state(state: &str) -> JobState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
            JobState::Downloading
        }
        "stalledDL" => JobState::Stalled,
        "uploading" | "forcedUP" => JobState::Seeding,
        "stalledUP" => JobState::StalledUpload,
        "pausedUP" | "stoppedUP" => JobState::PausedComplete,
        "completed" => JobState::Completed,
        "error" => JobState::Error,
        "missingFiles" => JobState::MissingFiles,
        _ => JobState::Other,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl DownloadEngine for QBittorrentEngine {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn authenticate(&self) -> Result<(), EngineError> {
        self.invalidate_session().await;
        self.login().await
    }

    async fn list_jobs(&self) -> Result<JobSnapshot, EngineError> {
        let response = self.get("/api/v2/torrents/info").await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response)
            .map_err(|e| EngineError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(JobSnapshot::new(
            torrents.into_iter().map(|t| t.into_job_record()).collect(),
        ))
    }

    async fn submit_job(&self, payload: &JobPayload, destination: &str) -> Result<(), EngineError> {
        debug!(payload = %payload.describe(), destination, "Submitting job to qBittorrent");

        let body = self
            .post_multipart("/api/v2/torrents/add", || {
                let form = match payload {
                    JobPayload::Magnet { uri } => multipart::Form::new().text("urls", uri.clone()),
                    JobPayload::TorrentFile { data, filename } => {
                        let file_part = multipart::Part::bytes(data.clone())
                            .file_name(
                                filename
                                    .clone()
                                    .unwrap_or_else(|| "torrent.torrent".to_string()),
                            )
                            .mime_str("application/x-bittorrent")
                            .map_err(|e| EngineError::InvalidPayload(e.to_string()))?;
                        multipart::Form::new().part("torrents", file_part)
                    }
                };
                Ok(form.text("savepath", destination.to_string()))
            })
            .await?;

        // The add endpoint answers 200 "Fails." when it rejects the payload
        if body.trim() == "Fails." {
            return Err(EngineError::InvalidPayload(format!(
                "qBittorrent rejected {}",
                payload.describe()
            )));
        }

        Ok(())
    }
}

/// Builds a fresh [`QBittorrentEngine`] per caller.
pub struct QBittorrentProvider {
    config: EngineConfig,
}

impl QBittorrentProvider {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineProvider for QBittorrentProvider {
    fn connect(&self) -> Result<Arc<dyn DownloadEngine>, EngineError> {
        Ok(Arc::new(QBittorrentEngine::new(self.config.clone())?))
    }
}
