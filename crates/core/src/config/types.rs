use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory `torrent_path` submissions are read from. Unset disables them.
    #[serde(default)]
    pub torrent_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            torrent_dir: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8090
}

/// Download engine (qBittorrent Web API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Web UI base URL (e.g., "http://127.0.0.1:8080")
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_engine_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u32,
    /// Absolute root that relative pipeline destinations are resolved against
    #[serde(default = "default_scratch_root")]
    pub scratch_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            username: default_engine_username(),
            password: String::new(),
            timeout_secs: default_engine_timeout(),
            scratch_root: default_scratch_root(),
        }
    }
}

fn default_engine_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_engine_username() -> String {
    "admin".to_string()
}

fn default_engine_timeout() -> u32 {
    30
}

fn default_scratch_root() -> String {
    "/data/scratch".to_string()
}

/// How the remote executor manages SSH sessions between commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Open a fresh connection for every command.
    #[default]
    PerCommand,
    /// Reuse one master connection per host via OpenSSH multiplexing.
    Multiplexed,
}

/// Remote conversion host configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_remote_user")]
    pub user: String,
    /// Password auth (driven through sshpass). Key auth is used when unset.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_ssh_path")]
    pub ssh_path: PathBuf,
    #[serde(default = "default_sshpass_path")]
    pub sshpass_path: PathBuf,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Wall-clock bound for connect + command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub session_policy: SessionPolicy,
    #[serde(default = "default_control_persist")]
    pub control_persist_secs: u64,
    /// Directory for multiplexing control sockets (default: system temp dir)
    #[serde(default)]
    pub control_dir: Option<PathBuf>,
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_general_log_dir")]
    pub general_log_dir: String,
    #[serde(default = "default_ffmpeg_log_dir")]
    pub ffmpeg_log_dir: String,
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_remote_host(),
            port: default_remote_port(),
            user: default_remote_user(),
            password: None,
            identity_file: None,
            ssh_path: default_ssh_path(),
            sshpass_path: default_sshpass_path(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            session_policy: SessionPolicy::default(),
            control_persist_secs: default_control_persist(),
            control_dir: None,
            app_dir: default_app_dir(),
            database_file: default_database_file(),
            general_log_dir: default_general_log_dir(),
            ffmpeg_log_dir: default_ffmpeg_log_dir(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}

fn default_remote_port() -> u16 {
    22
}

fn default_remote_user() -> String {
    "root".to_string()
}

fn default_ssh_path() -> PathBuf {
    PathBuf::from("ssh")
}

fn default_sshpass_path() -> PathBuf {
    PathBuf::from("sshpass")
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

fn default_control_persist() -> u64 {
    60
}

fn default_app_dir() -> String {
    "/opt/movie-conversion".to_string()
}

fn default_database_file() -> String {
    "conversion_data.db".to_string()
}

fn default_general_log_dir() -> String {
    "/var/log/conversion/general".to_string()
}

fn default_ffmpeg_log_dir() -> String {
    "/var/log/conversion/ffmpeg".to_string()
}

fn default_log_tail_lines() -> usize {
    50
}

/// Pipeline loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// How often the acquisition poller fetches a job snapshot (milliseconds).
    #[serde(default = "default_acquisition_interval")]
    pub acquisition_poll_interval_ms: u64,
    /// How often the telemetry poller queries the conversion host (milliseconds).
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_poll_interval_ms: u64,
    /// Title used for telemetry lookups when neither the request nor the engine supplies one.
    #[serde(default = "default_title")]
    pub default_title: String,
    /// Capacity of the broadcast channel shared by dashboard subscribers.
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquisition_poll_interval_ms: default_acquisition_interval(),
            telemetry_poll_interval_ms: default_telemetry_interval(),
            default_title: default_title(),
            update_buffer: default_update_buffer(),
        }
    }
}

fn default_acquisition_interval() -> u64 {
    2000 // 2 seconds
}

fn default_telemetry_interval() -> u64 {
    3000 // 3 seconds
}

fn default_title() -> String {
    "Unknown Media".to_string()
}

fn default_update_buffer() -> usize {
    256
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: SanitizedEngineConfig,
    pub remote: SanitizedRemoteConfig,
    pub pipeline: PipelineConfig,
}

/// Sanitized engine config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEngineConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
    pub scratch_root: String,
}

/// Sanitized remote config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub session_policy: SessionPolicy,
    pub app_dir: String,
    pub general_log_dir: String,
    pub ffmpeg_log_dir: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let remote = &config.remote;
        let auth = if remote.password.is_some() {
            "password"
        } else if remote.identity_file.is_some() {
            "identity_file"
        } else {
            "agent"
        };

        Self {
            server: config.server.clone(),
            engine: SanitizedEngineConfig {
                url: config.engine.url.clone(),
                username: config.engine.username.clone(),
                password_configured: !config.engine.password.is_empty(),
                timeout_secs: config.engine.timeout_secs,
                scratch_root: config.engine.scratch_root.clone(),
            },
            remote: SanitizedRemoteConfig {
                host: remote.host.clone(),
                port: remote.port,
                user: remote.user.clone(),
                auth: auth.to_string(),
                connect_timeout_secs: remote.connect_timeout_secs,
                command_timeout_secs: remote.command_timeout_secs,
                session_policy: remote.session_policy,
                app_dir: remote.app_dir.clone(),
                general_log_dir: remote.general_log_dir.clone(),
                ffmpeg_log_dir: remote.ffmpeg_log_dir.clone(),
            },
            pipeline: config.pipeline.clone(),
        }
    }
}
