// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tether connection core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tether configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQLite database holding channels and connection events.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Pairing credential persistence.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Session event recorder.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Connection event log retention and query limits.
    #[serde(default)]
    pub events: EventsConfig,

    /// Adapter registry lifecycle and reconnection policy.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Read API server.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Official business API transport.
    #[serde(default)]
    pub cloud_api: CloudApiConfig,

    /// Pairing bridge transport.
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Prometheus metrics export.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of this instance, used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "tether".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    data_dir().join("tether.db").to_string_lossy().into_owned()
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|p| p.join("tether"))
        .unwrap_or_else(|| std::path::PathBuf::from(".tether"))
}

fn default_true() -> bool {
    true
}

/// Which credential backend a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// One JSON file per key under `root_dir/{tenant}/{channel}/`.
    #[default]
    File,
    /// Remote key-value cache addressed as `sessions:{channel}:{key}`.
    Redis,
    /// Process memory only; lost on restart.
    Memory,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub backend: CredentialBackend,

    /// Root directory for the file backend.
    #[serde(default = "default_credentials_root")]
    pub root_dir: String,

    /// Connection URL for the redis backend (e.g. `redis://127.0.0.1:6379/0`).
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound for any single credential read, write, or delete.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: CredentialBackend::default(),
            root_dir: default_credentials_root(),
            redis_url: None,
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl CredentialsConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

fn default_credentials_root() -> String {
    data_dir().join("sessions").to_string_lossy().into_owned()
}

fn default_io_timeout_secs() -> u64 {
    10
}

/// Session event recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether per-connection forensic records are kept at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for mirrored JSON records. `None` keeps records in memory only.
    #[serde(default)]
    pub mirror_dir: Option<String>,

    /// Upper bound for one mirror write.
    #[serde(default = "default_mirror_timeout_secs")]
    pub mirror_timeout_secs: u64,

    /// Entries kept per record; the oldest are dropped beyond this.
    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mirror_dir: None,
            mirror_timeout_secs: default_mirror_timeout_secs(),
            max_entries: default_audit_max_entries(),
        }
    }
}

fn default_mirror_timeout_secs() -> u64 {
    5
}

fn default_audit_max_entries() -> usize {
    1000
}

/// Connection event log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Events older than this are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often the retention purge runs.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Default page size for event listings.
    #[serde(default = "default_event_limit")]
    pub default_limit: u32,

    /// Largest page size a caller may request.
    #[serde(default = "default_max_event_limit")]
    pub max_limit: u32,

    /// Default metrics window in days.
    #[serde(default = "default_metrics_days")]
    pub default_metrics_days: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
            default_limit: default_event_limit(),
            max_limit: default_max_event_limit(),
            default_metrics_days: default_metrics_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

fn default_purge_interval_secs() -> u64 {
    3600
}

fn default_event_limit() -> u32 {
    50
}

fn default_max_event_limit() -> u32 {
    500
}

fn default_metrics_days() -> u32 {
    30
}

/// Adapter registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Upper bound for one `initialize()` call.
    #[serde(default = "default_initialize_timeout_secs")]
    pub initialize_timeout_secs: u64,

    /// First reconnect delay.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Multiplier applied per retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Ceiling for any reconnect delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Reconnect attempts before a channel is left disconnected.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Purge pairing credentials when the network removes the device.
    #[serde(default = "default_true")]
    pub clear_credentials_on_ban: bool,

    /// Connect every active channel at startup.
    #[serde(default = "default_true")]
    pub connect_on_startup: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initialize_timeout_secs: default_initialize_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            max_retries: default_max_retries(),
            clear_credentials_on_ban: true,
            connect_on_startup: true,
        }
    }
}

impl RegistryConfig {
    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_secs(self.initialize_timeout_secs)
    }
}

fn default_initialize_timeout_secs() -> u64 {
    60
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    10
}

/// A bearer token and the single tenant it grants access to.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayToken {
    pub token: String,
    pub tenant_id: String,
}

impl std::fmt::Debug for GatewayToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayToken")
            .field("token", &"[redacted]")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Read API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Tenant-scoped bearer tokens. An empty list rejects every API request.
    #[serde(default)]
    pub tokens: Vec<GatewayToken>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            tokens: Vec::new(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3100
}

/// Official business API transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CloudApiConfig {
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,

    #[serde(default = "default_cloud_api_version")]
    pub api_version: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_cloud_base_url(),
            api_version: default_cloud_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_cloud_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_cloud_api_version() -> String {
    "v21.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Pairing bridge transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairingConfig {
    /// Bridge URL used by channels that do not override it.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:8790/pairing".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
