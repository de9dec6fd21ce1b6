//! # Application Configuration
//!
//! Configuration for the engine and the server that hosts it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     QUAN_PORT=9090                                                     │
//! │     QUAN_JWT_SECRET=...                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path> / QUAN_CONFIG, else                                │
//! │     ~/.config/quan-pos/quan.toml (Linux)                               │
//! │     ~/Library/Application Support/vn.quan.pos/quan.toml (macOS)        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     port 8080, poll 30 s, stale after 300 s, capacity 256              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/quan/quan.db"
//! max_connections = 8
//!
//! [escalation]
//! enabled = true
//! poll_interval_secs = 30
//! stale_threshold_secs = 300
//! stale_statuses = ["waiting", "in_progress"]
//!
//! [realtime]
//! channel_capacity = 256
//! heartbeat_interval_secs = 20
//!
//! [auth]
//! jwt_secret = "at-least-sixteen-characters"
//! access_token_lifetime_secs = 43200
//!
//! [payments.momo]
//! partner_code = "MOMO"
//! access_key = "..."
//! secret_key = "..."
//!
//! [payments.vietqr]
//! bank_bin = "970436"
//! account_number = "0011001932418"
//! webhook_secret = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use quan_core::{OrderItemStatus, DEFAULT_ESCALATION_POLL_SECS, DEFAULT_STALE_THRESHOLD_SECS};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "QUAN_CONFIG";

const MIN_JWT_SECRET_LEN: usize = 16;

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `quan.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Configured path, else the platform data directory, else `./quan.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join("quan.db"))
                .unwrap_or_else(|| PathBuf::from("quan.db"))
        })
    }
}

// =============================================================================
// Escalation
// =============================================================================

/// Auto-return worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Age after which an item counts as stuck.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,

    /// Statuses considered stuck once old enough.
    #[serde(default = "default_stale_statuses")]
    pub stale_statuses: Vec<OrderItemStatus>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    DEFAULT_ESCALATION_POLL_SECS
}

fn default_stale_threshold() -> u64 {
    DEFAULT_STALE_THRESHOLD_SECS
}

fn default_stale_statuses() -> Vec<OrderItemStatus> {
    vec![OrderItemStatus::Waiting, OrderItemStatus::InProgress]
}

impl Default for EscalationSettings {
    fn default() -> Self {
        EscalationSettings {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            stale_threshold_secs: default_stale_threshold(),
            stale_statuses: default_stale_statuses(),
        }
    }
}

// =============================================================================
// Realtime
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_heartbeat_interval() -> u64 {
    20
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        RealtimeSettings {
            channel_capacity: default_channel_capacity(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

// =============================================================================
// Offline queue
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    /// Actions read per round trip while flushing.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    50
}

impl Default for OfflineSettings {
    fn default() -> Self {
        OfflineSettings {
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret for access tokens. Generated per process when absent,
    /// which logs everyone out on restart.
    #[serde(default = "generate_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_token_lifetime")]
    pub access_token_lifetime_secs: i64,

    /// Admin account created on first start when no staff exist.
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn default_token_lifetime() -> i64 {
    12 * 60 * 60
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            jwt_secret: generate_secret(),
            access_token_lifetime_secs: default_token_lifetime(),
            bootstrap_admin: None,
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Offset of the restaurant's business day from UTC.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset() -> i32 {
    7 * 60
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MomoSettings {
    #[serde(default)]
    pub partner_code: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZaloPaySettings {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub key1: String,
    /// Verifies callbacks.
    #[serde(default)]
    pub key2: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VietQrSettings {
    #[serde(default)]
    pub bank_bin: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub webhook_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSettings {
    #[serde(default)]
    pub momo: MomoSettings,
    #[serde(default)]
    pub zalopay: ZaloPaySettings,
    #[serde(default)]
    pub vietqr: VietQrSettings,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub escalation: EscalationSettings,

    #[serde(default)]
    pub realtime: RealtimeSettings,

    #[serde(default)]
    pub offline: OfflineSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub reports: ReportSettings,

    #[serde(default)]
    pub payments: PaymentSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, `QUAN_CONFIG`, or the platform default)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.server.port == 0 {
            return Err(EngineError::InvalidConfig("server.port must be set".into()));
        }

        if self.escalation.poll_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "escalation.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.escalation.stale_threshold_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "escalation.stale_threshold_secs must be greater than 0".into(),
            ));
        }
        if self.escalation.stale_statuses.is_empty() {
            return Err(EngineError::InvalidConfig(
                "escalation.stale_statuses must not be empty".into(),
            ));
        }
        if let Some(status) = self
            .escalation
            .stale_statuses
            .iter()
            .find(|s| s.is_terminal())
        {
            return Err(EngineError::InvalidConfig(format!(
                "escalation.stale_statuses cannot contain terminal status '{}'",
                status
            )));
        }

        if self.realtime.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "realtime.channel_capacity must be greater than 0".into(),
            ));
        }
        if self.offline.batch_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "offline.batch_size must be greater than 0".into(),
            ));
        }

        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(EngineError::InvalidConfig(format!(
                "auth.jwt_secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.auth.access_token_lifetime_secs <= 0 {
            return Err(EngineError::InvalidConfig(
                "auth.access_token_lifetime_secs must be greater than 0".into(),
            ));
        }

        if !(-12 * 60..=14 * 60).contains(&self.reports.utc_offset_minutes) {
            return Err(EngineError::InvalidConfig(
                "reports.utc_offset_minutes must be between -720 and 840".into(),
            ));
        }

        Ok(())
    }

    /// Applies `QUAN_*` overrides, reading each variable through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("QUAN_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(port) = lookup("QUAN_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid QUAN_PORT"),
            }
        }

        if let Some(path) = lookup("QUAN_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(enabled) = lookup("QUAN_ESCALATION_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.escalation.enabled = true,
                "0" | "false" | "no" | "off" => self.escalation.enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid QUAN_ESCALATION_ENABLED"),
            }
        }
        if let Some(secs) = lookup("QUAN_ESCALATION_POLL_SECS") {
            match secs.parse() {
                Ok(s) => {
                    debug!(secs = s, "Overriding escalation poll interval from environment");
                    self.escalation.poll_interval_secs = s;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid QUAN_ESCALATION_POLL_SECS"),
            }
        }
        if let Some(secs) = lookup("QUAN_STALE_THRESHOLD_SECS") {
            match secs.parse() {
                Ok(s) => {
                    debug!(secs = s, "Overriding stale threshold from environment");
                    self.escalation.stale_threshold_secs = s;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid QUAN_STALE_THRESHOLD_SECS"),
            }
        }

        if let Some(secret) = lookup("QUAN_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let (Some(username), Some(password)) =
            (lookup("QUAN_ADMIN_USERNAME"), lookup("QUAN_ADMIN_PASSWORD"))
        {
            self.auth.bootstrap_admin = Some(BootstrapAdmin { username, password });
        }

        if let Some(key) = lookup("QUAN_MOMO_ACCESS_KEY") {
            self.payments.momo.access_key = key;
        }
        if let Some(key) = lookup("QUAN_MOMO_SECRET_KEY") {
            self.payments.momo.secret_key = key;
        }
        if let Some(key) = lookup("QUAN_ZALOPAY_KEY2") {
            self.payments.zalopay.key2 = key;
        }
        if let Some(secret) = lookup("QUAN_VIETQR_WEBHOOK_SECRET") {
            self.payments.vietqr.webhook_secret = secret;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("quan.toml"))
    }

    /// Stale threshold as a chrono duration.
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.escalation.stale_threshold_secs as i64)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("vn", "quan", "pos")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.escalation.poll_interval_secs, 30);
        assert_eq!(config.escalation.stale_threshold_secs, 300);
        assert_eq!(
            config.escalation.stale_statuses,
            vec![OrderItemStatus::Waiting, OrderItemStatus::InProgress]
        );
        assert_eq!(config.realtime.channel_capacity, 256);
        assert_eq!(config.auth.access_token_lifetime_secs, 43_200);
        assert!(config.auth.jwt_secret.len() >= MIN_JWT_SECRET_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [escalation]
            stale_statuses = ["waiting"]

            [payments.vietqr]
            bank_bin = "970436"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.escalation.stale_statuses, vec![OrderItemStatus::Waiting]);
        assert_eq!(config.escalation.poll_interval_secs, 30);
        assert_eq!(config.payments.vietqr.bank_bin, "970436");
        assert!(config.payments.momo.secret_key.is_empty());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();

        config.escalation.stale_statuses = vec![OrderItemStatus::Cancelled];
        assert!(config.validate().is_err());

        config.escalation.stale_statuses = vec![];
        assert!(config.validate().is_err());

        config.escalation.stale_statuses = vec![OrderItemStatus::Ready];
        assert!(config.validate().is_ok());

        config.auth.jwt_secret = "short".into();
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QUAN_PORT", "9191"),
            ("QUAN_STALE_THRESHOLD_SECS", "120"),
            ("QUAN_ESCALATION_ENABLED", "off"),
            ("QUAN_ADMIN_USERNAME", "admin"),
            ("QUAN_ADMIN_PASSWORD", "secret123"),
            ("QUAN_VIETQR_WEBHOOK_SECRET", "whsec"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9191);
        assert_eq!(config.escalation.stale_threshold_secs, 120);
        assert!(!config.escalation.enabled);
        assert_eq!(
            config.auth.bootstrap_admin.as_ref().map(|a| a.username.as_str()),
            Some("admin")
        );
        assert_eq!(config.payments.vietqr.webhook_secret, "whsec");
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| (key == "QUAN_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_escalation_overrides_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "QUAN_ESCALATION_POLL_SECS" => Some("soon".to_string()),
            "QUAN_STALE_THRESHOLD_SECS" => Some("-5".to_string()),
            _ => None,
        });
        assert_eq!(config.escalation.poll_interval_secs, 30);
        assert_eq!(config.escalation.stale_threshold_secs, 300);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[escalation]"));
        assert!(toml_str.contains("stale_statuses"));
    }
}
