//! Application configuration — every tunable as an operator-editable TOML value.
//!
//! The config is a closed struct tree parsed once at startup and immutable
//! thereafter. Each struct implements `Default` with the documented defaults,
//! so a missing file or missing section changes nothing.
//!
//! ## Loading Order
//!
//! 1. `CAREWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `carewatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Environment Overrides
//!
//! Applied after parsing, so secrets stay out of the config file:
//! `CAREWATCH_BOT_TOKEN`, `CAREWATCH_DB_PATH`,
//! `CAREWATCH_DASHBOARD_USERNAME`, `CAREWATCH_DASHBOARD_PASSWORD`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Placeholder password that must never survive into a guarded deployment.
const DEFAULT_DASHBOARD_PASSWORD: &str = "changeme";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

/// Routine model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Slot width in minutes. Only 15 is supported.
    pub slot_minutes: u32,
    /// Start of the awake window (local hour)
    pub awake_start_hour: u32,
    /// End of the awake window (local hour, exclusive)
    pub awake_end_hour: u32,
    /// Length of the learning phase in training days
    pub learning_days: i64,
    /// Beta prior alpha for every (slot, channel) cell
    pub prior_alpha: f64,
    /// Beta prior beta for every (slot, channel) cell
    pub prior_beta: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 15,
            awake_start_hour: 6,
            awake_end_hour: 23,
            learning_days: 14,
            prior_alpha: 1.0,
            prior_beta: 1.0,
        }
    }
}

/// Alert thresholds and real-time check tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Composite z at which a gentle (level 1) alert starts
    pub z_threshold_gentle: f64,
    /// Composite z at which a serious (level 2) alert starts
    pub z_threshold_serious: f64,
    /// Composite z at which an emergency (level 3) alert starts
    pub z_threshold_emergency: f64,
    /// Minimum normal days before the baseline is usable
    pub min_train_days: i64,
    /// Hour of the morning vital-sign check
    pub morning_check_hour: u32,
    /// Hours of daytime silence before an extended-silence alert
    pub silence_threshold_hours: i64,
    /// Minutes in the bathroom without exit movement before a fall
    /// suspicion fires. 0 disables the check.
    pub fall_detection_minutes: i64,
    /// Minimum gap between emissions at the same alert tier
    pub cooldown_hours: i64,
    /// Daily cap on morning-silence notifications
    pub morning_max_per_day: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            z_threshold_gentle: 2.0,
            z_threshold_serious: 3.0,
            z_threshold_emergency: 4.0,
            min_train_days: 7,
            morning_check_hour: 11,
            silence_threshold_hours: 3,
            fall_detection_minutes: 45,
            cooldown_hours: 6,
            morning_max_per_day: 2,
        }
    }
}

/// Telegram messenger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Bot token. Empty disables all outbound notifications.
    pub bot_token: String,
    /// Primary caregiver chat ids
    pub chat_ids: Vec<String>,
    /// Secondary contacts paged when a level-3 alert goes unacknowledged
    pub emergency_chat_ids: Vec<String>,
    /// Minutes before an unacknowledged level-3 alert escalates
    pub escalation_minutes: i64,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_ids: Vec::new(),
            emergency_chat_ids: Vec::new(),
            escalation_minutes: 10,
        }
    }
}

/// Embedded store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path
    pub path: String,
    /// Days of raw sensor events to keep
    pub retention_days: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/carewatch.db".to_string(),
            retention_days: 90,
        }
    }
}

/// Credentials for the (external) web dashboard. Carried here because the
/// config contract owns their env overrides and the startup guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub username: String,
    pub password: String,
}

/// Cross-cutting system flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Seed value for vacation mode; the persisted flag wins thereafter
    pub vacation_mode: bool,
    /// Window for the weekly frailty trend regression
    pub trend_analysis_days: i64,
    /// Minimum days of data before a trend is reported
    pub trend_min_days: i64,
    /// Slope above which a bathroom-usage increase is reported
    pub trend_bathroom_threshold: f64,
    /// Slope below which a presence decrease is reported
    pub trend_presence_threshold: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            vacation_mode: false,
            trend_analysis_days: 30,
            trend_min_days: 14,
            trend_bathroom_threshold: 0.3,
            trend_presence_threshold: -0.3,
        }
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration. Load with [`AppConfig::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub alerts: AlertsConfig,
    pub messenger: MessengerConfig,
    pub database: DatabaseConfig,
    pub dashboard: DashboardConfig,
    pub system: SystemConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides and validate. Any validation failure is fatal
    /// to startup, by design.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_unvalidated()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path (CLI `--config`), with the same override
    /// and validation steps.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn load_unvalidated() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CAREWATCH_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::parse_file(&p)?;
                info!(path = %p.display(), "loaded config from CAREWATCH_CONFIG");
                return Ok(config);
            }
            warn!(path = %path, "CAREWATCH_CONFIG points to a non-existent file, falling back");
        }

        let local = PathBuf::from("carewatch.toml");
        if local.exists() {
            let config = Self::parse_file(&local)?;
            info!("loaded config from ./carewatch.toml");
            return Ok(config);
        }

        info!("no carewatch.toml found, using built-in defaults");
        Ok(Self::default())
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Environment variables beat file values, so Docker secrets never have
    /// to be written into the TOML.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("CAREWATCH_BOT_TOKEN") {
            if !token.is_empty() {
                self.messenger.bot_token = token;
            }
        }
        if let Ok(path) = std::env::var("CAREWATCH_DB_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(user) = std::env::var("CAREWATCH_DASHBOARD_USERNAME") {
            if !user.is_empty() {
                self.dashboard.username = user;
            }
        }
        if let Ok(pass) = std::env::var("CAREWATCH_DASHBOARD_PASSWORD") {
            if !pass.is_empty() {
                self.dashboard.password = pass;
            }
        }
    }

    /// Structural invariants. Violations abort startup before any job is
    /// registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.slot_minutes != 15 {
            return Err(ConfigError::Invalid(format!(
                "model.slot_minutes must be 15 (got {})",
                self.model.slot_minutes
            )));
        }
        if self.model.awake_start_hour >= self.model.awake_end_hour
            || self.model.awake_end_hour > 24
        {
            return Err(ConfigError::Invalid(format!(
                "awake window [{}, {}) is not a valid hour range",
                self.model.awake_start_hour, self.model.awake_end_hour
            )));
        }
        if self.model.learning_days < 1 {
            return Err(ConfigError::Invalid(
                "model.learning_days must be at least 1".to_string(),
            ));
        }
        if self.model.prior_alpha <= 0.0 || self.model.prior_beta <= 0.0 {
            return Err(ConfigError::Invalid(
                "beta priors must be strictly positive".to_string(),
            ));
        }
        let a = &self.alerts;
        if !(a.z_threshold_gentle < a.z_threshold_serious
            && a.z_threshold_serious < a.z_threshold_emergency)
        {
            return Err(ConfigError::Invalid(format!(
                "alert thresholds must be strictly increasing (gentle {} / serious {} / emergency {})",
                a.z_threshold_gentle, a.z_threshold_serious, a.z_threshold_emergency
            )));
        }
        if a.min_train_days < 1 {
            return Err(ConfigError::Invalid(
                "alerts.min_train_days must be at least 1".to_string(),
            ));
        }
        if self.messenger.escalation_minutes < 1 {
            return Err(ConfigError::Invalid(
                "messenger.escalation_minutes must be at least 1".to_string(),
            ));
        }
        if self.database.retention_days < 1 {
            return Err(ConfigError::Invalid(
                "database.retention_days must be at least 1".to_string(),
            ));
        }
        // A dashboard with a username but a missing or placeholder password
        // is a deployment mistake, not something to limp along with.
        if !self.dashboard.username.is_empty()
            && (self.dashboard.password.is_empty()
                || self.dashboard.password == DEFAULT_DASHBOARD_PASSWORD)
        {
            return Err(ConfigError::Invalid(
                "dashboard.username is set but dashboard.password is empty or still the default"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// First slot of the awake window.
    pub fn awake_start_slot(&self) -> usize {
        (self.model.awake_start_hour * 4) as usize
    }

    /// One-past-last slot of the awake window.
    pub fn awake_end_slot(&self) -> usize {
        (self.model.awake_end_hour * 4) as usize
    }
}
