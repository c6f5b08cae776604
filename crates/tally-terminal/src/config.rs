//! # Terminal Configuration
//!
//! Settings for one terminal process.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DEVICE_ID=register-1                                         │
//! │     TALLY_TAX_RATE=8.25                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/terminal.toml (Linux)                          │
//! │     ~/Library/Application Support/com.tally.pos/terminal.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated device_id, branch "main", no tax                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # terminal.toml
//! [terminal]
//! device_id = "register-1"
//! branch_id = "north"
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! max_connections = 5
//!
//! [sale]
//! tax_rate_bps = 825
//! max_lines_warning = 100
//! overpayment_warning_factor = 2
//!
//! [recovery]
//! idle_expiry_hours = 24
//! sweep_interval_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::validation::validate_tax_rate_bps;
use tally_core::{StepLimits, TaxRate, DEFAULT_IDLE_EXPIRY_HOURS};

use crate::error::ConfigError;

// =============================================================================
// Sections
// =============================================================================

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSection {
    /// Stamped onto every transaction and finalized sale.
    /// Auto-generated on first run if not provided.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Branch used for branch-scoped pricing rules.
    #[serde(default = "default_branch_id")]
    pub branch_id: String,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_branch_id() -> String {
    "main".to_string()
}

impl Default for TerminalSection {
    fn default() -> Self {
        TerminalSection {
            device_id: default_device_id(),
            branch_id: default_branch_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// SQLite file. `None` means `<data dir>/tally.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Sale math and validation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleSection {
    /// Tax rate in basis points (825 = 8.25%).
    #[serde(default)]
    pub tax_rate_bps: u32,

    /// Items-step warning threshold.
    #[serde(default = "default_max_lines_warning")]
    pub max_lines_warning: usize,

    /// Payment-step warning when tendered exceeds this multiple of the total.
    #[serde(default = "default_overpayment_factor")]
    pub overpayment_warning_factor: i64,
}

fn default_max_lines_warning() -> usize {
    StepLimits::default().max_lines_warning
}

fn default_overpayment_factor() -> i64 {
    StepLimits::default().overpayment_factor
}

impl Default for SaleSection {
    fn default() -> Self {
        SaleSection {
            tax_rate_bps: 0,
            max_lines_warning: default_max_lines_warning(),
            overpayment_warning_factor: default_overpayment_factor(),
        }
    }
}

/// Idle expiry of abandoned transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySection {
    #[serde(default = "default_idle_expiry_hours")]
    pub idle_expiry_hours: i64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Upper bound for `idle_expiry_hours` (100 years).
pub const MAX_IDLE_EXPIRY_HOURS: i64 = 8_760 * 100;

fn default_idle_expiry_hours() -> i64 {
    DEFAULT_IDLE_EXPIRY_HOURS
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for RecoverySection {
    fn default() -> Self {
        RecoverySection {
            idle_expiry_hours: default_idle_expiry_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub terminal: TerminalSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub sale: SaleSection,

    #[serde(default)]
    pub recovery: RecoverySection,
}

impl TerminalConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (terminal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Serialize("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Terminal config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terminal.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id must not be empty".into()));
        }

        if self.terminal.branch_id.trim().is_empty() {
            return Err(ConfigError::Invalid("branch_id must not be empty".into()));
        }

        validate_tax_rate_bps(self.sale.tax_rate_bps)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.sale.overpayment_warning_factor < 1 {
            return Err(ConfigError::Invalid(
                "overpayment_warning_factor must be at least 1".into(),
            ));
        }

        if self.recovery.idle_expiry_hours <= 0 {
            return Err(ConfigError::Invalid(
                "idle_expiry_hours must be greater than 0".into(),
            ));
        }

        if self.recovery.idle_expiry_hours > MAX_IDLE_EXPIRY_HOURS {
            return Err(ConfigError::Invalid(format!(
                "idle_expiry_hours must be at most {MAX_IDLE_EXPIRY_HOURS}"
            )));
        }

        if self.recovery.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.terminal.device_id = id;
        }

        if let Ok(id) = std::env::var("TALLY_BRANCH_ID") {
            self.terminal.branch_id = id;
        }

        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        // Percent, e.g. "8.25"
        if let Ok(rate) = std::env::var("TALLY_TAX_RATE") {
            match rate.parse::<f64>() {
                Ok(pct) if pct >= 0.0 => {
                    self.sale.tax_rate_bps = TaxRate::from_percentage(pct).bps();
                }
                _ => warn!(rate = %rate, "Ignoring unparseable TALLY_TAX_RATE"),
            }
        }

        if let Ok(hours) = std::env::var("TALLY_IDLE_EXPIRY_HOURS") {
            if let Ok(h) = hours.parse::<i64>() {
                self.recovery.idle_expiry_hours = h;
            }
        }

        if let Ok(secs) = std::env::var("TALLY_SWEEP_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.recovery.sweep_interval_secs = s;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Configured database file, else the platform data directory, else `./tally.db`.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }

        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.data_dir().join("tally.db"))
            .unwrap_or_else(|| PathBuf::from("./tally.db"))
    }

    pub fn device_id(&self) -> &str {
        &self.terminal.device_id
    }

    pub fn branch_id(&self) -> &str {
        &self.terminal.branch_id
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.sale.tax_rate_bps)
    }

    pub fn step_limits(&self) -> StepLimits {
        StepLimits {
            max_lines_warning: self.sale.max_lines_warning,
            overpayment_factor: self.sale.overpayment_warning_factor,
        }
    }

    /// Clamped to `1..=MAX_IDLE_EXPIRY_HOURS` hours, even on an unvalidated config.
    pub fn idle_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.recovery
                .idle_expiry_hours
                .clamp(1, MAX_IDLE_EXPIRY_HOURS),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.recovery.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TerminalConfig::default();
        assert!(!config.terminal.device_id.is_empty());
        assert_eq!(config.terminal.branch_id, "main");
        assert_eq!(config.sale.max_lines_warning, 100);
        assert_eq!(config.recovery.idle_expiry_hours, 24);
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TerminalConfig::default();

        config.terminal.device_id = String::new();
        assert!(config.validate().is_err());

        config.terminal.device_id = "register-1".to_string();
        config.sale.tax_rate_bps = 10_001;
        assert!(config.validate().is_err());

        config.sale.tax_rate_bps = 825;
        config.recovery.idle_expiry_hours = 0;
        assert!(config.validate().is_err());

        config.recovery.idle_expiry_hours = 10_000_000_000;
        assert!(config.validate().is_err());

        config.recovery.idle_expiry_hours = MAX_IDLE_EXPIRY_HOURS;
        assert!(config.validate().is_ok());

        config.recovery.idle_expiry_hours = 24;
        config.recovery.sweep_interval_secs = 0;
        assert!(config.validate().is_err());

        config.recovery.sweep_interval_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_idle_expiry_is_clamped() {
        let mut config = TerminalConfig::default();

        config.recovery.idle_expiry_hours = 10_000_000_000;
        assert_eq!(
            config.idle_expiry(),
            chrono::Duration::hours(MAX_IDLE_EXPIRY_HOURS)
        );

        config.recovery.idle_expiry_hours = -5;
        assert_eq!(config.idle_expiry(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TerminalConfig = toml::from_str(
            r#"
            [terminal]
            device_id = "register-7"

            [sale]
            tax_rate_bps = 825
            "#,
        )
        .unwrap();

        assert_eq!(config.device_id(), "register-7");
        assert_eq!(config.branch_id(), "main");
        assert_eq!(config.tax_rate().bps(), 825);
        assert_eq!(config.step_limits(), StepLimits::default());
        assert_eq!(config.idle_expiry(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = TerminalConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/tally.db"));

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: TerminalConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.terminal.device_id, config.terminal.device_id);
        assert_eq!(parsed.database_path(), PathBuf::from("/tmp/tally.db"));
    }
}
