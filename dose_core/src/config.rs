//! Configuration file support for the dose tools.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/doses/config.toml`.

use crate::{Error, Result, ScheduleSettings};
use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub adherence: AdherenceConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_patient_id")]
    pub patient_id: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            patient_id: default_patient_id(),
        }
    }
}

/// Dose scheduling parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: u32,

    #[serde(default = "default_due_soon_minutes")]
    pub due_soon_minutes: u32,

    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            due_soon_minutes: default_due_soon_minutes(),
            horizon_days: default_horizon_days(),
            utc_offset_minutes: 0,
        }
    }
}

/// Adherence reporting windows
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdherenceConfig {
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            period_days: default_period_days(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local/share")
    });
    base.join("doses")
}

fn default_patient_id() -> String {
    "default".into()
}

fn default_grace_minutes() -> u32 {
    30
}

fn default_due_soon_minutes() -> u32 {
    60
}

fn default_horizon_days() -> u32 {
    7
}

fn default_period_days() -> u32 {
    7
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        });
        base.join("doses").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Validate the schedule section and build engine settings from it
    pub fn schedule_settings(&self) -> Result<ScheduleSettings> {
        let schedule = &self.schedule;

        if schedule.horizon_days == 0 {
            return Err(Error::Config("horizon_days must be at least 1".into()));
        }

        let local_offset = FixedOffset::east_opt(schedule.utc_offset_minutes * 60)
            .ok_or_else(|| {
                Error::Config(format!(
                    "utc_offset_minutes out of range: {}",
                    schedule.utc_offset_minutes
                ))
            })?;

        Ok(ScheduleSettings {
            grace: Duration::minutes(i64::from(schedule.grace_minutes)),
            due_soon: Duration::minutes(i64::from(schedule.due_soon_minutes)),
            horizon_days: schedule.horizon_days,
            local_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.patient_id, "default");
        assert_eq!(config.schedule.grace_minutes, 30);
        assert_eq!(config.schedule.horizon_days, 7);
        assert_eq!(config.adherence.period_days, 7);
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses").join("config.toml");

        let mut config = Config::default();
        config.schedule.utc_offset_minutes = 330;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.schedule.utc_offset_minutes, 330);
        assert_eq!(loaded.schedule.grace_minutes, config.schedule.grace_minutes);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[schedule]
grace_minutes = 45
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedule.grace_minutes, 45);
        assert_eq!(config.schedule.due_soon_minutes, 60); // default
        assert_eq!(config.adherence.period_days, 7); // default
    }

    #[test]
    fn test_schedule_settings() {
        let mut config = Config::default();
        config.schedule.utc_offset_minutes = -300;

        let settings = config.schedule_settings().unwrap();
        assert_eq!(settings.grace, Duration::minutes(30));
        assert_eq!(settings.due_soon, Duration::minutes(60));
        assert_eq!(settings.local_offset.local_minus_utc(), -300 * 60);
    }

    #[test]
    fn test_invalid_schedule_settings() {
        let mut config = Config::default();
        config.schedule.utc_offset_minutes = 24 * 60;
        assert!(matches!(config.schedule_settings(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.schedule.horizon_days = 0;
        assert!(matches!(config.schedule_settings(), Err(Error::Config(_))));
    }
}
