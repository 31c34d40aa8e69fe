//! Service Settings

use acquisition::AcquisitionConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use turbine_protocol::DEFAULT_BAUD_RATE;

/// Prefix for environment overrides, e.g. `WINDFARM__SERIAL__PORT`
pub const ENV_PREFIX: &str = "WINDFARM";

/// Settings loading errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid acquisition settings: {0}")]
    Acquisition(#[from] acquisition::ConfigError),

    #[error("Invalid serial settings: {0}")]
    Serial(String),
}

/// Serial link to the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Log output and recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
    /// Append every delivered batch to this TSV file
    pub record_path: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            record_path: None,
        }
    }
}

/// Top-level service settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial: SerialSettings,
    pub acquisition: AcquisitionConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load defaults, then the optional TOML file, then `WINDFARM__*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        Self::from_sources(builder, environment())
    }

    fn from_sources(
        builder: ConfigBuilder<DefaultState>,
        env: Environment,
    ) -> Result<Self, SettingsError> {
        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.serial.port.trim().is_empty() {
            return Err(SettingsError::Serial("port must not be empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(SettingsError::Serial("baud_rate must be positive".to_string()));
        }
        self.acquisition.validate()?;
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbine_protocol::{DeviceVariant, PowerMode};

    fn no_env() -> Environment {
        environment().source(Some(config::Map::new()))
    }

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Settings::from_sources(builder, no_env())
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::from_sources(Config::builder(), no_env()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.acquisition.capacity, 100);
    }

    #[test]
    fn test_toml_file() {
        let settings = from_toml(
            r#"
            [serial]
            port = "/dev/ttyUSB1"

            [acquisition]
            variant = "wind_farm"
            capacity = 500
            batch_size = 50
            power_mode = "raw"

            [logging]
            json = true
            record_path = "/tmp/farm.tsv"
            "#,
        )
        .unwrap();

        assert_eq!(settings.serial.port, "/dev/ttyUSB1");
        assert_eq!(settings.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(settings.acquisition.variant, DeviceVariant::WindFarm);
        assert_eq!(settings.acquisition.batch_size(), 50);
        assert_eq!(settings.acquisition.power_mode, PowerMode::Raw);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.record_path, Some(PathBuf::from("/tmp/farm.tsv")));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut vars = config::Map::new();
        vars.insert("WINDFARM__SERIAL__PORT".to_string(), "/dev/ttyS3".to_string());
        vars.insert("WINDFARM__ACQUISITION__CAPACITY".to_string(), "20".to_string());

        let builder = Config::builder().add_source(File::from_str(
            "[serial]\nport = \"/dev/ttyUSB1\"\n",
            FileFormat::Toml,
        ));
        let settings = Settings::from_sources(builder, environment().source(Some(vars))).unwrap();

        assert_eq!(settings.serial.port, "/dev/ttyS3");
        assert_eq!(settings.acquisition.capacity, 20);
    }

    #[test]
    fn test_invalid_acquisition_rejected() {
        let result = from_toml("[acquisition]\ncapacity = 10\nbatch_size = 20\n");
        assert!(matches!(result, Err(SettingsError::Acquisition(e)) if e.field == "batch_size"));
    }

    #[test]
    fn test_empty_port_rejected() {
        let result = from_toml("[serial]\nport = \"\"\n");
        assert!(matches!(result, Err(SettingsError::Serial(_))));
    }
}
