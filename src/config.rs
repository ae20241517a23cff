use crate::dates::offset_from_minutes;
use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "ROSTERD_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "rosterd";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Opened at start-up so callers can skip `workspace.select`.
    pub workspace: Option<PathBuf>,
    /// Used for tenants that never called `tenants.configure`.
    pub default_utc_offset_minutes: i32,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: None,
            default_utc_offset_minutes: 0,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Defaults, then `rosterd.toml` (or the file named by `ROSTERD_CONFIG`), then
    /// `ROSTERD_*` environment variables. A `.env` file is loaded first if present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => File::with_name(path.trim()).required(true),
            _ => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            // Example: ROSTERD_DEFAULT_UTC_OFFSET_MINUTES=330
            .add_source(
                Environment::with_prefix("ROSTERD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        offset_from_minutes(self.default_utc_offset_minutes)?;
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn empty_config_gives_defaults() {
        let s = from_toml("").unwrap();
        assert_eq!(s.workspace, None);
        assert_eq!(s.default_utc_offset_minutes, 0);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.log_format, LogFormat::Pretty);
    }

    #[test]
    fn file_values_override_defaults() {
        let s = from_toml(
            r#"
            workspace = "/var/lib/rosterd"
            default_utc_offset_minutes = 330
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(s.workspace, Some(PathBuf::from("/var/lib/rosterd")));
        assert_eq!(s.default_utc_offset_minutes, 330);
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn out_of_range_offset_fails_validation() {
        assert!(from_toml("default_utc_offset_minutes = 2000").is_err());
        assert!(from_toml("log_format = \"xml\"").is_err());
    }
}
