use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Settings file name inside the configuration directory.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Prefix of environment variables overriding settings (`STEAMPIPE_SDK_FOLDER`, ...).
pub const ENV_PREFIX: &str = "STEAMPIPE";

/// Configuration manager for the user settings file.
///
/// Settings are layered, later sources winning:
/// 1. [`Settings::default`]
/// 2. `settings.yaml` in the configuration directory (optional)
/// 3. `STEAMPIPE_*` environment variables
///
/// Saving writes only the YAML file; environment overrides are never persisted.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    env_source: Option<config::Map<String, String>>,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `settings.yaml`
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
            env_source: None,
        })
    }

    /// `<user config dir>/steampipe`, e.g. `~/.config/steampipe` on Linux.
    pub fn default_dir() -> Result<Utf8PathBuf> {
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        let base = Utf8PathBuf::try_from(base).context("User config directory is not UTF-8")?;
        Ok(base.join(crate::APP_NAME))
    }

    /// Read overrides from `variables` instead of the process environment.
    pub fn with_environment(mut self, variables: config::Map<String, String>) -> Self {
        self.env_source = Some(variables);
        self
    }

    /// Load settings, falling back to defaults for anything unset.
    pub fn load_settings(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::info!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .source(self.env_source.clone());

        let settings: Settings = Config::builder()
            .add_source(
                File::from(self.settings_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::debug!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Delete the settings file so the next load returns defaults.
    pub fn reset(&self) -> Result<()> {
        if self.settings_path.exists() {
            fs::remove_file(&self.settings_path).with_context(|| {
                format!("Failed to delete settings: {}", self.settings_path)
            })?;
            tracing::info!("Settings reset: {}", self.settings_path);
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
