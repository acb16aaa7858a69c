use crate::{AppConfig, ConfigError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "Sift";
const APP: &str = "Sift";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        Self::at(dirs.config_dir().join("config.toml"))
    }

    /// Uses an explicit config file, writing defaults if it does not exist yet.
    pub fn at(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            let initial = AppConfig::default();
            let content = toml::to_string_pretty(&initial)?;
            fs::write(&config_path, content)?;
            tracing::info!(path = %config_path.display(), "wrote default config");
        }

        Ok(Self { config_path })
    }

    /// Reads the file and applies environment overrides on top.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Overlays `PORT`, `SIFT_BIND`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
/// `SAFE_BROWSING_API_KEY` and `SIFT_REPLY_PHRASE`. Empty values are ignored.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(port) = get("PORT") {
        config.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: "PORT".to_string(),
            value: port.clone(),
        })?;
    }
    if let Some(bind) = get("SIFT_BIND") {
        config.server.bind = bind;
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.ai.api_key = Some(key);
    }
    if let Some(model) = get("OPENAI_MODEL") {
        config.ai.model = model;
    }
    if let Some(key) = get("SAFE_BROWSING_API_KEY") {
        config.scanner.safe_browsing_api_key = Some(key);
    }
    if let Some(phrase) = get("SIFT_REPLY_PHRASE") {
        config.ai.required_reply_phrase = Some(phrase);
    }

    Ok(())
}
