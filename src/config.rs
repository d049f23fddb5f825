//! Configuration management for Spark Vault.
//!
//! This module handles loading and saving the backend connection settings
//! to/from a JSON file. The config directory can be customized.
//!
//! UI preferences and the device identifier are not stored here; they live in
//! the preference store (`preferences.json`) in the same directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

fn default_request_timeout_secs() -> u64 {
    30
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Base URL of the hosted auth/row-store project
    #[serde(default)]
    pub backend_url: String,
    /// Public (anonymous) API key sent with every request
    #[serde(default)]
    pub anon_key: String,
    /// Per-request timeout for remote calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where magic-link emails send the user back to
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            redirect_url: None,
        }
    }
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// On mobile platforms (without the `desktop` feature), `config_dir` is required.
    pub fn new(config_dir: Option<PathBuf>) -> VaultResult<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                #[cfg(feature = "desktop")]
                {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("spark-vault")
                }
                #[cfg(not(feature = "desktop"))]
                {
                    return Err(VaultError::Config(
                        "config_dir is required on mobile platforms".to_string(),
                    ));
                }
            }
        };

        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join(CONFIG_FILE_NAME);

        let data = if config_file.exists() {
            match fs::read_to_string(&config_file) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Invalid config file, using defaults");
                    ConfigData::default()
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable config file, using defaults");
                    ConfigData::default()
                }
            }
        } else {
            ConfigData::default()
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        // Save default config if it doesn't exist
        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> VaultResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the preference store that sits next to the config file
    pub fn preferences_file(&self) -> PathBuf {
        self.config_dir.join(PREFERENCES_FILE_NAME)
    }

    pub fn backend_url(&self) -> &str {
        &self.data.backend_url
    }

    pub fn anon_key(&self) -> &str {
        &self.data.anon_key
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.data.request_timeout_secs
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.data.redirect_url.as_deref()
    }

    /// True once both the backend URL and the API key are set
    pub fn is_backend_configured(&self) -> bool {
        !self.data.backend_url.trim().is_empty() && !self.data.anon_key.trim().is_empty()
    }

    /// Override connection settings for this process only (not saved).
    pub fn apply_overrides(&mut self, backend_url: Option<String>, anon_key: Option<String>) {
        if let Some(url) = backend_url {
            self.data.backend_url = url;
        }
        if let Some(key) = anon_key {
            self.data.anon_key = key;
        }
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "backend_url" => Some(self.data.backend_url.clone()),
            "anon_key" => Some(self.data.anon_key.clone()),
            "request_timeout_secs" => Some(self.data.request_timeout_secs.to_string()),
            "redirect_url" => self.data.redirect_url.clone(),
            _ => None,
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> VaultResult<()> {
        match key {
            "backend_url" => self.data.backend_url = value.trim_end_matches('/').to_string(),
            "anon_key" => self.data.anon_key = value.to_string(),
            "request_timeout_secs" => {
                let secs: u64 = value.parse().map_err(|_| {
                    VaultError::validation("request_timeout_secs", "must be a whole number of seconds")
                })?;
                if secs == 0 {
                    return Err(VaultError::validation(
                        "request_timeout_secs",
                        "must be greater than zero",
                    ));
                }
                self.data.request_timeout_secs = secs;
            }
            "redirect_url" => self.data.redirect_url = Some(value.to_string()),
            _ => return Err(VaultError::Config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();

        assert!(config.backend_url().is_empty());
        assert!(!config.is_backend_configured());
        assert_eq!(config.request_timeout_secs(), 30);
        assert!(temp_dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_config_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
            config.set("backend_url", "https://demo.example.co/").unwrap();
            config.set("anon_key", "public-key").unwrap();
        }

        {
            let config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
            assert_eq!(config.backend_url(), "https://demo.example.co");
            assert_eq!(config.anon_key(), "public-key");
            assert!(config.is_backend_configured());
        }
    }

    #[test]
    fn test_unknown_key() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();

        assert!(config.set("favourite_colour", "green").is_err());
        assert!(config.get("favourite_colour").is_none());
    }

    #[test]
    fn test_invalid_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();

        assert!(config.set("request_timeout_secs", "soon").is_err());
        assert!(config.set("request_timeout_secs", "0").is_err());
        config.set("request_timeout_secs", "5").unwrap();
        assert_eq!(config.get("request_timeout_secs"), Some("5".to_string()));
    }

    #[test]
    fn test_corrupt_config_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "][").unwrap();

        let config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
        assert_eq!(config.request_timeout_secs(), 30);
    }

    #[test]
    fn test_overrides_are_not_saved() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
            config.apply_overrides(Some("https://env.example.co".to_string()), None);
            assert_eq!(config.backend_url(), "https://env.example.co");
        }

        let config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
        assert!(config.backend_url().is_empty());
    }
}
