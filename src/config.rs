use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "banana_reporter.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub analysis: AnalysisConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of the RPC backend, e.g. `https://<project>.supabase.co`.
    pub base_url: String,
    /// Public (anon) API key sent with every RPC call.
    pub api_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Upper bound on decoding + sampling a single photo.
    pub decode_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub store_file: PathBuf,
    pub export_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig {
                base_url: "https://YOUR_PROJECT_ID.supabase.co".to_string(),
                api_key: String::new(),
                request_timeout_secs: 20,
            },
            analysis: AnalysisConfig {
                decode_timeout_secs: 30,
            },
            paths: PathConfig {
                store_file: PathBuf::from("banana_store.json"),
                export_dir: PathBuf::from("exports"),
                config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    /// Reads `path` (or the default file when it exists) without ever writing
    /// one; falls back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load_from_file(DEFAULT_CONFIG_FILE),
            None => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;
        config.paths.config_file = path.as_ref().to_path_buf();

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Environment variables win over the file so keys need not be stored on disk.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BANANA_CLASSIFIER_URL") {
            log::debug!("Classifier URL overridden from environment");
            self.classifier.base_url = url;
        }
        if let Ok(key) = std::env::var("BANANA_API_KEY") {
            log::debug!("API key overridden from environment");
            self.classifier.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.classifier.base_url.trim();
        if url.is_empty() {
            return Err(anyhow::anyhow!("Classifier base URL is empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!("Classifier base URL must start with http:// or https://: {}", url));
        }

        if self.classifier.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Invalid classifier request timeout"));
        }

        if self.analysis.decode_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Invalid decode timeout"));
        }

        Ok(())
    }

    /// Placeholder URL from the template has not been replaced yet.
    pub fn is_unconfigured(&self) -> bool {
        self.classifier.base_url.contains("YOUR_PROJECT_ID") || self.classifier.api_key.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier.request_timeout_secs)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.decode_timeout_secs)
    }

    pub fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.export_dir)
            .with_context(|| format!("Failed to create export directory: {}",
                self.paths.export_dir.display()))?;

        log::info!("Created necessary directories");
        Ok(())
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn classifier_url(mut self, url: &str) -> Self {
        self.config.classifier.base_url = url.to_string();
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.config.classifier.api_key = key.to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.classifier.request_timeout_secs = secs;
        self
    }

    pub fn decode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analysis.decode_timeout_secs = secs;
        self
    }

    pub fn store_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.paths.store_file = path.into();
        self
    }

    pub fn export_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.paths.export_dir = path.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Local backend on the default Supabase CLI port.
    pub fn local_development() -> Self {
        Config {
            classifier: ClassifierConfig {
                base_url: "http://127.0.0.1:54321".to_string(),
                request_timeout_secs: 5,
                ..Config::default().classifier
            },
            ..Default::default()
        }
    }
}
