use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::registry::ModelEntry;
use crate::retry::RetryPolicy;
use crate::url::Credential;

/// Preferred base-directory override (docker volume).
pub const ENV_MODEL_DIR: &str = "MODEL_DIR";
/// Legacy base-directory override.
pub const ENV_LEGACY_MODEL_DIR: &str = "WBIA_MODELS_DIR";
/// Credential query variables, in priority order.
pub const ENV_CREDENTIALS: [&str; 3] = ["MODEL_SAS_QUERY", "MODEL_SAS_TOKEN", "WBIA_MODELS_SAS"];
/// Set to `1` to verify registered checksums after download.
pub const ENV_VERIFY_CHECKSUM: &str = "MODEL_VERIFY_CHECKSUM";
/// Override for the `testdb1` fixture archive.
pub const ENV_TEST_IMAGES_URL: &str = "TEST_IMAGES_URL";
/// Path of the TOML config file.
pub const ENV_CONFIG_PATH: &str = "GRABMODELS_CONFIG";

pub const DEFAULT_TESTDATA_KEY: &str = "testdb1";
const DEFAULT_TESTDATA_URL: &str = "https://cthulhu.dyn.wildme.io/public/data/testdata.zip";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where models live on disk
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transfer tuning
    #[serde(default)]
    pub download: DownloadConfig,

    /// Test fixture archives
    #[serde(default)]
    pub testdata: TestdataConfig,

    /// Extra or replacement registry entries
    #[serde(default)]
    pub models: Vec<ModelEntry>,

    /// SAS query fragment, only ever read from the environment
    #[serde(skip)]
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Primary override (MODEL_DIR)
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Legacy override (WBIA_MODELS_DIR)
    #[serde(default)]
    pub legacy_model_dir: Option<PathBuf>,

    /// Well-known mount point checked after the overrides
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// Conventional name of the models directory
    #[serde(default = "default_dir_name")]
    pub dir_name: String,

    /// Replaces the per-user cache fallback (default: ~/.cache/wbia/detectmodels)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Write buffer size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Total attempts per download
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep `backoff_base^(attempt-1)` seconds between attempts
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Connect and read timeout per attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Draw a progress bar on stderr
    #[serde(default)]
    pub show_progress: bool,

    /// Check registered checksums (MODEL_VERIFY_CHECKSUM=1)
    #[serde(default)]
    pub verify_checksums: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestdataConfig {
    /// Fixture key to zipped archive URL
    #[serde(default = "default_testdata_urls")]
    pub urls: BTreeMap<String, String>,

    /// Where fixtures are unpacked (default: ~/.cache/wbia/testdata)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_mount_point() -> PathBuf {
    PathBuf::from("/models")
}

fn default_dir_name() -> String {
    "detectmodels".to_string()
}

fn default_chunk_size() -> usize {
    1 << 20
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    "wbia-grabmodels/1.0".to_string()
}

fn default_testdata_urls() -> BTreeMap<String, String> {
    BTreeMap::from([(
        DEFAULT_TESTDATA_KEY.to_string(),
        DEFAULT_TESTDATA_URL.to_string(),
    )])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            download: DownloadConfig::default(),
            testdata: TestdataConfig::default(),
            models: Vec::new(),
            credential: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            legacy_model_dir: None,
            mount_point: default_mount_point(),
            dir_name: default_dir_name(),
            cache_dir: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            show_progress: false,
            verify_checksums: false,
        }
    }
}

impl Default for TestdataConfig {
    fn default() -> Self {
        Self {
            urls: default_testdata_urls(),
            dir: None,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff_base: self.backoff_base,
        }
    }
}

impl Config {
    /// Load the config file (explicit path, `GRABMODELS_CONFIG`, or the default
    /// location), then apply environment overrides.
    ///
    /// A missing file at the default location means defaults; an explicit path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match Self::locate(path, |key| std::env::var(key).ok()) {
            Some(ConfigSource::Explicit(path)) => Self::from_file(&path)?,
            Some(ConfigSource::Default(path)) if path.exists() => Self::from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// The file [`Config::load`] reads for `path`, if any.
    pub fn source_path(path: Option<&Path>) -> Option<PathBuf> {
        Self::locate(path, |key| std::env::var(key).ok()).map(ConfigSource::into_path)
    }

    fn locate<F>(path: Option<&Path>, lookup: F) -> Option<ConfigSource>
    where
        F: Fn(&str) -> Option<String>,
    {
        path.map(Path::to_path_buf)
            .or_else(|| {
                lookup(ENV_CONFIG_PATH)
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
            })
            .map(ConfigSource::Explicit)
            .or_else(|| Self::config_path().map(ConfigSource::Default))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay environment variables read through `lookup`. Empty values count
    /// as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(dir) = get(ENV_MODEL_DIR) {
            self.storage.model_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get(ENV_LEGACY_MODEL_DIR) {
            self.storage.legacy_model_dir = Some(PathBuf::from(dir));
        }
        if let Some(credential) = ENV_CREDENTIALS
            .iter()
            .find_map(|key| get(key).and_then(|v| Credential::new(&v)))
        {
            self.credential = Some(credential);
        }
        if let Some(flag) = get(ENV_VERIFY_CHECKSUM) {
            self.download.verify_checksums = flag == "1";
        }
        if let Some(url) = get(ENV_TEST_IMAGES_URL) {
            self.testdata
                .urls
                .insert(DEFAULT_TESTDATA_KEY.to_string(), url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "download.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.download.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "download.max_retries must be at least 1".to_string(),
            ));
        }
        if !self.download.backoff_base.is_finite() || self.download.backoff_base < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "download.backoff_base must be a non-negative number, got {}",
                self.download.backoff_base
            )));
        }
        if self.storage.dir_name.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.dir_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config file path: ~/.config/wbia/grabmodels.toml
    pub fn config_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("wbia").join("grabmodels.toml"))
    }

    /// Directory where test fixtures are unpacked
    pub fn testdata_dir(&self) -> PathBuf {
        self.testdata
            .dir
            .clone()
            .unwrap_or_else(|| user_cache_dir().join("testdata"))
    }
}

/// Per-user application cache: ~/.cache/wbia
pub fn user_cache_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join("wbia"))
        .unwrap_or_else(|| std::env::temp_dir().join("wbia"))
}

/// Where a config file comes from. An explicit file must exist; the default
/// one may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    Explicit(PathBuf),
    Default(PathBuf),
}

impl ConfigSource {
    fn into_path(self) -> PathBuf {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Default(path) => path,
        }
    }
}
