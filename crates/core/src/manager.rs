use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::archive::{self, ExtractError, InstallOptions};
use crate::config::Config;
use crate::downloader::{file_name_from_url, DownloadError, DownloadSpec, Downloader};
use crate::fixtures;
use crate::integrity::{self, IntegrityError};
use crate::paths::PathResolver;
use crate::registry::{ModelEntry, ModelKey, ModelRegistry, RegistryError, DETECTOR_KEY_RF};
use crate::staging::StagingDir;
use crate::url;

/// Written into every model directory installed by [`ModelManager::ensure`].
pub const MANIFEST_FILE: &str = ".grabmodels.json";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("failed to extract {path:?}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },
    #[error("model directory {0:?} does not exist")]
    Missing(PathBuf),
    #[error("filesystem error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no test data registered under '{0}'")]
    UnknownFixture(String),
    #[error("cannot derive a file name from {0}")]
    NoFileName(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ProvisionError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Run filesystem-heavy work (hashing, extraction) on the blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ProvisionError>
where
    F: FnOnce() -> Result<T, ProvisionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Provenance of an installed model directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallManifest {
    pub key: ModelKey,
    /// Download URL with credentials masked
    pub source: String,
    pub installed_at: DateTime<Utc>,
}

impl InstallManifest {
    pub fn read(model_dir: &Path) -> Option<Self> {
        let content = fs::read_to_string(model_dir.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Provisions every registered model under a base directory.
///
/// All operations run one model at a time on the calling task. Nothing guards
/// against a second process provisioning the same directory concurrently.
pub struct ModelManager {
    config: Config,
    registry: ModelRegistry,
    downloader: Downloader,
    default_dir: OnceLock<PathBuf>,
}

impl ModelManager {
    pub fn new(config: Config) -> Result<Self, ProvisionError> {
        let downloader = Downloader::http(&config.download)?;
        Self::with_downloader(config, downloader)
    }

    pub fn with_downloader(config: Config, downloader: Downloader) -> Result<Self, ProvisionError> {
        let registry = ModelRegistry::with_overrides(&config.models)?;
        Ok(Self {
            config,
            registry,
            downloader,
            default_dir: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The resolved base directory, computed on first use.
    pub fn default_dir(&self) -> &Path {
        self.default_dir
            .get_or_init(|| PathResolver::new(&self.config.storage, &self.registry).resolve())
    }

    /// `(key, directory)` for every registered model under `base`.
    pub fn model_dirs<'a>(&'a self, base: &'a Path) -> impl Iterator<Item = (&'a ModelKey, PathBuf)> + 'a {
        self.registry
            .list()
            .iter()
            .map(move |entry| (&entry.key, base.join(&entry.subdir)))
    }

    /// Directory holding the random forest trees for `species`.
    pub fn species_trees_path(&self, base: &Path, species: &str) -> PathBuf {
        let subdir = self
            .registry
            .get(DETECTOR_KEY_RF)
            .map(|entry| entry.subdir.as_str())
            .unwrap_or(DETECTOR_KEY_RF);
        base.join(subdir).join(species)
    }

    /// Download every model whose directory is missing, then check that all
    /// of them are present. Directories that already exist are left alone.
    pub async fn ensure(&self, base: &Path) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(base)
            .await
            .map_err(ProvisionError::io(base))?;

        for entry in self.registry.list() {
            let target = base.join(&entry.subdir);
            if target.exists() {
                tracing::debug!("Model {} already present at {:?}", entry.key, target);
                continue;
            }
            self.provision(entry, &target).await?;
        }

        self.assert_present(base)
    }

    /// Fail with the first registered model directory missing under `base`.
    pub fn assert_present(&self, base: &Path) -> Result<(), ProvisionError> {
        for (key, dir) in self.model_dirs(base) {
            if !dir.exists() {
                tracing::error!("Model {} is missing: {:?}", key, dir);
                return Err(ProvisionError::Missing(dir));
            }
            tracing::debug!("[grabmodels] found {} at {:?}", key, dir);
        }
        Ok(())
    }

    /// Delete `base` entirely and provision everything again.
    pub async fn redownload(&self, base: &Path) -> Result<(), ProvisionError> {
        tracing::info!("Redownloading detection models into {:?}", base);
        match tokio::fs::remove_dir_all(base).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProvisionError::io(base)(e)),
        }
        self.ensure(base).await?;
        tracing::info!("Finished redownloading detection models");
        Ok(())
    }

    /// Fetch (unless `ensure` is false) and return the directory of a zipped
    /// test fixture.
    pub async fn testdata_dir(&self, key: &str, ensure: bool) -> Result<PathBuf, ProvisionError> {
        let url = self
            .config
            .testdata
            .urls
            .get(key)
            .ok_or_else(|| ProvisionError::UnknownFixture(key.to_string()))?;
        fixtures::grab_zipped_url(&self.downloader, url, &self.config.testdata_dir(), ensure).await
    }

    async fn provision(&self, entry: &ModelEntry, target: &Path) -> Result<(), ProvisionError> {
        let staging = StagingDir::create(target).map_err(ProvisionError::io(target))?;

        let composed = url::compose(&entry.url, self.config.credential.as_ref());
        let file_name = file_name_from_url(&composed.full).unwrap_or_else(|| format!("{}.bin", entry.key));
        let spec = DownloadSpec {
            remote_url: composed.full,
            destination: staging.path().join(file_name),
            expected_checksum: entry.checksum.clone(),
        };

        tracing::info!(
            "Downloading model for {} from {} -> {:?}",
            entry.key,
            composed.masked,
            target
        );
        self.downloader
            .download(&spec.remote_url, &spec.destination)
            .await?;

        let verify = self.config.download.verify_checksums;
        let DownloadSpec {
            destination,
            expected_checksum,
            ..
        } = spec;
        blocking(move || {
            if verify {
                if let Some(expected) = &expected_checksum {
                    integrity::verify(&destination, expected)?;
                }
            }
            archive::install(&destination, InstallOptions::default())
                .map_err(|source| ProvisionError::Extract {
                    path: destination.clone(),
                    source,
                })
        })
        .await?;

        let manifest = InstallManifest {
            key: entry.key.clone(),
            source: composed.masked,
            installed_at: Utc::now(),
        };
        let manifest_path = staging.path().join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| ProvisionError::io(&manifest_path)(io::Error::other(e)))?;
        tokio::fs::write(&manifest_path, json)
            .await
            .map_err(ProvisionError::io(&manifest_path))?;

        staging.commit().map_err(ProvisionError::io(target))?;
        tracing::info!("Installed model {} into {:?}", entry.key, target);
        Ok(())
    }
}
