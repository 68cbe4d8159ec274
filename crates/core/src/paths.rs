//! Base directory resolution
//!
//! Candidates are tried in order: `MODEL_DIR`, `WBIA_MODELS_DIR`, the `/models`
//! mount point, then the per-user cache (~/.cache/wbia/detectmodels). Each
//! non-fallback candidate may be:
//! - a directory containing `detectmodels/`,
//! - the `detectmodels` directory itself (by name, or because it already holds
//!   an algorithm subdirectory such as `rf/`),
//! - any other directory, under which `detectmodels/` is created.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{user_cache_dir, StorageConfig, ENV_LEGACY_MODEL_DIR, ENV_MODEL_DIR};
use crate::registry::ModelRegistry;

/// Naming conventions a candidate directory is checked against.
struct Layout<'a> {
    dir_name: &'a str,
    markers: Vec<&'a str>,
}

struct Step {
    check: fn(&Layout<'_>, &Path) -> bool,
    resolve: fn(&Layout<'_>, &Path) -> Option<PathBuf>,
}

const STEPS: [Step; 3] = [
    Step {
        check: contains_models_dir,
        resolve: nested_models_dir,
    },
    Step {
        check: is_models_dir,
        resolve: itself,
    },
    Step {
        check: always,
        resolve: create_models_dir,
    },
];

fn contains_models_dir(layout: &Layout<'_>, candidate: &Path) -> bool {
    candidate.join(layout.dir_name).is_dir()
}

fn nested_models_dir(layout: &Layout<'_>, candidate: &Path) -> Option<PathBuf> {
    Some(canonical(&candidate.join(layout.dir_name)))
}

fn is_models_dir(layout: &Layout<'_>, candidate: &Path) -> bool {
    let named = candidate
        .file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case(layout.dir_name))
        .unwrap_or(false);
    named || layout.markers.iter().any(|m| candidate.join(m).is_dir())
}

fn itself(_: &Layout<'_>, candidate: &Path) -> Option<PathBuf> {
    Some(canonical(candidate))
}

fn always(_: &Layout<'_>, _: &Path) -> bool {
    true
}

fn create_models_dir(layout: &Layout<'_>, candidate: &Path) -> Option<PathBuf> {
    let dir = candidate.join(layout.dir_name);
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(canonical(&dir)),
        Err(e) => {
            tracing::debug!("Cannot create {:?}: {}", dir, e);
            None
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub struct PathResolver<'a> {
    storage: &'a StorageConfig,
    layout: Layout<'a>,
}

impl<'a> PathResolver<'a> {
    pub fn new(storage: &'a StorageConfig, registry: &'a ModelRegistry) -> Self {
        Self {
            storage,
            layout: Layout {
                dir_name: &storage.dir_name,
                markers: registry.subdirs().collect(),
            },
        }
    }

    /// Resolve the base models directory. Never fails: the cache fallback is
    /// returned even if it could not be created.
    pub fn resolve(&self) -> PathBuf {
        for (source, candidate) in self.candidates() {
            match self.resolve_candidate(candidate) {
                Some(dir) => {
                    tracing::info!("Using mounted {} dir ({}): {:?}", self.layout.dir_name, source, dir);
                    return dir;
                }
                None => tracing::debug!("Skipping {} candidate {:?}", source, candidate),
            }
        }

        let fallback = self.fallback_dir();
        if let Err(e) = fs::create_dir_all(&fallback) {
            tracing::warn!("Failed to create models cache dir {:?}: {}", fallback, e);
        }
        tracing::info!("Using cached {} dir: {:?}", self.layout.dir_name, fallback);
        fallback
    }

    fn candidates(&self) -> Vec<(&'static str, &Path)> {
        let mut candidates = Vec::new();
        if let Some(dir) = &self.storage.model_dir {
            candidates.push((ENV_MODEL_DIR, dir.as_path()));
        }
        if let Some(dir) = &self.storage.legacy_model_dir {
            candidates.push((ENV_LEGACY_MODEL_DIR, dir.as_path()));
        }
        candidates.push(("mount point", self.storage.mount_point.as_path()));
        candidates
    }

    fn resolve_candidate(&self, candidate: &Path) -> Option<PathBuf> {
        if candidate.as_os_str().is_empty() || !candidate.is_dir() {
            return None;
        }
        STEPS
            .iter()
            .find(|step| (step.check)(&self.layout, candidate))
            .and_then(|step| (step.resolve)(&self.layout, candidate))
            .filter(|dir| dir.is_dir())
    }

    fn fallback_dir(&self) -> PathBuf {
        self.storage
            .cache_dir
            .clone()
            .unwrap_or_else(|| user_cache_dir().join(&self.storage.dir_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        storage: StorageConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let storage = StorageConfig {
                mount_point: root.path().join("no-such-mount"),
                cache_dir: Some(root.path().join("cache").join("detectmodels")),
                ..StorageConfig::default()
            };
            Self { root, storage }
        }

        fn dir(&self, relative: &str) -> PathBuf {
            let path = self.root.path().join(relative);
            fs::create_dir_all(&path).unwrap();
            path
        }

        fn resolve(&self) -> PathBuf {
            let registry = ModelRegistry::builtin();
            PathResolver::new(&self.storage, &registry).resolve()
        }
    }

    #[test]
    fn prefers_existing_nested_models_dir() {
        let mut fx = Fixture::new();
        let existing = fx.dir("volume/detectmodels");
        fx.storage.model_dir = Some(fx.root.path().join("volume"));

        let resolved = fx.resolve();

        assert_eq!(resolved, canonical(&existing));
        assert!(!existing.join("detectmodels").exists());
    }

    #[test]
    fn accepts_models_dir_by_name() {
        let mut fx = Fixture::new();
        let named = fx.dir("mnt/DetectModels");
        fx.storage.model_dir = Some(named.clone());

        assert_eq!(fx.resolve(), canonical(&named));
        assert!(!named.join("detectmodels").exists());
    }

    #[test]
    fn accepts_dir_with_algorithm_marker() {
        let mut fx = Fixture::new();
        fx.dir("models-volume/rf");
        let volume = fx.root.path().join("models-volume");
        fx.storage.model_dir = Some(volume.clone());

        assert_eq!(fx.resolve(), canonical(&volume));
    }

    #[test]
    fn creates_models_dir_under_plain_parent() {
        let mut fx = Fixture::new();
        let parent = fx.dir("data");
        fx.storage.model_dir = Some(parent.clone());

        let resolved = fx.resolve();

        assert_eq!(resolved, canonical(&parent.join("detectmodels")));
        assert!(resolved.is_dir());
    }

    #[test]
    fn falls_through_to_legacy_override() {
        let mut fx = Fixture::new();
        let legacy = fx.dir("legacy/detectmodels");
        fx.storage.model_dir = Some(fx.root.path().join("missing"));
        fx.storage.legacy_model_dir = Some(fx.root.path().join("legacy"));

        assert_eq!(fx.resolve(), canonical(&legacy));
    }

    #[test]
    fn primary_override_beats_mount_point() {
        let mut fx = Fixture::new();
        let primary = fx.dir("primary/detectmodels");
        fx.dir("mount/detectmodels");
        fx.storage.model_dir = Some(fx.root.path().join("primary"));
        fx.storage.mount_point = fx.root.path().join("mount");

        assert_eq!(fx.resolve(), canonical(&primary));
    }

    #[test]
    fn uses_mount_point_without_overrides() {
        let mut fx = Fixture::new();
        let mounted = fx.dir("mount/detectmodels");
        fx.storage.mount_point = fx.root.path().join("mount");

        assert_eq!(fx.resolve(), canonical(&mounted));
    }

    #[test]
    fn falls_back_to_cache_and_creates_it() {
        let fx = Fixture::new();
        let expected = fx.root.path().join("cache").join("detectmodels");
        assert!(!expected.exists());

        let resolved = fx.resolve();

        assert_eq!(resolved, expected);
        assert!(resolved.is_dir());
    }

    #[test]
    fn uncreatable_candidate_falls_through() {
        let mut fx = Fixture::new();
        // A file squatting on the models dir name makes creation fail, even as root.
        let blocked = fx.dir("blocked");
        fs::write(blocked.join("detectmodels"), b"not a directory").unwrap();
        let legacy = fx.dir("legacy/detectmodels");
        fx.storage.model_dir = Some(blocked.clone());
        fx.storage.legacy_model_dir = Some(fx.root.path().join("legacy"));

        assert_eq!(fx.resolve(), canonical(&legacy));
        assert!(blocked.join("detectmodels").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_candidate_falls_through() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::new();
        let read_only = fx.dir("ro-mount");
        fs::set_permissions(&read_only, fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not bind root.
        if fs::create_dir(read_only.join("write-check")).is_ok() {
            fs::remove_dir(read_only.join("write-check")).unwrap();
            return;
        }
        fx.storage.model_dir = Some(read_only.clone());

        let resolved = fx.resolve();

        fs::set_permissions(&read_only, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(resolved, fx.root.path().join("cache").join("detectmodels"));
        assert!(!read_only.join("detectmodels").exists());
    }

    #[test]
    fn uncreatable_cache_is_still_returned() {
        let mut fx = Fixture::new();
        let file = fx.root.path().join("plain-file");
        fs::write(&file, b"in the way").unwrap();
        let cache = file.join("detectmodels");
        fx.storage.cache_dir = Some(cache.clone());

        let resolved = fx.resolve();

        assert_eq!(resolved, cache);
        assert!(!resolved.exists());
    }

    #[test]
    fn resolving_twice_is_stable() {
        let mut fx = Fixture::new();
        fx.storage.model_dir = Some(fx.dir("data"));

        let first = fx.resolve();
        let second = fx.resolve();

        assert_eq!(first, second);
        assert!(!first.join("detectmodels").exists());
    }
}
