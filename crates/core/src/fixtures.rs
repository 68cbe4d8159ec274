//! Zipped test fixtures (image collections for integration tests).

use std::path::{Path, PathBuf};

use crate::archive::{self, ArchiveKind, InstallOptions};
use crate::downloader::{file_name_from_url, Downloader};
use crate::manager::{blocking, ProvisionError};
use crate::staging::StagingDir;
use crate::url;

/// Directory under `cache_dir` that the archive at `archive_url` unpacks to.
pub fn fixture_dir(archive_url: &str, cache_dir: &Path) -> Result<PathBuf, ProvisionError> {
    let file_name = file_name_from_url(archive_url)
        .ok_or_else(|| ProvisionError::NoFileName(url::mask(archive_url)))?;
    let stem = match ArchiveKind::from_path(Path::new(&file_name)) {
        Some(kind) => kind.strip_extension(&file_name).to_string(),
        None => file_name,
    };
    Ok(cache_dir.join(stem))
}

/// Download and unpack `archive_url` under `cache_dir` unless it is already
/// there. With `ensure` false the directory is returned without touching the
/// network, whether or not it exists.
pub async fn grab_zipped_url(
    downloader: &Downloader,
    archive_url: &str,
    cache_dir: &Path,
    ensure: bool,
) -> Result<PathBuf, ProvisionError> {
    let target = fixture_dir(archive_url, cache_dir)?;
    if !ensure || target.exists() {
        return Ok(target);
    }

    tokio::fs::create_dir_all(cache_dir)
        .await
        .map_err(ProvisionError::io(cache_dir))?;
    let staging = StagingDir::create(&target).map_err(ProvisionError::io(&target))?;

    let file_name = file_name_from_url(archive_url)
        .ok_or_else(|| ProvisionError::NoFileName(url::mask(archive_url)))?;
    let archive_path = staging.path().join(file_name);

    tracing::info!(
        "Fetching test data from {} -> {:?}",
        url::mask(archive_url),
        target
    );
    downloader.download(archive_url, &archive_path).await?;
    blocking(move || {
        archive::install(
            &archive_path,
            InstallOptions {
                flatten_single_root: true,
            },
        )
        .map_err(|source| ProvisionError::Extract {
            path: archive_path.clone(),
            source,
        })
    })
    .await?;

    staging.commit().map_err(ProvisionError::io(&target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;
    use crate::testing::{zip_bytes, RecordingSleeper, Reply, ScriptedTransport};
    use std::fs;
    use std::sync::Arc;

    const URL: &str = "https://cthulhu.dyn.wildme.io/public/data/testdata.zip";

    fn downloader(transport: Arc<ScriptedTransport>) -> Downloader {
        Downloader::new(
            DownloadConfig::default(),
            transport,
            Arc::new(RecordingSleeper::default()),
        )
    }

    #[test]
    fn fixture_dir_drops_archive_extension() {
        let cache = Path::new("/cache");
        assert_eq!(fixture_dir(URL, cache).unwrap(), PathBuf::from("/cache/testdata"));
        assert_eq!(
            fixture_dir("https://host/sets/images.tar.gz?sig=x", cache).unwrap(),
            PathBuf::from("/cache/images")
        );
        for url in ["https://host/", "https://host/sets/"] {
            assert!(matches!(
                fixture_dir(url, cache),
                Err(ProvisionError::NoFileName(_))
            ));
        }
    }

    #[tokio::test]
    async fn downloads_once_and_flattens() {
        let cache = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Reply::Ok(zip_bytes(&[
            ("testdata/easy1.JPG", b"one"),
            ("testdata/easy2.JPG", b"two"),
        ]))]));
        let downloader = downloader(transport.clone());

        let dir = grab_zipped_url(&downloader, URL, cache.path(), true).await.unwrap();
        let again = grab_zipped_url(&downloader, URL, cache.path(), true).await.unwrap();

        assert_eq!(dir, cache.path().join("testdata"));
        assert_eq!(dir, again);
        assert_eq!(fs::read(dir.join("easy1.JPG")).unwrap(), b"one");
        assert!(!dir.join("testdata.zip").exists());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn without_ensure_nothing_is_fetched() {
        let cache = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([]));

        let dir = grab_zipped_url(&downloader(transport.clone()), URL, cache.path(), false)
            .await
            .unwrap();

        assert_eq!(dir, cache.path().join("testdata"));
        assert!(!dir.exists());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_no_directory() {
        let cache = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Reply::Refused("offline")]));

        let err = grab_zipped_url(&downloader(transport), URL, cache.path(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Download(_)));
        assert!(!cache.path().join("testdata").exists());
        assert!(!cache.path().join(".testdata.partial").exists());
    }
}
