//! Archive installation
//!
//! Extracts a downloaded archive next to itself and removes the archive,
//! whether or not extraction succeeded.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect the archive format from the file name, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }

    /// File name without the archive extension.
    pub fn strip_extension(self, name: &str) -> &str {
        let suffixes: &[&str] = match self {
            ArchiveKind::Zip => &[".zip"],
            ArchiveKind::Tar => &[".tar"],
            ArchiveKind::TarGz => &[".tar.gz", ".tgz"],
        };
        suffixes
            .iter()
            .find_map(|suffix| {
                let split = name.len().checked_sub(suffix.len())?;
                let tail = name.get(split..)?;
                tail.eq_ignore_ascii_case(suffix).then(|| &name[..split])
            })
            .unwrap_or(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Promote the contents of a lone top-level directory after extraction
    pub flatten_single_root: bool,
}

/// Unpack `path` into its parent directory and delete it. Files that are not
/// archives are left in place untouched.
pub fn install(path: &Path, options: InstallOptions) -> Result<(), ExtractError> {
    let Some(kind) = ArchiveKind::from_path(path) else {
        tracing::debug!("{:?} is not an archive, keeping as is", path);
        return Ok(());
    };

    let dest = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::info!("Extracting {:?} into {:?}", path, dest);
    let result = extract(kind, path, &dest);

    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove archive {:?}: {}", path, e);
    }
    result?;

    if options.flatten_single_root {
        flatten_single_root(&dest)?;
    }
    Ok(())
}

fn extract(kind: ArchiveKind, path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(path)?;
    match kind {
        ArchiveKind::Zip => extract_zip(file, dest),
        ArchiveKind::Tar => extract_tar(BufReader::new(file), dest),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(BufReader::new(file)), dest),
    }
}

fn extract_zip(file: File, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                tracing::warn!("Skipping zip entry outside destination: {}", entry.name());
                continue;
            }
        };

        if is_metadata(&relative) {
            continue;
        }

        let out_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode)).ok();
            }
        }
    }
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        if is_metadata(&relative) {
            continue;
        }
        if !entry.unpack_in(dest)? {
            tracing::warn!("Skipping tar entry outside destination: {:?}", relative);
        }
    }
    Ok(())
}

/// Finder and resource-fork litter that macOS adds to archives.
fn is_metadata(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str() == "__MACOSX" || c.as_os_str() == ".DS_Store")
}

/// If `dir` holds exactly one entry and it is a directory, move its children
/// up into `dir` and remove it.
fn flatten_single_root(dir: &Path) -> io::Result<()> {
    let entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    let [root] = entries.as_slice() else {
        return Ok(());
    };
    if !root.file_type()?.is_dir() {
        return Ok(());
    }

    // Moved aside first so a child sharing the root's name can't collide.
    let parked = dir.join(".flatten-root");
    fs::rename(root.path(), &parked)?;
    for child in fs::read_dir(&parked)? {
        let child = child?;
        fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    fs::remove_dir(&parked)
}
