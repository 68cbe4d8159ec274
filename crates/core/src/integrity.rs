use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BLOCK_SIZE: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("unsupported checksum '{0}': expected 32 (MD5) or 64 (SHA-256) hex digits")]
    Unsupported(String),
}

/// Digest family of a registered checksum, told apart by hex length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Md5,
    Sha256,
}

impl ChecksumKind {
    pub fn detect(expected: &str) -> Option<Self> {
        if !expected.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match expected.len() {
            32 => Some(ChecksumKind::Md5),
            64 => Some(ChecksumKind::Sha256),
            _ => None,
        }
    }

    /// Lowercase hex digest of the file at `path`.
    pub fn digest_file(self, path: &Path) -> Result<String, IntegrityError> {
        match self {
            ChecksumKind::Md5 => hash_file::<Md5>(path),
            ChecksumKind::Sha256 => hash_file::<Sha256>(path),
        }
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String, IntegrityError> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compute the SHA-256 hex digest of a file, reading it block by block.
pub fn sha256_file(path: &Path) -> Result<String, IntegrityError> {
    hash_file::<Sha256>(path)
}

/// Fail unless the digest of `path` is exactly `expected` (lowercase hex).
/// 32 digits select MD5, 64 select SHA-256.
pub fn verify(path: &Path, expected: &str) -> Result<(), IntegrityError> {
    let kind = ChecksumKind::detect(expected)
        .ok_or_else(|| IntegrityError::Unsupported(expected.to_string()))?;

    tracing::info!("Verifying {:?} checksum for {:?}", kind, path);
    let actual = kind.digest_file(path)?;
    if actual != expected {
        return Err(IntegrityError::Mismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    tracing::info!("Checksum verified: {}", expected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

    fn abc_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        path
    }

    #[test]
    fn digest_of_known_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = abc_file(&dir);
        assert_eq!(sha256_file(&path).unwrap(), ABC_SHA256);
        assert!(verify(&path, ABC_SHA256).is_ok());
    }

    #[test]
    fn md5_checksums_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = abc_file(&dir);
        assert_eq!(ChecksumKind::detect(ABC_MD5), Some(ChecksumKind::Md5));
        assert_eq!(ChecksumKind::Md5.digest_file(&path).unwrap(), ABC_MD5);
        assert!(verify(&path, ABC_MD5).is_ok());

        let err = verify(&path, "00000000000000000000000000000000").unwrap_err();
        match err {
            IntegrityError::Mismatch { actual, .. } => assert_eq!(actual, ABC_MD5),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn unknown_digest_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = abc_file(&dir);
        let not_hex = "z".repeat(32);
        for bad in ["abc123", "", not_hex.as_str()] {
            let err = verify(&path, bad).unwrap_err();
            assert!(matches!(err, IntegrityError::Unsupported(_)), "{}", bad);
        }
    }

    #[test]
    fn spans_multiple_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; BLOCK_SIZE * 2 + 13];
        std::fs::write(&path, &data).unwrap();
        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(sha256_file(&path).unwrap(), expected);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = abc_file(&dir);
        let err = verify(&path, &ABC_SHA256.to_uppercase()).unwrap_err();
        match err {
            IntegrityError::Mismatch { actual, .. } => assert_eq!(actual, ABC_SHA256),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify(&dir.path().join("absent"), ABC_SHA256).unwrap_err();
        assert!(matches!(err, IntegrityError::Io(_)));
    }
}
