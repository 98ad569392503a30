//! src/transfer/checksum.rs
//! Expected digests and post-download verification.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    const fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha256 => 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChecksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: Vec<u8>,
}

impl ExpectedChecksum {
    /// Parses `md5:<hex>`, `sha256:<hex>` or a bare base64 Content-MD5.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        let invalid = |msg: &str| AppError::invalid_input("checksum", format!("{msg}: {value:?}"));

        let (algorithm, digest) = if let Some(hex_digest) = value.strip_prefix("md5:") {
            (
                ChecksumAlgorithm::Md5,
                hex::decode(hex_digest).map_err(|_| invalid("bad hex"))?,
            )
        } else if let Some(hex_digest) = value.strip_prefix("sha256:") {
            (
                ChecksumAlgorithm::Sha256,
                hex::decode(hex_digest).map_err(|_| invalid("bad hex"))?,
            )
        } else {
            (
                ChecksumAlgorithm::Md5,
                BASE64.decode(value).map_err(|_| invalid("bad base64"))?,
            )
        };

        if digest.len() != algorithm.digest_len() {
            return Err(invalid("wrong digest length"));
        }

        Ok(Self { algorithm, digest })
    }

    /// Canonical `<algo>:<hex>` form.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExpectedChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), hex::encode(&self.digest))
    }
}

/// Hash `path` in `buffer_size` chunks.
pub async fn hash_file(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    buffer_size: usize,
) -> Result<Vec<u8>, AppError> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; buffer_size.max(1)];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            Ok(ctx.compute().0.to_vec())
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher.finalize().to_vec())
        }
    }
}

/// Hash the file and compare. A mismatch leaves the file in place.
pub async fn verify_file(
    path: &Path,
    expected: &ExpectedChecksum,
    buffer_size: usize,
) -> Result<(), AppError> {
    let actual = hash_file(path, expected.algorithm, buffer_size).await?;

    debug!(
        marker = "CHECKSUM_VERIFY",
        operation_type = "download",
        path = %path.display(),
        algorithm = expected.algorithm.name(),
        matched = actual == expected.digest,
        "Verified downloaded file"
    );

    if actual == expected.digest {
        return Ok(());
    }

    Err(AppError::ChecksumMismatch {
        path: path.to_path_buf(),
        expected: expected.canonical(),
        actual: format!("{}:{}", expected.algorithm.name(), hex::encode(actual)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let md5_b64 = BASE64.encode(md5::compute(b"hello").0);
        let parsed = ExpectedChecksum::parse(&md5_b64).unwrap();
        assert_eq!(parsed.algorithm, ChecksumAlgorithm::Md5);
        assert_eq!(parsed.canonical(), "md5:5d41402abc4b2a76b9719d911017c592");

        let hex_form = ExpectedChecksum::parse("md5:5d41402abc4b2a76b9719d911017c592").unwrap();
        assert_eq!(hex_form, parsed);

        let sha = ExpectedChecksum::parse(
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        )
        .unwrap();
        assert_eq!(sha.algorithm, ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ExpectedChecksum::parse("md5:zz").is_err());
        assert!(ExpectedChecksum::parse("sha256:abcd").is_err());
        assert!(ExpectedChecksum::parse("!!!").is_err());
    }

    #[tokio::test]
    async fn test_verify_file_detects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let good = ExpectedChecksum::parse(
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
        )
        .unwrap();
        verify_file(&path, &good, 2).await.unwrap();

        let bad = ExpectedChecksum::parse("md5:00000000000000000000000000000000").unwrap();
        let err = verify_file(&path, &bad, 2).await.unwrap_err();
        assert!(matches!(err, AppError::ChecksumMismatch { .. }));
        assert!(path.exists());
    }
}
