use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::fs;

/// key: key-file-source
/// Read access to local key files referenced by upload keys.
#[async_trait]
pub trait KeyFileSource: Send + Sync {
    /// True when `path` names a regular file that can be opened for reading.
    async fn exists(&self, path: &Path) -> bool;
    async fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Local filesystem through `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSource;

#[async_trait]
impl KeyFileSource for LocalFileSource {
    async fn exists(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => fs::File::open(path).await.is_ok(),
            _ => false,
        }
    }

    async fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_existing_files_only() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("signing.crt");
        fs::write(&file, b"-----BEGIN CERTIFICATE-----").await.unwrap();

        let source = LocalFileSource;
        assert!(source.exists(&file).await);
        assert!(!source.exists(&dir.path().join("missing.crt")).await);
        assert!(!source.exists(dir.path()).await);
    }

    #[tokio::test]
    async fn reads_raw_bytes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("container.pfx");
        fs::write(&file, [0x30u8, 0x82, 0x0a, 0x5f]).await.unwrap();

        let bytes = LocalFileSource.read_bytes(&file).await.unwrap();
        assert_eq!(bytes, vec![0x30, 0x82, 0x0a, 0x5f]);
    }
}
