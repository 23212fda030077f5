//! Binary provisioning
//!
//! Guarantees the installed node binary exists and matches the manifest's
//! checksum. Downloads go to a scratch path first and are only moved into
//! place after the integrity check passes, so a failed download never
//! disturbs a working install.

use crate::error::SupervisorError;
use crate::hasher;
use crate::manifest::{ClientConfig, ClientPaths};
use futures_util::StreamExt;
use std::fs::{self, File};
use std::io::Write;
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Provisions one client binary described by a resolved manifest entry
pub struct Provisioner<'a> {
    config: &'a ClientConfig,
    paths: &'a ClientPaths,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a ClientConfig, paths: &'a ClientPaths) -> Self {
        Self { config, paths }
    }

    /// Whether a binary is present at the installed path
    pub fn is_installed(&self) -> bool {
        self.paths.installed.exists()
    }

    /// Whether the installed binary's checksum differs from the manifest's.
    /// Byte-exact hex comparison, no fuzzy matching.
    pub fn update_available(&self) -> Result<bool, SupervisorError> {
        let matches = hasher::file_matches(&self.paths.installed, &self.config.download.sha256)
            .map_err(|e| SupervisorError::Internal(e.to_string()))?;
        Ok(!matches)
    }

    /// Download, verify and install the binary.
    ///
    /// A checksum mismatch fails with `InvalidHash` and removes the scratch
    /// file; the previously installed binary, if any, is untouched. Any
    /// transport or filesystem failure is reported as `DownloadFailed`.
    pub async fn download(&self) -> Result<(), SupervisorError> {
        fs::create_dir_all(&self.paths.data_dir)
            .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?;

        // Delete any stale partial download
        if self.paths.scratch.exists() {
            log::info!("Deleting stale client download");
            fs::remove_file(&self.paths.scratch)
                .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?;
        }

        log::info!(
            "Downloading client from {} to {}",
            self.config.download.url,
            self.paths.scratch.display()
        );
        self.fetch_to_scratch()
            .await
            .map_err(SupervisorError::DownloadFailed)?;

        let computed = hasher::file_sha256(&self.paths.scratch)
            .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?;
        let expected = self.config.download.sha256.to_lowercase();
        if computed != expected {
            log::info!("Downloaded client has invalid SHA256");
            let _ = fs::remove_file(&self.paths.scratch);
            return Err(SupervisorError::InvalidHash { expected, computed });
        }

        fs::rename(&self.paths.scratch, &self.paths.installed)
            .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.paths.installed)
                .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?
                .permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&self.paths.installed, perms)
                .map_err(|e| SupervisorError::DownloadFailed(e.to_string()))?;
        }

        log::info!("Client installed at {}", self.paths.installed.display());
        Ok(())
    }

    async fn fetch_to_scratch(&self) -> Result<(), String> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;

        let response = client
            .get(&self.config.download.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("download returned status {}", response.status()));
        }

        let mut file = File::create(&self.paths.scratch).map_err(|e| e.to_string())?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            file.write_all(&chunk).map_err(|e| e.to_string())?;
        }
        file.flush().map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DownloadInfo;
    use sha2::{Digest, Sha256};
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAYLOAD: &[u8] = b"#!/bin/sh\nexit 0\n";

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Serve `payload` on any path over plain HTTP
    async fn spawn_file_fixture(payload: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let payload = payload.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        payload.len()
                    );
                    let _ = stream.write_all(header.as_bytes()).await;
                    let _ = stream.write_all(&payload).await;
                });
            }
        });
        port
    }

    fn fixture(dir: &Path, url: String, sha256: String) -> (ClientConfig, ClientPaths) {
        let config = ClientConfig {
            bin: "Lindad".into(),
            download: DownloadInfo { url, sha256 },
        };
        let paths = ClientPaths::derive(dir, &config);
        (config, paths)
    }

    #[tokio::test]
    async fn download_installs_on_matching_hash() {
        let dir = TempDir::new().unwrap();
        let port = spawn_file_fixture(PAYLOAD.to_vec()).await;
        let (config, paths) = fixture(
            dir.path(),
            format!("http://127.0.0.1:{}/Lindad", port),
            sha256_hex(PAYLOAD),
        );

        let provisioner = Provisioner::new(&config, &paths);
        assert!(!provisioner.is_installed());
        provisioner.download().await.unwrap();

        assert!(provisioner.is_installed());
        assert!(!paths.scratch.exists());
        assert_eq!(std::fs::read(&paths.installed).unwrap(), PAYLOAD);
        assert!(!provisioner.update_available().unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&paths.installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn hash_mismatch_never_installs() {
        let dir = TempDir::new().unwrap();
        let port = spawn_file_fixture(PAYLOAD.to_vec()).await;
        let (config, paths) = fixture(
            dir.path(),
            format!("http://127.0.0.1:{}/Lindad", port),
            "0".repeat(64),
        );

        // A previous good install must survive a failed update
        std::fs::create_dir_all(&paths.data_dir).unwrap();
        std::fs::write(&paths.installed, b"previous install").unwrap();

        let provisioner = Provisioner::new(&config, &paths);
        let err = provisioner.download().await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidHash { .. }));

        assert!(!paths.scratch.exists());
        assert_eq!(std::fs::read(&paths.installed).unwrap(), b"previous install");
    }

    #[tokio::test]
    async fn transport_failure_is_download_failed() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (config, paths) = fixture(
            dir.path(),
            format!("http://127.0.0.1:{}/Lindad", port),
            sha256_hex(PAYLOAD),
        );
        let provisioner = Provisioner::new(&config, &paths);
        let err = provisioner.download().await.unwrap_err();
        assert!(matches!(err, SupervisorError::DownloadFailed(_)));
        assert!(!provisioner.is_installed());
    }

    #[tokio::test]
    async fn stale_scratch_is_replaced() {
        let dir = TempDir::new().unwrap();
        let port = spawn_file_fixture(PAYLOAD.to_vec()).await;
        let (config, paths) = fixture(
            dir.path(),
            format!("http://127.0.0.1:{}/Lindad", port),
            sha256_hex(PAYLOAD),
        );

        std::fs::create_dir_all(&paths.data_dir).unwrap();
        std::fs::write(&paths.scratch, b"half a binary").unwrap();

        Provisioner::new(&config, &paths).download().await.unwrap();
        assert_eq!(std::fs::read(&paths.installed).unwrap(), PAYLOAD);
    }

    #[test]
    fn update_available_compares_checksums() {
        let dir = TempDir::new().unwrap();
        let (config, paths) = fixture(dir.path(), "http://unused".into(), sha256_hex(PAYLOAD));

        std::fs::create_dir_all(&paths.data_dir).unwrap();
        std::fs::write(&paths.installed, PAYLOAD).unwrap();
        assert!(!Provisioner::new(&config, &paths).update_available().unwrap());

        std::fs::write(&paths.installed, b"an older build").unwrap();
        assert!(Provisioner::new(&config, &paths).update_available().unwrap());
    }
}
