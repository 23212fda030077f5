//! Manifest resolution
//!
//! Determines which node binary, version and checksum apply for the current
//! platform and architecture. A freshly fetched remote manifest is preferred;
//! any fetch or parse failure falls back silently to the manifest bundled with
//! the application.

use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Manifest key of the supervised client
pub const CLIENT_NAME: &str = "Lindad";

/// Remote manifest location, checked for updated binaries on a fresh start
pub const MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/thelindaprojectinc/altitude/master/clientBinaries.json";

/// Manifest shipped with the application, used when the remote is unreachable
const BUNDLED_MANIFEST: &str = include_str!("clients.json");

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Scratch file name for in-progress downloads
const SCRATCH_NAME: &str = "download";

/// Manifest document: client name -> platform -> arch -> config
pub type Manifest = HashMap<String, HashMap<String, HashMap<String, ClientConfig>>>;

/// Binary details resolved from the manifest for one platform/arch pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Installed binary file name
    pub bin: String,
    pub download: DownloadInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    pub sha256: String,
}

/// Filesystem locations derived from a resolved config
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPaths {
    /// Directory holding installed client binaries
    pub data_dir: PathBuf,
    /// Where the binary lives once installed
    pub installed: PathBuf,
    /// Scratch location for in-progress downloads
    pub scratch: PathBuf,
}

impl ClientPaths {
    pub fn derive(data_dir: &Path, config: &ClientConfig) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            installed: data_dir.join(&config.bin),
            scratch: data_dir.join(SCRATCH_NAME),
        }
    }
}

/// Default client-data directory for this platform
pub fn default_clients_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Altitude")
            .join("clients")
    }

    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Altitude")
            .join("clients")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Altitude")
            .join("clients")
    }
}

/// Platform identifier used as a manifest key
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

/// CPU architecture used as a manifest key
pub fn current_arch() -> &'static str {
    std::env::consts::ARCH
}

/// Resolves manifests into per-platform client configs
pub struct ManifestResolver {
    url: String,
    bundled: String,
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new(MANIFEST_URL.to_string())
    }
}

impl ManifestResolver {
    pub fn new(url: String) -> Self {
        Self {
            url,
            bundled: BUNDLED_MANIFEST.to_string(),
        }
    }

    /// Replace the bundled fallback document (tests and packaging overrides)
    pub fn with_bundled(mut self, document: String) -> Self {
        self.bundled = document;
        self
    }

    /// Resolve the client config for `platform`/`arch`.
    ///
    /// `skip_remote` avoids network chatter on restart paths; the bundled
    /// manifest is used directly.
    pub async fn resolve(
        &self,
        platform: &str,
        arch: &str,
        skip_remote: bool,
    ) -> Result<ClientConfig, SupervisorError> {
        let manifest = if skip_remote {
            self.bundled_manifest()?
        } else {
            match self.fetch_remote().await {
                Ok(manifest) => manifest,
                Err(e) => {
                    log::info!("Failed to get remote client manifest, using bundled: {}", e);
                    self.bundled_manifest()?
                }
            }
        };

        lookup(&manifest, CLIENT_NAME, platform, arch)
    }

    async fn fetch_remote(&self) -> Result<Manifest, String> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("manifest fetch returned status {}", response.status()));
        }

        // The manifest is served as raw text, parse it ourselves
        let body = response.text().await.map_err(|e| e.to_string())?;
        serde_json::from_str(&body).map_err(|e| e.to_string())
    }

    fn bundled_manifest(&self) -> Result<Manifest, SupervisorError> {
        serde_json::from_str(&self.bundled)
            .map_err(|e| SupervisorError::Internal(format!("bundled manifest is invalid: {}", e)))
    }
}

/// Look up `manifest[client][platform][arch]`
pub fn lookup(
    manifest: &Manifest,
    client: &str,
    platform: &str,
    arch: &str,
) -> Result<ClientConfig, SupervisorError> {
    manifest
        .get(client)
        .and_then(|platforms| platforms.get(platform))
        .and_then(|archs| archs.get(arch))
        .cloned()
        .ok_or_else(|| SupervisorError::UnsupportedPlatform {
            platform: platform.to_string(),
            arch: arch.to_string(),
        })
}
