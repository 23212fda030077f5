//! Persisted user settings consumed by the supervisor
//!
//! Stored as pretty JSON next to the client-data directory. Loading is
//! tolerant: a missing or unparseable file yields defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Settings that translate into node startup flags, plus the last update
/// checksum the user chose to skip
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// sha256 of the last update the user declined; matching updates are not
    /// re-prompted
    pub skip_core_update: Option<String>,
    /// Translates to `-listen=0`
    pub block_incoming_connections: bool,
    /// Comma-separated network list, each entry becomes `-onlynet=<net>`
    pub onlynet: Option<String>,
    /// Translates to `-proxy=<addr>`
    pub proxy: Option<String>,
    /// Translates to `-tor=<addr>`
    pub tor: Option<String>,
}

impl Settings {
    /// Startup flags derived from these settings
    pub fn startup_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.block_incoming_connections {
            flags.push("-listen=0".to_string());
        }
        if let Some(nets) = &self.onlynet {
            for net in nets.split(',').filter(|n| !n.trim().is_empty()) {
                flags.push(format!("-onlynet={}", net.trim()));
            }
        }
        if let Some(proxy) = &self.proxy {
            flags.push(format!("-proxy={}", proxy));
        }
        if let Some(tor) = &self.tor {
            flags.push(format!("-tor={}", tor));
        }
        flags
    }
}

/// File-backed settings store
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    cached: Mutex<Settings>,
}

impl SettingsStore {
    /// Open the store at `path`, loading whatever is there
    pub fn open(path: PathBuf) -> Self {
        let cached = Self::read(&path);
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }

    fn read(path: &PathBuf) -> Settings {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    /// Current settings snapshot
    pub fn get(&self) -> Settings {
        self.cached.lock().unwrap().clone()
    }

    /// Mutate and persist; a write failure keeps the in-memory value and logs
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.cached.lock().unwrap();
        f(&mut guard);
        if let Err(e) = self.write(&guard) {
            log::error!("Failed to persist settings to {}: {}", self.path.display(), e);
        }
    }

    fn write(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(settings)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::open(path.clone());
        store.update(|s| {
            s.skip_core_update = Some("abc123".into());
            s.block_incoming_connections = true;
        });

        let reopened = SettingsStore::open(path);
        assert_eq!(reopened.get().skip_core_update.as_deref(), Some("abc123"));
        assert!(reopened.get().block_incoming_connections);
    }

    #[test]
    fn garbage_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::open(path);
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn startup_flags_derivation() {
        let settings = Settings {
            skip_core_update: None,
            block_incoming_connections: true,
            onlynet: Some("onion,ipv4".into()),
            proxy: Some("127.0.0.1:9050".into()),
            tor: Some("127.0.0.1:9051".into()),
        };
        assert_eq!(
            settings.startup_flags(),
            vec![
                "-listen=0",
                "-onlynet=onion",
                "-onlynet=ipv4",
                "-proxy=127.0.0.1:9050",
                "-tor=127.0.0.1:9051",
            ]
        );
    }

    #[test]
    fn default_settings_produce_no_flags() {
        assert!(Settings::default().startup_flags().is_empty());
    }
}
