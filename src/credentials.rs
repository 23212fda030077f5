//! RPC credential loading from the node's own config file
//!
//! The node writes a line-oriented `key=value` config (Linda.conf). We read it
//! back for exactly three keys: `rpcuser`, `rpcpassword`, `rpcport`.
//! Credentials are only trusted once the file was read successfully and all
//! three values are present and non-empty.

use std::path::{Path, PathBuf};

/// Config file name written by the node
pub const CLIENT_CONF_NAME: &str = "Linda.conf";

/// RPC auth parsed from the node config
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub rpc_user: String,
    pub rpc_password: String,
    pub rpc_port: u16,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CredentialsError {
    /// Config file does not exist (or could not be read) - the node may not
    /// have started yet, callers poll until it appears
    #[error("client config not found")]
    NotFound,
    /// Config file exists but one or more of rpcuser/rpcpassword/rpcport is
    /// missing or empty - distinct from NotFound, the user must fix the file
    #[error("client config is missing rpc credentials")]
    Incomplete,
}

/// Default location of the node config for this platform, honoring a
/// `-datadir=<dir>` argument passed to the supervisor's own process.
pub fn default_config_path() -> PathBuf {
    config_path_from_args(std::env::args())
}

pub(crate) fn config_path_from_args(args: impl Iterator<Item = String>) -> PathBuf {
    for arg in args {
        if let Some(dir) = datadir_override(&arg) {
            return PathBuf::from(dir.trim()).join(CLIENT_CONF_NAME);
        }
    }
    platform_config_path()
}

fn datadir_override(arg: &str) -> Option<&str> {
    let lower = arg.to_lowercase();
    if lower.contains("-datadir=") {
        arg.split_once('=').map(|(_, dir)| dir)
    } else {
        None
    }
}

fn platform_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Linda")
            .join(CLIENT_CONF_NAME)
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
            .join("Linda")
            .join(CLIENT_CONF_NAME)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".Linda")
            .join(CLIENT_CONF_NAME)
    }
}

/// Load credentials from the node config at `path`
pub fn load(path: &Path) -> Result<Credentials, CredentialsError> {
    let data = std::fs::read_to_string(path).map_err(|_| CredentialsError::NotFound)?;
    parse(&data)
}

fn parse(data: &str) -> Result<Credentials, CredentialsError> {
    let mut user = None;
    let mut password = None;
    let mut port = None;

    for line in data.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim_end_matches('\r').trim();
        if value.is_empty() {
            continue;
        }
        match key {
            "rpcuser" => user = Some(value.to_string()),
            "rpcpassword" => password = Some(value.to_string()),
            "rpcport" => port = value.parse::<u16>().ok(),
            _ => {}
        }
    }

    match (user, password, port) {
        (Some(rpc_user), Some(rpc_password), Some(rpc_port)) => Ok(Credentials {
            rpc_user,
            rpc_password,
            rpc_port,
        }),
        _ => Err(CredentialsError::Incomplete),
    }
}
