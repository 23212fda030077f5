//! Error taxonomy for the supervisor
//!
//! Domain errors map one-to-one onto `ClientStatus` values; anything outside
//! the enumerated kinds is carried as `Internal` with its cause, keeping the
//! status enumeration closed.

use crate::status::ClientStatus;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("no client binary for platform {platform}/{arch}")]
    UnsupportedPlatform { platform: String, arch: String },

    #[error("downloaded binary hash mismatch: expected {expected}, computed {computed}")]
    InvalidHash { expected: String, computed: String },

    #[error("client download failed: {0}")]
    DownloadFailed(String),

    #[error("rpc credentials missing from client config")]
    NoCredentials,

    #[error("{0}")]
    Internal(String),
}

impl SupervisorError {
    /// The status value this error is surfaced as
    pub fn as_status(&self) -> ClientStatus {
        match self {
            SupervisorError::UnsupportedPlatform { .. } => ClientStatus::UnsupportedPlatform,
            SupervisorError::InvalidHash { .. } => ClientStatus::InvalidHash,
            SupervisorError::DownloadFailed(_) => ClientStatus::DownloadFailed,
            SupervisorError::NoCredentials => ClientStatus::NoCredentials,
            SupervisorError::Internal(cause) => ClientStatus::InternalError(cause.clone()),
        }
    }
}

impl From<std::io::Error> for SupervisorError {
    fn from(err: std::io::Error) -> Self {
        SupervisorError::Internal(err.to_string())
    }
}
