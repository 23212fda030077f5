//! Client status state machine values and outbound notifications
//!
//! `ClientStatus` is the single source of truth for what the supervisor is
//! doing right now. Every mutation is published to the notification channel.

use crate::rpc::RpcOutcome;
use serde::{Deserialize, Serialize};

/// Lifecycle status of the supervised node (closed set)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "detail")]
pub enum ClientStatus {
    Initialising,
    CheckExists,
    DownloadClient,
    UpdateAvailable,
    Starting,
    Running,
    /// The node answers on the RPC port but we did not spawn it
    RunningExternal,
    Stopped,
    /// Config file exists but rpc credentials are missing or partial
    NoCredentials,
    /// Downloaded binary failed its integrity check
    InvalidHash,
    DownloadFailed,
    UnsupportedPlatform,
    ShuttingDown,
    Restarting,
    /// The node process exited without a stop/restart being requested
    ClosedUnexpectedly,
    /// Catch-all for faults outside the domain statuses, carrying the cause
    InternalError(String),
}

impl ClientStatus {
    /// True for transitions that supersede an in-flight startup sequence.
    /// Polling loops abandon themselves when they observe one of these.
    /// `Stopped` is included so a loop that slept through the brief
    /// `ShuttingDown` window still winds down.
    pub fn interrupts_startup(&self) -> bool {
        matches!(
            self,
            ClientStatus::ShuttingDown
                | ClientStatus::Restarting
                | ClientStatus::ClosedUnexpectedly
                | ClientStatus::Stopped
        )
    }

    /// True for transitions that imply the RPC channel is down
    pub fn implies_rpc_down(&self) -> bool {
        matches!(
            self,
            ClientStatus::Stopped
                | ClientStatus::ShuttingDown
                | ClientStatus::Restarting
                | ClientStatus::ClosedUnexpectedly
        )
    }
}

/// Outbound notifications published to the front-end channel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Notification {
    /// The lifecycle status changed (or was re-requested)
    Status { status: ClientStatus },
    /// RPC health: ready flag plus an optional diagnostic message
    /// (populated only from JSON-RPC error code -28, "still loading")
    Rpc { ready: bool, message: String },
    /// Result of an update-check-only pass
    UpdateCheck { available: bool },
    /// Result of a proxied RPC call, tagged with the caller's id
    CallResult {
        call_id: String,
        method: String,
        outcome: RpcOutcome,
    },
}
