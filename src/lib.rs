//! Lifecycle supervisor for the Linda node daemon
//!
//! Provisions, launches, monitors and tears down the Lindad binary, exposing
//! its health through a JSON-RPC probe and a closed status state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   node-supervisor                        │
//! ├─────────────────────────────────────────────────────────┤
//! │  supervisor.rs  - Lifecycle state machine and commands   │
//! │  manifest.rs    - Remote/bundled manifest resolution     │
//! │  provision.rs   - Binary download and install            │
//! │  hasher.rs      - SHA256 verification                    │
//! │  process.rs     - Child process ownership                │
//! │  rpc.rs         - JSON-RPC client                        │
//! │  credentials.rs - Linda.conf credential loading          │
//! │  settings.rs    - Persisted user settings                │
//! │  status.rs      - Status values and notifications        │
//! │  logging.rs     - log4rs setup for the harness binary    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The `Supervisor` drives manifest resolution, provisioning, credential
//! loading, process spawn and RPC polling as one serialized protocol, and
//! reacts to front-end commands (restart, apply-update, update decisions)
//! over channels.

pub mod credentials;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod manifest;
pub mod process;
pub mod provision;
pub mod rpc;
pub mod settings;
pub mod status;
pub mod supervisor;

pub use error::SupervisorError;
pub use manifest::{ClientConfig, ClientPaths, ManifestResolver};
pub use rpc::{RpcClient, RpcOutcome};
pub use settings::{Settings, SettingsStore};
pub use status::{ClientStatus, Notification};
pub use supervisor::{Command, Supervisor, SupervisorConfig};
