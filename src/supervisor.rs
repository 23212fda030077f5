//! Lifecycle state machine for the supervised node
//!
//! The `Supervisor` owns all mutable lifecycle state: the published status,
//! the spawned process handle and the pending update-decision slot. It
//! sequences manifest resolution, binary provisioning, credential loading,
//! process spawn and RPC polling into the startup/update/shutdown protocol,
//! and exposes the command surface the front-end channel drives.

use crate::credentials::{self, Credentials, CredentialsError};
use crate::error::SupervisorError;
use crate::manifest::{self, ClientConfig, ClientPaths, ManifestResolver};
use crate::process::{self, NodeProcess};
use crate::provision::Provisioner;
use crate::rpc::{RpcClient, RpcOutcome, RPC_IN_WARMUP};
use crate::settings::SettingsStore;
use crate::status::{ClientStatus, Notification};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Interval for both the credential wait and the readiness wait
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a graceful stop may take before the process is force killed
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Commands accepted from the controlling front-end
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "cmd")]
pub enum Command {
    /// Re-publish the current status
    Status,
    /// Re-publish the current RPC health
    Rpc,
    /// Stop then start with `restart=true, update=false`
    Restart { commands: Vec<String> },
    /// Run the update-check-only path
    CheckUpdate,
    /// Stop then start with `restart=true, update=true`
    ApplyUpdate { commands: Vec<String> },
    /// Resolve a pending update decision as "apply"
    Update,
    /// Resolve a pending update decision as "skip"
    NoUpdate { persist: bool },
    /// Proxy an arbitrary RPC call, result tagged with `call_id`
    CallClient {
        method: String,
        #[serde(default)]
        params: Vec<Value>,
        call_id: String,
    },
}

/// Wiring for a supervisor instance; defaults target the real install
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding installed client binaries
    pub clients_dir: PathBuf,
    /// Location of the node's own config file (Linda.conf)
    pub config_path: PathBuf,
    /// Location of the persisted user settings
    pub settings_path: PathBuf,
    /// Remote manifest URL
    pub manifest_url: String,
    /// Override for the bundled manifest document
    pub bundled_manifest: Option<String>,
    /// Manifest platform key
    pub platform: String,
    /// Manifest architecture key
    pub arch: String,
    /// CLI args forwarded verbatim to every node spawn
    pub passthrough_args: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let clients_dir = manifest::default_clients_dir();
        let settings_path = clients_dir
            .parent()
            .map(|p| p.join("settings.json"))
            .unwrap_or_else(|| clients_dir.join("settings.json"));
        Self {
            clients_dir,
            config_path: credentials::default_config_path(),
            settings_path,
            manifest_url: manifest::MANIFEST_URL.to_string(),
            bundled_manifest: None,
            platform: manifest::current_platform().to_string(),
            arch: manifest::current_arch().to_string(),
            passthrough_args: Vec::new(),
        }
    }
}

/// What the startup sequence still owes after its serialized phase
enum StartStep {
    /// Sequence aborted, nothing left to do
    Done,
    /// Node already answering, only the readiness wait remains
    AwaitReady,
    /// Freshly spawned, credential wait then readiness wait
    AwaitCredentials,
}

#[derive(Debug)]
struct State {
    status: ClientStatus,
    rpc_ready: bool,
    rpc_message: String,
    credentials: Option<Credentials>,
    client_config: Option<ClientConfig>,
    proc: Option<NodeProcess>,
    update_decision: Option<oneshot::Sender<bool>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            status: ClientStatus::Initialising,
            rpc_ready: false,
            rpc_message: String::new(),
            credentials: None,
            client_config: None,
            proc: None,
            update_decision: None,
        }
    }
}

/// The lifecycle controller
pub struct Supervisor {
    config: SupervisorConfig,
    resolver: ManifestResolver,
    settings: SettingsStore,
    notify_tx: mpsc::UnboundedSender<Notification>,
    state: Mutex<State>,
    /// Serializes start/stop/restart sequences; two cannot overlap
    op_lock: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, notify_tx: mpsc::UnboundedSender<Notification>) -> Arc<Self> {
        let mut resolver = ManifestResolver::new(config.manifest_url.clone());
        if let Some(document) = &config.bundled_manifest {
            resolver = resolver.with_bundled(document.clone());
        }
        let settings = SettingsStore::open(config.settings_path.clone());
        log::info!("Client config location {}", config.config_path.display());

        Arc::new(Self {
            config,
            resolver,
            settings,
            notify_tx,
            state: Mutex::new(State::default()),
            op_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Process inbound commands until the channel closes
    pub async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = commands.recv().await {
            log::debug!("Received command {:?}", cmd);
            self.handle_command(cmd);
        }
    }

    fn handle_command(self: &Arc<Self>, cmd: Command) {
        match cmd {
            Command::Status => {
                let status = self.status();
                self.notify(Notification::Status { status });
            }
            Command::Rpc => self.send_rpc_status(),
            Command::Restart { commands } => {
                let sup = Arc::clone(self);
                tokio::spawn(async move {
                    sup.stop(false).await;
                    sup.start_client(true, false, commands).await;
                });
            }
            Command::CheckUpdate => {
                let sup = Arc::clone(self);
                tokio::spawn(async move { sup.check_client_update().await });
            }
            Command::ApplyUpdate { commands } => {
                let sup = Arc::clone(self);
                tokio::spawn(async move {
                    sup.stop(false).await;
                    sup.start_client(true, true, commands).await;
                });
            }
            Command::Update => self.resolve_update_decision(true),
            Command::NoUpdate { persist } => {
                if persist {
                    let sha = {
                        let st = self.state.lock().unwrap();
                        st.client_config.as_ref().map(|c| c.download.sha256.clone())
                    };
                    if let Some(sha) = sha {
                        self.settings.update(|s| s.skip_core_update = Some(sha));
                    }
                }
                self.resolve_update_decision(false);
            }
            Command::CallClient {
                method,
                params,
                call_id,
            } => {
                let sup = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = sup.call_client(&method, &params).await;
                    sup.notify(Notification::CallResult {
                        call_id,
                        method,
                        outcome,
                    });
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Startup protocol
    // ------------------------------------------------------------------

    /// Run the startup protocol.
    ///
    /// `restart` skips the remote manifest fetch; `update` downloads a
    /// differing binary without prompting. `commands` are extra startup flags
    /// from the caller. Failures surface purely through status transitions.
    pub async fn start_client(self: &Arc<Self>, restart: bool, update: bool, commands: Vec<String>) {
        let next = {
            let _guard = self.op_lock.lock().await;
            match self.start_sequence(restart, update, &commands).await {
                Ok(step) => step,
                Err(e) => {
                    log::error!("Client start error: {}", e);
                    self.set_status(e.as_status());
                    return;
                }
            }
        };
        // The wait loops run outside the sequence lock so a stop or restart
        // can supersede them; they abandon themselves on such a transition.
        match next {
            StartStep::Done => {}
            StartStep::AwaitReady => self.wait_for_client_ready().await,
            StartStep::AwaitCredentials => {
                self.wait_for_credentials().await;
                self.wait_for_client_ready().await;
            }
        }
    }

    async fn start_sequence(
        self: &Arc<Self>,
        restart: bool,
        update: bool,
        commands: &[String],
    ) -> Result<StartStep, SupervisorError> {
        self.set_status(ClientStatus::Initialising);
        let config = self
            .resolver
            .resolve(&self.config.platform, &self.config.arch, restart)
            .await?;
        let paths = ClientPaths::derive(&self.config.clients_dir, &config);
        self.state.lock().unwrap().client_config = Some(config.clone());

        self.set_status(ClientStatus::CheckExists);
        match credentials::load(&self.config.config_path) {
            Ok(creds) => {
                log::info!("Config exists");
                self.state.lock().unwrap().credentials = Some(creds);
                log::info!("Check if client is already running");
                if self.call_client("help", &[]).await.success {
                    log::info!("Client is already running");
                    if self.owns_process() {
                        self.set_status(ClientStatus::Running);
                    } else {
                        self.set_status(ClientStatus::RunningExternal);
                    }
                    return Ok(StartStep::AwaitReady);
                }
            }
            Err(CredentialsError::Incomplete) => {
                log::info!("Couldn't get credentials from config");
                self.set_status(ClientStatus::NoCredentials);
                return Ok(StartStep::Done);
            }
            // No config yet, the node writes one on first start
            Err(CredentialsError::NotFound) => {}
        }

        let provisioner = Provisioner::new(&config, &paths);
        log::info!("Check client exists at {}", paths.installed.display());
        if !provisioner.is_installed() {
            self.download_client(&provisioner).await?;
        } else if provisioner.update_available()? {
            log::info!("Update available");
            let skip_hash = self.settings.get().skip_core_update;
            if update {
                self.download_client(&provisioner).await?;
            } else if skip_hash.as_deref() != Some(config.download.sha256.as_str()) {
                self.set_status(ClientStatus::UpdateAvailable);
                match self.wait_for_update_decision().await? {
                    Some(true) => self.download_client(&provisioner).await?,
                    Some(false) => log::info!("Skipping update"),
                    // The prompt was cancelled by a stop or restart
                    None => return Ok(StartStep::Done),
                }
            } else {
                log::info!("Skipping update");
            }
        }

        self.set_status(ClientStatus::Starting);
        let mut args = commands.to_vec();
        args.extend(self.config.passthrough_args.iter().cloned());
        args.extend(self.settings.get().startup_flags());
        let proc = NodeProcess::spawn(&paths.installed, &args)
            .map_err(|e| SupervisorError::Internal(format!("failed to start client: {}", e)))?;
        self.register_process(proc);
        Ok(StartStep::AwaitCredentials)
    }

    async fn download_client(&self, provisioner: &Provisioner<'_>) -> Result<(), SupervisorError> {
        self.set_status(ClientStatus::DownloadClient);
        provisioner.download().await
    }

    /// Park the startup sequence until an external `Update`/`NoUpdate`
    /// command arrives. Only one decision may be pending at a time; a
    /// cancelled prompt resolves to `None`.
    async fn wait_for_update_decision(&self) -> Result<Option<bool>, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut st = self.state.lock().unwrap();
            if st.update_decision.is_some() {
                return Err(SupervisorError::Internal(
                    "an update decision is already pending".into(),
                ));
            }
            st.update_decision = Some(tx);
        }
        Ok(rx.await.ok())
    }

    /// Resolve the pending update decision, if any
    fn resolve_update_decision(&self, apply: bool) {
        let pending = self.state.lock().unwrap().update_decision.take();
        if let Some(tx) = pending {
            let _ = tx.send(apply);
        }
    }

    /// Drop a pending update decision without answering it, aborting a
    /// startup sequence parked on the prompt
    fn cancel_update_decision(&self) {
        self.state.lock().unwrap().update_decision.take();
    }

    // ------------------------------------------------------------------
    // Polling waits
    // ------------------------------------------------------------------

    /// Poll the node config until credentials parse completely. Abandons
    /// silently if a stop/restart/unexpected-close superseded the startup.
    async fn wait_for_credentials(&self) {
        loop {
            if self.status().interrupts_startup() {
                return;
            }
            match credentials::load(&self.config.config_path) {
                Ok(creds) => {
                    log::info!("Config exists");
                    self.state.lock().unwrap().credentials = Some(creds);
                    self.set_status(ClientStatus::Running);
                    return;
                }
                Err(CredentialsError::Incomplete) => {
                    log::info!("Couldn't get credentials from config");
                    self.set_status(ClientStatus::NoCredentials);
                    return;
                }
                Err(CredentialsError::NotFound) => {
                    log::debug!("Config doesn't exist, checking again in 1s");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Poll `getinfo` until the node answers. While it fails, a diagnostic
    /// message is surfaced only for the "still loading" error code.
    async fn wait_for_client_ready(&self) {
        loop {
            if self.status().interrupts_startup() {
                self.set_rpc_health(false, String::new());
                return;
            }

            let outcome = self.call_client("getinfo", &[]).await;
            if outcome.success {
                self.set_rpc_health(true, String::new());
                log::info!("RPC ready");
                return;
            }

            let message = if outcome.error_code() == Some(RPC_IN_WARMUP) {
                outcome.error_message().unwrap_or_default().to_string()
            } else {
                String::new()
            };
            self.set_rpc_health(false, message.clone());
            log::info!("RPC not ready, retrying in 1s {}", message);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    // ------------------------------------------------------------------
    // Shutdown protocol
    // ------------------------------------------------------------------

    /// Stop the supervised process. `shutting_down` distinguishes a final
    /// shutdown from a restart in the published status. Races a graceful RPC
    /// `stop` against a forced kill after the grace period; always ends in
    /// `Stopped`.
    pub async fn stop(&self, shutting_down: bool) {
        // A startup parked on the update prompt holds the sequence lock;
        // cancel the prompt so the lock frees instead of wedging the stop
        self.cancel_update_decision();
        let _guard = self.op_lock.lock().await;
        self.set_status(if shutting_down {
            ClientStatus::ShuttingDown
        } else {
            ClientStatus::Restarting
        });

        let proc = self.state.lock().unwrap().proc.take();
        let Some(mut proc) = proc else {
            self.set_status(ClientStatus::Stopped);
            return;
        };

        log::info!("Stopping client");
        let mut exited = proc.exit_watch();
        let stop_call = self.call_client("stop", &[]);
        tokio::pin!(stop_call);
        let grace = tokio::time::sleep(KILL_GRACE);
        tokio::pin!(grace);
        let mut rpc_pending = true;

        loop {
            tokio::select! {
                _ = process::wait_for_exit(&mut exited) => break,
                outcome = &mut stop_call, if rpc_pending => {
                    rpc_pending = false;
                    if !outcome.success {
                        log::info!("Graceful stop failed, force killing");
                        proc.force_kill();
                        break;
                    }
                }
                _ = &mut grace => {
                    log::info!("Client failed to exit gracefully, force killing");
                    proc.force_kill();
                    break;
                }
            }
        }

        self.set_status(ClientStatus::Stopped);
    }

    // ------------------------------------------------------------------
    // Update check
    // ------------------------------------------------------------------

    /// Re-resolve the manifest and compare checksums without touching the
    /// lifecycle status; publishes only the boolean result. Errors are
    /// swallowed.
    pub async fn check_client_update(&self) {
        let result: Result<bool, SupervisorError> = async {
            let config = self
                .resolver
                .resolve(&self.config.platform, &self.config.arch, false)
                .await?;
            let paths = ClientPaths::derive(&self.config.clients_dir, &config);
            Provisioner::new(&config, &paths).update_available()
        }
        .await;

        match result {
            Ok(available) => self.notify(Notification::UpdateCheck { available }),
            Err(e) => log::debug!("Update check failed: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // RPC
    // ------------------------------------------------------------------

    /// Issue one RPC call with the currently loaded credentials.
    ///
    /// When the node is externally owned and the connection is refused, the
    /// external node is taken to have stopped; this is the only place process
    /// death is inferred from a failed RPC.
    pub async fn call_client(&self, method: &str, params: &[Value]) -> RpcOutcome {
        let creds = self.state.lock().unwrap().credentials.clone();
        let Some(creds) = creds else {
            return RpcOutcome::failed(None, "no rpc credentials loaded");
        };

        let outcome = RpcClient::new(&creds).call(method, params).await;
        if !outcome.success
            && outcome.connection_refused
            && self.status() == ClientStatus::RunningExternal
        {
            log::info!("External client stopped answering");
            self.set_status(ClientStatus::Stopped);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Process observation
    // ------------------------------------------------------------------

    fn register_process(self: &Arc<Self>, proc: NodeProcess) {
        let mut exited = proc.exit_watch();
        self.state.lock().unwrap().proc = Some(proc);

        let sup = Arc::clone(self);
        tokio::spawn(async move {
            process::wait_for_exit(&mut exited).await;
            sup.handle_process_exit();
        });
    }

    /// Exit observer: a close that was not requested releases the handle and
    /// flags `ClosedUnexpectedly`. During stop/restart the handle has already
    /// been taken, so this is a no-op.
    fn handle_process_exit(&self) {
        let unexpected = {
            let mut st = self.state.lock().unwrap();
            let interrupting = matches!(
                st.status,
                ClientStatus::ShuttingDown | ClientStatus::Restarting | ClientStatus::Stopped
            );
            if st.proc.is_some() && !interrupting {
                st.proc = None;
                true
            } else {
                false
            }
        };
        if unexpected {
            log::info!("Client closed unexpectedly");
            self.set_status(ClientStatus::ClosedUnexpectedly);
        }
    }

    // ------------------------------------------------------------------
    // Published state
    // ------------------------------------------------------------------

    /// Current lifecycle status
    pub fn status(&self) -> ClientStatus {
        self.state.lock().unwrap().status.clone()
    }

    /// Whether we own a spawned process handle (as opposed to an external
    /// node answering on the RPC port)
    pub fn owns_process(&self) -> bool {
        self.state.lock().unwrap().proc.is_some()
    }

    fn set_status(&self, status: ClientStatus) {
        let rpc_down = status.implies_rpc_down();
        {
            let mut st = self.state.lock().unwrap();
            st.status = status.clone();
            if rpc_down {
                st.rpc_ready = false;
                st.rpc_message.clear();
            }
        }
        self.notify(Notification::Status { status });
        // An interrupting transition forces an RPC-down notification even
        // when no poll was in flight
        if rpc_down {
            self.send_rpc_status();
        }
    }

    fn set_rpc_health(&self, ready: bool, message: String) {
        {
            let mut st = self.state.lock().unwrap();
            st.rpc_ready = ready;
            st.rpc_message = message;
        }
        self.send_rpc_status();
    }

    fn send_rpc_status(&self) {
        let (ready, message) = {
            let st = self.state.lock().unwrap();
            (st.rpc_ready, st.rpc_message.clone())
        };
        self.notify(Notification::Rpc { ready, message });
    }

    fn notify(&self, notification: Notification) {
        // The receiver going away just means nobody is listening
        let _ = self.notify_tx.send(notification);
    }
}
