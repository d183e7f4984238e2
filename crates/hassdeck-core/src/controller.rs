// ── Controller abstraction ──
//
// Full lifecycle management for one Home Assistant hub connection.
// Handles the initial state fetch, background refresh, command routing,
// IR telemetry, and reactive device streaming through the DataStore.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use hassdeck_api::transport::{TlsMode, TransportConfig};
use hassdeck_api::HassClient;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::{ActivityEntry, ActivityLog};
use crate::command::{Command, CommandEnvelope, CommandResult, CommandSink};
use crate::config::{ControllerConfig, TlsVerification};
use crate::control::{ControlHandle, ControlSession, ControlledAttribute};
use crate::convert::snapshot_from_states;
use crate::error::CoreError;
use crate::model::{Device, DeviceId, DeviceMapping, EntityState};
use crate::remote::{RemoteInputController, RemoteKey};
use crate::store::DataStore;
use crate::stream::DeviceStream;
use crate::telemetry::IrTelemetry;

const COMMAND_CHANNEL_SIZE: usize = 64;
const TELEMETRY_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Owns the device store,
/// the command channel and the background refresh loop.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    store: Arc<DataStore>,
    connection_state: watch::Sender<ConnectionState>,
    telemetry_tx: broadcast::Sender<IrTelemetry>,
    activity: std::sync::Mutex<ActivityLog>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    client: Mutex<Option<HassClient>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller over an initial device list and mapping. Does
    /// NOT connect; call [`connect()`](Self::connect) to fetch state and
    /// start background tasks.
    pub fn new(config: ControllerConfig, devices: Vec<Device>, mapping: DeviceMapping) -> Self {
        let store = Arc::new(DataStore::new(devices, mapping));
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (telemetry_tx, _) = broadcast::channel(TELEMETRY_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                connection_state,
                telemetry_tx,
                activity: std::sync::Mutex::new(ActivityLog::new()),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                client: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the hub.
    ///
    /// Verifies the token, performs an initial state fetch, and spawns
    /// the background tasks (periodic refresh, command processor).
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.connection_state.send_replace(ConnectionState::Connecting);

        match self.establish().await {
            Ok(()) => {
                self.inner.connection_state.send_replace(ConnectionState::Connected);
                info!(url = %self.inner.config.url, "connected to Home Assistant");
                Ok(())
            }
            Err(e) => {
                self.inner.connection_state.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let transport = build_transport(config);
        let client = HassClient::from_token(config.url.clone(), &config.token, &transport)?;

        let status = client.check_api().await?;
        debug!(message = %status.message, "hub API reachable");

        *self.inner.client.lock().await = Some(client);
        self.refresh().await?;

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let ctrl = self.clone();
            handles.push(tokio::spawn(command_processor_task(ctrl, rx)));
        }

        let interval = config.refresh_interval;
        if !interval.is_zero() {
            let ctrl = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(refresh_task(ctrl, interval, cancel)));
        }

        Ok(())
    }

    /// Stop background tasks and every control session spawned from this
    /// controller, then reset to [`Disconnected`](ConnectionState::Disconnected).
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        *self.inner.client.lock().await = None;
        self.inner.connection_state.send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Fetch every entity state and merge it into the device list.
    ///
    /// Returns whether any device changed.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        let client = self.client().await?;
        let states = client.fetch_states().await?;
        let snapshot = snapshot_from_states(states);
        let entities = snapshot.len();

        let changed = self.inner.store.apply_entities(snapshot);
        debug!(entities, changed, "state refresh complete");
        Ok(changed)
    }

    async fn client(&self) -> Result<HassClient, CoreError> {
        self.inner
            .client
            .lock()
            .await
            .clone()
            .ok_or(CoreError::ControllerDisconnected)
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command and await its result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.connection_state.borrow() != ConnectionState::Connected {
            return Err(CoreError::ControllerDisconnected);
        }

        let (tx, rx) = oneshot::channel();

        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: Some(tx),
            })
            .await
            .map_err(|_| CoreError::ControllerDisconnected)?;

        rx.await.map_err(|_| CoreError::ControllerDisconnected)?
    }

    /// Queue a command without waiting. Failures are logged, not returned.
    pub fn dispatch(&self, cmd: Command) {
        if *self.inner.connection_state.borrow() != ConnectionState::Connected {
            warn!(command = %cmd, "not connected, command dropped");
            return;
        }

        let envelope = CommandEnvelope {
            command: cmd,
            response_tx: None,
        };
        if let Err(e) = self.inner.command_tx.try_send(envelope) {
            let dropped = match e {
                mpsc::error::TrySendError::Full(env) | mpsc::error::TrySendError::Closed(env) => {
                    env.command
                }
            };
            warn!(command = %dropped, "command channel unavailable, command dropped");
        }
    }

    // ── Remote control ───────────────────────────────────────────

    /// Send one IR code through the remote device's mapped entity.
    ///
    /// Every attempt is reported on the telemetry channel: unmapped
    /// devices report failure without touching the hub.
    pub async fn send_remote(&self, id: DeviceId, code: &str) -> Result<(), CoreError> {
        let Some(entity) = self.inner.store.entity_for(id) else {
            warn!(device = %id, code, "remote has no mapped entity");
            self.emit(IrTelemetry::unmapped(id, code));
            return Err(CoreError::NotMapped { id });
        };

        self.emit(IrTelemetry::sent(id, entity.clone(), code));
        let cmd = Command::SendRemote {
            id,
            code: code.to_owned(),
        };
        match self.execute(cmd).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(device = %id, code, error = %e, "IR send failed");
                self.emit(IrTelemetry::failed(id, entity, code, &e));
                Err(e)
            }
        }
    }

    /// A remote-panel input arbiter whose accepted presses are sent
    /// through [`send_remote`](Self::send_remote).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn remote_input(&self, id: DeviceId) -> RemoteInputController {
        let (tx, mut rx) = mpsc::unbounded_channel::<RemoteKey>();
        let ctrl = self.clone();
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    key = rx.recv() => {
                        let Some(key) = key else { break };
                        // Failures are already on the telemetry channel.
                        let _ = ctrl.send_remote(id, &key.to_string()).await;
                    }
                }
            }
        });

        RemoteInputController::new(move |key| {
            let _ = tx.send(key);
        })
    }

    fn emit(&self, event: IrTelemetry) {
        let _ = self.inner.telemetry_tx.send(event);
    }

    /// Subscribe to IR send telemetry.
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<IrTelemetry> {
        self.inner.telemetry_tx.subscribe()
    }

    // ── Controls ─────────────────────────────────────────────────

    /// Start an optimistic control session for one attribute of a device.
    ///
    /// The session stops on [`shutdown()`](Self::shutdown).
    pub fn control<A: ControlledAttribute>(
        &self,
        id: DeviceId,
    ) -> Result<ControlHandle<A>, CoreError> {
        ControlSession::<A>::spawn(
            id,
            self.devices(),
            Arc::new(self.clone()),
            self.inner.config.timing,
            self.inner.cancel.child_token(),
        )
    }

    // ── Activity log ─────────────────────────────────────────────

    fn record(&self, message: String) {
        self.inner
            .activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(message);
    }

    /// Newest first.
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.inner
            .activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    /// Seed the activity log, e.g. from a persisted copy.
    pub fn restore_activity(&self, entries: Vec<ActivityEntry>) {
        *self
            .inner
            .activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ActivityLog::from_entries(entries);
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, shut down.
    pub async fn oneshot<F, Fut, T>(
        config: ControllerConfig,
        devices: Vec<Device>,
        mapping: DeviceMapping,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config, devices, mapping);
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.shutdown().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn devices(&self) -> DeviceStream {
        self.inner.store.subscribe_devices()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices_snapshot()
    }

    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.inner.store.device(id)
    }

    pub fn mapping(&self) -> Arc<DeviceMapping> {
        self.inner.store.mapping()
    }
}

impl CommandSink for Controller {
    fn dispatch(&self, command: Command) {
        Controller::dispatch(self, command);
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodically refresh hub state.
async fn refresh_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = controller.refresh().await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

/// Process commands from the mpsc channel one at a time.
async fn command_processor_task(controller: Controller, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = controller.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let label = envelope.command.to_string();
                let result = route_command(&controller, envelope.command).await;
                match envelope.response_tx {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(command = %label, error = %e, "dispatch failed");
                        }
                    }
                }
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────

/// Send a command to the hub through the device's mapped entity, or
/// patch the device locally when it has none.
async fn route_command(controller: &Controller, cmd: Command) -> Result<CommandResult, CoreError> {
    let store = &controller.inner.store;
    let id = cmd.device_id();

    if store.device(id).is_none() {
        return Err(CoreError::DeviceNotFound { id });
    }

    let Some(entity) = store.entity_for(id) else {
        if matches!(cmd, Command::SendRemote { .. }) {
            return Err(CoreError::NotMapped { id });
        }
        store.update_device(id, |device| cmd.apply_local(device))?;
        controller.record(format!("{cmd} (local)"));
        return Ok(CommandResult::Local);
    };

    let call = cmd.service_call(&entity)?;
    let client = controller.client().await?;
    let changed = client
        .call_service(&call.domain, call.service, &call.data)
        .await?;

    debug!(
        command = %cmd,
        domain = %call.domain,
        service = call.service,
        changed = changed.len(),
        "service call sent"
    );
    controller.record(format!("{cmd} → {entity}"));

    let count = changed.len();
    store.merge_entities(changed.into_iter().map(EntityState::from));

    Ok(CommandResult::Sent {
        entity_id: entity,
        changed: count,
    })
}

// ── Helpers ──────────────────────────────────────────────────────

fn build_transport(config: &ControllerConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
