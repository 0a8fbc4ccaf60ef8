// ── Controller abstraction ──
//
// Full lifecycle management for one account's fleet: the initial cycle,
// the cloud scheduler, one local poller per device, command routing, and
// reactive state through the DeviceStore.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use evsync_api::{CloudClient, QuotaSnapshot, WriteValue};
use futures_util::future::join_all;
use strum::Display;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::SyncConfig;
use crate::controls::{self, ControlHandle};
use crate::engine::{CycleReport, SyncEngine};
use crate::error::CoreError;
use crate::local_poller::LocalPoller;
use crate::model::LocalSnapshot;
use crate::store::DeviceStore;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Shortest local poll period; `tokio::time::interval` rejects zero.
const MIN_LOCAL_PERIOD: Duration = Duration::from_secs(1);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The cloud rejected the key. Polling continues at the default
    /// period until a cycle succeeds again.
    AuthFailed,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct PollerHandle {
    wake: Arc<Notify>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ControllerInner {
    config: SyncConfig,
    clock: SharedClock,
    engine: SyncEngine<CloudClient>,
    local: LocalPoller,
    connection_state: watch::Sender<ConnectionState>,
    /// Wakes the scheduler for an out-of-schedule cycle.
    refresh_wake: Notify,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    /// Child token for the current connection, cancelled on disconnect,
    /// replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    pollers: Mutex<HashMap<String, PollerHandle>>,
}

impl Controller {
    /// Create a controller. Does NOT connect -- call
    /// [`connect()`](Self::connect) to run the first cycle and start tasks.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SyncConfig, clock: SharedClock) -> Result<Self, CoreError> {
        let store = Arc::new(DeviceStore::new());
        let cloud =
            CloudClient::from_api_key(&config.base_url, &config.api_key, &config.cloud_transport())?;
        let engine = SyncEngine::new(cloud, Arc::clone(&store), &config, Arc::clone(&clock));
        let local = LocalPoller::new(&config.local, store, Arc::clone(&clock))?;

        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                clock,
                engine,
                local,
                connection_state,
                refresh_wake: Notify::new(),
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                pollers: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        self.inner.engine.store()
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.inner.clock)
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Run the initial cloud cycle, then spawn the command processor and,
    /// when `background` is set, the scheduler and local pollers.
    ///
    /// Any failure of the initial cycle is returned, auth failures included.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        // Fresh child token for this connection (supports reconnect).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        match self.inner.engine.run_cycle().await {
            Ok(report) => debug!(
                devices = report.devices,
                skipped = report.skipped,
                "initial cycle complete"
            ),
            Err(e) => {
                let state = if e.is_auth() {
                    ConnectionState::AuthFailed
                } else {
                    ConnectionState::Disconnected
                };
                self.inner.connection_state.send_replace(state);
                return Err(e);
            }
        }

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            let ctrl = self.clone();
            handles.push(tokio::spawn(command_processor_task(ctrl, rx, child.clone())));
        }

        if self.inner.config.background {
            let ctrl = self.clone();
            handles.push(tokio::spawn(scheduler_task(ctrl, child.clone())));

            if self.inner.config.local.enabled {
                let ctrl = self.clone();
                handles.push(tokio::spawn(local_supervisor_task(ctrl, child.clone())));
            }
        }
        drop(handles);

        self.inner.connection_state.send_replace(ConnectionState::Connected);
        info!(devices = self.store().len(), "connected");
        Ok(())
    }

    /// Cancel background tasks and wait for them to stop.
    pub async fn disconnect(&self) {
        // Cancel the child token only; the parent stays live for reconnect.
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        let pollers: Vec<PollerHandle> = self
            .inner
            .pollers
            .lock()
            .await
            .drain()
            .map(|(_, p)| p)
            .collect();
        for poller in pollers {
            poller.cancel.cancel();
            let _ = poller.handle.await;
        }

        // Recreate command channel so reconnects can spawn a fresh receiver.
        {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
            *self.inner.command_tx.lock().await = tx;
            *self.inner.command_rx.lock().await = Some(rx);
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Ask the scheduler for an out-of-schedule cycle. Throttled to one per
    /// `minimum_interval`; a throttled request waits for the regular timer.
    pub fn request_refresh(&self) {
        self.inner.refresh_wake.notify_one();
    }

    /// Run a throttled out-of-schedule cycle inline. `Ok(None)` if throttled.
    pub async fn refresh_now(&self) -> Result<Option<CycleReport>, CoreError> {
        self.inner.engine.run_forced_cycle().await
    }

    /// Read one device's local endpoint now.
    pub async fn refresh_local(&self, device_id: &str) -> Result<LocalSnapshot, CoreError> {
        self.inner.local.refresh(device_id).await
    }

    /// Read every device's local endpoint concurrently. Empty when local
    /// polling is disabled.
    pub async fn refresh_local_all(&self) -> Vec<(String, Result<LocalSnapshot, CoreError>)> {
        if !self.inner.config.local.enabled {
            return Vec::new();
        }
        let local = &self.inner.local;
        let reads = self.store().device_ids().into_iter().map(move |id| async move {
            let result = local.refresh(&id).await;
            (id, result)
        });
        join_all(reads).await
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command through the command processor.
    ///
    /// A successful cloud command requests a refresh.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if matches!(
            *self.inner.connection_state.borrow(),
            ConnectionState::Disconnected | ConnectionState::Connecting
        ) {
            return Err(CoreError::ControllerDisconnected);
        }
        // The receiver is only taken once the processor runs.
        if self.inner.command_rx.lock().await.is_some() {
            return Err(CoreError::ControllerDisconnected);
        }

        let is_local = cmd.is_local();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();

        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::ControllerDisconnected)?;

        let result = rx.await.map_err(|_| CoreError::ControllerDisconnected)?;
        if result.is_ok() && !is_local {
            self.request_refresh();
        }
        result
    }

    /// Write `keyword=value` to a device's local endpoint.
    pub async fn write_local(
        &self,
        device_id: &str,
        keyword: &str,
        value: impl Into<WriteValue>,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::WriteLocal {
            device_id: device_id.to_owned(),
            keyword: keyword.to_owned(),
            value: value.into(),
        })
        .await
    }

    /// Handle for one writable control of one device.
    pub fn control(&self, device_id: &str, name: &str) -> Result<ControlHandle, CoreError> {
        let spec = controls::lookup(name).ok_or_else(|| CoreError::ValidationFailed {
            message: format!("unknown control '{name}'"),
        })?;
        if self.store().get(device_id).is_none() {
            return Err(CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            });
        }
        Ok(ControlHandle::new(self.clone(), device_id.to_owned(), spec))
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, disconnect.
    ///
    /// Optimized for CLI: no scheduler and no local pollers, since we only
    /// need a single cycle.
    pub async fn oneshot<F, Fut, T>(config: SyncConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.background = false;

        let controller = Controller::new(cfg)?;
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Last quota seen on any cloud response.
    pub fn quota(&self) -> Option<QuotaSnapshot> {
        self.inner.engine.source().quota().snapshot()
    }

    /// Current scheduler period.
    pub fn current_interval(&self) -> Duration {
        self.inner.engine.current_interval()
    }

    // ── Local helpers ────────────────────────────────────────────

    async fn local_write(
        &self,
        device_id: &str,
        keyword: &str,
        value: &WriteValue,
    ) -> Result<(), CoreError> {
        match self.inner.local.write(device_id, keyword, value).await {
            Ok(()) => {
                self.kick_local(device_id).await;
                Ok(())
            }
            Err(e @ CoreError::LocalUnavailable { .. }) => {
                self.schedule_followup(device_id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh one device's local snapshot soon: wakes its poller if one
    /// runs, otherwise reads inline.
    async fn kick_local(&self, device_id: &str) {
        if let Some(poller) = self.inner.pollers.lock().await.get(device_id) {
            poller.wake.notify_one();
            return;
        }
        if let Err(e) = self.inner.local.refresh(device_id).await {
            debug!(device_id, error = %e, "local refresh after write failed");
        }
    }

    /// A write that timed out may have landed; read back shortly after.
    async fn schedule_followup(&self, device_id: &str) {
        let delay = self.inner.config.local.write_followup;
        let cancel = self.inner.cancel_child.lock().await.clone();
        let controller = self.clone();
        let device_id = device_id.to_owned();
        debug!(device_id = %device_id, delay_ms = delay.as_millis(), "follow-up local refresh scheduled");

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => controller.kick_local(&device_id).await,
            }
        });
    }

    /// Start pollers for new devices and stop those no longer paired.
    async fn sync_pollers(&self, parent: &CancellationToken) {
        let ids = self.store().device_ids();
        let mut pollers = self.inner.pollers.lock().await;

        pollers.retain(|id, poller| {
            let keep = ids.contains(id);
            if !keep {
                debug!(device_id = %id, "local poller stopped");
                poller.cancel.cancel();
            }
            keep
        });

        for id in ids {
            if let Entry::Vacant(slot) = pollers.entry(id) {
                let wake = Arc::new(Notify::new());
                let cancel = parent.child_token();
                let handle = tokio::spawn(local_poll_task(
                    self.clone(),
                    slot.key().clone(),
                    Arc::clone(&wake),
                    cancel.clone(),
                ));
                debug!(device_id = %slot.key(), "local poller started");
                slot.insert(PollerHandle {
                    wake,
                    cancel,
                    handle,
                });
            }
        }
    }

    fn after_cycle(&self, result: Result<Option<CycleReport>, CoreError>) {
        let state = &self.inner.connection_state;
        match result {
            Ok(Some(_)) => {
                if *state.borrow() == ConnectionState::AuthFailed {
                    info!("cloud access restored");
                    state.send_replace(ConnectionState::Connected);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_auth() => {
                warn!(error = %e, "cloud rejected credentials");
                state.send_replace(ConnectionState::AuthFailed);
            }
            Err(e) => warn!(error = %e, "cloud cycle failed"),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Cloud cycles on the adaptive period, plus throttled cycles on request.
/// Cycles run inline, so the next deadline is only set once one finishes.
async fn scheduler_task(controller: Controller, cancel: CancellationToken) {
    let engine = &controller.inner.engine;
    let mut deadline = Instant::now() + engine.current_interval();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep_until(deadline) => {
                let result = engine.run_cycle().await.map(Some);
                controller.after_cycle(result);
                deadline = Instant::now() + engine.current_interval();
            }
            () = controller.inner.refresh_wake.notified() => {
                let result = engine.run_forced_cycle().await;
                if !matches!(result, Ok(None)) {
                    deadline = Instant::now() + engine.current_interval();
                }
                controller.after_cycle(result);
            }
        }
    }
}

/// Keeps one local poller per device in the store.
async fn local_supervisor_task(controller: Controller, cancel: CancellationToken) {
    let mut rx = controller.store().subscribe();

    loop {
        controller.sync_pollers(&cancel).await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn local_poll_task(
    controller: Controller,
    device_id: String,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    let settings = &controller.inner.config.local;
    let mut interval = tokio::time::interval(settings.poll_interval.max(MIN_LOCAL_PERIOD));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = wake.notified() => {}
            _ = interval.tick() => {}
        }

        match controller.inner.local.refresh(&device_id).await {
            Ok(_) => {
                if failures >= settings.recovery_log_threshold {
                    info!(device_id = %device_id, failures, "local endpoint recovered");
                }
                failures = 0;
            }
            // Nothing to poll until the cloud resolves an address.
            Err(CoreError::AddressUnknown { .. } | CoreError::DeviceNotFound { .. }) => {}
            Err(e) => {
                failures = failures.saturating_add(1);
                if failures == settings.recovery_log_threshold {
                    warn!(device_id = %device_id, failures, error = %e, "local endpoint unavailable");
                } else {
                    debug!(device_id = %device_id, failures, error = %e, "local poll failed");
                }
            }
        }
    }
}

/// Process commands one at a time, so writes never overlap.
async fn command_processor_task(
    controller: Controller,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&controller, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────

async fn route_command(controller: &Controller, cmd: Command) -> Result<CommandResult, CoreError> {
    let cloud = controller.inner.engine.source();
    debug!(command = cmd.name(), device_id = cmd.device_id(), "executing command");

    let body = match cmd {
        Command::SetIntensity { device_id, amps } => cloud.set_intensity(&device_id, amps).await?,
        Command::SetMinIntensity { device_id, amps } => {
            cloud.set_min_intensity(&device_id, amps).await?
        }
        Command::SetMaxIntensity { device_id, amps } => {
            cloud.set_max_intensity(&device_id, amps).await?
        }
        Command::SetMaxPower { device_id, watts } => cloud.set_max_power(&device_id, watts).await?,
        Command::SetDynamic { device_id, enabled } => cloud.set_dynamic(&device_id, enabled).await?,
        Command::SetLocked { device_id, locked } => cloud.set_locked(&device_id, locked).await?,
        Command::SetLogoLed { device_id, enabled } => {
            cloud.set_logo_led(&device_id, enabled).await?
        }
        Command::SetRfidReader { device_id, enabled } => {
            cloud.set_rfid_mode(&device_id, enabled).await?
        }
        Command::StartCharge { device_id } => cloud.start_charge(&device_id).await?,
        Command::PauseCharge { device_id } => cloud.pause_charge(&device_id).await?,
        Command::Reboot { device_id } => cloud.reboot(&device_id).await?,
        Command::TriggerUpdate { device_id } => cloud.trigger_update(&device_id).await?,
        Command::WriteLocal {
            device_id,
            keyword,
            value,
        } => {
            controller.local_write(&device_id, &keyword, &value).await?;
            return Ok(CommandResult::Ok);
        }
    };
    Ok(CommandResult::Response(body))
}
