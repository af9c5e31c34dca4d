//! Session orchestrator.
//!
//! One [`Session`] per printer host. All mutable state sits behind a single
//! `RwLock`; every push merge, simulator tick and command is one write-lock
//! critical section. Background work runs in at most four tasks (connect
//! loop, push pump, file poll, simulator tick), each owned by the session
//! and aborted before it is replaced.

use crate::activity::{ActivityLog, LogEntry};
use crate::error::SessionError;
use crate::policy::{Fallback, RetryPolicy};
use crate::simulation::{Simulator, TICK_INTERVAL};
use klipperdeck_client::{
    DiagnosticReport, LiveEvent, LiveSubscription, MoonrakerClient, PrinterHost, PrinterInfo,
    ServerInfo, TransportError,
};
use klipperdeck_core::{
    Axis, CommandError, ConnectionParams, ErrorKind, FileRecord, PortCorrection, PrinterCommand,
    PrinterProfile, Record, SessionState, Snapshot, gcode,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;

/// How often the file list is refreshed while connected. File changes are
/// not pushed.
pub const FILE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Tunables for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub profile: PrinterProfile,
    pub policy: RetryPolicy,
    /// Seed for the simulator's jitter. Random when unset.
    pub seed: Option<u64>,
}

/// A printer session. See the crate docs.
pub struct Session<H: PrinterHost = MoonrakerClient> {
    shared: Arc<Shared<H>>,
}

struct Shared<H> {
    host: H,
    params: ConnectionParams,
    options: SessionOptions,
    inner: RwLock<Inner>,
    tasks: Mutex<Tasks>,
}

struct Inner {
    state: SessionState,
    snapshot: Snapshot,
    files: Vec<FileRecord>,
    log: ActivityLog,
    attempts: u32,
    /// Present exactly while the session is simulated.
    simulator: Option<Simulator>,
    printer_state: Option<String>,
    klippy_version: Option<String>,
    /// Bumped whenever the live link is torn down, so a late push message
    /// from an old subscription is never merged.
    live_epoch: u64,
}

#[derive(Default)]
struct Tasks {
    connector: Option<JoinHandle<()>>,
    live: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    tick: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Connector,
    Live,
    Poll,
    Tick,
}

impl Tasks {
    fn slot(&mut self, slot: Slot) -> &mut Option<JoinHandle<()>> {
        match slot {
            Slot::Connector => &mut self.connector,
            Slot::Live => &mut self.live,
            Slot::Poll => &mut self.poll,
            Slot::Tick => &mut self.tick,
        }
    }
}

struct Established {
    server: ServerInfo,
    printer: PrinterInfo,
    status: Record,
    files: Vec<FileRecord>,
}

impl Session<MoonrakerClient> {
    /// A session against a real Moonraker host with default options.
    pub fn new(params: ConnectionParams) -> Self {
        Self::with_options(params, SessionOptions::default())
    }

    pub fn with_options(params: ConnectionParams, options: SessionOptions) -> Self {
        let host = MoonrakerClient::from_params(&params);
        Self::with_host(host, params, options)
    }
}

impl<H: PrinterHost> Session<H> {
    pub fn with_host(host: H, params: ConnectionParams, options: SessionOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                params,
                options,
                inner: RwLock::new(Inner {
                    state: SessionState::Disconnected,
                    snapshot: Snapshot::new(),
                    files: Vec::new(),
                    log: ActivityLog::new(),
                    attempts: 0,
                    simulator: None,
                    printer_state: None,
                    klippy_version: None,
                    live_epoch: 0,
                }),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.shared.params
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.shared.options.profile
    }

    pub fn host(&self) -> &H {
        &self.shared.host
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.read().await.state.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.shared.inner.read().await.snapshot.clone()
    }

    pub async fn files(&self) -> Vec<FileRecord> {
        self.shared.inner.read().await.files.clone()
    }

    /// Newest first.
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.shared.inner.read().await.log.to_vec()
    }

    /// Klipper's own state ("ready", "shutdown", ...), as last reported.
    pub async fn printer_state(&self) -> Option<String> {
        self.shared.inner.read().await.printer_state.clone()
    }

    pub async fn klippy_version(&self) -> Option<String> {
        self.shared.inner.read().await.klippy_version.clone()
    }

    pub async fn attempts(&self) -> u32 {
        self.shared.inner.read().await.attempts
    }

    /// Open the connection with retries and fallback. A no-op while an
    /// attempt is already in flight.
    ///
    /// Resolves when the connect loop ends: `Ok` once connected, otherwise
    /// the last failure (after the fallback, if any, has been entered).
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut inner = self.shared.inner.write().await;
            if inner.state.is_connecting() {
                tracing::debug!("Connect ignored, an attempt is in flight");
                return Ok(());
            }
            inner.state = SessionState::Connecting { attempt: 1 };
        }

        self.shared.stop_task(Slot::Connector).await;
        self.shared.stop_task(Slot::Tick).await;
        self.shared.stop_live().await;
        {
            let mut inner = self.shared.inner.write().await;
            inner.simulator = None;
            inner.live_epoch += 1;
        }

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let result = shared.run_connector().await;
            let _ = tx.send(result);
        });
        self.shared.put_task(Slot::Connector, handle);

        rx.await.unwrap_or(Err(SessionError::Cancelled))
    }

    /// Connect if the parameters ask for it.
    pub async fn auto_connect(&self) -> Result<(), SessionError> {
        if self.shared.params.auto_connect {
            self.connect().await
        } else {
            Ok(())
        }
    }

    /// Tear everything down: connect loop, push channel, file poll and
    /// simulation.
    pub async fn disconnect(&self) {
        self.shared.stop_task(Slot::Connector).await;
        self.shared.stop_live().await;
        self.shared.stop_task(Slot::Tick).await;

        let mut inner = self.shared.inner.write().await;
        inner.live_epoch += 1;
        inner.simulator = None;
        inner.attempts = 0;
        inner.state = SessionState::Disconnected;
        inner.log.info("Disconnected from Klipper");
        tracing::info!("Disconnected from {}", self.shared.host.describe());
    }

    /// Switch to the simulator. Any live link is closed first.
    pub async fn start_demo_mode(&self) {
        self.shared.stop_task(Slot::Connector).await;
        self.shared.begin_simulation().await;
    }

    /// Leave the simulator. Does nothing unless simulated.
    pub async fn stop_demo_mode(&self) {
        if !self.shared.inner.read().await.state.is_simulated() {
            return;
        }
        self.shared.stop_task(Slot::Tick).await;

        let mut inner = self.shared.inner.write().await;
        inner.simulator = None;
        inner.state = SessionState::Disconnected;
        inner.log.info("Demo mode stopped");
    }

    /// Probe the configured host and explain the result.
    pub async fn diagnose(&self) -> DiagnosticReport {
        let params = &self.shared.params;
        let report = klipperdeck_client::diagnose(&params.host, params.port).await;

        let mut inner = self.shared.inner.write().await;
        if report.is_healthy() {
            inner.log.info(format!(
                "Diagnostics: {}:{} is reachable",
                report.host, report.port
            ));
        } else {
            inner.log.error(format!(
                "Diagnostics: {}",
                report.error.as_deref().unwrap_or("host not healthy")
            ));
        }
        report
    }

    /// Run one command against the simulator or the host, whichever is
    /// active.
    pub async fn execute(&self, command: PrinterCommand) -> Result<(), SessionError> {
        let encoded = match gcode::encode(&self.shared.options.profile, &command) {
            Ok(encoded) => encoded,
            Err(err) => return Err(self.reject(err).await),
        };

        {
            let mut guard = self.shared.inner.write().await;
            let inner = &mut *guard;
            if let Some(simulator) = inner.simulator.as_mut() {
                simulator.apply(&command, &mut inner.snapshot);
                inner.log.simulated(command.to_string());
                return Ok(());
            }
            if !inner.state.is_connected() {
                inner.log.error(format!("Not connected, '{command}' was not sent"));
                return Err(SessionError::NotConnected);
            }
        }

        let result = self.shared.host.execute(encoded).await;
        let mut inner = self.shared.inner.write().await;
        match result {
            Ok(()) => {
                inner.log.info(command.to_string());
                Ok(())
            }
            Err(err) => {
                inner.log.error(format!("Command failed: {err}"));
                Err(err.into())
            }
        }
    }

    async fn reject(&self, err: CommandError) -> SessionError {
        self.shared.inner.write().await.log.error(err.to_string());
        err.into()
    }

    pub async fn send_gcode(&self, script: impl Into<String>) -> Result<(), SessionError> {
        self.execute(PrinterCommand::Raw {
            script: script.into(),
        })
        .await
    }

    pub async fn set_hotend_temperature(&self, target: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::SetHotendTemperature { target })
            .await
    }

    pub async fn set_bed_temperature(&self, target: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::SetBedTemperature { target })
            .await
    }

    pub async fn move_axis(&self, axis: Axis, distance: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::MoveAxis {
            axis,
            distance,
            feedrate: None,
        })
        .await
    }

    /// Home `axes`, or every axis when empty.
    pub async fn home(&self, axes: Vec<Axis>) -> Result<(), SessionError> {
        self.execute(PrinterCommand::Home { axes }).await
    }

    /// Positive extrudes, negative retracts.
    pub async fn extrude(&self, amount: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::Extrude {
            amount,
            feedrate: None,
        })
        .await
    }

    pub async fn set_fan_speed(&self, percent: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::SetFanSpeed { percent }).await
    }

    pub async fn start_print(&self, filename: impl Into<String>) -> Result<(), SessionError> {
        self.execute(PrinterCommand::StartPrint {
            filename: filename.into(),
        })
        .await
    }

    pub async fn pause_print(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::PausePrint).await
    }

    pub async fn resume_print(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::ResumePrint).await
    }

    pub async fn cancel_print(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::CancelPrint).await
    }

    pub async fn emergency_stop(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::EmergencyStop).await
    }

    pub async fn firmware_restart(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::FirmwareRestart).await
    }

    pub async fn bed_mesh_calibrate(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::BedMeshCalibrate).await
    }

    pub async fn load_bed_mesh(&self, profile: impl Into<String>) -> Result<(), SessionError> {
        self.execute(PrinterCommand::LoadBedMesh {
            profile: profile.into(),
        })
        .await
    }

    pub async fn save_bed_mesh(&self, profile: impl Into<String>) -> Result<(), SessionError> {
        self.execute(PrinterCommand::SaveBedMesh {
            profile: profile.into(),
        })
        .await
    }

    pub async fn probe_accuracy(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::ProbeAccuracy).await
    }

    pub async fn query_probe(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::QueryProbe).await
    }

    pub async fn pid_tune_hotend(&self, target: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::PidTuneHotend { target }).await
    }

    pub async fn pid_tune_bed(&self, target: f64) -> Result<(), SessionError> {
        self.execute(PrinterCommand::PidTuneBed { target }).await
    }

    pub async fn input_shaper_calibrate(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::InputShaperCalibrate).await
    }

    pub async fn save_config(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::SaveConfig).await
    }

    pub async fn start_sequence(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::StartSequence).await
    }

    pub async fn end_sequence(&self) -> Result<(), SessionError> {
        self.execute(PrinterCommand::EndSequence).await
    }

    /// Store a G-code file. A live upload is followed by a fresh file list.
    pub async fn upload_file(
        &self,
        filename: &str,
        contents: Vec<u8>,
    ) -> Result<(), SessionError> {
        if filename.trim().is_empty() {
            return Err(self.reject(CommandError::EmptyFilename).await);
        }

        {
            let mut guard = self.shared.inner.write().await;
            let inner = &mut *guard;
            if let Some(simulator) = inner.simulator.as_ref() {
                let record = simulator.upload(filename, contents.len() as u64);
                inner.files.insert(0, record);
                inner.log.simulated(format!("uploaded {filename}"));
                return Ok(());
            }
            if !inner.state.is_connected() {
                inner.log.error(format!("Not connected, {filename} was not uploaded"));
                return Err(SessionError::NotConnected);
            }
        }

        if let Err(err) = self
            .shared
            .host
            .upload(filename.to_string(), contents)
            .await
        {
            self.shared
                .inner
                .write()
                .await
                .log
                .error(format!("Upload of {filename} failed: {err}"));
            return Err(err.into());
        }

        let refreshed = self.shared.host.list_files().await;
        let mut inner = self.shared.inner.write().await;
        inner.log.info(format!("uploaded {filename}"));
        match refreshed {
            Ok(files) => inner.files = files,
            Err(err) => inner.log.error(format!("File list refresh failed: {err}")),
        }
        Ok(())
    }

    /// Re-read the file list from the host.
    pub async fn refresh_files(&self) -> Result<(), SessionError> {
        {
            let inner = self.shared.inner.read().await;
            if inner.state.is_simulated() {
                return Ok(());
            }
            if !inner.state.is_connected() {
                return Err(SessionError::NotConnected);
            }
        }
        let files = self.shared.host.list_files().await?;
        self.shared.inner.write().await.files = files;
        Ok(())
    }
}

impl<H: PrinterHost> Drop for Session<H> {
    fn drop(&mut self) {
        let mut tasks = self.shared.tasks();
        for slot in [Slot::Connector, Slot::Live, Slot::Poll, Slot::Tick] {
            if let Some(handle) = tasks.slot(slot).take() {
                handle.abort();
            }
        }
    }
}

impl<H: PrinterHost> Shared<H> {
    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_task(&self, slot: Slot, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks().slot(slot).replace(handle) {
            old.abort();
        }
    }

    /// Abort the task in `slot` and wait until it is gone.
    async fn stop_task(&self, slot: Slot) {
        let handle = self.tasks().slot(slot).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn stop_live(&self) {
        self.stop_task(Slot::Live).await;
        self.stop_task(Slot::Poll).await;
    }

    async fn run_connector(self: Arc<Self>) -> Result<(), SessionError> {
        let policy = self.options.policy;
        self.inner.write().await.attempts = 0;

        loop {
            let attempt = {
                let mut inner = self.inner.write().await;
                inner.attempts += 1;
                let attempt = inner.attempts;
                inner.state = SessionState::Connecting { attempt };
                inner.log.info(format!(
                    "Connection attempt {attempt}/{}",
                    policy.max_attempts
                ));
                inner
                    .log
                    .info(format!("Connecting to {}", self.host.describe()));
                attempt
            };
            tracing::info!(
                "Connecting to {} (attempt {}/{})",
                self.host.describe(),
                attempt,
                policy.max_attempts
            );

            let err = match self.establish().await {
                Ok(established) => {
                    self.install(established).await;
                    return Ok(());
                }
                Err(err) => err,
            };

            let retry = policy.allows_retry(attempt);
            {
                let mut inner = self.inner.write().await;
                inner.state = SessionState::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                inner.log.error(format!("Connection failed: {err}"));
                self.log_remediation(&mut inner.log, &err);

                if retry {
                    inner.log.info(format!(
                        "Retrying in {}s ({attempt}/{})",
                        policy.retry_delay.as_secs(),
                        policy.max_attempts
                    ));
                } else {
                    inner.log.info("Maximum connection attempts reached");
                    if policy.fallback == Fallback::Simulate {
                        inner.log.info("Switching to demo mode");
                    }
                }
            }

            if retry {
                tokio::time::sleep(policy.retry_delay).await;
                continue;
            }

            tracing::warn!("Giving up on {}: {}", self.host.describe(), err);
            if policy.fallback == Fallback::Simulate {
                tokio::time::sleep(policy.fallback_delay).await;
                self.begin_simulation().await;
            }
            return Err(err.into());
        }
    }

    async fn establish(&self) -> Result<Established, TransportError> {
        self.host.ping().await?;

        let (server, printer, status, files) = tokio::join!(
            self.host.server_info(),
            self.host.printer_info(),
            self.host.query_status(),
            self.host.list_files(),
        );
        let files = files.unwrap_or_else(|e| {
            tracing::warn!("File list unavailable: {}", e);
            Vec::new()
        });

        Ok(Established {
            server: server?,
            printer: printer?,
            status: status?,
            files,
        })
    }

    async fn install(self: &Arc<Self>, established: Established) {
        self.stop_live().await;

        let epoch = {
            let mut inner = self.inner.write().await;
            inner.snapshot = Snapshot::from_status(&established.status);
            inner.files = established.files;
            inner.printer_state = Some(
                established
                    .printer
                    .state
                    .clone()
                    .unwrap_or_else(|| "ready".to_string()),
            );
            inner.klippy_version = established.printer.software_version.clone();
            inner.state = SessionState::Connected;
            inner.attempts = 0;
            inner.live_epoch += 1;

            let version = inner
                .klippy_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            inner.log.info(format!("Connected to Klipper {version}"));
            if let Some(moonraker) = &established.server.moonraker_version {
                inner.log.info(format!("Moonraker {moonraker}"));
            }
            inner
                .log
                .info(format!("{} ready", self.options.profile.name));
            inner.live_epoch
        };
        tracing::info!("Connected to {}", self.host.describe());

        let subscription = self.host.subscribe_live();
        let shared = Arc::clone(self);
        self.put_task(
            Slot::Live,
            tokio::spawn(async move { shared.run_live(subscription, epoch).await }),
        );
        let shared = Arc::clone(self);
        self.put_task(
            Slot::Poll,
            tokio::spawn(async move { shared.run_poll().await }),
        );
    }

    fn log_remediation(&self, log: &mut ActivityLog, err: &TransportError) {
        if self.params.port_correction() == Some(PortCorrection::Ssh) {
            log.error("Port 22 is SSH, Moonraker listens on 7125");
            log.info("Change the port to 7125 in the connection settings");
        }
        if err.kind() == ErrorKind::Cors {
            log.error("The printer host refused this client (cross-origin)");
            log.info("Update cors_domains and trusted_clients in moonraker.conf");
            log.info("Run `klipperdeck diagnose` for a full report");
        }
    }

    async fn begin_simulation(self: &Arc<Self>) {
        self.stop_live().await;
        self.stop_task(Slot::Tick).await;

        {
            let profile = self.options.profile.clone();
            let simulator = match self.options.seed {
                Some(seed) => Simulator::seeded(profile, seed),
                None => Simulator::new(profile),
            };

            let simulating = format!("Simulating {}", simulator.profile().name);
            let mut inner = self.inner.write().await;
            inner.live_epoch += 1;
            inner.snapshot = Simulator::baseline_snapshot();
            inner.files = Simulator::baseline_files();
            inner.simulator = Some(simulator);
            inner.state = SessionState::Simulated;
            inner.printer_state = Some("ready".to_string());
            inner.log.info("Demo mode started");
            inner.log.info(simulating);
            inner
                .log
                .info("All controls work against the simulator");
        }
        tracing::info!("Simulation started");

        let shared = Arc::clone(self);
        self.put_task(
            Slot::Tick,
            tokio::spawn(async move { shared.run_tick().await }),
        );
    }

    async fn run_tick(&self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            match inner.simulator.as_mut() {
                Some(simulator) => simulator.tick(&mut inner.snapshot),
                None => break,
            }
        }
    }

    async fn run_poll(&self) {
        let mut interval = tokio::time::interval(FILE_POLL_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            match self.host.list_files().await {
                Ok(files) => {
                    let mut inner = self.inner.write().await;
                    if inner.state.is_connected() {
                        inner.files = files;
                    }
                }
                Err(e) => tracing::debug!("File poll failed: {}", e),
            }
        }
    }

    async fn run_live(&self, mut subscription: LiveSubscription, epoch: u64) {
        while let Some(event) = subscription.recv().await {
            let mut inner = self.inner.write().await;
            if inner.live_epoch != epoch {
                break;
            }
            match event {
                LiveEvent::Opened => tracing::debug!("Live updates flowing"),
                LiveEvent::Message(message) => {
                    if let Some(delta) = status_update(&message) {
                        inner.snapshot.merge(delta);
                    }
                }
                LiveEvent::Reconnecting { attempt, max } => {
                    inner.log.error(format!(
                        "Live connection lost, reconnecting ({attempt}/{max})"
                    ));
                }
                LiveEvent::Exhausted(err) => {
                    inner
                        .log
                        .error(format!("Live connection gave up: {err}"));
                    inner.state = SessionState::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    };
                    inner.live_epoch += 1;
                    if let Some(poll) = self.tasks().poll.take() {
                        poll.abort();
                    }
                    break;
                }
            }
        }
        subscription.shutdown().await;
    }
}

/// The delta carried by a `notify_status_update` push message.
fn status_update(message: &Value) -> Option<&Record> {
    if message.get("method")?.as_str()? != "notify_status_update" {
        return None;
    }
    message.get("params")?.get(0)?.as_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_update_shape() {
        let msg = json!({
            "jsonrpc": "2.0",
            "method": "notify_status_update",
            "params": [{"extruder": {"temperature": 205.0}}, 12.5],
        });
        assert!(status_update(&msg).unwrap().contains_key("extruder"));

        let other = json!({"method": "notify_gcode_response", "params": ["ok"]});
        assert!(status_update(&other).is_none());
        assert!(status_update(&json!({"method": "notify_status_update"})).is_none());
    }

    #[tokio::test]
    async fn commands_rejected_while_disconnected() {
        let session = Session::new(ConnectionParams::new("127.0.0.1", 7125));
        let err = session.set_bed_temperature(60.0).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert_eq!(session.logs().await.len(), 1);
    }

    #[tokio::test]
    async fn demo_mode_round_trip() {
        let session = Session::new(ConnectionParams::new("127.0.0.1", 7125));
        session.start_demo_mode().await;
        assert!(session.state().await.is_simulated());
        assert_eq!(session.files().await.len(), 4);

        session.set_fan_speed(50.0).await.unwrap();
        assert_eq!(session.snapshot().await.fan().unwrap().speed, Some(0.5));

        session.stop_demo_mode().await;
        assert_eq!(session.state().await, SessionState::Disconnected);
    }
}
