//! Connected switch session.
//!
//! A [`Session`] owns one switch's command executor, its topology model and
//! the progress tracker of whatever top-level operation is running. All
//! device interaction for the switch goes through it, one command at a
//! time. Callers must not run two operations on the same session at once.

mod builder;
mod scan;
mod traffic;

pub use builder::SessionBuilder;
pub use scan::ScanStep;
pub use traffic::{PortTraffic, TrafficControl, TrafficReport, TrafficStatus};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandId, CommandResult, Fields};
use crate::dispatch::Executor;
use crate::error::{Error, Result, SessionError};
use crate::poller::{Poller, WaitOutcome};
use crate::progress::{ProgressEvent, ProgressSink, ProgressTracker};
use crate::settings::WizardSettings;
use crate::snapshot::SnapshotStore;
use crate::topology::{
    DataKind, DebugLevel, PortId, PriorityLevel, SlotId, Switch, SwitchStatus, SyncStatus,
};

/// Progress units declared by [`Session::connect`].
pub const CONNECT_STEPS: u32 = 25;
/// Progress units declared by [`Session::refresh_switch`].
pub const REFRESH_STEPS: u32 = 21;

/// Debug applications of the PoE subsystem.
pub(crate) const LPNI: &str = "lpNi";
pub(crate) const LPCMM: &str = "lpCmm";

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    /// Stopped between two steps; the model holds every step before it.
    Cancelled,
}

/// Slot-wide PoE feature toggled by [`Session::set_perpetual_or_fast_poe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFeature {
    FastPoe,
    PerpetualPoe,
}

/// A switch session.
pub struct Session<E: Executor> {
    pub(crate) executor: E,
    pub(crate) switch: Switch,
    pub(crate) progress: ProgressTracker,
    pub(crate) snapshots: Arc<dyn SnapshotStore>,
    pub(crate) settings: WizardSettings,
    traffic: TrafficControl,
}

impl<E: Executor> Session<E> {
    pub fn new(
        executor: E,
        ip: impl Into<String>,
        sink: Arc<dyn ProgressSink>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: WizardSettings,
    ) -> Self {
        Self {
            executor,
            switch: Switch::new(ip),
            progress: ProgressTracker::new(sink),
            snapshots,
            settings,
            traffic: TrafficControl::default(),
        }
    }

    /// Current topology model.
    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn settings(&self) -> &WizardSettings {
        &self.settings
    }

    /// Handle to stop a running traffic analysis from another task.
    pub fn traffic(&self) -> TrafficControl {
        self.traffic.clone()
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn is_connected(&self) -> bool {
        self.executor.is_connected()
    }

    pub(crate) fn sink(&self) -> Arc<dyn ProgressSink> {
        self.progress.sink()
    }

    pub(crate) fn report(&self, event: ProgressEvent) {
        self.progress.sink().report(event);
    }

    pub(crate) fn poller(&self, cancel: &CancellationToken) -> Poller {
        Poller::new(self.progress.sink(), cancel.clone())
    }

    /// Track a connection-level failure on the model and tell the sink.
    fn note_failure(&mut self, e: &Error) {
        let status = if e.is_auth_failure() {
            SwitchStatus::LoginFail
        } else if e.is_connection_failure() {
            SwitchStatus::Unreachable
        } else {
            return;
        };
        self.switch.status = status;
        self.report(ProgressEvent::error(
            format!("Switch {}", self.switch.ip),
            e.to_string(),
        ));
    }

    /// Run one command.
    pub async fn execute(&mut self, command: &Command) -> Result<CommandResult> {
        match self.executor.execute(command).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Run `commands` and load every result into the model together.
    ///
    /// Nothing is applied unless every command succeeds and every result
    /// loads.
    pub(crate) async fn load_all(&mut self, commands: &[(Command, DataKind)]) -> Result<()> {
        let mut fetched = Vec::with_capacity(commands.len());
        for (command, kind) in commands {
            fetched.push((*kind, self.execute(command).await?));
        }
        self.apply(&fetched)
    }

    pub(crate) async fn load(&mut self, command: Command, kind: DataKind) -> Result<()> {
        self.load_all(&[(command, kind)]).await
    }

    /// Load results into a copy of the model and swap it in on success.
    pub(crate) fn apply(&mut self, results: &[(DataKind, CommandResult)]) -> Result<()> {
        let mut next = self.switch.clone();
        for (kind, data) in results {
            next.load(*kind, data)?;
        }
        self.switch = next;
        Ok(())
    }

    /// Log in and read the inventory, then scan.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let owner = self.progress.start(CONNECT_STEPS);
        let result = self.connect_steps(cancel).await;
        self.progress.finish(owner);
        result
    }

    async fn connect_steps(&mut self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let title = format!("Connecting to {}", self.switch.ip);
        info!("{title}");
        self.report(ProgressEvent::info(&title, "Logging in"));
        if let Err(e) = self.executor.connect().await {
            self.note_failure(&e);
            return Err(e);
        }
        self.switch.status = SwitchStatus::Reachable;
        self.progress.advance(1, &title, "Logged in");

        let inventory = [
            (CommandId::ShowMicrocode, DataKind::Microcode, "Reading firmware version"),
            (CommandId::ShowChassis, DataKind::Chassis, "Reading chassis"),
            (CommandId::ShowHardwareInfo, DataKind::HardwareInfo, "Reading hardware info"),
            (CommandId::ShowPortsList, DataKind::PortList, "Reading ports"),
        ];
        for (id, kind, message) in inventory {
            if cancel.is_cancelled() {
                return Ok(ScanOutcome::Cancelled);
            }
            self.load(Command::new(id), kind).await?;
            self.progress.advance(1, &title, message);
        }

        self.scan_switch(cancel).await
    }

    /// Scan, then re-read port status.
    pub async fn refresh_switch(&mut self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let owner = self.progress.start(REFRESH_STEPS);
        let result = async {
            if self.scan_switch(cancel).await? == ScanOutcome::Cancelled {
                return Ok(ScanOutcome::Cancelled);
            }
            let title = format!("Refreshing {}", self.switch.ip);
            self.load(Command::new(CommandId::ShowPortsList), DataKind::PortList)
                .await?;
            self.progress.advance(1, &title, "Port status");
            Ok(ScanOutcome::Completed)
        }
        .await;
        self.progress.finish(owner);
        result
    }

    /// Close every transport.
    pub async fn close(&mut self) -> Result<()> {
        info!("Closing session to {}", self.switch.ip);
        self.traffic.stop("session closed");
        self.executor.close().await
    }

    /// Re-read one port: slot lanpower, link status, MACs and LLDP.
    pub async fn refresh_port(&mut self, port: PortId) -> Result<()> {
        self.load_all(&[
            (
                Command::slot(CommandId::ShowLanPower, port.slot_id()),
                DataKind::LanPower(port.slot_id()),
            ),
            (
                Command::port(CommandId::ShowPortStatus, port),
                DataKind::PortList,
            ),
        ])
        .await?;

        let extras = [
            (CommandId::ShowPortMacLearning, DataKind::PortMacTable(port)),
            (CommandId::ShowPortLldpRemote, DataKind::PortLldpRemote(port)),
        ];
        for (id, kind) in extras {
            match self.load(Command::port(id, port), kind).await {
                Ok(()) => {}
                Err(e) if e.is_connection_failure() || e.is_auth_failure() => return Err(e),
                Err(e) => debug!("{} on {}: {}", id.template(), port, e),
            }
        }
        Ok(())
    }

    /// Re-read one slot: status, lanpower and port configuration.
    pub async fn refresh_slot(&mut self, slot: SlotId) -> Result<()> {
        self.load_all(&[
            (
                Command::slot(CommandId::ShowSlotLanPowerStatus, slot),
                DataKind::SlotStatus(slot),
            ),
            (
                Command::slot(CommandId::ShowLanPower, slot),
                DataKind::LanPower(slot),
            ),
            (
                Command::slot(CommandId::ShowLanPowerConfig, slot),
                DataKind::LanPowerConfig(slot),
            ),
        ])
        .await?;
        if let Some(slot) = self.switch.slot_mut(slot) {
            slot.update_poe_status();
        }
        Ok(())
    }

    /// Port is up and drawing power, as read now from the switch.
    pub(crate) async fn port_powered(&mut self, port: PortId) -> Result<bool> {
        self.refresh_port(port).await?;
        let min = self.settings.min_power_mw;
        Ok(self
            .switch
            .port(port)
            .is_some_and(|p| p.is_powered_up(min)))
    }

    async fn slot_power_is(&mut self, slot: SlotId, on: bool) -> Result<bool> {
        self.load(
            Command::slot(CommandId::ShowSlotLanPowerStatus, slot),
            DataKind::SlotStatus(slot),
        )
        .await?;
        Ok(self
            .switch
            .slot(slot)
            .is_some_and(|s| s.is_initialized == on))
    }

    /// Wait for a slot to report the requested power state.
    pub(crate) async fn wait_slot_power(
        &mut self,
        slot: SlotId,
        on: bool,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let label = format!("Waiting for slot {slot} to power {}", if on { "up" } else { "down" });
        let conv = self.settings.convergence(self.settings.slot_power_wait);
        self.poller(cancel)
            .wait_until(self, &label, conv, |s| Box::pin(s.slot_power_is(slot, on)))
            .await
    }

    /// Wait for a port to come up and draw power.
    pub(crate) async fn wait_port_up(
        &mut self,
        port: PortId,
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let label = format!("Waiting for port {port} to come up");
        let conv = self.settings.port_up(timeout);
        self.poller(cancel)
            .wait_until(self, &label, conv, |s| Box::pin(s.port_powered(port)))
            .await
    }

    /// Start or stop PoE on a slot and wait for it to settle.
    pub async fn power_slot(
        &mut self,
        slot: SlotId,
        on: bool,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        if self.switch.slot(slot).is_none() {
            return Err(SessionError::UnknownSlot(slot.to_string()).into());
        }
        let id = if on {
            CommandId::PowerUpSlot
        } else {
            CommandId::PowerDownSlot
        };
        self.execute(&Command::slot(id, slot)).await?;
        let outcome = self.wait_slot_power(slot, on, cancel).await?;
        if !outcome.is_converged() {
            warn!("Slot {slot} did not settle after {:?}", outcome.elapsed());
        }
        self.refresh_slot(slot).await?;
        Ok(outcome)
    }

    pub async fn change_port_priority(&mut self, port: PortId, level: PriorityLevel) -> Result<()> {
        self.require_port(port)?;
        self.execute(&Command::port_value(
            CommandId::SetPortPriority,
            port,
            level.as_cli(),
        ))
        .await?;
        self.refresh_port(port).await
    }

    /// Power the port down and up, then wait for it to come back.
    pub async fn reset_port(
        &mut self,
        port: PortId,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        self.require_port(port)?;
        self.power_cycle(port, cancel).await?;
        self.wait_port_up(port, self.settings.port_up_wait, cancel).await
    }

    pub(crate) async fn power_cycle(
        &mut self,
        port: PortId,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let pause = Duration::from_secs(self.settings.power_cycle_pause);
        self.execute(&Command::port(CommandId::PowerDownPort, port))
            .await?;
        let outcome = self
            .poller(cancel)
            .pause(&format!("Powering off port {port}"), pause)
            .await;
        if outcome.is_cancelled() {
            return Ok(outcome);
        }
        self.execute(&Command::port(CommandId::PowerUpPort, port))
            .await?;
        Ok(self
            .poller(cancel)
            .pause(&format!("Powering on port {port}"), pause)
            .await)
    }

    /// Toggle fast or perpetual PoE on a slot.
    pub async fn set_perpetual_or_fast_poe(
        &mut self,
        slot: SlotId,
        feature: SlotFeature,
        enable: bool,
    ) -> Result<()> {
        let state = self
            .switch
            .slot(slot)
            .ok_or_else(|| SessionError::UnknownSlot(slot.to_string()))?;
        if enable && !state.is_initialized {
            return Err(SessionError::Refused(format!(
                "slot {slot} is not initialized; power it up first"
            ))
            .into());
        }
        if enable && feature == SlotFeature::FastPoe && state.has_8023bt_enabled() {
            return Err(SessionError::Refused(format!(
                "fast PoE cannot be enabled while 802.3bt is enabled on slot {slot}"
            ))
            .into());
        }
        let id = match (feature, enable) {
            (SlotFeature::FastPoe, true) => CommandId::FastPoeEnable,
            (SlotFeature::FastPoe, false) => CommandId::FastPoeDisable,
            (SlotFeature::PerpetualPoe, true) => CommandId::PerpetualPoeEnable,
            (SlotFeature::PerpetualPoe, false) => CommandId::PerpetualPoeDisable,
        };
        self.execute(&Command::slot(id, slot)).await?;
        self.refresh_slot(slot).await
    }

    /// Save the running configuration and wait for the flash copy to sync.
    pub async fn write_memory(&mut self, cancel: &CancellationToken) -> Result<WaitOutcome> {
        let title = format!("Saving configuration on {}", self.switch.ip);
        self.execute(&Command::new(CommandId::WriteMemory)).await?;
        let poller = self.poller(cancel);
        let outcome = poller.pause(&title, Duration::from_secs(20)).await;
        if outcome.is_cancelled() {
            return Ok(outcome);
        }
        let conv = self.settings.convergence(20);
        let outcome = poller
            .wait_until(self, &title, conv, |s| Box::pin(s.is_synchronized()))
            .await?;
        if !outcome.is_converged() {
            self.report(ProgressEvent::warning(
                &title,
                "Configuration is not synchronized yet",
            ));
        }
        Ok(outcome)
    }

    async fn is_synchronized(&mut self) -> Result<bool> {
        self.load(
            Command::new(CommandId::ShowRunningDirectory),
            DataKind::RunningDirectory,
        )
        .await?;
        Ok(self.switch.sync_status == SyncStatus::Synchronized)
    }

    /// Read the swlog level of one application.
    pub(crate) async fn read_debug_level(&mut self, app: &str) -> Result<DebugLevel> {
        let data = self
            .execute(&Command::with_params(CommandId::ShowDebugLevel, [app]))
            .await?;
        Ok(data
            .record()
            .and_then(|rec| rec.field("Level").or_else(|| rec.values().last().map(String::as_str)))
            .map(DebugLevel::from_device)
            .unwrap_or(DebugLevel::Unknown))
    }

    pub(crate) async fn read_debug_levels(&mut self) -> Result<()> {
        let lpni = self.read_debug_level(LPNI).await?;
        let lpcmm = self.read_debug_level(LPCMM).await?;
        self.switch.debug.lpni = lpni;
        self.switch.debug.lpcmm = lpcmm;
        Ok(())
    }

    async fn debug_level_is(&mut self, level: DebugLevel) -> Result<bool> {
        self.read_debug_levels().await?;
        Ok(self.switch.debug.lpni == level && self.switch.debug.lpcmm == level)
    }

    /// Set the PoE debug level and wait until the switch reports it.
    pub async fn set_debug_level(
        &mut self,
        level: DebugLevel,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        for app in [LPNI, LPCMM] {
            self.execute(&Command::with_params(
                CommandId::SetDebugLevel,
                [app, level.as_cli()],
            ))
            .await?;
        }
        let label = format!("Setting PoE debug level to {}", level.as_cli());
        let conv = self.settings.convergence(self.settings.debug_level_wait);
        self.poller(cancel)
            .wait_until(self, &label, conv, |s| Box::pin(s.debug_level_is(level)))
            .await
    }

    fn require_port(&self, port: PortId) -> Result<()> {
        match self.switch.port(port) {
            Some(_) => Ok(()),
            None => Err(SessionError::UnknownPort(port.to_string()).into()),
        }
    }
}
