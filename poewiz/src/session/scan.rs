//! Topology scan pipeline.

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{ScanOutcome, Session};
use crate::command::{Command, CommandId};
use crate::dispatch::Executor;
use crate::error::Result;
use crate::progress::ProgressEvent;
use crate::snapshot::ConfigDiff;
use crate::topology::{DataKind, SlotId, Switch};

/// Progress units declared by a standalone scan.
pub const SCAN_STEPS: u32 = 20;

/// Scan steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    DebugLevels,
    Snapshot,
    SystemInfo,
    Cmm,
    Temperature,
    HealthThresholds,
    PortList,
    LinkAgg,
    BlockedPorts,
    LldpLocal,
    PowerSupplies,
    LanPower,
    MacAndLldp,
    SnapshotPersist,
}

impl ScanStep {
    pub const ALL: [ScanStep; 14] = [
        ScanStep::DebugLevels,
        ScanStep::Snapshot,
        ScanStep::SystemInfo,
        ScanStep::Cmm,
        ScanStep::Temperature,
        ScanStep::HealthThresholds,
        ScanStep::PortList,
        ScanStep::LinkAgg,
        ScanStep::BlockedPorts,
        ScanStep::LldpLocal,
        ScanStep::PowerSupplies,
        ScanStep::LanPower,
        ScanStep::MacAndLldp,
        ScanStep::SnapshotPersist,
    ];

    /// Progress units counted when the step completes.
    pub fn weight(&self) -> u32 {
        match self {
            ScanStep::DebugLevels | ScanStep::Snapshot => 2,
            ScanStep::LanPower | ScanStep::MacAndLldp => 3,
            _ => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanStep::DebugLevels => "Reading PoE debug levels",
            ScanStep::Snapshot => "Comparing configuration snapshot",
            ScanStep::SystemInfo => "Reading system information",
            ScanStep::Cmm => "Reading management modules",
            ScanStep::Temperature => "Reading temperature",
            ScanStep::HealthThresholds => "Reading health thresholds",
            ScanStep::PortList => "Reading ports",
            ScanStep::LinkAgg => "Reading link aggregation",
            ScanStep::BlockedPorts => "Reading blocked ports",
            ScanStep::LldpLocal => "Reading LLDP local ports",
            ScanStep::PowerSupplies => "Reading power supplies",
            ScanStep::LanPower => "Reading PoE status",
            ScanStep::MacAndLldp => "Reading MAC and LLDP tables",
            ScanStep::SnapshotPersist => "Saving configuration snapshot",
        }
    }

    /// Single-command steps: what to run and where to load it.
    fn simple(&self) -> Option<(CommandId, DataKind)> {
        Some(match self {
            ScanStep::Cmm => (CommandId::ShowCmm, DataKind::Cmm),
            ScanStep::Temperature => (CommandId::ShowTemperature, DataKind::Temperature),
            ScanStep::HealthThresholds => (CommandId::ShowHealthConfig, DataKind::HealthConfig),
            ScanStep::PortList => (CommandId::ShowPortsList, DataKind::PortList),
            ScanStep::LinkAgg => (CommandId::ShowLinkAgg, DataKind::LinkAgg),
            ScanStep::BlockedPorts => (CommandId::ShowBlockedPorts, DataKind::BlockedPorts),
            ScanStep::LldpLocal => (CommandId::ShowLldpLocalPorts, DataKind::LldpLocal),
            ScanStep::PowerSupplies => (CommandId::ShowPowerSupplies, DataKind::PowerSupplies),
            _ => return None,
        })
    }
}

impl<E: Executor> Session<E> {
    /// Refresh the whole topology model.
    ///
    /// Cancellation is checked before every step. A step either applies all
    /// of its data or none of it.
    pub async fn scan_switch(&mut self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let owner = self.progress.start(SCAN_STEPS);
        let result = self.scan_steps(cancel).await;
        self.progress.finish(owner);
        result
    }

    async fn scan_steps(&mut self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let title = format!("Scanning {}", self.switch.ip);
        for step in ScanStep::ALL {
            if cancel.is_cancelled() {
                info!("Scan of {} cancelled before {:?}", self.switch.ip, step);
                self.report(ProgressEvent::warning(&title, "Scan cancelled"));
                return Ok(ScanOutcome::Cancelled);
            }
            match self.run_scan_step(step).await {
                Ok(()) => {}
                Err(e) if e.is_not_supported() => {
                    warn!("{}: {}", step.label(), e);
                    self.report(ProgressEvent::warning(step.label(), e.to_string()));
                }
                Err(e) => {
                    error!("Scan of {} failed at {:?}: {}", self.switch.ip, step, e);
                    self.report(ProgressEvent::error(step.label(), e.to_string()));
                    return Err(e);
                }
            }
            self.progress.advance(step.weight(), &title, step.label());
        }
        Ok(ScanOutcome::Completed)
    }

    async fn run_scan_step(&mut self, step: ScanStep) -> Result<()> {
        if let Some((id, kind)) = step.simple() {
            return self.load(Command::new(id), kind).await;
        }
        match step {
            ScanStep::DebugLevels => self.read_debug_levels().await,
            ScanStep::Snapshot => self.compare_snapshot().await,
            ScanStep::SystemInfo => {
                self.load_all(&[
                    (Command::new(CommandId::ShowSystem), DataKind::System),
                    (
                        Command::new(CommandId::ShowRunningDirectory),
                        DataKind::RunningDirectory,
                    ),
                    (Command::new(CommandId::ShowIpInterface), DataKind::IpInterfaces),
                    (Command::new(CommandId::ShowIpRoutes), DataKind::IpRoutes),
                ])
                .await
            }
            ScanStep::LanPower => self.scan_lanpower().await,
            ScanStep::MacAndLldp => {
                self.load_all(&[
                    (Command::new(CommandId::ShowMacLearning), DataKind::MacTable),
                    (Command::new(CommandId::ShowLldpRemote), DataKind::LldpRemote),
                ])
                .await?;
                match self
                    .load(Command::new(CommandId::ShowLldpInventory), DataKind::LldpInventory)
                    .await
                {
                    Err(e) if e.is_not_supported() => {
                        warn!("LLDP inventory unavailable on {}: {}", self.switch.ip, e);
                        Ok(())
                    }
                    other => other,
                }
            }
            ScanStep::SnapshotPersist => {
                if self.switch.config_snapshot.is_empty() {
                    return Ok(());
                }
                self.snapshots
                    .write(&self.switch.ip, &self.switch.config_snapshot)
            }
            _ => Ok(()),
        }
    }

    async fn compare_snapshot(&mut self) -> Result<()> {
        let current = self
            .execute(&Command::new(CommandId::ShowConfiguration))
            .await?
            .text()
            .to_string();
        let previous = self.snapshots.read(&self.switch.ip)?;

        let changes = previous
            .map(|prev| ConfigDiff::between(&prev, &current))
            .filter(|diff| !diff.is_empty())
            .map(|diff| diff.to_string());
        if let Some(changes) = &changes {
            info!("Configuration of {} changed since last scan", self.switch.ip);
            self.report(ProgressEvent::info(
                "Configuration changes",
                changes.clone(),
            ));
        }
        self.switch.config_snapshot = current;
        self.switch.config_changes = changes;
        Ok(())
    }

    /// Per chassis then per slot PoE status, degrading capability flags for
    /// hardware without PoE.
    async fn scan_lanpower(&mut self) -> Result<()> {
        let mut next = self.switch.clone();
        let chassis: Vec<u8> = next.chassis.iter().map(|c| c.number).collect();

        for number in chassis {
            let probe = Command::with_params(
                CommandId::ShowChassisLanPowerStatus,
                [number.to_string()],
            );
            let supported = match self.execute(&probe).await {
                Ok(_) => true,
                Err(e) if e.chassis_lacks_poe() => {
                    warn!("Chassis {number} of {} has no PoE: {}", next.ip, e);
                    false
                }
                Err(e) => return Err(e),
            };

            let Some(entry) = next.chassis_mut(number) else {
                continue;
            };
            entry.supports_poe = supported;
            let slots: Vec<SlotId> = entry.slots.iter().map(|s| s.id).collect();
            for id in slots {
                if supported {
                    self.scan_slot(&mut next, id).await?;
                } else if let Some(slot) = next.slot_mut(id) {
                    slot.supports_poe = false;
                }
                if let Some(slot) = next.slot_mut(id) {
                    slot.update_poe_status();
                }
            }
            if let Some(entry) = next.chassis_mut(number) {
                entry.update_power();
            }
        }

        next.supports_poe = next.chassis.iter().any(|c| c.supports_poe);
        self.switch = next;
        Ok(())
    }

    async fn scan_slot(&mut self, next: &mut Switch, id: SlotId) -> Result<()> {
        let commands = [
            (CommandId::ShowSlotLanPowerStatus, DataKind::SlotStatus(id)),
            (CommandId::ShowLanPower, DataKind::LanPower(id)),
            (CommandId::ShowLanPowerConfig, DataKind::LanPowerConfig(id)),
        ];
        let mut fetched = Vec::with_capacity(commands.len());
        for (command, kind) in commands {
            match self.execute(&Command::slot(command, id)).await {
                Ok(data) => fetched.push((kind, data)),
                Err(e) if e.slot_lacks_poe() || e.is_not_supported() => {
                    warn!("Slot {id} has no PoE: {e}");
                    self.report(ProgressEvent::warning(
                        format!("Slot {id}"),
                        "PoE not supported",
                    ));
                    if let Some(slot) = next.slot_mut(id) {
                        slot.supports_poe = false;
                    }
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        for (kind, data) in &fetched {
            next.load(*kind, data)?;
        }
        if let Some(slot) = next.slot_mut(id) {
            slot.supports_poe = true;
        }
        Ok(())
    }
}
