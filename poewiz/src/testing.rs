//! In-memory switch used by the session and wizard tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandId, CommandResult, Record};
use crate::dispatch::Executor;
use crate::error::{Result, SessionError, TransportError, classify_device_error};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::session::Session;
use crate::settings::WizardSettings;
use crate::snapshot::MemorySnapshotStore;
use crate::topology::{PortId, PriorityLevel, SlotId};

/// Sink that keeps every event.
#[derive(Debug, Default)]
pub(crate) struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Session over `fake` with an in-memory snapshot store and default settings.
pub(crate) fn session(fake: FakeSwitch) -> (Session<FakeSwitch>, Arc<RecordingProgress>) {
    let sink = Arc::new(RecordingProgress::default());
    let session = Session::new(
        fake,
        "10.0.0.1",
        sink.clone(),
        Arc::new(MemorySnapshotStore::default()),
        WizardSettings::default(),
    );
    (session, sink)
}

/// What an attached device needs before it draws power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Need {
    None,
    Bt,
    FourPair,
    CapDetection,
    Priority,
    /// Reports a PoE conflict until the port is powered down once.
    Conflict,
    Never,
}

#[derive(Debug, Clone)]
pub(crate) struct FakePort {
    pub(crate) id: PortId,
    pub(crate) need: Need,
    pub(crate) poe_enabled: bool,
    pub(crate) priority: PriorityLevel,
    pub(crate) max_mw: u32,
    pub(crate) four_pair: bool,
    pub(crate) hdmi: bool,
    pub(crate) mdi: bool,
    pub(crate) ext_mdi: bool,
    pub(crate) capdet: bool,
    conflict_cleared: bool,
    pub(crate) mac: Option<String>,
    pub(crate) neighbor: Option<String>,
}

impl FakePort {
    fn new(id: PortId) -> Self {
        Self {
            id,
            need: Need::None,
            poe_enabled: true,
            priority: PriorityLevel::Low,
            max_mw: 30000,
            four_pair: false,
            hdmi: false,
            mdi: false,
            ext_mdi: false,
            capdet: false,
            conflict_cleared: false,
            mac: None,
            neighbor: None,
        }
    }

    fn in_conflict(&self) -> bool {
        self.need == Need::Conflict && !self.conflict_cleared
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeSlot {
    pub(crate) id: SlotId,
    pub(crate) poe: bool,
    pub(crate) initialized: bool,
    pub(crate) supports_bt: bool,
    pub(crate) bt: bool,
    pub(crate) fpoe: bool,
    pub(crate) ppoe: bool,
    pub(crate) class_detection: bool,
    pub(crate) allowed_max_mw: u32,
    pub(crate) ports: Vec<FakePort>,
}

impl FakeSlot {
    fn new(id: SlotId) -> Self {
        Self {
            id,
            poe: true,
            initialized: true,
            supports_bt: false,
            bt: false,
            fpoe: false,
            ppoe: false,
            class_detection: false,
            allowed_max_mw: 25000,
            ports: vec![],
        }
    }

    fn powered(&self, port: &FakePort) -> bool {
        if !self.initialized || !port.poe_enabled || port.in_conflict() {
            return false;
        }
        match port.need {
            Need::None | Need::Conflict => true,
            Need::Bt => self.bt,
            Need::FourPair => port.four_pair,
            Need::CapDetection => port.capdet,
            Need::Priority => port.priority >= PriorityLevel::High,
            Need::Never => false,
        }
    }

    fn draw_mw(&self, port: &FakePort) -> u32 {
        if self.powered(port) { 4200 } else { 0 }
    }
}

/// Scriptable switch implementing [`Executor`].
#[derive(Debug)]
pub(crate) struct FakeSwitch {
    connected: bool,
    pub(crate) unreachable: bool,
    pub(crate) bad_credentials: bool,
    pub(crate) chassis_poe: bool,
    pub(crate) slots: Vec<FakeSlot>,
    pub(crate) config: String,
    synchronized: bool,
    debug: HashMap<String, String>,
    counter_samples: u64,
    /// Round-trip added to every command.
    pub(crate) latency: Duration,
    log: Vec<String>,
    failures: Vec<(String, String)>,
    cancels: Vec<(String, CancellationToken)>,
}

fn rec<const N: usize>(pairs: [(&str, String); N]) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn on_off(flag: bool) -> String {
    if flag { "enable" } else { "disable" }.to_string()
}

impl FakeSwitch {
    /// One chassis, slot 1/1 with four ports:
    /// 1/1/1 powered camera, 1/1/2 spare device, 1/1/3 needing 802.3bt,
    /// 1/1/4 uplink to `core-sw`.
    pub(crate) fn sample() -> Self {
        let slot_id = SlotId::new(1, 1);
        let mut slot = FakeSlot::new(slot_id);
        slot.supports_bt = true;

        let mut camera = FakePort::new(slot_id.port(1));
        camera.mac = Some("00:11:22:33:44:55".to_string());
        let mut spare = FakePort::new(slot_id.port(2));
        spare.mac = Some("00:11:22:33:44:02".to_string());
        let mut bt = FakePort::new(slot_id.port(3));
        bt.need = Need::Bt;
        let mut uplink = FakePort::new(slot_id.port(4));
        uplink.neighbor = Some("core-sw".to_string());
        slot.ports = vec![camera, spare, bt, uplink];

        Self {
            connected: false,
            unreachable: false,
            bad_credentials: false,
            chassis_poe: true,
            slots: vec![slot],
            config: "! Chassis:\nsystem name lab-6860\n! Lanpower:\nlanpower slot 1/1 service start\n"
                .to_string(),
            synchronized: false,
            debug: HashMap::new(),
            counter_samples: 0,
            latency: Duration::ZERO,
            log: vec![],
            failures: vec![],
            cancels: vec![],
        }
    }

    /// Add a slot without PoE holding one port with a learned MAC.
    pub(crate) fn add_slot_without_poe(&mut self, id: SlotId) {
        let mut slot = FakeSlot::new(id);
        slot.poe = false;
        let mut port = FakePort::new(id.port(1));
        port.poe_enabled = false;
        port.mac = Some("00:aa:bb:cc:dd:01".to_string());
        slot.ports.push(port);
        self.slots.push(slot);
    }

    pub(crate) fn set_need(&mut self, port: PortId, need: Need) {
        if let Some(p) = self.port_mut(port) {
            p.need = need;
        }
    }

    pub(crate) fn set_max_power(&mut self, port: PortId, mw: u32) {
        if let Some(p) = self.port_mut(port) {
            p.max_mw = mw;
        }
    }

    pub(crate) fn set_slot_initialized(&mut self, slot: SlotId, on: bool) {
        if let Some(s) = self.slot_mut(slot) {
            s.initialized = on;
        }
    }

    /// Fail every command whose text or template is `command`.
    pub(crate) fn fail_on(&mut self, command: &str, message: &str) {
        self.failures
            .push((command.to_string(), message.to_string()));
    }

    /// Cancel `token` while running `command`.
    pub(crate) fn cancel_on(&mut self, command: &str, token: CancellationToken) {
        self.cancels.push((command.to_string(), token));
    }

    /// Commands run so far, rendered.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.log.clone()
    }

    pub(crate) fn clear_log(&mut self) {
        self.log.clear();
    }

    fn slot(&self, id: SlotId) -> Option<&FakeSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut FakeSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    fn port_mut(&mut self, id: PortId) -> Option<&mut FakePort> {
        self.slot_mut(id.slot_id())?
            .ports
            .iter_mut()
            .find(|p| p.id == id)
    }

    fn ports(&self) -> impl Iterator<Item = (&FakeSlot, &FakePort)> {
        self.slots
            .iter()
            .flat_map(|s| s.ports.iter().map(move |p| (s, p)))
    }

    fn port_row(slot: &FakeSlot, port: &FakePort) -> Record {
        let up = slot.powered(port) || port.neighbor.is_some();
        rec([
            ("Chas/Slot/Port", port.id.to_string()),
            ("Admin Status", "enable".to_string()),
            ("Link Status", if up { "up" } else { "down" }.to_string()),
            ("Alias", format!("\"port {}\"", port.id.port)),
        ])
    }

    fn lanpower_row(slot: &FakeSlot, port: &FakePort) -> Record {
        let status = if !slot.initialized || !port.poe_enabled {
            "Off"
        } else if port.in_conflict() {
            "Bad!VoltInj"
        } else if slot.powered(port) {
            "Powered On"
        } else {
            "Searching"
        };
        rec([
            ("Port", port.id.port.to_string()),
            ("Maximum(mW)", port.max_mw.to_string()),
            ("Actual Used(mW)", slot.draw_mw(port).to_string()),
            ("Status", status.to_string()),
            ("Priority", port.priority.as_cli().to_string()),
            ("On/Off", if port.poe_enabled { "ON" } else { "OFF" }.to_string()),
            ("Class", if slot.powered(port) { "4" } else { "" }.to_string()),
        ])
    }

    fn config_row(slot: &FakeSlot, port: &FakePort) -> Record {
        let bt = if !slot.supports_bt {
            "NA".to_string()
        } else {
            on_off(slot.bt)
        };
        rec([
            ("Port", port.id.port.to_string()),
            ("4-Pair", on_off(port.four_pair)),
            ("Power Over HDMI", on_off(port.hdmi)),
            ("Capacitor Detection", on_off(port.capdet)),
            ("802.3bt", bt),
            ("LLDP Power Via MDI", on_off(port.mdi)),
            ("LLDP Ext Power Via MDI", on_off(port.ext_mdi)),
        ])
    }

    fn slot_status(slot: &FakeSlot) -> Record {
        let used: u32 = slot.ports.iter().map(|p| slot.draw_mw(p)).sum();
        rec([
            ("Chas/Slot", slot.id.to_string()),
            ("Max Watts", "780".to_string()),
            ("Actual Used Watts", (used / 1000).to_string()),
            ("Usage Threshold", "80".to_string()),
            ("PoE Status", if slot.initialized { "ON" } else { "OFF" }.to_string()),
            ("FPOE", on_off(slot.fpoe)),
            ("PPOE", on_off(slot.ppoe)),
            ("Class Detection", on_off(slot.class_detection)),
            ("8023BT Support", if slot.supports_bt { "yes" } else { "no" }.to_string()),
        ])
    }

    fn mac_rows(&self, only: Option<PortId>) -> Vec<Record> {
        self.ports()
            .filter(|(_, p)| only.is_none_or(|id| id == p.id))
            .filter_map(|(_, p)| {
                let mac = p.mac.clone()?;
                Some(rec([
                    ("Mac Address", mac),
                    ("Interface", p.id.to_string()),
                    ("Vlan", "1".to_string()),
                ]))
            })
            .collect()
    }

    fn neighbor_rows(&self, only: Option<PortId>) -> Vec<Record> {
        self.ports()
            .filter(|(_, p)| only.is_none_or(|id| id == p.id))
            .filter_map(|(_, p)| {
                let name = p.neighbor.clone()?;
                Some(rec([
                    ("Local Port", p.id.to_string()),
                    ("Chassis ID", "e8:e7:32:00:00:01".to_string()),
                    ("System Name", name),
                    ("Capabilities Enabled", "Bridge Router".to_string()),
                ]))
            })
            .collect()
    }

    fn require_slot(&self, command: &Command) -> Result<SlotId> {
        let text = command.params().first().map(String::as_str).unwrap_or("");
        let id: SlotId = text.parse()?;
        if self.slot(id).is_none() {
            return Err(SessionError::UnknownSlot(text.to_string()).into());
        }
        Ok(id)
    }

    fn port_param(command: &Command) -> Result<PortId> {
        let text = command.params().first().map(String::as_str).unwrap_or("");
        Ok(text.parse()?)
    }

    fn device_error(command: &Command, message: &str) -> crate::Error {
        classify_device_error(&command.render(), message).into()
    }

    fn query(&mut self, command: &Command) -> Result<CommandResult> {
        use CommandId::*;
        let records = CommandResult::Records;
        Ok(match command.id() {
            ShowMicrocode => records(vec![rec([
                ("Package", "Base".to_string()),
                ("Release", "8.9.221.R03".to_string()),
            ])]),
            ShowChassis => records(vec![rec([
                ("ID", "1".to_string()),
                ("Model Name", "OS6860E-P24".to_string()),
                ("Serial Number", "T0123456".to_string()),
                ("Role", "Master".to_string()),
            ])]),
            ShowHardwareInfo => records(vec![rec([
                ("ID", "1".to_string()),
                ("FPGA", "0.12".to_string()),
                ("CPLD", "0.5".to_string()),
            ])]),
            ShowCmm => records(vec![rec([
                ("ID", "1".to_string()),
                ("Model Name", "OS6860E-P24".to_string()),
            ])]),
            ShowSystem => CommandResult::Record(rec([
                ("Name", "lab-6860".to_string()),
                ("Location", "rack 4".to_string()),
                ("Contact", "netops".to_string()),
                ("Up Time", "12 days".to_string()),
            ])),
            ShowRunningDirectory => CommandResult::Record(rec([(
                "Synchronization Status",
                if self.synchronized {
                    "SYNCHRONIZED"
                } else {
                    "NOT SYNCHRONIZED"
                }
                .to_string(),
            )])),
            ShowConfiguration | ShowAaaConfiguration => CommandResult::Text(self.config.clone()),
            ShowIpInterface => records(vec![rec([
                ("Name", "mgmt".to_string()),
                ("IP Address", "10.0.0.1".to_string()),
                ("Subnet Mask", "255.255.255.0".to_string()),
                ("Device", "vlan 1".to_string()),
            ])]),
            ShowIpRoutes => records(vec![rec([
                ("Dest Address", "0.0.0.0/0".to_string()),
                ("Gateway Addr", "10.0.0.254".to_string()),
            ])]),
            ShowTemperature => records(vec![rec([
                ("Chassis/Device", "1/CMMA".to_string()),
                ("Current", "41".to_string()),
                ("Thresh", "60".to_string()),
                ("Danger", "68".to_string()),
                ("Status", "UNDER THRESHOLD".to_string()),
            ])]),
            ShowHealthConfig => {
                CommandResult::Record(rec([("CPU Threshold", "80".to_string())]))
            }
            ShowPortsList => records(
                self.ports()
                    .map(|(s, p)| Self::port_row(s, p))
                    .collect(),
            ),
            ShowPortStatus => {
                let id = Self::port_param(command)?;
                records(
                    self.ports()
                        .filter(|(_, p)| p.id == id)
                        .map(|(s, p)| Self::port_row(s, p))
                        .collect(),
                )
            }
            ShowLinkAgg | ShowBlockedPorts | ShowIpService => records(vec![]),
            ShowLldpLocalPorts => records(
                self.ports()
                    .map(|(_, p)| {
                        rec([
                            ("Local Port", p.id.to_string()),
                            (
                                "Port ID",
                                format!("{}{:03} (Locally assigned)", p.id.slot, p.id.port),
                            ),
                        ])
                    })
                    .collect(),
            ),
            ShowLldpRemote => records(self.neighbor_rows(None)),
            ShowPortLldpRemote => records(self.neighbor_rows(Some(Self::port_param(command)?))),
            ShowLldpInventory => {
                return Err(Self::device_error(
                    command,
                    "ERROR: LLDP MED inventory not supported",
                ));
            }
            ShowPowerSupplies => records(vec![rec([
                ("Chassis/PS", "1/PS-1".to_string()),
                ("Module Type", "OS6860-BPS-PS".to_string()),
                ("Type", "AC".to_string()),
                ("Status", "UP".to_string()),
                ("Power Provision", "920".to_string()),
            ])]),
            ShowMacLearning => records(self.mac_rows(None)),
            ShowPortMacLearning => records(self.mac_rows(Some(Self::port_param(command)?))),
            ShowInterfaceCounters => {
                self.counter_samples += 1;
                let busy = self.counter_samples;
                records(
                    self.ports()
                        .map(|(_, p)| {
                            let (rx, tx) = if p.id.port == 1 && p.id.slot == 1 {
                                (1000 * busy, 500 * busy)
                            } else {
                                (200, 100)
                            };
                            rec([
                                ("Port", p.id.to_string()),
                                ("InOctets", rx.to_string()),
                                ("OutOctets", tx.to_string()),
                            ])
                        })
                        .collect(),
                )
            }
            ShowChassisLanPowerStatus => {
                if !self.chassis_poe {
                    return Err(Self::device_error(command, "ERROR: lanpower not supported"));
                }
                records(vec![])
            }
            ShowSlotLanPowerStatus | ShowLanPower | ShowLanPowerConfig => {
                let id = self.require_slot(command)?;
                let Some(slot) = self.slot(id).filter(|s| s.poe) else {
                    return Err(Self::device_error(
                        command,
                        &format!("ERROR: Lanpower not supported on slot {id}"),
                    ));
                };
                match command.id() {
                    ShowSlotLanPowerStatus => records(vec![Self::slot_status(slot)]),
                    ShowLanPower => records(
                        slot.ports
                            .iter()
                            .map(|p| Self::lanpower_row(slot, p))
                            .collect(),
                    ),
                    _ => records(
                        slot.ports
                            .iter()
                            .map(|p| Self::config_row(slot, p))
                            .collect(),
                    ),
                }
            }
            ShowDebugLevel => {
                let app = command.params().first().cloned().unwrap_or_default();
                let level = self.debug.get(&app).cloned().unwrap_or("info".to_string());
                records(vec![rec([("Application", app), ("Level", level)])])
            }
            _ => CommandResult::Text(String::new()),
        })
    }

    fn mutate(&mut self, command: &Command) -> Result<()> {
        use CommandId::*;
        let id = command.id();
        match id {
            SetDebugLevel => {
                let params = command.params();
                self.debug.insert(params[0].clone(), params[1].clone());
            }
            WriteMemory => self.synchronized = true,
            PowerUpSlot | PowerDownSlot | Enable8023bt | Disable8023bt | FastPoeEnable
            | FastPoeDisable | PerpetualPoeEnable | PerpetualPoeDisable | ClassDetectionEnable
            | ClassDetectionDisable => {
                let slot_id = self.require_slot(command)?;
                let Some(slot) = self.slot_mut(slot_id) else {
                    return Ok(());
                };
                if matches!(id, Enable8023bt | Disable8023bt) && !slot.supports_bt {
                    return Err(Self::device_error(command, "ERROR: 802.3bt not supported"));
                }
                match id {
                    PowerUpSlot => slot.initialized = true,
                    PowerDownSlot => slot.initialized = false,
                    Enable8023bt => slot.bt = true,
                    Disable8023bt => slot.bt = false,
                    FastPoeEnable => slot.fpoe = true,
                    FastPoeDisable => slot.fpoe = false,
                    PerpetualPoeEnable => slot.ppoe = true,
                    PerpetualPoeDisable => slot.ppoe = false,
                    ClassDetectionEnable => slot.class_detection = true,
                    _ => slot.class_detection = false,
                }
            }
            SetMaxPower => {
                let port_id = Self::port_param(command)?;
                let mw: u32 = command.params()[1].parse().unwrap_or(0);
                let allowed = self
                    .slot(port_id.slot_id())
                    .map(|s| s.allowed_max_mw)
                    .unwrap_or(0);
                if mw == 0 {
                    return Err(Self::device_error(
                        command,
                        &format!("ERROR: Max power of port {port_id} can be set to 30000 mW"),
                    ));
                }
                if mw > allowed {
                    return Err(Self::device_error(
                        command,
                        &format!("ERROR: power not exceed {allowed} when 802.3bt is disabled"),
                    ));
                }
                if let Some(port) = self.port_mut(port_id) {
                    port.max_mw = mw;
                }
            }
            PowerUpPort | PowerDownPort | SetPortPriority | Power4Pair | Power2Pair
            | PowerOverHdmiEnable | PowerOverHdmiDisable | LldpPowerMdiEnable
            | LldpPowerMdiDisable | LldpExtPowerMdiEnable | LldpExtPowerMdiDisable
            | CapacitorDetectionEnable | CapacitorDetectionDisable => {
                let port_id = Self::port_param(command)?;
                let value = command.params().get(1).cloned().unwrap_or_default();
                let ceiling = self
                    .slot(port_id.slot_id())
                    .map(|s| s.allowed_max_mw)
                    .unwrap_or(0);
                let Some(port) = self.port_mut(port_id) else {
                    return Err(SessionError::UnknownPort(port_id.to_string()).into());
                };
                match id {
                    PowerUpPort => port.poe_enabled = true,
                    PowerDownPort => {
                        port.poe_enabled = false;
                        port.conflict_cleared = true;
                    }
                    SetPortPriority => port.priority = PriorityLevel::from_device(&value),
                    // Changing pair mode resets the port to the slot ceiling.
                    Power4Pair | Power2Pair => {
                        port.four_pair = id == Power4Pair;
                        port.max_mw = ceiling;
                    }
                    PowerOverHdmiEnable => port.hdmi = true,
                    PowerOverHdmiDisable => port.hdmi = false,
                    LldpPowerMdiEnable => port.mdi = true,
                    LldpPowerMdiDisable => port.mdi = false,
                    LldpExtPowerMdiEnable => port.ext_mdi = true,
                    LldpExtPowerMdiDisable => port.ext_mdi = false,
                    CapacitorDetectionEnable => port.capdet = true,
                    _ => port.capdet = false,
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Executor for FakeSwitch {
    async fn connect(&mut self) -> Result<()> {
        if self.unreachable {
            return Err(TransportError::ConnectionFailed {
                host: "10.0.0.1".to_string(),
                reason: "no route to host".to_string(),
            }
            .into());
        }
        if self.bad_credentials {
            return Err(TransportError::AuthenticationFailed {
                user: "admin".to_string(),
            }
            .into());
        }
        self.connected = true;
        Ok(())
    }

    async fn execute(&mut self, command: &Command) -> Result<CommandResult> {
        if !self.connected {
            return Err(SessionError::NotConnected.into());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let text = command.render();
        let template = command.id().template();
        self.log.push(text.clone());

        let matches = |key: &String| *key == text || key == template;
        for (_, token) in self.cancels.iter().filter(|(key, _)| matches(key)) {
            token.cancel();
        }
        if let Some((_, message)) = self.failures.iter().find(|(key, _)| matches(key)) {
            return Err(Self::device_error(command, message));
        }

        if command.id().is_query() {
            self.query(command)
        } else {
            self.mutate(command)?;
            Ok(CommandResult::Text(String::new()))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
