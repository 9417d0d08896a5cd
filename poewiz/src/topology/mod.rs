//! Switch topology model.
//!
//! `Switch → Chassis → Slot → Port`, refreshed in place by the scan
//! pipeline through the [`DataKind`] loaders in [`load`].

mod ids;
pub mod load;

pub use ids::{PortId, SlotId};
pub use load::DataKind;

use serde::{Deserialize, Serialize};

/// Default minimum power draw (mW) for a port to count as powered.
pub const MIN_POWER_CONSUMPTION_MW: f64 = 300.0;

/// Maximum number of MAC addresses kept per port.
pub const MAX_MACS_PER_PORT: usize = 52;

/// Reachability of the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwitchStatus {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
    LoginFail,
}

/// Running/certified configuration synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    Unknown,
    Synchronized,
    NotSynchronized,
}

impl SyncStatus {
    pub fn from_device(value: &str) -> Self {
        let value = value.trim().to_uppercase();
        if value.contains("NOT") {
            SyncStatus::NotSynchronized
        } else if value.contains("SYNCHRONIZED") {
            SyncStatus::Synchronized
        } else {
            SyncStatus::Unknown
        }
    }
}

/// Link state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PortStatus {
    #[default]
    Unknown,
    Up,
    Down,
    Blocked,
}

impl PortStatus {
    pub fn from_device(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "up" => PortStatus::Up,
            "down" => PortStatus::Down,
            _ => PortStatus::Unknown,
        }
    }
}

/// PoE state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoeStatus {
    On,
    Off,
    Searching,
    Fault,
    Deny,
    Conflict,
    PoweredOff,
    Test,
    Delayed,
    #[default]
    NoPoe,
}

impl PoeStatus {
    pub fn from_device(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "powered on" | "on" => PoeStatus::On,
            "powered off" => PoeStatus::PoweredOff,
            "off" | "disabled" => PoeStatus::Off,
            "searching" => PoeStatus::Searching,
            "fault" => PoeStatus::Fault,
            "deny" => PoeStatus::Deny,
            "test" => PoeStatus::Test,
            "delayed" => PoeStatus::Delayed,
            v if v.contains("conflict") || v.contains("voltinj") => PoeStatus::Conflict,
            _ => PoeStatus::NoPoe,
        }
    }

    /// States the remediation wizard treats as healthy.
    pub fn is_ok(&self) -> bool {
        !matches!(self, PoeStatus::Fault | PoeStatus::Deny | PoeStatus::Searching)
    }
}

/// Power budget state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlotPoeStatus {
    UnderThreshold,
    NearThreshold,
    Critical,
    Off,
    #[default]
    NotSupported,
}

/// PoE priority of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PriorityLevel {
    #[default]
    Low,
    High,
    Critical,
}

impl PriorityLevel {
    pub fn from_device(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => PriorityLevel::High,
            "critical" => PriorityLevel::Critical,
            _ => PriorityLevel::Low,
        }
    }

    /// Keyword used by the CLI.
    pub fn as_cli(&self) -> &'static str {
        match self {
            PriorityLevel::Low => "low",
            PriorityLevel::High => "high",
            PriorityLevel::Critical => "critical",
        }
    }
}

/// Tri-state feature setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigType {
    Disable,
    Enable,
    #[default]
    Unavailable,
}

impl ConfigType {
    pub fn from_device(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "enable" | "enabled" | "on" | "yes" => ConfigType::Enable,
            "disable" | "disabled" | "off" | "no" => ConfigType::Disable,
            _ => ConfigType::Unavailable,
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self == ConfigType::Enable
    }
}

/// swlog level of an application on the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugLevel {
    Off,
    Alarm,
    Error,
    Alert,
    Warning,
    Info,
    Debug1,
    Debug2,
    Debug3,
    #[default]
    Unknown,
    Invalid,
}

impl DebugLevel {
    pub fn from_device(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "off" => DebugLevel::Off,
            "alarm" => DebugLevel::Alarm,
            "error" => DebugLevel::Error,
            "alert" => DebugLevel::Alert,
            "warning" => DebugLevel::Warning,
            "info" => DebugLevel::Info,
            "debug1" => DebugLevel::Debug1,
            "debug2" => DebugLevel::Debug2,
            "debug3" => DebugLevel::Debug3,
            _ => DebugLevel::Unknown,
        }
    }

    pub fn as_cli(&self) -> &'static str {
        match self {
            DebugLevel::Off => "off",
            DebugLevel::Alarm => "alarm",
            DebugLevel::Error => "error",
            DebugLevel::Alert => "alert",
            DebugLevel::Warning => "warning",
            DebugLevel::Info => "info",
            DebugLevel::Debug1 => "debug1",
            DebugLevel::Debug2 => "debug2",
            DebugLevel::Debug3 => "debug3",
            DebugLevel::Unknown | DebugLevel::Invalid => "info",
        }
    }
}

/// Debug levels of the two PoE applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebugLevels {
    /// `lpNi`, the per-NI PoE application.
    pub lpni: DebugLevel,
    /// `lpCmm`, the chassis-level PoE application.
    pub lpcmm: DebugLevel,
}

/// Nominal power (W) of an IEEE PoE class.
pub fn power_class_watts(class: u8) -> Option<&'static str> {
    match class {
        0 => Some("15.4"),
        1 => Some("4"),
        2 => Some("7"),
        3 => Some("15.4"),
        4 => Some("30"),
        5 => Some("45"),
        6 => Some("60"),
        7 => Some("75"),
        8 => Some("90-100"),
        _ => None,
    }
}

/// IP interface on the switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub name: String,
    pub ip: String,
    pub mask: String,
    pub device: String,
}

/// LLDP neighbour seen on a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LldpNeighbor {
    pub system_name: String,
    pub description: String,
    pub port_description: String,
    pub capabilities: String,
    pub mac: String,
    pub ip: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
}

impl LldpNeighbor {
    /// The neighbour advertises switching or routing.
    pub fn is_network_device(&self) -> bool {
        let caps = self.capabilities.to_lowercase();
        caps.contains("bridge") || caps.contains("router")
    }
}

/// Power supply unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSupply {
    pub id: String,
    pub model: String,
    pub kind: String,
    pub status: String,
    pub watts: String,
}

/// Chassis temperature summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f64,
    pub threshold: f64,
    pub danger: f64,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub alias: String,
    pub admin_enabled: bool,
    pub status: PortStatus,

    pub poe: PoeStatus,
    /// PoE administratively enabled on the port.
    pub poe_enabled: bool,
    /// Measured draw in watts.
    pub power: f64,
    /// Configured ceiling in watts.
    pub max_power: f64,
    pub priority: PriorityLevel,
    pub class: String,
    pub is_4pair: bool,
    pub power_over_hdmi: bool,
    pub lldp_power_mdi: bool,
    pub lldp_ext_power_mdi: bool,
    pub capacitor_detection: bool,
    pub protocol_8023bt: ConfigType,

    pub link_agg: Option<String>,
    pub blocked: bool,
    pub lldp_local_id: Option<String>,
    pub neighbors: Vec<LldpNeighbor>,
    pub macs: Vec<String>,
}

impl Port {
    pub fn new(id: PortId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Port links this switch to other network gear rather than an end device.
    pub fn is_uplink(&self) -> bool {
        self.link_agg.is_some() || self.neighbors.iter().any(LldpNeighbor::is_network_device)
    }

    /// Link up and drawing at least `min_power_mw`.
    pub fn is_powered_up(&self, min_power_mw: f64) -> bool {
        self.status == PortStatus::Up
            && self.poe == PoeStatus::On
            && self.power * 1000.0 > min_power_mw
    }

    /// One-line status used in wizard reports.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Port {}: {:?}, PoE {:?}, {:.1} W",
            self.id, self.status, self.poe, self.power
        );
        if let Some(mac) = self.macs.first() {
            text.push_str(&format!(", MAC {mac}"));
        }
        if let Some(name) = self.neighbors.first().map(|n| &n.system_name) {
            if !name.is_empty() {
                text.push_str(&format!(", device {name}"));
            }
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub supports_poe: bool,
    pub is_initialized: bool,
    pub poe_status: SlotPoeStatus,
    /// Power budget in watts.
    pub budget: f64,
    /// Power in use in watts.
    pub power: f64,
    /// Usage threshold in percent.
    pub threshold: f64,
    pub fast_poe: ConfigType,
    pub perpetual_poe: ConfigType,
    pub class_detection: ConfigType,
    pub supports_8023bt: bool,
    pub ports: Vec<Port>,
}

impl Slot {
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            supports_poe: true,
            is_initialized: false,
            poe_status: SlotPoeStatus::NotSupported,
            budget: 0.0,
            power: 0.0,
            threshold: 80.0,
            fast_poe: ConfigType::Unavailable,
            perpetual_poe: ConfigType::Unavailable,
            class_detection: ConfigType::Unavailable,
            supports_8023bt: false,
            ports: vec![],
        }
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.id == id)
    }

    /// Port, created in order if missing.
    pub fn port_entry(&mut self, id: PortId) -> &mut Port {
        let index = match self.ports.iter().position(|p| p.id == id) {
            Some(index) => index,
            None => {
                let index = self.ports.partition_point(|p| p.id < id);
                self.ports.insert(index, Port::new(id));
                index
            }
        };
        &mut self.ports[index]
    }

    /// Remaining budget in watts.
    pub fn remaining_power(&self) -> f64 {
        self.budget - self.power
    }

    /// Any port on the slot already runs 802.3bt.
    pub fn has_8023bt_enabled(&self) -> bool {
        self.ports
            .iter()
            .any(|p| p.protocol_8023bt == ConfigType::Enable)
    }

    /// Recompute the budget state from the current figures.
    pub fn update_poe_status(&mut self) {
        self.poe_status = if !self.supports_poe {
            SlotPoeStatus::NotSupported
        } else if !self.is_initialized {
            SlotPoeStatus::Off
        } else if self.budget > 0.0 && self.power >= self.budget {
            SlotPoeStatus::Critical
        } else if self.budget > 0.0 && self.power >= self.budget * self.threshold / 100.0 {
            SlotPoeStatus::NearThreshold
        } else {
            SlotPoeStatus::UnderThreshold
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chassis {
    pub number: u8,
    pub model: String,
    pub serial_number: String,
    pub is_master: bool,
    pub supports_poe: bool,
    pub budget: f64,
    pub power: f64,
    pub fpga: String,
    pub cpld: String,
    pub temperature: Option<Temperature>,
    pub power_supplies: Vec<PowerSupply>,
    pub slots: Vec<Slot>,
}

impl Chassis {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            model: String::new(),
            serial_number: String::new(),
            is_master: false,
            supports_poe: true,
            budget: 0.0,
            power: 0.0,
            fpga: String::new(),
            cpld: String::new(),
            temperature: None,
            power_supplies: vec![],
            slots: vec![],
        }
    }

    /// Slot, created in order if missing.
    pub fn slot_entry(&mut self, slot: u8) -> &mut Slot {
        let id = SlotId::new(self.number, slot);
        let index = match self.slots.iter().position(|s| s.id == id) {
            Some(index) => index,
            None => {
                let index = self.slots.partition_point(|s| s.id < id);
                self.slots.insert(index, Slot::new(id));
                index
            }
        };
        &mut self.slots[index]
    }

    /// Sum slot budgets and draw.
    pub fn update_power(&mut self) {
        self.budget = self.slots.iter().map(|s| s.budget).sum();
        self.power = self.slots.iter().map(|s| s.power).sum();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub ip: String,
    pub name: String,
    pub model: String,
    pub serial_number: String,
    pub version: String,
    pub location: String,
    pub contact: String,
    pub up_time: String,
    pub status: SwitchStatus,
    pub sync_status: SyncStatus,
    pub supports_poe: bool,
    pub netmask: String,
    pub default_gateway: String,
    pub vlans: Vec<Vlan>,
    /// CPU health threshold in percent.
    pub cpu_threshold: Option<f64>,
    pub debug: DebugLevels,
    pub config_snapshot: String,
    pub config_changes: Option<String>,
    pub chassis: Vec<Chassis>,
}

impl Switch {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn chassis(&self, number: u8) -> Option<&Chassis> {
        self.chassis.iter().find(|c| c.number == number)
    }

    pub fn chassis_mut(&mut self, number: u8) -> Option<&mut Chassis> {
        self.chassis.iter_mut().find(|c| c.number == number)
    }

    /// Chassis, created in order if missing.
    pub fn chassis_entry(&mut self, number: u8) -> &mut Chassis {
        let index = match self.chassis.iter().position(|c| c.number == number) {
            Some(index) => index,
            None => {
                let index = self.chassis.partition_point(|c| c.number < number);
                self.chassis.insert(index, Chassis::new(number));
                index
            }
        };
        &mut self.chassis[index]
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.chassis(id.chassis)?.slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.chassis_mut(id.chassis)?
            .slots
            .iter_mut()
            .find(|s| s.id == id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.slot(id.slot_id())?.port(id)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.slot_mut(id.slot_id())?.port_mut(id)
    }

    /// Port, creating chassis and slot on the way if needed.
    pub fn port_entry(&mut self, id: PortId) -> &mut Port {
        self.chassis_entry(id.chassis)
            .slot_entry(id.slot)
            .port_entry(id)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.chassis.iter().flat_map(|c| c.slots.iter())
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.slots().flat_map(|s| s.ports.iter())
    }

    pub fn ports_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.chassis
            .iter_mut()
            .flat_map(|c| c.slots.iter_mut())
            .flat_map(|s| s.ports.iter_mut())
    }
}
