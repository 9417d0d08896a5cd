//! Switch command catalogue.
//!
//! Every operation the crate performs against a switch is one of the
//! [`CommandId`] variants. Each variant statically declares its CLI
//! template, the shape of its normalized response and the transport that
//! carries it, so the dispatcher never has to guess.

mod result;

pub use result::{CommandResult, Fields, Record};

use std::fmt;

use crate::topology::{PortId, SlotId};

/// Which transport carries a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// REST management API.
    Primary,
    /// SSH CLI session.
    Secondary,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Primary => write!(f, "rest"),
            Route::Secondary => write!(f, "ssh"),
        }
    }
}

/// Shape hint handed to the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Pass the text through untouched.
    Raw,

    /// Column table under a dashed separator, with `header_rows` header lines.
    Table { header_rows: usize },

    /// `key : value` / `key = value` block.
    Vertical,

    /// Vertical blocks, each introduced by a line matching `discriminator`.
    /// The first capture group is stored under the `ID` field.
    MultiTable { discriminator: &'static str },

    /// Blocks grouped under a header matching `group`; the first capture
    /// group is stored in every record of the block under `field`.
    Grouped {
        group: &'static str,
        field: &'static str,
    },
}

/// Closed set of switch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    // Inventory and system queries
    ShowMicrocode,
    ShowChassis,
    ShowHardwareInfo,
    ShowSystem,
    ShowRunningDirectory,
    ShowConfiguration,
    ShowIpInterface,
    ShowIpRoutes,
    ShowCmm,
    ShowTemperature,
    ShowHealthConfig,
    ShowPortsList,
    ShowPortStatus,
    ShowLinkAgg,
    ShowBlockedPorts,
    ShowLldpLocalPorts,
    ShowLldpRemote,
    ShowPortLldpRemote,
    ShowLldpInventory,
    ShowPowerSupplies,
    ShowMacLearning,
    ShowPortMacLearning,
    ShowInterfaceCounters,

    // PoE queries
    ShowChassisLanPowerStatus,
    ShowSlotLanPowerStatus,
    ShowLanPower,
    ShowLanPowerConfig,

    // Debug levels (SSH only)
    ShowDebugLevel,
    SetDebugLevel,

    // REST bootstrap (SSH only)
    ShowAaaConfiguration,
    ShowIpService,
    EnableHttpService,
    AaaDefaultLocal,
    AaaHttpLocal,

    // Configuration actions
    LldpSystemDescriptionEnable,
    LldpManagementAddressEnable,
    WriteMemory,

    // PoE actions
    PowerUpPort,
    PowerDownPort,
    PowerUpSlot,
    PowerDownSlot,
    SetPortPriority,
    SetMaxPower,
    Power4Pair,
    Power2Pair,
    PowerOverHdmiEnable,
    PowerOverHdmiDisable,
    LldpPowerMdiEnable,
    LldpPowerMdiDisable,
    LldpExtPowerMdiEnable,
    LldpExtPowerMdiDisable,
    CapacitorDetectionEnable,
    CapacitorDetectionDisable,
    Enable8023bt,
    Disable8023bt,
    FastPoeEnable,
    FastPoeDisable,
    PerpetualPoeEnable,
    PerpetualPoeDisable,
    ClassDetectionEnable,
    ClassDetectionDisable,
}

const CHASSIS_BLOCK: &str = r"(?i)^\s*(?:\w+\s+)?Chassis\s+ID\s+(\d+)";
const HW_BLOCK: &str = r"(?i)^\s*Chassis\s+(\d+)\s*$";
const LOCAL_PORT_GROUP: &str = r"(?i)Local\s+Port\s+(\d+/\d+(?:/\d+)?)\s*:";

impl CommandId {
    /// CLI template; `{0}`, `{1}` are replaced by the command parameters.
    pub fn template(&self) -> &'static str {
        use CommandId::*;
        match self {
            ShowMicrocode => "show microcode",
            ShowChassis => "show chassis",
            ShowHardwareInfo => "show hardware-info",
            ShowSystem => "show system",
            ShowRunningDirectory => "show running-directory",
            ShowConfiguration => "show configuration snapshot",
            ShowIpInterface => "show ip interface",
            ShowIpRoutes => "show ip routes",
            ShowCmm => "show cmm",
            ShowTemperature => "show temperature",
            ShowHealthConfig => "show health configuration",
            ShowPortsList => "show interfaces alias",
            ShowPortStatus => "show interfaces port {0} alias",
            ShowLinkAgg => "show linkagg port",
            ShowBlockedPorts => "show spantree ports blocking",
            ShowLldpLocalPorts => "show lldp local-port",
            ShowLldpRemote => "show lldp remote-system",
            ShowPortLldpRemote => "show lldp port {0} remote-system",
            ShowLldpInventory => "show lldp remote-system med inventory",
            ShowPowerSupplies => "show powersupply",
            ShowMacLearning => "show mac-learning",
            ShowPortMacLearning => "show mac-learning port {0}",
            ShowInterfaceCounters => "show interfaces counters",
            ShowChassisLanPowerStatus => "show lanpower chassis {0} status",
            ShowSlotLanPowerStatus => "show lanpower slot {0} status",
            ShowLanPower => "show lanpower slot {0}",
            ShowLanPowerConfig => "show lanpower slot {0} port-config",
            ShowDebugLevel => "show swlog appid {0}",
            SetDebugLevel => "swlog appid {0} subapp all level {1}",
            ShowAaaConfiguration => "show configuration snapshot aaa",
            ShowIpService => "show ip service",
            EnableHttpService => "ip service http admin-state enable",
            AaaDefaultLocal => "aaa authentication default local",
            AaaHttpLocal => "aaa authentication http local",
            LldpSystemDescriptionEnable => {
                "lldp nearest-bridge chassis tlv management port-description enable system-name enable system-description enable"
            }
            LldpManagementAddressEnable => {
                "lldp nearest-bridge chassis tlv management management-address enable"
            }
            WriteMemory => "write memory flash-synchro",
            PowerUpPort => "lanpower port {0} admin-state enable",
            PowerDownPort => "lanpower port {0} admin-state disable",
            PowerUpSlot => "lanpower slot {0} service start",
            PowerDownSlot => "lanpower slot {0} service stop",
            SetPortPriority => "lanpower port {0} priority {1}",
            SetMaxPower => "lanpower port {0} power {1}",
            Power4Pair => "lanpower port {0} 4pair enable",
            Power2Pair => "lanpower port {0} 4pair disable",
            PowerOverHdmiEnable => "lanpower port {0} power-over-hdmi enable",
            PowerOverHdmiDisable => "lanpower port {0} power-over-hdmi disable",
            LldpPowerMdiEnable => "lldp nearest-bridge port {0} tlv dot3 power-via-mdi enable",
            LldpPowerMdiDisable => "lldp nearest-bridge port {0} tlv dot3 power-via-mdi disable",
            LldpExtPowerMdiEnable => "lldp nearest-bridge port {0} tlv med ext-power-via-mdi enable",
            LldpExtPowerMdiDisable => {
                "lldp nearest-bridge port {0} tlv med ext-power-via-mdi disable"
            }
            CapacitorDetectionEnable => "lanpower port {0} capacitor-detection enable",
            CapacitorDetectionDisable => "lanpower port {0} capacitor-detection disable",
            Enable8023bt => "lanpower slot {0} 8023bt enable",
            Disable8023bt => "lanpower slot {0} 8023bt disable",
            FastPoeEnable => "lanpower slot {0} fpoe enable",
            FastPoeDisable => "lanpower slot {0} fpoe disable",
            PerpetualPoeEnable => "lanpower slot {0} ppoe enable",
            PerpetualPoeDisable => "lanpower slot {0} ppoe disable",
            ClassDetectionEnable => "lanpower slot {0} class-detection enable",
            ClassDetectionDisable => "lanpower slot {0} class-detection disable",
        }
    }

    /// Declared response shape.
    pub fn shape(&self) -> ResponseShape {
        use CommandId::*;
        use ResponseShape::*;
        match self {
            ShowMicrocode | ShowIpInterface | ShowIpRoutes | ShowTemperature | ShowLinkAgg
            | ShowBlockedPorts | ShowMacLearning | ShowPortMacLearning
            | ShowInterfaceCounters | ShowLanPower | ShowDebugLevel | ShowIpService => {
                Table { header_rows: 1 }
            }
            ShowPowerSupplies
            | ShowChassisLanPowerStatus
            | ShowSlotLanPowerStatus
            | ShowLanPowerConfig => Table { header_rows: 2 },
            ShowPortsList | ShowPortStatus => Table { header_rows: 3 },
            ShowSystem | ShowRunningDirectory | ShowHealthConfig => Vertical,
            ShowChassis | ShowCmm => MultiTable {
                discriminator: CHASSIS_BLOCK,
            },
            ShowHardwareInfo => MultiTable {
                discriminator: HW_BLOCK,
            },
            ShowLldpLocalPorts | ShowLldpRemote | ShowPortLldpRemote | ShowLldpInventory => {
                Grouped {
                    group: LOCAL_PORT_GROUP,
                    field: "Local Port",
                }
            }
            _ => Raw,
        }
    }

    /// Static transport route.
    pub fn route(&self) -> Route {
        use CommandId::*;
        match self {
            ShowDebugLevel | SetDebugLevel | ShowAaaConfiguration | ShowIpService
            | EnableHttpService | AaaDefaultLocal | AaaHttpLocal => Route::Secondary,
            _ => Route::Primary,
        }
    }

    /// Whether the command only reads state.
    pub fn is_query(&self) -> bool {
        self.template().starts_with("show ")
    }

    /// Number of `{n}` placeholders in the template.
    pub fn arity(&self) -> usize {
        let template = self.template();
        (0..)
            .take_while(|i| template.contains(&format!("{{{i}}}")))
            .count()
    }
}

/// An immutable request for one switch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: CommandId,
    params: Vec<String>,
}

impl Command {
    /// Command without parameters.
    pub fn new(id: CommandId) -> Self {
        Self { id, params: vec![] }
    }

    /// Command with explicit parameters.
    pub fn with_params<I, S>(id: CommandId, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Command addressed to a port.
    pub fn port(id: CommandId, port: PortId) -> Self {
        Self::with_params(id, [port.to_string()])
    }

    /// Command addressed to a port with one extra value.
    pub fn port_value(id: CommandId, port: PortId, value: impl Into<String>) -> Self {
        Self::with_params(id, [port.to_string(), value.into()])
    }

    /// Command addressed to a slot.
    pub fn slot(id: CommandId, slot: SlotId) -> Self {
        Self::with_params(id, [slot.to_string()])
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn route(&self) -> Route {
        self.id.route()
    }

    pub fn shape(&self) -> ResponseShape {
        self.id.shape()
    }

    /// Render the CLI text. Missing parameters render as empty strings.
    pub fn render(&self) -> String {
        debug_assert_eq!(self.params.len(), self.id.arity(), "{:?}", self.id);
        let mut text = self.id.template().to_string();
        for index in 0..self.id.arity() {
            let value = self.params.get(index).map(String::as_str).unwrap_or("");
            text = text.replace(&format!("{{{index}}}"), value);
        }
        text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
