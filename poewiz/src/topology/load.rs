//! Bulk loaders from normalized command results.

use log::debug;

use super::{
    ConfigType, LldpNeighbor, PoeStatus, PortId, PortStatus, PowerSupply, PriorityLevel, SlotId,
    Switch, SyncStatus, Temperature, Vlan, MAX_MACS_PER_PORT,
};
use crate::command::{CommandResult, Fields, Record};
use crate::error::{ParseError, Result};

/// Closed set of data the topology can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Microcode,
    System,
    RunningDirectory,
    IpInterfaces,
    IpRoutes,
    Chassis,
    HardwareInfo,
    Cmm,
    Temperature,
    HealthConfig,
    PortList,
    LinkAgg,
    BlockedPorts,
    LldpLocal,
    PowerSupplies,
    SlotStatus(SlotId),
    LanPower(SlotId),
    LanPowerConfig(SlotId),
    LldpRemote,
    PortLldpRemote(PortId),
    LldpInventory,
    MacTable,
    PortMacTable(PortId),
}

impl Switch {
    /// Apply a normalized result to the model.
    pub fn load(&mut self, kind: DataKind, data: &CommandResult) -> Result<()> {
        debug!("Loading {:?} ({})", kind, data.summary());
        let records = data.records();
        match kind {
            DataKind::Microcode => {
                if let Some(rec) = records.first() {
                    self.version = rec.text("Release").to_string();
                }
            }
            DataKind::System => {
                if let Some(rec) = data.record() {
                    self.name = rec.text("Name").to_string();
                    self.location = rec.text("Location").to_string();
                    self.contact = rec.text("Contact").to_string();
                    self.up_time = rec.text("Up Time").to_string();
                }
            }
            DataKind::RunningDirectory => {
                if let Some(rec) = data.record() {
                    self.sync_status = SyncStatus::from_device(rec.text("Synchronization Status"));
                }
            }
            DataKind::IpInterfaces => self.load_ip_interfaces(records),
            DataKind::IpRoutes => {
                if let Some(route) = records
                    .iter()
                    .find(|r| r.text("Dest Address").starts_with("0.0.0.0/0"))
                {
                    self.default_gateway = route.text("Gateway Addr").to_string();
                }
            }
            DataKind::Chassis => self.load_chassis(records)?,
            DataKind::HardwareInfo => {
                for rec in records {
                    let chassis = self.chassis_entry(chassis_number(rec.required("ID")?)?);
                    chassis.fpga = first_of(rec, &["FPGA", "FPGA 1"]);
                    chassis.cpld = first_of(rec, &["CPLD", "CPLD 1"]);
                }
            }
            DataKind::Cmm => {
                for rec in records {
                    let chassis = self.chassis_entry(chassis_number(rec.required("ID")?)?);
                    if chassis.model.is_empty() {
                        chassis.model = rec.text("Model Name").to_string();
                    }
                    if chassis.fpga.is_empty() {
                        chassis.fpga = first_of(rec, &["FPGA", "FPGA 1"]);
                    }
                }
            }
            DataKind::Temperature => {
                for rec in records {
                    let number = chassis_number(prefix(rec.text("Chassis/Device")))?;
                    let chassis = self.chassis_entry(number);
                    chassis.temperature = Some(Temperature {
                        current: rec.number("Current")?.unwrap_or_default(),
                        threshold: rec.number("Thresh")?.unwrap_or_default(),
                        danger: rec.number("Danger")?.unwrap_or_default(),
                        status: rec.text("Status").to_string(),
                    });
                }
            }
            DataKind::HealthConfig => {
                if let Some(rec) = data.record() {
                    self.cpu_threshold = rec.number("CPU Threshold")?;
                }
            }
            DataKind::PortList => {
                for rec in records {
                    let id = port_id(None, first_field(rec, &["Chas/Slot/Port", "Port"]))?;
                    let port = self.port_entry(id);
                    port.admin_enabled = rec.flag("Admin Status");
                    port.status = PortStatus::from_device(rec.text("Link Status"));
                    port.alias = rec.text("Alias").trim_matches('"').to_string();
                    if port.blocked && port.status == PortStatus::Up {
                        port.status = PortStatus::Blocked;
                    }
                }
            }
            DataKind::LinkAgg => {
                self.ports_mut().for_each(|p| p.link_agg = None);
                for rec in records {
                    let id = port_id(None, first_field(rec, &["Chassis/Slot/Port", "Chas/Slot/Port"]))?;
                    let agg = rec.text("Agg").to_string();
                    if let Some(port) = self.port_mut(id) {
                        port.link_agg = Some(agg);
                    }
                }
            }
            DataKind::BlockedPorts => {
                self.ports_mut().for_each(|p| p.blocked = false);
                for rec in records {
                    let id = port_id(None, rec.text("Port"))?;
                    if let Some(port) = self.port_mut(id) {
                        port.blocked = true;
                        if port.status == PortStatus::Up {
                            port.status = PortStatus::Blocked;
                        }
                    }
                }
            }
            DataKind::LldpLocal => {
                for rec in records {
                    let id = port_id(None, rec.text("Local Port"))?;
                    if let Some(port) = self.port_mut(id) {
                        port.lldp_local_id = Some(prefix_word(rec.text("Port ID")));
                    }
                }
            }
            DataKind::PowerSupplies => {
                self.chassis.iter_mut().for_each(|c| c.power_supplies.clear());
                for rec in records {
                    let location = rec.text("Chassis/PS");
                    let number = chassis_number(prefix(location))?;
                    self.chassis_entry(number).power_supplies.push(PowerSupply {
                        id: location.to_string(),
                        model: rec.text("Module Type").to_string(),
                        kind: rec.text("Type").to_string(),
                        status: rec.text("Status").to_string(),
                        watts: rec.text("Power Provision").to_string(),
                    });
                }
            }
            DataKind::SlotStatus(id) => self.load_slot_status(id, records)?,
            DataKind::LanPower(id) => self.load_lanpower(id, records)?,
            DataKind::LanPowerConfig(id) => self.load_lanpower_config(id, records)?,
            DataKind::LldpRemote => {
                self.ports_mut().for_each(|p| p.neighbors.clear());
                self.load_neighbors(records)?;
            }
            DataKind::PortLldpRemote(id) => {
                if let Some(port) = self.port_mut(id) {
                    port.neighbors.clear();
                }
                self.load_neighbors(records)?;
            }
            DataKind::LldpInventory => {
                for rec in records {
                    let id = port_id(None, rec.text("Local Port"))?;
                    if let Some(port) = self.port_mut(id) {
                        if port.neighbors.is_empty() {
                            port.neighbors.push(LldpNeighbor::default());
                        }
                        let neighbor = &mut port.neighbors[0];
                        neighbor.vendor = rec.text("Manufacturer Name").to_string();
                        neighbor.model = rec.text("Model Name").to_string();
                        neighbor.serial_number = rec.text("Serial Number").to_string();
                    }
                }
            }
            DataKind::MacTable => {
                self.ports_mut().for_each(|p| p.macs.clear());
                self.load_macs(records)?;
            }
            DataKind::PortMacTable(id) => {
                if let Some(port) = self.port_mut(id) {
                    port.macs.clear();
                }
                self.load_macs(records)?;
            }
        }
        Ok(())
    }

    fn load_ip_interfaces(&mut self, records: &[Record]) {
        self.vlans = records
            .iter()
            .map(|rec| Vlan {
                name: rec.text("Name").to_string(),
                ip: rec.text("IP Address").to_string(),
                mask: rec.text("Subnet Mask").to_string(),
                device: rec.text("Device").to_string(),
            })
            .collect();
        if let Some(vlan) = self.vlans.iter().find(|v| v.ip == self.ip) {
            self.netmask = vlan.mask.clone();
        }
    }

    fn load_chassis(&mut self, records: &[Record]) -> Result<()> {
        let single = records.len() == 1;
        for rec in records {
            let chassis = self.chassis_entry(chassis_number(rec.required("ID")?)?);
            chassis.model = rec.text("Model Name").to_string();
            chassis.serial_number = rec.text("Serial Number").to_string();
            chassis.is_master = single || rec.text("Role").to_lowercase().contains("master");
        }
        if let Some(master) = self.chassis.iter().find(|c| c.is_master) {
            self.model = master.model.clone();
            self.serial_number = master.serial_number.clone();
        }
        Ok(())
    }

    fn load_slot_status(&mut self, id: SlotId, records: &[Record]) -> Result<()> {
        let Some(rec) = records.first() else {
            return Ok(());
        };
        let slot = self
            .chassis_entry(id.chassis)
            .slot_entry(id.slot);
        slot.budget = rec.number("Max Watts")?.unwrap_or(slot.budget);
        slot.power = rec.number("Actual Used Watts")?.unwrap_or(slot.power);
        slot.threshold = rec.number("Usage Threshold")?.unwrap_or(slot.threshold);
        slot.is_initialized = rec.flag("PoE Status");
        slot.fast_poe = ConfigType::from_device(rec.text("FPOE"));
        slot.perpetual_poe = ConfigType::from_device(rec.text("PPOE"));
        slot.class_detection = ConfigType::from_device(rec.text("Class Detection"));
        slot.supports_8023bt = rec.flag("8023BT Support");
        Ok(())
    }

    fn load_lanpower(&mut self, id: SlotId, records: &[Record]) -> Result<()> {
        let slot = self.chassis_entry(id.chassis).slot_entry(id.slot);
        for rec in records {
            let port = slot.port_entry(port_id(Some(id), rec.text("Port"))?);
            port.max_power = rec.number("Maximum(mW)")?.unwrap_or_default() / 1000.0;
            port.power = rec.number("Actual Used(mW)")?.unwrap_or_default() / 1000.0;
            port.poe = PoeStatus::from_device(rec.text("Status"));
            port.priority = PriorityLevel::from_device(rec.text("Priority"));
            port.poe_enabled = rec.flag("On/Off");
            port.class = rec.text("Class").to_string();
        }
        slot.power = slot.ports.iter().map(|p| p.power).sum();
        Ok(())
    }

    fn load_lanpower_config(&mut self, id: SlotId, records: &[Record]) -> Result<()> {
        let slot = self.chassis_entry(id.chassis).slot_entry(id.slot);
        for rec in records {
            let port = slot.port_entry(port_id(Some(id), rec.text("Port"))?);
            port.is_4pair = rec.flag("4-Pair");
            port.power_over_hdmi = rec.flag("Power Over HDMI");
            port.capacitor_detection = rec.flag("Capacitor Detection");
            port.protocol_8023bt = ConfigType::from_device(rec.text("802.3bt"));
            port.lldp_power_mdi = rec.flag("LLDP Power Via MDI");
            port.lldp_ext_power_mdi = rec.flag("LLDP Ext Power Via MDI");
        }
        Ok(())
    }

    fn load_neighbors(&mut self, records: &[Record]) -> Result<()> {
        for rec in records {
            let id = port_id(None, rec.text("Local Port"))?;
            if let Some(port) = self.port_mut(id) {
                port.neighbors.push(LldpNeighbor {
                    system_name: rec.text("System Name").to_string(),
                    description: rec.text("System Description").to_string(),
                    port_description: rec.text("Port Description").to_string(),
                    capabilities: rec.text("Capabilities Enabled").to_string(),
                    mac: rec.text("Chassis ID").to_string(),
                    ip: rec.text("Management IP Address").to_string(),
                    ..Default::default()
                });
            }
        }
        Ok(())
    }

    fn load_macs(&mut self, records: &[Record]) -> Result<()> {
        for rec in records {
            let interface = rec.text("Interface");
            // Link aggregates show as `0/1` style ids; only physical ports are kept.
            if interface.matches('/').count() != 2 {
                continue;
            }
            let id = interface.parse::<PortId>()?;
            if let Some(port) = self.port_mut(id) {
                let mac = rec.text("Mac Address").to_string();
                if port.macs.len() < MAX_MACS_PER_PORT && !port.macs.contains(&mac) {
                    port.macs.push(mac);
                }
            }
        }
        Ok(())
    }
}

fn first_field<'a>(rec: &'a Record, names: &[&str]) -> &'a str {
    names.iter().find_map(|n| rec.field(n)).unwrap_or("")
}

fn first_of(rec: &Record, names: &[&str]) -> String {
    first_field(rec, names).to_string()
}

/// `1/CMMA` → `1`.
fn prefix(value: &str) -> &str {
    value.split('/').next().unwrap_or("").trim()
}

/// `1001 (Locally assigned)` → `1001`.
fn prefix_word(value: &str) -> String {
    value.split_whitespace().next().unwrap_or("").to_string()
}

fn chassis_number(value: &str) -> Result<u8> {
    value.trim().parse::<u8>().map_err(|_| {
        ParseError::InvalidNumber {
            field: "chassis".to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

/// Full id, or a bare port number relative to `slot`.
fn port_id(slot: Option<SlotId>, value: &str) -> Result<PortId> {
    let value = value.trim();
    match (slot, value.contains('/')) {
        (Some(slot), false) => value
            .parse::<u16>()
            .map(|n| slot.port(n))
            .map_err(|_| ParseError::InvalidPortId(value.to_string()).into()),
        _ => Ok(value.parse::<PortId>()?),
    }
}
