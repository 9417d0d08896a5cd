//! Device profiles and confirmation hooks.

use serde::{Deserialize, Serialize};

use super::action::RemediationAction;
use crate::topology::PortId;

use RemediationAction::*;

/// Kind of device attached to the port. Decides the action order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceProfile {
    Camera,
    Phone,
    AccessPoint,
    #[default]
    Other,
}

const HDMI_MDI: [RemediationAction; 3] =
    [EnablePowerOverHdmi, EnableLldpPowerMdi, EnableLldpExtPowerMdi];
const BT: [RemediationAction; 2] = [Check8023bt, Enable8023bt];
const PRIORITY: [RemediationAction; 2] = [CheckPriority, ChangePriority];

impl DeviceProfile {
    /// Ordered remediation sequence for this kind of device.
    pub fn actions(&self) -> Vec<RemediationAction> {
        let mut actions = vec![];
        match self {
            DeviceProfile::Camera => {
                actions.push(CheckCapacitorDetection);
                actions.extend(BT);
                actions.extend(HDMI_MDI);
                actions.extend(PRIORITY);
                actions.extend([ResetPortPower, TogglePairPower]);
            }
            DeviceProfile::Phone => {
                actions.extend([TogglePairPower, ResetPortPower]);
                actions.extend(PRIORITY);
                actions.extend(HDMI_MDI);
                actions.extend(BT);
                actions.push(CheckCapacitorDetection);
            }
            DeviceProfile::AccessPoint => {
                actions.push(ResetPortPower);
                actions.extend(PRIORITY);
                actions.extend(BT);
                actions.extend(HDMI_MDI);
                actions.extend([CheckCapacitorDetection, TogglePairPower]);
            }
            DeviceProfile::Other => {
                actions.push(ResetPortPower);
                actions.extend(PRIORITY);
                actions.extend(BT);
                actions.extend(HDMI_MDI);
                actions.extend([TogglePairPower, CheckCapacitorDetection]);
            }
        }
        actions
    }
}

/// Asks whether a change flagged by a check action may go ahead.
pub trait Confirm: Send + Sync {
    fn confirm(&self, port: PortId, action: RemediationAction, alert: Option<&str>) -> bool;
}

/// Approves every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _: PortId, _: RemediationAction, _: Option<&str>) -> bool {
        true
    }
}

/// Declines every change; only unconditional actions run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&self, _: PortId, _: RemediationAction, _: Option<&str>) -> bool {
        false
    }
}
