//! Remediation actions.
//!
//! Each [`RemediationAction`] turns the current model of a port into a
//! [`Prepared`] value: either an immediate verdict (already configured, not
//! supported, nothing to change) or a [`Plan`] of steps to apply, the
//! predicate to wait on, and the steps that undo the change when the port
//! does not come up.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::report::{Outcome, Verdict};
use crate::command::{Command, CommandId};
use crate::settings::WizardSettings;
use crate::topology::{ConfigType, Port, PortId, PriorityLevel, Slot, SlotId};

/// Closed set of remediation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationAction {
    Check8023bt,
    Enable8023bt,
    TogglePairPower,
    EnablePowerOverHdmi,
    EnableLldpPowerMdi,
    EnableLldpExtPowerMdi,
    CheckPriority,
    ChangePriority,
    CheckCapacitorDetection,
    DisableCapacitorDetection,
    ResetPortPower,
    CheckMaxPower,
    ChangeMaxPower,
}

/// One thing the engine does while applying or undoing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Send(Command),
    /// Seconds.
    Pause(u64),
    /// Start or stop the slot and wait for it.
    SlotPower { slot: SlotId, on: bool },
    /// Power down, pause, power up, pause.
    PowerCycle(PortId),
    /// Set the max power, falling back to the ceiling the switch reports.
    SetMaxPower { port: PortId, mw: u32 },
    /// Re-read the port and put its max power back to `mw` if it moved.
    RestoreMaxPower { port: PortId, mw: u32 },
}

/// What counts as the port having recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Predicate {
    PortUp,
    /// A searching port is accepted too.
    PortUpOrSearching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub apply: Vec<Step>,
    /// Run when the port does not come up.
    pub compensate: Vec<Step>,
    /// Run after the wait, converged or not.
    pub finally: Vec<Step>,
    /// Run when a step fails with a device error.
    pub recovery: Vec<Step>,
    pub predicate: Predicate,
    /// Seconds.
    pub wait: u64,
}

impl Plan {
    fn new(apply: Vec<Step>, wait: u64) -> Self {
        Self {
            apply,
            compensate: vec![],
            finally: vec![],
            recovery: vec![],
            predicate: Predicate::PortUp,
            wait,
        }
    }

    fn compensate(mut self, steps: Vec<Step>) -> Self {
        self.compensate = steps;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Prepared {
    Plan(Plan),
    Done(Verdict),
}

fn send_port(id: CommandId, port: PortId) -> Step {
    Step::Send(Command::port(id, port))
}

fn send_slot(id: CommandId, slot: SlotId) -> Step {
    Step::Send(Command::slot(id, slot))
}

fn priority_needed(port: &Port, slot: &Slot) -> Result<(), String> {
    if port.priority >= PriorityLevel::High {
        return Err(format!("priority is already {}", port.priority.as_cli()));
    }
    if slot.remaining_power() >= port.max_power {
        return Err(format!(
            "slot {} has {:.1} W left, enough for the port's {:.1} W",
            slot.id,
            slot.remaining_power(),
            port.max_power
        ));
    }
    Ok(())
}

pub(crate) fn milliwatts(watts: f64) -> u32 {
    (watts * 1000.0).round() as u32
}

fn watts(mw: u32) -> f64 {
    f64::from(mw) / 1000.0
}

impl RemediationAction {
    pub fn label(&self) -> &'static str {
        match self {
            RemediationAction::Check8023bt => "Check 802.3bt",
            RemediationAction::Enable8023bt => "Enable 802.3bt",
            RemediationAction::TogglePairPower => "Toggle 2-pair/4-pair power",
            RemediationAction::EnablePowerOverHdmi => "Enable power over HDMI",
            RemediationAction::EnableLldpPowerMdi => "Enable LLDP power via MDI",
            RemediationAction::EnableLldpExtPowerMdi => "Enable LLDP ext power via MDI",
            RemediationAction::CheckPriority => "Check priority",
            RemediationAction::ChangePriority => "Change priority",
            RemediationAction::CheckCapacitorDetection => "Enable capacitor detection",
            RemediationAction::DisableCapacitorDetection => "Disable capacitor detection",
            RemediationAction::ResetPortPower => "Reset port power",
            RemediationAction::CheckMaxPower => "Check max power",
            RemediationAction::ChangeMaxPower => "Change max power",
        }
    }

    /// Mutating action that a check action gates.
    pub fn paired(&self) -> Option<RemediationAction> {
        match self {
            RemediationAction::Check8023bt => Some(RemediationAction::Enable8023bt),
            RemediationAction::CheckPriority => Some(RemediationAction::ChangePriority),
            RemediationAction::CheckMaxPower => Some(RemediationAction::ChangeMaxPower),
            _ => None,
        }
    }

    /// Convergence wait in seconds.
    pub fn wait(&self, settings: &WizardSettings) -> u64 {
        match self {
            RemediationAction::CheckCapacitorDetection
            | RemediationAction::DisableCapacitorDetection => settings.wait.capacitor_detection,
            RemediationAction::TogglePairPower => settings.wait.two_pair,
            RemediationAction::ResetPortPower => settings.wait.reset,
            _ => settings.wait.default,
        }
    }

    /// Decide what to do from the current model.
    ///
    /// `input` is the return value of the previous step, used by
    /// [`ChangeMaxPower`](Self::ChangeMaxPower). `CheckMaxPower` needs the
    /// device and is handled by the engine.
    pub(crate) fn prepare(
        &self,
        port: &Port,
        slot: &Slot,
        settings: &WizardSettings,
        input: Option<&str>,
    ) -> Prepared {
        let id = port.id;
        let wait = self.wait(settings);
        let fast_poe = slot.fast_poe.is_enabled();

        match self {
            RemediationAction::Check8023bt => Prepared::Done(match port.protocol_8023bt {
                _ if !slot.supports_8023bt => {
                    Verdict::new(
                        Outcome::Skip,
                        format!("802.3bt not supported on slot {}", slot.id),
                    )
                }
                _ if slot.has_8023bt_enabled() => {
                    Verdict::new(
                        Outcome::Skip,
                        format!("802.3bt already enabled on slot {}", slot.id),
                    )
                }
                ConfigType::Disable => {
                    let verdict = Verdict::new(
                        Outcome::Warning,
                        format!("802.3bt is disabled on slot {}", slot.id),
                    );
                    if fast_poe {
                        verdict.alert(format!(
                            "Fast PoE will be disabled on slot {} and the slot will restart",
                            slot.id
                        ))
                    } else {
                        verdict.alert(format!("Slot {} will restart", slot.id))
                    }
                }
                ConfigType::Unavailable => Verdict::new(Outcome::Skip, "802.3bt not supported"),
                ConfigType::Enable => Verdict::new(Outcome::Skip, "802.3bt already enabled"),
            }),

            RemediationAction::Enable8023bt => {
                if !slot.supports_8023bt {
                    return Prepared::Done(Verdict::new(
                        Outcome::Proceed,
                        format!("802.3bt not supported on slot {}", slot.id),
                    ));
                }
                if slot.has_8023bt_enabled() {
                    return Prepared::Done(Verdict::new(
                        Outcome::Proceed,
                        format!("802.3bt already enabled on slot {}", slot.id),
                    ));
                }
                let mut apply = vec![];
                if fast_poe {
                    apply.push(send_slot(CommandId::FastPoeDisable, slot.id));
                }
                apply.extend([
                    Step::SlotPower { slot: slot.id, on: false },
                    send_slot(CommandId::Enable8023bt, slot.id),
                    Step::SlotPower { slot: slot.id, on: true },
                ]);
                let mut plan = Plan::new(apply, wait).compensate(vec![
                    Step::SlotPower { slot: slot.id, on: false },
                    send_slot(CommandId::Disable8023bt, slot.id),
                    Step::SlotPower { slot: slot.id, on: true },
                ]);
                plan.recovery = vec![Step::SlotPower { slot: slot.id, on: true }];
                Prepared::Plan(plan)
            }

            RemediationAction::TogglePairPower => {
                let (set, undo) = if port.is_4pair {
                    (CommandId::Power2Pair, CommandId::Power4Pair)
                } else {
                    (CommandId::Power4Pair, CommandId::Power2Pair)
                };
                let mut apply = vec![];
                if fast_poe {
                    apply.push(send_slot(CommandId::FastPoeDisable, slot.id));
                }
                apply.extend([send_port(set, id), Step::Pause(3)]);
                let mut plan = Plan::new(apply, wait).compensate(vec![send_port(undo, id)]);
                plan.finally = vec![Step::RestoreMaxPower {
                    port: id,
                    mw: milliwatts(port.max_power),
                }];
                if fast_poe {
                    plan.finally.push(send_slot(CommandId::FastPoeEnable, slot.id));
                }
                plan.recovery = plan.finally.clone();
                Prepared::Plan(plan)
            }

            RemediationAction::EnablePowerOverHdmi
            | RemediationAction::EnableLldpPowerMdi
            | RemediationAction::EnableLldpExtPowerMdi => {
                let (enabled, on, off) = match self {
                    RemediationAction::EnablePowerOverHdmi => (
                        port.power_over_hdmi,
                        CommandId::PowerOverHdmiEnable,
                        CommandId::PowerOverHdmiDisable,
                    ),
                    RemediationAction::EnableLldpPowerMdi => (
                        port.lldp_power_mdi,
                        CommandId::LldpPowerMdiEnable,
                        CommandId::LldpPowerMdiDisable,
                    ),
                    _ => (
                        port.lldp_ext_power_mdi,
                        CommandId::LldpExtPowerMdiEnable,
                        CommandId::LldpExtPowerMdiDisable,
                    ),
                };
                if enabled {
                    return Prepared::Done(Verdict::new(Outcome::Proceed, "already enabled"));
                }
                Prepared::Plan(
                    Plan::new(vec![send_port(on, id), Step::Pause(3)], wait)
                        .compensate(vec![send_port(off, id)]),
                )
            }

            RemediationAction::CheckPriority => Prepared::Done(match priority_needed(port, slot) {
                Ok(()) => Verdict::new(
                    Outcome::Warning,
                    format!(
                        "slot {} has {:.1} W left, less than the port's {:.1} W",
                        slot.id,
                        slot.remaining_power(),
                        port.max_power
                    ),
                )
                .alert(format!(
                    "Priority of port {id} will change from {} to high",
                    port.priority.as_cli()
                )),
                Err(reason) => Verdict::new(Outcome::Skip, reason),
            }),

            RemediationAction::ChangePriority => match priority_needed(port, slot) {
                Ok(()) => Prepared::Plan(
                    Plan::new(
                        vec![Step::Send(Command::port_value(
                            CommandId::SetPortPriority,
                            id,
                            PriorityLevel::High.as_cli(),
                        ))],
                        wait,
                    )
                    .compensate(vec![Step::Send(Command::port_value(
                        CommandId::SetPortPriority,
                        id,
                        port.priority.as_cli(),
                    ))]),
                ),
                Err(reason) => Prepared::Done(Verdict::new(Outcome::Proceed, reason)),
            },

            RemediationAction::CheckCapacitorDetection => {
                if port.capacitor_detection {
                    return Prepared::Done(Verdict::new(
                        Outcome::Proceed,
                        "capacitor detection already enabled",
                    ));
                }
                Prepared::Plan(
                    Plan::new(
                        vec![
                            send_port(CommandId::CapacitorDetectionEnable, id),
                            Step::Pause(5),
                            Step::PowerCycle(id),
                        ],
                        wait,
                    )
                    .compensate(vec![
                        send_port(CommandId::CapacitorDetectionDisable, id),
                        Step::PowerCycle(id),
                        Step::Pause(10),
                    ]),
                )
            }

            RemediationAction::DisableCapacitorDetection => {
                if !port.capacitor_detection {
                    return Prepared::Done(Verdict::new(
                        Outcome::Proceed,
                        "capacitor detection already disabled",
                    ));
                }
                let mut plan = Plan::new(
                    vec![
                        send_port(CommandId::CapacitorDetectionDisable, id),
                        Step::PowerCycle(id),
                        Step::Pause(10),
                    ],
                    wait,
                );
                plan.predicate = Predicate::PortUpOrSearching;
                Prepared::Plan(plan)
            }

            RemediationAction::ResetPortPower => {
                Prepared::Plan(Plan::new(vec![Step::PowerCycle(id)], wait))
            }

            RemediationAction::CheckMaxPower => {
                Prepared::Done(Verdict::new(Outcome::Proceed, "checked by the engine"))
            }

            RemediationAction::ChangeMaxPower => {
                let Some(mw) = input.and_then(|v| v.trim().parse::<u32>().ok()) else {
                    return Prepared::Done(Verdict::new(
                        Outcome::Proceed,
                        "no max power change requested",
                    ));
                };
                let current = milliwatts(port.max_power);
                Prepared::Plan(
                    Plan::new(vec![Step::SetMaxPower { port: id, mw }], wait).compensate(vec![
                        Step::Send(Command::port_value(
                            CommandId::SetMaxPower,
                            id,
                            current.to_string(),
                        )),
                    ]),
                )
            }
        }
    }

    /// Verdict of a max-power probe: `default_mw` is what the switch
    /// reports as the port's default ceiling.
    pub(crate) fn max_power_verdict(port: &Port, default_mw: u32) -> Verdict {
        let current = port.max_power;
        let default = watts(default_mw);
        if current < default {
            Verdict::new(
                Outcome::Warning,
                format!("max power is {current:.1} W, default is {default:.1} W"),
            )
            .alert(format!(
                "Max power of port {} will change from {current:.1} W to {default:.1} W",
                port.id
            ))
            .returning(default_mw.to_string())
        } else {
            Verdict::new(
                Outcome::Proceed,
                format!("max power {current:.1} W is not below the default {default:.1} W"),
            )
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
