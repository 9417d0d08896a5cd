//! PoE port remediation wizard.
//!
//! The wizard takes a port that is not drawing power and works through an
//! ordered list of [`RemediationAction`]s until the port comes up:
//!
//! 1. The entry gate handles ports that need no actions: a PoE conflict is
//!    cleared by power cycling, a port without PoE, an uplink or a healthy
//!    port ends the run with `NothingToDo`.
//! 2. Each action checks its precondition, applies its change and waits for
//!    the port. If the port comes up the run stops with `Ok`. Otherwise the
//!    change is undone before the next action starts.
//! 3. Check actions that end in `Warning` ask the [`Confirm`] hook before
//!    their paired action runs.
//!
//! [`Session::run_poe_wizard`] wraps this with a scan, a temporary
//! class-detection override and a final max-power pass.

mod action;
mod profile;
mod report;

pub use action::RemediationAction;
pub use profile::{AlwaysConfirm, Confirm, DeviceProfile, NeverConfirm};
pub use report::{Outcome, ReportResult, Verdict, WizardReport};

use std::time::Duration;

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use action::{Plan, Predicate, Prepared, Step, milliwatts};
use crate::command::{Command, CommandId};
use crate::dispatch::Executor;
use crate::error::{Error, Result, SessionError};
use crate::progress::ProgressEvent;
use crate::session::{ScanOutcome, Session};
use crate::topology::{ConfigType, PoeStatus, Port, PortId, PortStatus, Slot, SlotId};

/// `... can be set to 30000 mW`: the port's default ceiling.
static DEFAULT_MAX_POWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)to\s+(\d+)\s*mW").expect("default max power pattern is valid"));

/// `... power not exceed 25000 when ...`: the ceiling the slot allows.
static ALLOWED_MAX_POWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)power\s+not\s+exceed\s+(\d+)").expect("allowed max power pattern is valid")
});

fn capture_mw(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Outcome of an action whose port did not come up.
fn classify(port: &Port) -> Outcome {
    match port.poe {
        PoeStatus::Conflict | PoeStatus::Fault | PoeStatus::Deny | PoeStatus::Searching => {
            Outcome::Fail
        }
        PoeStatus::On if port.status != PortStatus::Up => Outcome::Fail,
        _ => Outcome::Proceed,
    }
}

fn event(title: String, verdict: &Verdict) -> ProgressEvent {
    let message = format!("{:?}: {}", verdict.outcome, verdict.description);
    match verdict.outcome {
        Outcome::Fail => ProgressEvent::error(title, message),
        Outcome::Warning => ProgressEvent::warning(title, message),
        _ => ProgressEvent::info(title, message),
    }
}

impl<E: Executor> Session<E> {
    /// Run `actions` against `port` on the current model.
    pub async fn run_wizard_actions(
        &mut self,
        port: PortId,
        actions: &[RemediationAction],
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> Result<WizardReport> {
        let mut report = WizardReport::new();
        self.run_actions(port, actions, confirm, cancel, &mut report)
            .await?;
        Ok(report)
    }

    /// Full wizard: scan, remediate with the profile's actions, then tidy up.
    pub async fn run_poe_wizard(
        &mut self,
        port: PortId,
        profile: DeviceProfile,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> Result<WizardReport> {
        let title = format!("PoE wizard on port {port}");
        info!("{title} ({profile:?})");
        if self.scan_switch(cancel).await? == ScanOutcome::Cancelled {
            return Err(Error::Cancelled);
        }
        self.port_state(port)?;

        let saved = self.override_class_detection().await?;
        let mut report = WizardReport::new();
        let mut run = self
            .run_actions(port, &profile.actions(), confirm, cancel, &mut report)
            .await;

        // A powered port keeps class detection enabled.
        let unresolved = matches!(
            report.outcome(port),
            Some(Outcome::Fail | Outcome::NothingToDo)
        );
        if run.is_ok() && unresolved {
            run = self
                .run_sequence(
                    port,
                    &[RemediationAction::CheckMaxPower, RemediationAction::ChangeMaxPower],
                    confirm,
                    cancel,
                    &mut report,
                )
                .await;
        }
        if run.is_err() || unresolved {
            let restored = self.restore_class_detection(&saved).await;
            run?;
            restored?;
        }
        self.refresh_port(port).await?;

        if let Some(latest) = report.latest(port) {
            let verdict = Verdict::new(latest.outcome, latest.description.clone());
            self.report(event(title, &verdict));
        }
        Ok(report)
    }

    /// Slot power-up, entry gate, then the sequence.
    async fn run_actions(
        &mut self,
        port: PortId,
        actions: &[RemediationAction],
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
        report: &mut WizardReport,
    ) -> Result<()> {
        let slot = self.slot_state(port.slot_id())?;
        if slot.supports_poe && !slot.is_initialized {
            info!("Slot {} is not initialized; powering it up", slot.id);
            self.report(ProgressEvent::info(
                format!("Port {port}"),
                format!("Powering up slot {}", slot.id),
            ));
            self.run_step(&Step::SlotPower { slot: slot.id, on: true }, cancel)
                .await?;
            self.refresh_slot(slot.id).await?;
        }

        if !self.entry_gate(port, cancel, report).await? {
            return Ok(());
        }
        self.run_sequence(port, actions, confirm, cancel, report)
            .await
    }

    /// Returns `true` when the actions should run.
    async fn entry_gate(
        &mut self,
        port: PortId,
        cancel: &CancellationToken,
        report: &mut WizardReport,
    ) -> Result<bool> {
        let settle = Duration::from_secs(self.settings.settle_wait);

        if self.port_state(port)?.poe == PoeStatus::Conflict {
            let started = Instant::now();
            report.begin(port, "PoE conflict");
            self.pause_checked(&format!("Checking conflict on port {port}"), settle, cancel)
                .await?;
            self.refresh_port(port).await?;

            if self.port_state(port)?.poe == PoeStatus::Conflict {
                warn!("Port {port} stays in conflict; power cycling");
                self.run_step(&Step::PowerCycle(port), cancel).await?;
                let outcome = self
                    .wait_port_up(port, self.settings.port_up_wait, cancel)
                    .await?;
                if outcome.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let verdict = Verdict::new(
                    Outcome::Ok,
                    format!(
                        "Power cycled to clear the conflict. {}",
                        self.port_state(port)?.summary()
                    ),
                );
                self.report(event(format!("Port {port}"), &verdict));
                report.complete(port, verdict, started.elapsed());
                return Ok(false);
            }
            report.complete(
                port,
                Verdict::new(Outcome::Proceed, "conflict cleared by itself"),
                started.elapsed(),
            );
        }

        let state = self.port_state(port)?;
        let reason = if state.poe == PoeStatus::NoPoe {
            Some("port has no PoE".to_string())
        } else if state.is_uplink() {
            let peer = state
                .neighbors
                .first()
                .map(|n| n.system_name.as_str())
                .filter(|name| !name.is_empty())
                .or(state.link_agg.as_deref().map(|_| "a link aggregate"))
                .unwrap_or("a network device");
            Some(format!("port is an uplink to {peer}"))
        } else {
            None
        };
        if let Some(reason) = reason {
            report.begin(port, "Port check");
            report.complete(port, Verdict::new(Outcome::NothingToDo, reason), Duration::ZERO);
            return Ok(false);
        }

        if state.poe.is_ok() {
            let started = Instant::now();
            self.pause_checked(&format!("Checking port {port}"), settle, cancel)
                .await?;
            self.refresh_port(port).await?;
            let state = self.port_state(port)?;
            if state.poe.is_ok() {
                report.begin(port, "Port check");
                report.complete(
                    port,
                    Verdict::new(
                        Outcome::NothingToDo,
                        format!("port is not faulty. {}", state.summary()),
                    ),
                    started.elapsed(),
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run actions in order until the port is `Ok`.
    async fn run_sequence(
        &mut self,
        port: PortId,
        actions: &[RemediationAction],
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
        report: &mut WizardReport,
    ) -> Result<()> {
        let mut gated: Option<RemediationAction> = None;
        for &action in actions {
            if report.is_stopped(port) {
                break;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if gated.take() == Some(action) {
                debug!("{action} on port {port} not confirmed");
                continue;
            }

            let verdict = self.run_action(port, action, cancel, report).await?;
            if let Some(paired) = action.paired() {
                let approved = verdict.outcome == Outcome::Warning
                    && confirm.confirm(port, paired, verdict.alert.as_deref());
                if !approved {
                    gated = Some(paired);
                }
            }
        }
        Ok(())
    }

    async fn run_action(
        &mut self,
        port: PortId,
        action: RemediationAction,
        cancel: &CancellationToken,
        report: &mut WizardReport,
    ) -> Result<Verdict> {
        let input = report.return_value(port).map(str::to_string);
        let started = Instant::now();
        if !report.begin(port, action.label()) {
            return Ok(Verdict::new(Outcome::Ok, "already resolved"));
        }
        let title = format!("Port {port}");
        info!("{title}: {action}");
        self.report(ProgressEvent::info(&title, action.label()));

        let (result, recovery) = if action == RemediationAction::CheckMaxPower {
            (self.check_max_power(port).await, vec![])
        } else {
            let state = self.port_state(port)?;
            let slot = self.slot_state(port.slot_id())?;
            match action.prepare(&state, &slot, &self.settings, input.as_deref()) {
                Prepared::Done(verdict) => (Ok(verdict), vec![]),
                Prepared::Plan(plan) => {
                    let result = self.run_plan(port, &plan, cancel).await;
                    (result, plan.recovery)
                }
            }
        };

        let verdict = match result {
            Ok(verdict) => verdict,
            Err(e) if matches!(e, Error::Cancelled) || e.is_connection_failure() || e.is_auth_failure() => {
                report.complete(port, Verdict::new(Outcome::Fail, e.to_string()), started.elapsed());
                return Err(e);
            }
            Err(e) if e.is_not_supported() => {
                warn!("{title}: {action}: {e}");
                self.recover(&recovery, cancel).await?;
                Verdict::new(Outcome::Proceed, "command not supported")
            }
            Err(e) => {
                error!("{title}: {action}: {e}");
                let mut steps = vec![Step::Send(Command::port(CommandId::PowerUpPort, port))];
                steps.extend(recovery);
                self.recover(&steps, cancel).await?;
                Verdict::new(Outcome::Fail, e.to_string())
            }
        };

        self.report(event(title, &verdict));
        report.complete(port, verdict.clone(), started.elapsed());
        Ok(verdict)
    }

    async fn run_plan(
        &mut self,
        port: PortId,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<Verdict> {
        self.run_steps(&plan.apply, cancel).await?;
        let verdict = if self
            .wait_recovered(port, plan.predicate, plan.wait, cancel)
            .await?
        {
            Verdict::new(Outcome::Ok, self.port_state(port)?.summary())
        } else {
            self.run_steps(&plan.compensate, cancel).await?;
            self.refresh_port(port).await?;
            let state = self.port_state(port)?;
            Verdict::new(
                classify(&state),
                format!("port did not come up. {}", state.summary()),
            )
        };
        self.run_steps(&plan.finally, cancel).await?;
        Ok(verdict)
    }

    async fn wait_recovered(
        &mut self,
        port: PortId,
        predicate: Predicate,
        wait: u64,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let outcome = match predicate {
            Predicate::PortUp => self.wait_port_up(port, wait, cancel).await?,
            Predicate::PortUpOrSearching => {
                let label = format!("Waiting for port {port}");
                let conv = self.settings.port_up(wait);
                self.poller(cancel)
                    .wait_until(self, &label, conv, |s| {
                        Box::pin(s.port_up_or_searching(port))
                    })
                    .await?
            }
        };
        if outcome.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if outcome.is_converged() {
            return Ok(true);
        }
        // The port state read after the wait decides.
        match predicate {
            Predicate::PortUp => self.port_powered(port).await,
            Predicate::PortUpOrSearching => self.port_up_or_searching(port).await,
        }
    }

    async fn port_up_or_searching(&mut self, port: PortId) -> Result<bool> {
        if self.port_powered(port).await? {
            return Ok(true);
        }
        Ok(self.port_state(port)?.poe == PoeStatus::Searching)
    }

    async fn run_steps(&mut self, steps: &[Step], cancel: &CancellationToken) -> Result<()> {
        for step in steps {
            self.run_step(step, cancel).await?;
        }
        Ok(())
    }

    async fn run_step(&mut self, step: &Step, cancel: &CancellationToken) -> Result<()> {
        match step {
            Step::Send(command) => {
                self.execute(command).await?;
            }
            Step::Pause(secs) => {
                self.pause_checked("Waiting", Duration::from_secs(*secs), cancel)
                    .await?;
            }
            Step::SlotPower { slot, on } => {
                let id = if *on {
                    CommandId::PowerUpSlot
                } else {
                    CommandId::PowerDownSlot
                };
                self.execute(&Command::slot(id, *slot)).await?;
                let outcome = self.wait_slot_power(*slot, *on, cancel).await?;
                if outcome.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if !outcome.is_converged() {
                    warn!("Slot {slot} did not settle after {:?}", outcome.elapsed());
                }
            }
            Step::PowerCycle(port) => {
                if self.power_cycle(*port, cancel).await?.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
            Step::SetMaxPower { port, mw } => self.set_max_power(*port, *mw).await?,
            Step::RestoreMaxPower { port, mw } => {
                self.refresh_port(*port).await?;
                let now = milliwatts(self.port_state(*port)?.max_power);
                if now != *mw {
                    info!("Port {port} max power moved to {now} mW; restoring {mw} mW");
                    self.set_max_power(*port, *mw).await?;
                }
            }
        }
        Ok(())
    }

    /// Best effort: device errors are logged, connection errors abort.
    async fn recover(&mut self, steps: &[Step], cancel: &CancellationToken) -> Result<()> {
        for step in steps {
            match self.run_step(step, cancel).await {
                Ok(()) => {}
                Err(e) if matches!(e, Error::Cancelled) || e.is_connection_failure() => {
                    return Err(e);
                }
                Err(e) => warn!("Recovery step {step:?} failed: {e}"),
            }
        }
        Ok(())
    }

    async fn set_max_power(&mut self, port: PortId, mw: u32) -> Result<()> {
        let err = match self
            .execute(&Command::port_value(CommandId::SetMaxPower, port, mw.to_string()))
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        match err.device_message().and_then(|m| capture_mw(&ALLOWED_MAX_POWER, m)) {
            Some(allowed) if allowed != mw => {
                info!("Port {port} max power limited to {allowed} mW");
                self.execute(&Command::port_value(
                    CommandId::SetMaxPower,
                    port,
                    allowed.to_string(),
                ))
                .await?;
                Ok(())
            }
            _ => Err(err),
        }
    }

    /// Ask the switch for the port's default ceiling by requesting 0 mW.
    async fn check_max_power(&mut self, port: PortId) -> Result<Verdict> {
        let state = self.port_state(port)?;
        let probe = Command::port_value(CommandId::SetMaxPower, port, "0");
        let default_mw = match self.execute(&probe).await {
            Ok(_) => {
                let current = milliwatts(state.max_power);
                self.set_max_power(port, current).await?;
                None
            }
            Err(e) if e.is_connection_failure() || e.is_auth_failure() => return Err(e),
            Err(e) => e
                .device_message()
                .and_then(|m| capture_mw(&DEFAULT_MAX_POWER, m)),
        };
        Ok(match default_mw {
            Some(mw) => RemediationAction::max_power_verdict(&state, mw),
            None => Verdict::new(Outcome::Proceed, "default max power not reported"),
        })
    }

    /// Enable class detection on every PoE slot. Returns what to restore.
    async fn override_class_detection(&mut self) -> Result<Vec<SlotId>> {
        let slots: Vec<SlotId> = self
            .switch
            .slots()
            .filter(|s| s.supports_poe && s.class_detection == ConfigType::Disable)
            .map(|s| s.id)
            .collect();
        let mut changed = vec![];
        for slot in slots {
            match self
                .execute(&Command::slot(CommandId::ClassDetectionEnable, slot))
                .await
            {
                Ok(_) => changed.push(slot),
                Err(e) if e.is_not_supported() => debug!("Class detection on slot {slot}: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }

    async fn restore_class_detection(&mut self, slots: &[SlotId]) -> Result<()> {
        for &slot in slots {
            self.execute(&Command::slot(CommandId::ClassDetectionDisable, slot))
                .await?;
        }
        Ok(())
    }

    async fn pause_checked(
        &self,
        label: &str,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.poller(cancel).pause(label, duration).await.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn port_state(&self, port: PortId) -> Result<Port> {
        self.switch
            .port(port)
            .cloned()
            .ok_or_else(|| SessionError::UnknownPort(port.to_string()).into())
    }

    fn slot_state(&self, slot: SlotId) -> Result<Slot> {
        self.switch
            .slot(slot)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSlot(slot.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSwitch, Need, session};
    use RemediationAction::*;

    const CAMERA: PortId = PortId {
        chassis: 1,
        slot: 1,
        port: 1,
    };
    const SPARE: PortId = PortId {
        chassis: 1,
        slot: 1,
        port: 2,
    };
    const BT_DEVICE: PortId = PortId {
        chassis: 1,
        slot: 1,
        port: 3,
    };
    const UPLINK: PortId = PortId {
        chassis: 1,
        slot: 1,
        port: 4,
    };

    async fn connected(fake: FakeSwitch) -> Session<FakeSwitch> {
        let (mut session, _) = session(fake);
        session.connect(&CancellationToken::new()).await.unwrap();
        session.executor.clear_log();
        session
    }

    fn position(sent: &[String], command: &str) -> usize {
        sent.iter()
            .position(|c| c == command)
            .unwrap_or_else(|| panic!("{command} not sent: {sent:#?}"))
    }

    fn outcomes(report: &WizardReport, port: PortId) -> Vec<Outcome> {
        report.results(port).iter().map(|r| r.outcome).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_is_power_cycled_and_resolved() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Conflict);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(
                SPARE,
                &DeviceProfile::Camera.actions(),
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let results = report.results(SPARE);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Outcome::Ok);
        assert!(results[0].description.contains("00:11:22:33:44:02"));

        let sent = session.executor().sent();
        let down = position(&sent, "lanpower port 1/1/2 admin-state disable");
        let up = position(&sent, "lanpower port 1/1/2 admin-state enable");
        assert!(down < up);
        let mutations: Vec<&String> = sent.iter().filter(|c| !c.starts_with("show ")).collect();
        assert_eq!(mutations.len(), 2, "{mutations:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_first_ok() {
        let mut session = connected(FakeSwitch::sample()).await;
        let report = session
            .run_wizard_actions(
                BT_DEVICE,
                &[Enable8023bt, ChangePriority],
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes(&report, BT_DEVICE), vec![Outcome::Ok]);
        assert_eq!(report.results(BT_DEVICE)[0].action, Enable8023bt.label());
        let sent = session.executor().sent();
        assert!(sent.contains(&"lanpower slot 1/1 8023bt enable".to_string()));
        assert!(!sent.iter().any(|c| c.contains("priority")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compensates_before_next_action() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(
                SPARE,
                &[TogglePairPower, EnablePowerOverHdmi],
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes(&report, SPARE), vec![Outcome::Fail, Outcome::Fail]);

        let sent = session.executor().sent();
        let apply = position(&sent, "lanpower port 1/1/2 4pair enable");
        let undo = position(&sent, "lanpower port 1/1/2 4pair disable");
        let waited = sent[apply..undo]
            .iter()
            .filter(|c| *c == "show lanpower slot 1/1")
            .count();
        assert!(waited >= 1);
        let next = position(&sent, "lanpower port 1/1/2 power-over-hdmi enable");
        let next_undo = position(&sent, "lanpower port 1/1/2 power-over-hdmi disable");
        assert!(apply < undo && undo < next && next < next_undo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_switch_keeps_a_working_fix() {
        let mut session = connected(FakeSwitch::sample()).await;
        session.executor.latency = Duration::from_millis(400);

        let report = session
            .run_wizard_actions(
                BT_DEVICE,
                &[Enable8023bt],
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes(&report, BT_DEVICE), vec![Outcome::Ok]);

        let sent = session.executor().sent();
        position(&sent, "lanpower slot 1/1 8023bt enable");
        assert!(!sent.iter().any(|c| c == "lanpower slot 1/1 8023bt disable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_pair_device_recovers_after_reset() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::FourPair);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(
                SPARE,
                &[ResetPortPower, TogglePairPower, EnablePowerOverHdmi],
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes(&report, SPARE), vec![Outcome::Fail, Outcome::Ok]);

        let sent = session.executor().sent();
        position(&sent, "lanpower port 1/1/2 4pair enable");
        assert!(!sent.iter().any(|c| c == "lanpower port 1/1/2 4pair disable"));
        assert!(!sent.iter().any(|c| c.contains("power-over-hdmi")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_profile_enables_capacitor_detection_first() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::CapDetection);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(
                SPARE,
                &DeviceProfile::Camera.actions(),
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let results = report.results(SPARE);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, CheckCapacitorDetection.label());
        assert_eq!(results[0].outcome, Outcome::Ok);
        let sent = session.executor().sent();
        position(&sent, "lanpower port 1/1/2 capacitor-detection enable");
        assert!(!sent.iter().any(|c| c.contains("capacitor-detection disable")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_toggle_restores_max_power() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        fake.set_max_power(SPARE, 15000);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(SPARE, &[TogglePairPower], &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes(&report, SPARE), vec![Outcome::Fail]);

        let sent = session.executor().sent();
        let apply = position(&sent, "lanpower port 1/1/2 4pair enable");
        let undo = position(&sent, "lanpower port 1/1/2 4pair disable");
        let restore = position(&sent, "lanpower port 1/1/2 power 15000");
        assert!(apply < undo && undo < restore);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_supported_records_proceed() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        fake.fail_on(
            "lanpower port 1/1/2 power-over-hdmi enable",
            "ERROR: power-over-hdmi not supported on this port",
        );
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(
                SPARE,
                &[EnablePowerOverHdmi, EnableLldpPowerMdi],
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let results = report.results(SPARE);
        assert_eq!(results[0].outcome, Outcome::Proceed);
        assert_eq!(results[0].description, "command not supported");
        assert_eq!(results[1].outcome, Outcome::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_fails_and_powers_port_up() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        fake.fail_on("lanpower port 1/1/2 4pair enable", "ERROR: hardware failure");
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(SPARE, &[TogglePairPower], &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes(&report, SPARE), vec![Outcome::Fail]);
        assert!(report.results(SPARE)[0].description.contains("hardware failure"));

        let sent = session.executor().sent();
        let failed = position(&sent, "lanpower port 1/1/2 4pair enable");
        let up = position(&sent, "lanpower port 1/1/2 admin-state enable");
        assert!(failed < up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_port_is_nothing_to_do() {
        let mut session = connected(FakeSwitch::sample()).await;
        let report = session
            .run_wizard_actions(CAMERA, &[ResetPortPower], &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcomes(&report, CAMERA), vec![Outcome::NothingToDo]);
        assert!(session.executor().sent().iter().all(|c| c.starts_with("show ")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uplink_is_nothing_to_do() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(UPLINK, Need::Never);
        let mut session = connected(fake).await;
        let report = session
            .run_wizard_actions(UPLINK, &[ResetPortPower], &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();
        let latest = report.latest(UPLINK).unwrap();
        assert_eq!(latest.outcome, Outcome::NothingToDo);
        assert!(latest.description.contains("uplink to core-sw"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninitialized_slot_is_powered_first() {
        let mut fake = FakeSwitch::sample();
        fake.set_slot_initialized(SlotId::new(1, 1), false);
        let mut session = connected(fake).await;

        let report = session
            .run_wizard_actions(BT_DEVICE, &[], &AlwaysConfirm, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.results(BT_DEVICE).is_empty());
        assert_eq!(session.executor().sent()[0], "lanpower slot 1/1 service start");
        assert!(session.switch().slot(SlotId::new(1, 1)).unwrap().is_initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_requires_confirmation() {
        let mut session = connected(FakeSwitch::sample()).await;
        let report = session
            .run_wizard_actions(
                BT_DEVICE,
                &[Check8023bt, Enable8023bt],
                &NeverConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcomes(&report, BT_DEVICE), vec![Outcome::Warning]);
        assert!(!session.executor().sent().iter().any(|c| c.contains("8023bt")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_powered_port_keeps_class_detection() {
        let mut session = connected(FakeSwitch::sample()).await;
        let report = session
            .run_poe_wizard(
                BT_DEVICE,
                DeviceProfile::Camera,
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.outcome(BT_DEVICE), Some(Outcome::Ok));
        assert_eq!(
            outcomes(&report, BT_DEVICE),
            vec![Outcome::Fail, Outcome::Warning, Outcome::Ok]
        );

        let sent = session.executor().sent();
        let enable = position(&sent, "lanpower slot 1/1 class-detection enable");
        let bt = position(&sent, "lanpower slot 1/1 8023bt enable");
        assert!(enable < bt);
        assert!(!sent.iter().any(|c| c == "lanpower slot 1/1 class-detection disable"));
        assert!(!sent.iter().any(|c| c == "lanpower port 1/1/3 power 0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_do_still_checks_max_power() {
        let mut fake = FakeSwitch::sample();
        fake.set_max_power(UPLINK, 15000);
        let mut session = connected(fake).await;

        let report = session
            .run_poe_wizard(
                UPLINK,
                DeviceProfile::Other,
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let results = report.results(UPLINK);
        assert_eq!(results[0].outcome, Outcome::NothingToDo);
        assert_eq!(results[1].action, CheckMaxPower.label());
        assert_eq!(results[1].outcome, Outcome::Warning);
        assert_eq!(results[2].action, ChangeMaxPower.label());

        let sent = session.executor().sent();
        let enable = position(&sent, "lanpower slot 1/1 class-detection enable");
        let zero = position(&sent, "lanpower port 1/1/4 power 0");
        let restore = position(&sent, "lanpower slot 1/1 class-detection disable");
        assert!(enable < zero && zero < restore);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_power_pass_after_failed_run() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        fake.set_max_power(SPARE, 15000);
        let mut session = connected(fake).await;

        let report = session
            .run_poe_wizard(
                SPARE,
                DeviceProfile::Other,
                &AlwaysConfirm,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let results = report.results(SPARE);
        let check = results
            .iter()
            .find(|r| r.action == CheckMaxPower.label())
            .unwrap();
        assert_eq!(check.outcome, Outcome::Warning);
        assert_eq!(check.return_value.as_deref(), Some("30000"));
        assert_eq!(report.latest(SPARE).unwrap().action, ChangeMaxPower.label());
        assert_eq!(report.outcome(SPARE), Some(Outcome::Fail));

        let sent = session.executor().sent();
        let zero = position(&sent, "lanpower port 1/1/2 power 0");
        let limited = position(&sent, "lanpower port 1/1/2 power 25000");
        let undo = sent
            .iter()
            .rposition(|c| c == "lanpower port 1/1/2 power 15000")
            .unwrap();
        let restore = position(&sent, "lanpower slot 1/1 class-detection disable");
        assert!(zero < limited && limited < undo && undo < restore);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let mut fake = FakeSwitch::sample();
        fake.set_need(SPARE, Need::Never);
        let mut session = connected(fake).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let err = session
            .run_wizard_actions(SPARE, &[ResetPortPower, TogglePairPower], &AlwaysConfirm, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!session.executor().sent().iter().any(|c| c.contains("4pair")));
    }

    #[test]
    fn test_max_power_messages() {
        assert_eq!(
            capture_mw(&DEFAULT_MAX_POWER, "ERROR: Max power of port 1/1/2 can be set to 30000 mW"),
            Some(30000)
        );
        assert_eq!(
            capture_mw(&ALLOWED_MAX_POWER, "ERROR: power not exceed 25000 when 802.3bt is disabled"),
            Some(25000)
        );
        assert_eq!(capture_mw(&DEFAULT_MAX_POWER, "ERROR: not supported"), None);
    }
}
