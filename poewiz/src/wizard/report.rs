//! Wizard run reports.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::topology::PortId;

/// State of one wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Starting,
    /// Not resolved yet; the run moves on.
    Proceed,
    /// A change is needed and waits for confirmation.
    Warning,
    Skip,
    NothingToDo,
    Fail,
    /// The port is powered. Terminal for the run.
    Ok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub action: String,
    pub outcome: Outcome,
    pub description: String,
    pub elapsed: Duration,
    pub alert: Option<String>,
    /// Value handed to the following action, e.g. a max-power ceiling in mW.
    pub return_value: Option<String>,
}

impl ReportResult {
    fn starting(action: &str) -> Self {
        Self {
            action: action.to_string(),
            outcome: Outcome::Starting,
            description: String::new(),
            elapsed: Duration::ZERO,
            alert: None,
            return_value: None,
        }
    }
}

/// What an action concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub description: String,
    pub alert: Option<String>,
    pub return_value: Option<String>,
}

impl Verdict {
    pub fn new(outcome: Outcome, description: impl Into<String>) -> Self {
        Self {
            outcome,
            description: description.into(),
            alert: None,
            return_value: None,
        }
    }

    pub fn alert(mut self, alert: impl Into<String>) -> Self {
        self.alert = Some(alert.into());
        self
    }

    pub fn returning(mut self, value: impl Into<String>) -> Self {
        self.return_value = Some(value.into());
        self
    }
}

/// Per-port trail of wizard steps, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardReport {
    ports: IndexMap<PortId, Vec<ReportResult>>,
}

impl WizardReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a `Starting` entry for `action`. Refused once the port is `Ok`.
    pub fn begin(&mut self, port: PortId, action: &str) -> bool {
        if self.is_stopped(port) {
            return false;
        }
        self.ports
            .entry(port)
            .or_default()
            .push(ReportResult::starting(action));
        true
    }

    /// Settle the latest `Starting` entry of `port`.
    pub fn complete(&mut self, port: PortId, verdict: Verdict, elapsed: Duration) {
        let Some(entry) = self
            .ports
            .get_mut(&port)
            .and_then(|results| results.last_mut())
            .filter(|r| r.outcome == Outcome::Starting)
        else {
            return;
        };
        entry.outcome = verdict.outcome;
        entry.description = verdict.description;
        entry.alert = verdict.alert;
        entry.return_value = verdict.return_value;
        entry.elapsed = elapsed;
    }

    /// The run for `port` reached `Ok`.
    pub fn is_stopped(&self, port: PortId) -> bool {
        self.latest(port).is_some_and(|r| r.outcome == Outcome::Ok)
    }

    pub fn latest(&self, port: PortId) -> Option<&ReportResult> {
        self.ports.get(&port).and_then(|results| results.last())
    }

    pub fn outcome(&self, port: PortId) -> Option<Outcome> {
        self.latest(port).map(|r| r.outcome)
    }

    pub fn return_value(&self, port: PortId) -> Option<&str> {
        self.latest(port).and_then(|r| r.return_value.as_deref())
    }

    pub fn results(&self, port: PortId) -> &[ReportResult] {
        self.ports.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.ports.keys().copied()
    }
}

impl fmt::Display for WizardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (port, results) in &self.ports {
            writeln!(f, "Port {port}")?;
            for r in results {
                write!(f, "  {:<28} {:?}", r.action, r.outcome)?;
                if !r.elapsed.is_zero() {
                    write!(f, " ({} sec)", r.elapsed.as_secs())?;
                }
                if !r.description.is_empty() {
                    write!(f, ": {}", r.description)?;
                }
                writeln!(f)?;
                if let Some(alert) = &r.alert {
                    writeln!(f, "    ! {alert}")?;
                }
            }
        }
        Ok(())
    }
}
