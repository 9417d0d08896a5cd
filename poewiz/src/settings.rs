//! Tunables for scans and wizard runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::Convergence;
use crate::topology::{MAX_MACS_PER_PORT, MIN_POWER_CONSUMPTION_MW};

/// Timing and threshold settings. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardSettings {
    /// Minimum draw (mW) for a port to count as powered.
    pub min_power_mw: f64,
    /// Port-up wait after a power cycle.
    pub port_up_wait: u64,
    pub sample_interval: u64,
    pub recheck_interval: u64,
    /// Consecutive positive port checks required.
    pub port_up_checks: u32,
    pub slot_power_wait: u64,
    pub debug_level_wait: u64,
    /// Pause between powering a port down and up again.
    pub power_cycle_pause: u64,
    /// Grace period for a transient conflict or a healthy port.
    pub settle_wait: u64,
    pub max_macs_per_port: usize,
    pub wait: ActionWaits,
}

/// Convergence wait per remediation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionWaits {
    pub capacitor_detection: u64,
    pub two_pair: u64,
    pub reset: u64,
    pub default: u64,
}

impl Default for ActionWaits {
    fn default() -> Self {
        Self {
            capacitor_detection: 60,
            two_pair: 30,
            reset: 30,
            default: 15,
        }
    }
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            min_power_mw: MIN_POWER_CONSUMPTION_MW,
            port_up_wait: 30,
            sample_interval: 1,
            recheck_interval: 5,
            port_up_checks: 3,
            slot_power_wait: 50,
            debug_level_wait: 30,
            power_cycle_pause: 5,
            settle_wait: 5,
            max_macs_per_port: MAX_MACS_PER_PORT,
            wait: ActionWaits::default(),
        }
    }
}

impl WizardSettings {
    /// Convergence for `timeout` seconds with the configured cadence.
    pub fn convergence(&self, timeout: u64) -> Convergence {
        Convergence::secs(timeout).cadence(
            Duration::from_secs(self.sample_interval.max(1)),
            Duration::from_secs(self.recheck_interval.max(1)),
        )
    }

    /// Convergence for a port coming up.
    pub fn port_up(&self, timeout: u64) -> Convergence {
        self.convergence(timeout).required(self.port_up_checks)
    }
}
