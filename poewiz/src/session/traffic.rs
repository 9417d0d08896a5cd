//! Port traffic analysis.
//!
//! Samples the interface counters twice, `duration` apart, and reports the
//! per-port byte deltas. The run can be stopped early from another task
//! through the session's [`TrafficControl`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::info;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::command::{Command, CommandId, Fields};
use crate::dispatch::Executor;
use crate::error::{Result, SessionError};
use crate::poller::Poller;
use crate::progress::ProgressEvent;
use crate::topology::PortId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficStatus {
    #[default]
    Idle,
    Running,
    Completed,
    /// Ended early through [`TrafficControl::stop`].
    Stopped,
    Cancelled,
}

#[derive(Debug, Default)]
struct TrafficState {
    status: TrafficStatus,
    reason: Option<String>,
    stop: Option<CancellationToken>,
}

/// Shared handle on the traffic analysis of one session.
#[derive(Debug, Clone, Default)]
pub struct TrafficControl {
    state: Arc<Mutex<TrafficState>>,
}

impl TrafficControl {
    fn lock(&self) -> MutexGuard<'_, TrafficState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> TrafficStatus {
        self.lock().status
    }

    /// Why the last run was stopped, if it was.
    pub fn reason(&self) -> Option<String> {
        self.lock().reason.clone()
    }

    /// End a running analysis early. No effect when idle.
    pub fn stop(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.status != TrafficStatus::Running {
            return;
        }
        state.status = TrafficStatus::Stopped;
        state.reason = Some(reason.into());
        if let Some(token) = state.stop.take() {
            token.cancel();
        }
    }

    fn begin(&self, stop: CancellationToken) -> bool {
        let mut state = self.lock();
        if state.status == TrafficStatus::Running {
            return false;
        }
        *state = TrafficState {
            status: TrafficStatus::Running,
            reason: None,
            stop: Some(stop),
        };
        true
    }

    fn end(&self, status: TrafficStatus) -> TrafficStatus {
        let mut state = self.lock();
        state.stop = None;
        if state.status == TrafficStatus::Running {
            state.status = status;
        }
        state.status
    }
}

/// Bytes moved by one port during the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTraffic {
    pub port: PortId,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficReport {
    pub status: TrafficStatus,
    pub elapsed: Duration,
    pub reason: Option<String>,
    /// Ports that moved traffic, busiest first.
    pub ports: Vec<PortTraffic>,
}

fn counters(data: &crate::command::CommandResult) -> Result<Vec<PortTraffic>> {
    let mut ports = vec![];
    for rec in data.records() {
        let id = ["Port", "Chas/Slot/Port"]
            .iter()
            .find_map(|name| rec.field(name))
            .unwrap_or("");
        let Ok(port) = id.trim().parse::<PortId>() else {
            continue;
        };
        ports.push(PortTraffic {
            port,
            rx_bytes: rec.count("InOctets")?.unwrap_or_default(),
            tx_bytes: rec.count("OutOctets")?.unwrap_or_default(),
        });
    }
    Ok(ports)
}

impl<E: Executor> Session<E> {
    async fn sample_counters(&mut self) -> Result<Vec<PortTraffic>> {
        let data = self
            .execute(&Command::new(CommandId::ShowInterfaceCounters))
            .await?;
        counters(&data)
    }

    /// Measure per-port traffic over `duration`.
    pub async fn start_traffic_analysis(
        &mut self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<TrafficReport> {
        let stop = cancel.child_token();
        if !self.traffic.begin(stop.clone()) {
            return Err(SessionError::Refused(
                "traffic analysis is already running".to_string(),
            )
            .into());
        }
        let title = format!("Traffic analysis on {}", self.switch.ip);
        info!("{title} for {duration:?}");
        let start = Instant::now();

        let before = match self.sample_counters().await {
            Ok(sample) => sample,
            Err(e) => {
                self.traffic.end(TrafficStatus::Cancelled);
                return Err(e);
            }
        };
        Poller::new(self.sink(), stop).pause(&title, duration).await;

        if cancel.is_cancelled() {
            let status = self.traffic.end(TrafficStatus::Cancelled);
            return Ok(TrafficReport {
                status,
                elapsed: start.elapsed(),
                reason: self.traffic.reason(),
                ports: vec![],
            });
        }

        let after = self.sample_counters().await;
        let status = self.traffic.end(TrafficStatus::Completed);
        let after = after?;

        let mut ports: Vec<PortTraffic> = after
            .iter()
            .filter_map(|end| {
                let begin = before.iter().find(|b| b.port == end.port)?;
                Some(PortTraffic {
                    port: end.port,
                    rx_bytes: end.rx_bytes.saturating_sub(begin.rx_bytes),
                    tx_bytes: end.tx_bytes.saturating_sub(begin.tx_bytes),
                })
            })
            .filter(|p| p.rx_bytes > 0 || p.tx_bytes > 0)
            .collect();
        ports.sort_by_key(|p| std::cmp::Reverse(p.rx_bytes + p.tx_bytes));

        self.report(ProgressEvent::info(
            &title,
            format!("{} active ports", ports.len()),
        ));
        Ok(TrafficReport {
            status,
            elapsed: start.elapsed(),
            reason: self.traffic.reason(),
            ports,
        })
    }
}
