//! Convergence polling.
//!
//! Hardware changes (a port coming up, a slot powering on, a debug level
//! being applied) take seconds to settle. [`Poller::wait_until`] ticks every
//! `sample` interval, reporting progress on each tick, and only queries the
//! device every `recheck` interval. It returns once the probe has held true
//! on `required` consecutive rechecks, when the timeout expires, or when
//! the operation is cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::progress::{ProgressEvent, ProgressSink};

/// Cadence and thresholds for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub timeout: Duration,
    pub sample: Duration,
    pub recheck: Duration,
    pub required: u32,
}

impl Convergence {
    /// 1 s sample, 5 s recheck, one positive recheck.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sample: Duration::from_secs(1),
            recheck: Duration::from_secs(5),
            required: 1,
        }
    }

    pub fn secs(timeout: u64) -> Self {
        Self::new(Duration::from_secs(timeout))
    }

    pub fn required(mut self, required: u32) -> Self {
        self.required = required.max(1);
        self
    }

    pub fn cadence(mut self, sample: Duration, recheck: Duration) -> Self {
        self.sample = sample;
        self.recheck = recheck;
        self
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Converged(Duration),
    TimedOut(Duration),
    Cancelled(Duration),
}

impl WaitOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, WaitOutcome::Converged(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitOutcome::Cancelled(_))
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Converged(d) | WaitOutcome::TimedOut(d) | WaitOutcome::Cancelled(d) => *d,
        }
    }
}

/// First boundary `from + k * step` (k >= 1) strictly after `now`.
fn next_boundary(from: Instant, step: Duration, now: Instant) -> Instant {
    let mut at = from + step;
    while at <= now {
        at += step;
    }
    at
}

/// Cancellable timer shared by the scan pipeline and the wizard engine.
#[derive(Clone)]
pub struct Poller {
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(sink: Arc<dyn ProgressSink>, cancel: CancellationToken) -> Self {
        Self { sink, cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn tick_report(&self, label: &str, elapsed: Duration) {
        self.sink.report(ProgressEvent::info(
            label,
            format!("{label} ({} sec)", elapsed.as_secs()),
        ));
    }

    /// Sleep until `at`. Returns `false` if cancelled.
    async fn tick_until(&self, at: Instant) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(at) => true,
        }
    }

    /// Wait until `probe` holds on `conv.required` consecutive rechecks.
    ///
    /// Sample ticks and rechecks sit on fixed boundaries measured from the
    /// start of the wait, so a slow probe delays nothing but itself. The
    /// probe gets exclusive access to `state` each time it runs. A timeout
    /// is not an error; the caller decides what it means.
    pub async fn wait_until<S, F>(
        &self,
        state: &mut S,
        label: &str,
        conv: Convergence,
        mut probe: F,
    ) -> Result<WaitOutcome>
    where
        S: Send,
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<bool>> + Send,
    {
        let sample = conv.sample.max(Duration::from_millis(1));
        let recheck = conv.recheck.max(sample);
        let start = Instant::now();
        let deadline = start + conv.timeout;
        let mut next_tick = start + sample;
        let mut next_recheck = start + recheck;
        let mut hits: u32 = 0;

        loop {
            if self.cancel.is_cancelled() || !self.tick_until(next_tick).await {
                return Ok(WaitOutcome::Cancelled(start.elapsed()));
            }
            self.tick_report(label, start.elapsed());

            let now = Instant::now();
            if now >= next_recheck {
                next_recheck = next_boundary(next_recheck, recheck, now);
                let budget = (deadline + sample).saturating_duration_since(now);
                if budget.is_zero() {
                    return Ok(WaitOutcome::TimedOut(start.elapsed()));
                }
                match tokio::time::timeout(budget, probe(&mut *state)).await {
                    Ok(held) => {
                        if held? {
                            hits += 1;
                            if hits >= conv.required {
                                return Ok(WaitOutcome::Converged(start.elapsed()));
                            }
                        } else {
                            hits = 0;
                        }
                    }
                    Err(_) => return Ok(WaitOutcome::TimedOut(start.elapsed())),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut(start.elapsed()));
            }
            next_tick = next_boundary(next_tick, sample, now);
        }
    }

    /// Plain cancellable wait with a progress report every sample tick.
    pub async fn pause(&self, label: &str, duration: Duration) -> WaitOutcome {
        let start = Instant::now();
        let end = start + duration;
        let mut next = start;
        while Instant::now() < end {
            next = (next + Duration::from_secs(1)).min(end);
            if self.cancel.is_cancelled() || !self.tick_until(next).await {
                return WaitOutcome::Cancelled(start.elapsed());
            }
            self.tick_report(label, start.elapsed());
        }
        WaitOutcome::TimedOut(start.elapsed())
    }
}
