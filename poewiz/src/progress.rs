//! Progress reporting.
//!
//! Long operations push [`ProgressEvent`]s to a [`ProgressSink`] instead of
//! returning intermediate values. A UI typically holds the receiving end of
//! an unbounded channel.

use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressKind {
    Info,
    Warning,
    Error,
    /// Carries a percentage.
    Value,
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub title: String,
    pub message: String,
    pub percent: Option<f64>,
}

impl ProgressEvent {
    fn new(kind: ProgressKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            percent: None,
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Error, title, message)
    }

    pub fn value(title: impl Into<String>, message: impl Into<String>, percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Self::new(ProgressKind::Value, title, message)
        }
    }
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver means nobody is watching any more.
        let _ = self.send(event);
    }
}

/// Sink that writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event.kind {
            ProgressKind::Error => error!("{}: {}", event.title, event.message),
            ProgressKind::Warning => warn!("{}: {}", event.title, event.message),
            ProgressKind::Info => info!("{}: {}", event.title, event.message),
            ProgressKind::Value => info!(
                "{}: {} ({:.0}%)",
                event.title,
                event.message,
                event.percent.unwrap_or_default()
            ),
        }
    }
}

/// Step counter against a total declared once per top-level operation.
///
/// Nested operations call [`start`](Self::start) too; only the outermost
/// call sets the total. The counter never goes backwards and never passes
/// the total.
pub struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    total: u32,
    done: u32,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            total: 0,
            done: 0,
        }
    }

    /// Declare the total. Returns `false` when an operation is already running.
    pub fn start(&mut self, total: u32) -> bool {
        if self.total > 0 {
            return false;
        }
        self.total = total.max(1);
        self.done = 0;
        true
    }

    /// End the operation if `owner` started it.
    pub fn finish(&mut self, owner: bool) {
        if owner {
            self.total = 0;
            self.done = 0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.total > 0
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn done(&self) -> u32 {
        self.done
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.done) * 100.0 / f64::from(self.total)
    }

    /// Count `steps` units of work and emit a value event.
    pub fn advance(&mut self, steps: u32, title: &str, message: &str) {
        self.done = self.done.saturating_add(steps).min(self.total);
        let percent = self.percent();
        self.sink
            .report(ProgressEvent::value(title, message, percent));
    }

    /// The sink this tracker reports to.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingProgress;

    #[test]
    fn test_outer_start_owns_total() {
        let sink = Arc::new(RecordingProgress::default());
        let mut tracker = ProgressTracker::new(sink.clone());
        assert!(tracker.start(25));
        assert!(!tracker.start(20));
        assert_eq!(tracker.total(), 25);

        tracker.finish(false);
        assert!(tracker.is_active());
        tracker.finish(true);
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_advance_clamps_to_total() {
        let sink = Arc::new(RecordingProgress::default());
        let mut tracker = ProgressTracker::new(sink.clone());
        tracker.start(4);
        tracker.advance(3, "Scan", "ports");
        tracker.advance(3, "Scan", "lanpower");
        assert_eq!(tracker.done(), 4);

        let percents: Vec<f64> = sink
            .events()
            .iter()
            .filter_map(|e| e.percent)
            .collect();
        assert_eq!(percents, vec![75.0, 100.0]);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(ProgressEvent::warning("Scan", "slot 1/2 has no PoE"));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ProgressKind::Warning);
        drop(rx);
        tx.report(ProgressEvent::info("Scan", "ignored"));
    }
}
