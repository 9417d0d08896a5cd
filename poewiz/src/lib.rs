//! # poewiz
//!
//! Async manager for PoE access switches.
//!
//! poewiz talks to a switch over its HTTPS management API and, for the few
//! operations the API does not carry, over an interactive SSH CLI. On top of
//! that it keeps a topology model of the switch (chassis, slots, ports and
//! their PoE state) and runs a remediation wizard that works through a
//! sequence of fixes until a non-powered port comes up.
//!
//! ## Features
//!
//! - One `execute(command)` entry point with static REST/SSH routing
//! - Table, key/value and grouped CLI output normalized into records
//! - Cancellable topology scan with weighted progress reporting
//! - Convergence polling for ports, slots and debug levels
//! - PoE remediation wizard with confirmation hooks and compensation
//! - Configuration snapshots with per-scan change detection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use poewiz::{AlwaysConfirm, DeviceProfile, PortId, SessionBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), poewiz::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.10")
//!         .username("admin")
//!         .password("switch")
//!         .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     session.connect(&cancel).await?;
//!
//!     let port = PortId::new(1, 1, 12);
//!     let report = session
//!         .run_poe_wizard(port, DeviceProfile::Camera, &AlwaysConfirm, &cancel)
//!         .await?;
//!     println!("{report}");
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod platform;
pub mod poller;
pub mod progress;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod topology;
pub mod transport;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use command::{Command, CommandId, CommandResult};
pub use dispatch::{Dispatcher, Executor};
pub use error::{Error, Result};
pub use poller::{Convergence, WaitOutcome};
pub use progress::{LogProgress, ProgressEvent, ProgressKind, ProgressSink};
pub use session::{ScanOutcome, Session, SessionBuilder, SlotFeature};
pub use settings::WizardSettings;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use topology::{PortId, SlotId, Switch};
pub use transport::{HostKeyVerification, SwitchConfig};
pub use wizard::{
    AlwaysConfirm, Confirm, DeviceProfile, NeverConfirm, Outcome, RemediationAction,
    WizardReport,
};
