//! Builder for switch sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Session;
use crate::dispatch::Dispatcher;
use crate::error::{Result, SessionError};
use crate::progress::{LogProgress, ProgressSink};
use crate::settings::WizardSettings;
use crate::snapshot::{MemorySnapshotStore, SnapshotStore};
use crate::transport::{HostKeyVerification, RestTransport, SshTransport, SwitchConfig};

/// Builder for constructing switch sessions.
///
/// # Example
///
/// ```rust,no_run
/// use poewiz::SessionBuilder;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), poewiz::Error> {
/// let mut session = SessionBuilder::new("192.168.1.10")
///     .username("admin")
///     .password("switch")
///     .build()?;
///
/// session.connect(&CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    username: Option<String>,
    password: String,
    rest_port: u16,
    ssh_port: u16,
    timeout: Duration,
    terminal_width: u32,
    terminal_height: u32,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    sink: Arc<dyn ProgressSink>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: WizardSettings,
}

impl SessionBuilder {
    /// Create a new session builder for the specified switch.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: String::new(),
            rest_port: 443,
            ssh_port: 22,
            timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            sink: Arc::new(LogProgress),
            snapshots: Arc::new(MemorySnapshotStore::default()),
            settings: WizardSettings::default(),
        }
    }

    /// Set the username for REST and SSH logins.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the HTTPS port of the management API (default: 443).
    pub fn rest_port(mut self, port: u16) -> Self {
        self.rest_port = port;
        self
    }

    /// Set the SSH port (default: 22).
    pub fn ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Set the connect and per-command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set terminal dimensions of the SSH shell.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Where progress events go (default: the log).
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Where configuration snapshots are kept (default: memory).
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = store;
        self
    }

    pub fn settings(mut self, settings: WizardSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the session.
    ///
    /// This does not connect. Call `connect()` on the returned session.
    pub fn build(self) -> Result<Session<Dispatcher<RestTransport, SshTransport>>> {
        let username = self
            .username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SessionError::InvalidConfig {
                message: "Username is required".to_string(),
            })?;
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig {
                message: "Host is required".to_string(),
            }
            .into());
        }

        let mut config = SwitchConfig::new(self.host.clone(), username, self.password);
        config.rest_port = self.rest_port;
        config.ssh_port = self.ssh_port;
        config.timeout = self.timeout;
        config.terminal_width = self.terminal_width;
        config.terminal_height = self.terminal_height;
        config.host_key_verification = self.host_key_verification;
        config.known_hosts_path = self.known_hosts_path;

        let dispatcher = Dispatcher::new(
            self.host.clone(),
            RestTransport::new(config.clone()),
            SshTransport::new(config),
        );
        Ok(Session::new(
            dispatcher,
            self.host,
            self.sink,
            self.snapshots,
            self.settings,
        ))
    }
}
