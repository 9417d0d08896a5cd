//! Switch connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

/// Connection settings shared by the REST and SSH transports.
#[derive(Debug)]
pub struct SwitchConfig {
    /// Switch management address.
    pub host: String,

    /// Login name, used for both REST and SSH.
    pub username: String,

    /// Login password.
    pub password: SecretString,

    /// HTTPS port of the management API (default: 443).
    pub rest_port: u16,

    /// SSH port (default: 22).
    pub ssh_port: u16,

    /// Connect and per-command timeout.
    pub timeout: Duration,

    /// Terminal width for the SSH PTY.
    pub terminal_width: u32,

    /// Terminal height for the SSH PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SwitchConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            rest_port: 443,
            ssh_port: 22,
            timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Base URL of the management API.
    pub fn base_url(&self) -> String {
        if self.rest_port == 443 {
            format!("https://{}", self.host)
        } else {
            format!("https://{}:{}", self.host, self.rest_port)
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl Clone for SwitchConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            username: self.username.clone(),
            password: SecretString::from(self.password().to_string()),
            rest_port: self.rest_port,
            ssh_port: self.ssh_port,
            timeout: self.timeout,
            terminal_width: self.terminal_width,
            terminal_height: self.terminal_height,
            host_key_verification: self.host_key_verification.clone(),
            known_hosts_path: self.known_hosts_path.clone(),
        }
    }
}
