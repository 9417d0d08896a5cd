//! Interactive CLI transport over SSH, using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use regex::bytes::Regex;
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use tokio::time::Instant;

use super::config::{HostKeyVerification, SwitchConfig};
use super::{Reply, Transport};
use crate::channel::PatternBuffer;
use crate::command::Route;
use crate::error::{Result, SessionError, TransportError};
use crate::platform::{self, CliPlatform};

/// SSH transport driving the switch's `->` shell.
///
/// Used for commands the management API cannot run and for enabling the
/// API on switches where it is turned off.
pub struct SshTransport {
    config: SwitchConfig,
    platform: CliPlatform,
    session: Option<Handle<SshHandler>>,
    channel: Option<Channel<Msg>>,
    buffer: PatternBuffer,
}

impl SshTransport {
    pub fn new(config: SwitchConfig) -> Self {
        Self::with_platform(config, platform::aos())
    }

    pub fn with_platform(config: SwitchConfig, platform: CliPlatform) -> Self {
        Self {
            config,
            platform,
            session: None,
            channel: None,
            buffer: PatternBuffer::default(),
        }
    }

    async fn connect(&self) -> Result<Handle<SshHandler>> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(self.config.timeout * 10),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: self.config.host.clone(),
            port: self.config.ssh_port,
            host_key_verification: self.config.host_key_verification.clone(),
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let session = tokio::time::timeout(
            self.config.timeout,
            client::connect(
                ssh_config,
                (self.config.host.as_str(), self.config.ssh_port),
                handler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.config.timeout))?
        .map_err(|e| {
            // Prefer the detailed error stored by check_server_key.
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(io)) => TransportError::ConnectionFailed {
                    host: self.config.host.clone(),
                    reason: io.to_string(),
                },
                (None, e) => TransportError::Ssh(e),
            }
        })?;

        Ok(session)
    }

    async fn authenticate(&self, session: &mut Handle<SshHandler>) -> Result<()> {
        let success = session
            .authenticate_password(&self.config.username, self.config.password())
            .await
            .map_err(TransportError::Ssh)?
            .success();

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: self.config.username.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn open_channel(&self, session: &Handle<SshHandler>) -> Result<Channel<Msg>> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Read until the prompt shows up in the tail of the buffer.
    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<String> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        let deadline = Instant::now() + timeout;
        self.buffer.clear();

        while !self.buffer.tail_contains(&self.platform.prompt) {
            let msg = tokio::time::timeout_at(deadline, channel.wait())
                .await
                .map_err(|_| TransportError::Timeout(timeout))?;
            match msg {
                Some(ChannelMsg::Data { ref data }) => self.buffer.extend(data),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => self.buffer.extend(data),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    self.channel = None;
                    return Err(TransportError::ConnectionDropped.into());
                }
                Some(_) => {}
            }
        }

        let raw = self.buffer.take();
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        channel
            .data(text.as_bytes())
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Drop the echoed command and the trailing prompt line.
fn clean_output(raw: &str, command: &str, prompt: &Regex) -> String {
    let mut lines: Vec<&str> = raw.lines().map(|l| l.trim_end_matches('\r')).collect();
    if lines
        .last()
        .is_some_and(|last| prompt.is_match(last.as_bytes()))
    {
        lines.pop();
    }
    if lines
        .first()
        .is_some_and(|first| first.trim_end().ends_with(command.trim()))
    {
        lines.remove(0);
    }
    lines.join("\n")
}

impl Transport for SshTransport {
    fn route(&self) -> Route {
        Route::Secondary
    }

    fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let mut session = self.connect().await?;
        self.authenticate(&mut session).await?;
        let channel = self.open_channel(&session).await?;
        self.session = Some(session);
        self.channel = Some(channel);

        self.read_until_prompt(self.config.timeout).await?;
        for command in self.platform.on_open_commands.clone() {
            self.send(&command).await?;
        }
        info!("SSH session open on {}", self.config.host);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<Reply> {
        let start = Instant::now();
        self.write(&format!("{command}\n")).await?;
        let raw = self.read_until_prompt(self.config.timeout).await?;
        let output = clean_output(&raw, command, &self.platform.prompt);
        let elapsed = start.elapsed();

        Ok(match self.platform.failure(&output) {
            Some(line) => {
                let error = line.to_string();
                Reply::failed(command, output, elapsed, error)
            }
            None => Reply::new(command, output, elapsed),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            for command in self.platform.on_close_commands.clone() {
                // The shell closes on exit; no prompt follows.
                let _ = channel.data(format!("{command}\n").as_bytes()).await;
            }
            let _ = channel.close().await;
        }
        if let Some(session) = self.session.take() {
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
            debug!("SSH session closed on {}", self.config.host);
        }
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "SSH session to {} dropped without close(); the switch will time it out",
                self.config.host
            );
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error for connect() to surface instead of the
    /// generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// `Ok(true)` if matched, `Ok(false)` if the host is unknown.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(match self.host_key_verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        })
    }
}
