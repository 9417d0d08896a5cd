//! Transports that carry a rendered command to the switch.
//!
//! Two transports exist: the HTTPS management API ([`RestTransport`], the
//! primary route) and the interactive CLI over SSH ([`SshTransport`], the
//! secondary route). Both return the raw text the switch produced; parsing
//! happens in [`crate::normalize`].

use std::future::Future;

pub mod config;
mod reply;
mod rest;
mod ssh;

pub use config::{HostKeyVerification, SwitchConfig};
pub use reply::Reply;
pub use rest::RestTransport;
pub use ssh::SshTransport;

use crate::command::Route;
use crate::error::Result;

/// A connection to the switch that can run one command at a time.
pub trait Transport: Send {
    /// Which route this transport serves.
    fn route(&self) -> Route;

    /// Check if the transport has an open session.
    fn is_open(&self) -> bool;

    /// Open the session. A no-op when already open.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one rendered command and return the raw reply.
    ///
    /// A device-reported failure is carried in [`Reply::error`]; only
    /// transport failures are returned as `Err`.
    fn send(&mut self, command: &str) -> impl Future<Output = Result<Reply>> + Send;

    /// Close the session.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
