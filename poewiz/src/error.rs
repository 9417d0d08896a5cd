//! Error types for poewiz.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Device error fragments that mean "this feature is absent".
///
/// These come straight from switch firmware output and vary between
/// releases. They are matched verbatim.
pub const NOT_SUPPORTED: &str = "not supported";
const INVALID_ENTRY: &str = "invalid entry";
const LANPOWER: &str = "lanpower";
const LANPOWER_NOT_SUPPORTED: &str = "lanpower not supported";
const INVALID_ENTRY_LANPOWER: &str = "invalid entry: \"lanpower\"";
const INCORRECT_INDEX: &str = "incorrect index";

/// Main error type for poewiz operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (REST or SSH)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Errors reported by the switch for a single command
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Session-level errors (lookup, state, configuration)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Device output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

/// Transport layer errors (connection, authentication, I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Host unreachable or session could not be established
    #[error("Connection failed to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    /// An established session went away
    #[error("Connection dropped")]
    ConnectionDropped,

    /// Credentials rejected
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Login reached the switch but did not produce a usable session
    #[error("Login failed for user '{user}': {reason}")]
    LoginFailed { user: String, reason: String },

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// HTTP error from the management API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Host key differs from the one in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts (strict mode)
    #[error("Host {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors reported by the device for a single command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The switch does not recognize the operation on this hardware/firmware
    #[error("'{command}' not supported: {message}")]
    NotSupported { command: String, message: String },

    /// The switch rejected the request for another reason
    #[error("'{command}' failed: {message}")]
    Rejected { command: String, message: String },
}

/// Session errors (state and lookups).
#[derive(Error, Debug)]
pub enum SessionError {
    /// No open session - call connect() first
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// Port not found in the topology
    #[error("Unknown port '{0}'")]
    UnknownPort(String),

    /// Slot not found in the topology
    #[error("Unknown slot '{0}'")]
    UnknownSlot(String),

    /// Invalid builder configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// REST cannot be enabled because an external server authenticates logins
    #[error("Authentication is delegated to {server}; enable the REST API on the switch manually")]
    ExternalAuthentication { server: String },

    /// Operation refused in the current state of the switch
    #[error("{0}")]
    Refused(String),
}

/// Device output parse errors.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed port or slot identifier
    #[error("Invalid port identifier '{0}'")]
    InvalidPortId(String),

    /// Field expected to be numeric
    #[error("Invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: String, value: String },

    /// Field missing from a record
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// Response did not have the declared shape
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

impl Error {
    /// Text reported by the device, if this is a device error.
    pub fn device_message(&self) -> Option<&str> {
        match self {
            Error::Command(CommandError::NotSupported { message, .. })
            | Error::Command(CommandError::Rejected { message, .. }) => Some(message),
            _ => None,
        }
    }

    /// The switch does not support the command.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Error::Command(CommandError::NotSupported { .. }))
    }

    /// The switch could not be reached or the session was lost.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(
                TransportError::ConnectionFailed { .. }
                    | TransportError::ConnectionDropped
                    | TransportError::Timeout(_)
            )
        )
    }

    /// Credentials were rejected or the login did not complete.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(
                TransportError::AuthenticationFailed { .. } | TransportError::LoginFailed { .. }
            )
        )
    }

    /// The switch rejected the username or password.
    pub fn is_bad_credentials(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        )
    }

    /// A chassis-level PoE probe failed because the chassis has no PoE.
    pub fn chassis_lacks_poe(&self) -> bool {
        self.device_message().is_some_and(|msg| {
            let msg = msg.to_lowercase();
            msg.contains(LANPOWER) && (msg.contains(NOT_SUPPORTED) || msg.contains(INVALID_ENTRY))
        })
    }

    /// A slot-level PoE probe failed because the slot has no PoE.
    pub fn slot_lacks_poe(&self) -> bool {
        self.device_message().is_some_and(|msg| {
            let msg = msg.to_lowercase();
            msg.contains(LANPOWER_NOT_SUPPORTED)
                || msg.contains(INVALID_ENTRY_LANPOWER)
                || msg.contains(INCORRECT_INDEX)
        })
    }
}

/// Classify a device-reported error message for `command`.
pub fn classify_device_error(command: &str, message: &str) -> CommandError {
    if message.to_lowercase().contains(NOT_SUPPORTED) {
        CommandError::NotSupported {
            command: command.to_string(),
            message: message.to_string(),
        }
    } else {
        CommandError::Rejected {
            command: command.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias using poewiz's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> Error {
        classify_device_error("show lanpower slot 1/1", message).into()
    }

    #[test]
    fn test_not_supported_classification() {
        let err = rejected("ERROR: Command Not Supported on this platform");
        assert!(err.is_not_supported());

        let err = rejected("ERROR: Invalid entry: \"foo\"");
        assert!(!err.is_not_supported());
    }

    #[test]
    fn test_slot_lacks_poe() {
        assert!(rejected("ERROR: Lanpower not supported on slot 1/2").slot_lacks_poe());
        assert!(rejected("ERROR: Invalid entry: \"lanpower\"").slot_lacks_poe());
        assert!(rejected("ERROR: Incorrect index").slot_lacks_poe());
        assert!(!rejected("ERROR: timeout waiting for NI").slot_lacks_poe());
    }

    #[test]
    fn test_chassis_lacks_poe() {
        assert!(rejected("ERROR: lanpower is not supported").chassis_lacks_poe());
        assert!(rejected("ERROR: Invalid entry: \"lanpower\"").chassis_lacks_poe());
        assert!(!rejected("ERROR: not supported").chassis_lacks_poe());
    }

    #[test]
    fn test_connection_classification() {
        let err: Error = TransportError::ConnectionDropped.into();
        assert!(err.is_connection_failure());
        assert!(!err.is_auth_failure());

        let err: Error = TransportError::AuthenticationFailed {
            user: "admin".into(),
        }
        .into();
        assert!(err.is_auth_failure());
        assert!(err.is_bad_credentials());
        assert!(err.device_message().is_none());

        let err: Error = TransportError::LoginFailed {
            user: "admin".into(),
            reason: "HTTP 404".into(),
        }
        .into();
        assert!(err.is_auth_failure());
        assert!(!err.is_bad_credentials());
    }
}
