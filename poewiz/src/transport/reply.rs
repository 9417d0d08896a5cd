//! Raw reply from a transport.

use std::time::Duration;

/// What the switch sent back for one command.
#[derive(Debug, Clone)]
pub struct Reply {
    /// The command that was sent.
    pub command: String,

    /// Output text (command echo and trailing prompt removed).
    pub output: String,

    /// Device-reported error text, if the command failed.
    pub error: Option<String>,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Reply {
    pub fn new(command: impl Into<String>, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            error: None,
            elapsed,
        }
    }

    pub fn failed(
        command: impl Into<String>,
        output: impl Into<String>,
        elapsed: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(command, output, elapsed)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{error}"),
            None => write!(f, "{}", self.output),
        }
    }
}
