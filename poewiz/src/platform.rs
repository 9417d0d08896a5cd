//! CLI platform definition for the switch's interactive shell.

use regex::bytes::Regex;

/// Prompt and failure patterns for an interactive CLI.
#[derive(Debug, Clone)]
pub struct CliPlatform {
    /// Platform name.
    pub name: String,

    /// Prompt pattern, matched against the tail of the output.
    pub prompt: Regex,

    /// Output fragments that mean the command failed.
    pub failed_when_contains: Vec<String>,

    /// Commands to run once the shell is ready.
    pub on_open_commands: Vec<String>,

    /// Commands to run before the connection is closed.
    pub on_close_commands: Vec<String>,
}

impl CliPlatform {
    pub fn new(name: impl Into<String>, prompt: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            prompt: Regex::new(prompt)?,
            failed_when_contains: vec![],
            on_open_commands: vec![],
            on_close_commands: vec![],
        })
    }

    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        self.on_close_commands.push(command.into());
        self
    }

    /// The first output line containing a failure pattern.
    pub fn failure<'a>(&self, output: &'a str) -> Option<&'a str> {
        output.lines().map(str::trim).find(|line| {
            self.failed_when_contains
                .iter()
                .any(|pattern| line.contains(pattern.as_str()))
        })
    }
}

/// The switch CLI: `->` prompt, `ERROR:` on rejected commands.
pub fn aos() -> CliPlatform {
    CliPlatform::new("aos", r"->\s*$")
        .expect("prompt pattern is valid")
        .with_failure_pattern("ERROR:")
        .with_failure_pattern("Invalid entry")
        .with_on_close_command("exit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let platform = aos();
        assert!(platform.prompt.is_match(b"OS6860-> "));
        assert!(platform.prompt.is_match(b"->"));
        assert!(!platform.prompt.is_match(b"Password:"));
    }

    #[test]
    fn test_failure_line() {
        let platform = aos();
        let output = "lanpower port 1/1/3 priority high\r\nERROR: Lanpower not supported on slot 1/1\r\n";
        assert_eq!(
            platform.failure(output),
            Some("ERROR: Lanpower not supported on slot 1/1")
        );
        assert_eq!(platform.failure("Chassis ID 1\r\n"), None);
    }
}
