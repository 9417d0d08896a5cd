//! Normalized command results.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{ParseError, Result};

/// One normalized record: field name to value, in device order.
pub type Record = IndexMap<String, String>;

/// Result of a dispatched command.
///
/// The variant is fixed by the command's declared [`ResponseShape`](super::ResponseShape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Unparsed device output.
    Text(String),

    /// A single key/value block.
    Record(Record),

    /// An ordered list of records (table rows, grouped blocks).
    Records(Vec<Record>),
}

impl CommandResult {
    /// Raw text, or an empty string for structured results.
    pub fn text(&self) -> &str {
        match self {
            CommandResult::Text(text) => text,
            _ => "",
        }
    }

    /// The single record, or the first record of a list.
    pub fn record(&self) -> Option<&Record> {
        match self {
            CommandResult::Record(record) => Some(record),
            CommandResult::Records(records) => records.first(),
            CommandResult::Text(_) => None,
        }
    }

    /// All records; a single record is returned as a one-element slice.
    pub fn records(&self) -> &[Record] {
        match self {
            CommandResult::Record(record) => std::slice::from_ref(record),
            CommandResult::Records(records) => records,
            CommandResult::Text(_) => &[],
        }
    }

    /// Short description of the shape for audit logs.
    pub fn summary(&self) -> String {
        match self {
            CommandResult::Text(text) => format!("text ({} bytes)", text.len()),
            CommandResult::Record(record) => format!("record ({} fields)", record.len()),
            CommandResult::Records(records) => format!("{} records", records.len()),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Text(text) => write!(f, "{text}"),
            other => {
                for record in other.records() {
                    let line: Vec<String> =
                        record.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    writeln!(f, "{}", line.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Typed field access on a [`Record`].
pub trait Fields {
    /// Field value, matched exactly first and then case-insensitively.
    fn field(&self, name: &str) -> Option<&str>;

    /// Field value or an empty string.
    fn text(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }

    /// Numeric field; empty, `NA` and `-` are treated as absent.
    fn number(&self, name: &str) -> Result<Option<f64>> {
        self.parsed(name)
    }

    /// Integer field such as an octet counter, parsed without going
    /// through `f64`.
    fn count(&self, name: &str) -> Result<Option<u64>> {
        self.parsed(name)
    }

    /// Field parsed as `T` once a trailing unit (`W`, `mW`, `%`) is cut.
    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.field(name).map(str::trim) {
            None | Some("") | Some("NA") | Some("-") => Ok(None),
            Some(value) => value
                .trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%')
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| {
                    ParseError::InvalidNumber {
                        field: name.to_string(),
                        value: value.to_string(),
                    }
                    .into()
                }),
        }
    }

    /// Field required to be present.
    fn required(&self, name: &str) -> Result<&str> {
        self.field(name)
            .ok_or_else(|| ParseError::MissingField(name.to_string()).into())
    }

    /// `enable`/`enabled`/`on`/`yes` style flags.
    fn flag(&self, name: &str) -> bool {
        matches!(
            self.text(name).trim().to_lowercase().as_str(),
            "enable" | "enabled" | "on" | "yes" | "true"
        )
    }
}

impl Fields for Record {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).or_else(|| {
            self.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }
}
