//! Response normalization.
//!
//! Turns raw switch output into a [`CommandResult`] according to the shape
//! the command declared. [`CliNormalizer`] handles the table layouts the
//! switch CLI prints; other implementations can be plugged into the
//! dispatcher.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::command::{CommandResult, Record, ResponseShape};
use crate::error::{ParseError, Result};

/// Converts raw output into a normalized result.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str, shape: ResponseShape) -> Result<CommandResult>;
}

/// Normalizer for switch CLI text tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliNormalizer;

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-{2,}[-+\s]*$").expect("separator pattern is valid"));

impl Normalizer for CliNormalizer {
    fn normalize(&self, raw: &str, shape: ResponseShape) -> Result<CommandResult> {
        let text = raw.replace('\r', "");
        Ok(match shape {
            ResponseShape::Raw => CommandResult::Text(text),
            ResponseShape::Table { header_rows } => {
                CommandResult::Records(parse_table(&text, header_rows))
            }
            ResponseShape::Vertical => CommandResult::Record(parse_vertical(text.lines())),
            ResponseShape::MultiTable { discriminator } => {
                CommandResult::Records(parse_multi(&text, compile(discriminator)?))
            }
            ResponseShape::Grouped { group, field } => {
                CommandResult::Records(parse_grouped(&text, compile(group)?, field))
            }
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ParseError::UnexpectedShape(format!("bad pattern {pattern}: {e}")).into())
}

/// Column spans from a dashed separator line, as char offsets.
fn column_spans(separator: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = separator.chars().collect();
    let mut starts = vec![];
    let mut in_run = false;
    for (i, c) in chars.iter().enumerate() {
        let dash = *c == '-';
        if dash && !in_run {
            starts.push(i);
        }
        in_run = dash;
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, start)| (*start, starts.get(i + 1).copied().unwrap_or(usize::MAX)))
        .collect()
}

fn slice(chars: &[char], (start, end): (usize, usize)) -> String {
    if start >= chars.len() {
        return String::new();
    }
    let end = end.min(chars.len());
    chars[start..end]
        .iter()
        .collect::<String>()
        .trim()
        .trim_matches('|')
        .trim()
        .to_string()
}

fn join_header(acc: &mut String, part: &str) {
    if part.is_empty() {
        return;
    }
    if !acc.is_empty() && !acc.ends_with(['/', '-', '(']) {
        acc.push(' ');
    }
    acc.push_str(part);
}

fn parse_table(text: &str, header_rows: usize) -> Vec<Record> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(sep) = lines.iter().position(|line| SEPARATOR.is_match(line)) else {
        return vec![];
    };

    let spans = column_spans(lines[sep]);
    let header_lines: Vec<Vec<char>> = lines[sep.saturating_sub(header_rows)..sep]
        .iter()
        .map(|line| line.chars().collect())
        .collect();
    let headers: Vec<String> = spans
        .iter()
        .enumerate()
        .map(|(i, span)| {
            let mut name = String::new();
            for line in &header_lines {
                join_header(&mut name, &slice(line, *span));
            }
            if name.is_empty() {
                name = format!("Column {}", i + 1);
            }
            name
        })
        .collect();

    let mut records = vec![];
    for line in &lines[sep + 1..] {
        if line.trim().is_empty() || SEPARATOR.is_match(line) {
            break;
        }
        let chars: Vec<char> = line.chars().collect();
        let record: Record = headers
            .iter()
            .zip(&spans)
            .map(|(name, span)| (name.clone(), slice(&chars, *span)))
            .collect();
        if record.values().any(|v| !v.is_empty()) {
            records.push(record);
        }
    }
    records
}

/// Split `key : value` or `key = value`; `=` wins when present.
fn split_pair(line: &str) -> Option<(&str, &str)> {
    let pos = line.find('=').or_else(|| line.find(':'))?;
    let key = line[..pos].trim();
    let value = line[pos + 1..].trim().trim_end_matches(',').trim();
    (!key.is_empty()).then_some((key, value))
}

fn parse_vertical<'a>(lines: impl Iterator<Item = &'a str>) -> Record {
    let mut record = Record::new();
    for line in lines {
        if let Some((key, value)) = split_pair(line) {
            record
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    record
}

fn parse_multi(text: &str, discriminator: Regex) -> Vec<Record> {
    let mut records: Vec<Record> = vec![];
    for line in text.lines() {
        if let Some(caps) = discriminator.captures(line) {
            let mut record = Record::new();
            let id = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            record.insert("ID".to_string(), id.to_string());
            records.push(record);
            continue;
        }
        if let (Some(current), Some((key, value))) = (records.last_mut(), split_pair(line)) {
            current
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    records
}

/// A sub-block header such as `Chassis 38:f3:ab:12:34:56, Port 1001:`.
fn is_block_header(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.ends_with(':') && !trimmed.contains('=') && trimmed.contains(',')
}

fn parse_grouped(text: &str, group: Regex, field: &str) -> Vec<Record> {
    let mut records: Vec<Record> = vec![];
    let mut current_group: Option<String> = None;
    let mut current: Option<Record> = None;

    let flush = |current: &mut Option<Record>, records: &mut Vec<Record>| {
        if let Some(record) = current.take() {
            if record.len() > 1 {
                records.push(record);
            }
        }
    };
    let start = |group: &str| {
        let mut record = Record::new();
        record.insert(field.to_string(), group.to_string());
        record
    };

    for line in text.lines() {
        if let Some(caps) = group.captures(line) {
            flush(&mut current, &mut records);
            let value = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
            current = Some(start(&value));
            current_group = Some(value);
            continue;
        }
        let Some(group_value) = current_group.as_deref() else {
            continue;
        };
        if is_block_header(line) {
            flush(&mut current, &mut records);
            current = Some(start(group_value));
            continue;
        }
        if let (Some(record), Some((key, value))) = (current.as_mut(), split_pair(line)) {
            record
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    flush(&mut current, &mut records);
    records
}
