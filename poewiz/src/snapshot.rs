//! Configuration snapshots and change detection.
//!
//! The scan stores the switch's running configuration per IP address and
//! reports which lines were added or removed since the previous scan.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::Result;

/// Storage for the last seen configuration of each switch.
pub trait SnapshotStore: Send + Sync {
    /// Previous snapshot for `ip`, if any.
    fn read(&self, ip: &str) -> Result<Option<String>>;

    /// Replace the snapshot for `ip`.
    fn write(&self, ip: &str, snapshot: &str) -> Result<()>;
}

/// One `<ip>-snapshot.txt` file per switch in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, ip: &str) -> PathBuf {
        self.dir.join(format!("{ip}-snapshot.txt"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self, ip: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(ip)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::error::TransportError::Io(e).into()),
        }
    }

    fn write(&self, ip: &str, snapshot: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(crate::error::TransportError::Io)?;
        fs::write(self.path(ip), snapshot).map_err(crate::error::TransportError::Io)?;
        Ok(())
    }
}

/// In-memory store, for sessions that should not touch the disk.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, String>>,
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self, ip: &str) -> Result<Option<String>> {
        Ok(self
            .snapshots
            .lock()
            .ok()
            .and_then(|map| map.get(ip).cloned()))
    }

    fn write(&self, ip: &str, snapshot: &str) -> Result<()> {
        if let Ok(mut map) = self.snapshots.lock() {
            map.insert(ip.to_string(), snapshot.to_string());
        }
        Ok(())
    }
}

/// Lines added and removed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ConfigDiff {
    /// Compare configuration lines, ignoring blank lines and `!` comments.
    pub fn between(previous: &str, current: &str) -> Self {
        let significant = |text: &str| -> Vec<String> {
            text.lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('!'))
                .map(str::to_string)
                .collect()
        };
        let old = significant(previous);
        let new = significant(current);
        let old_set: HashSet<&String> = old.iter().collect();
        let new_set: HashSet<&String> = new.iter().collect();

        Self {
            added: new.iter().filter(|l| !old_set.contains(l)).cloned().collect(),
            removed: old.iter().filter(|l| !new_set.contains(l)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.removed {
            writeln!(f, "- {line}")?;
        }
        for line in &self.added {
            writeln!(f, "+ {line}")?;
        }
        Ok(())
    }
}
