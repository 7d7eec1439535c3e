use std::collections::BTreeSet;
use sysinfo::{ProcessesToUpdate, System};

use crate::error::ScanError;

/// Something that can report the names of currently running processes.
///
/// Names are short (no path) and without a trailing `.exe`. A `BTreeSet` keeps
/// iteration order deterministic for the matcher.
pub trait ProcessSource: Send {
    fn snapshot(&mut self) -> Result<BTreeSet<String>, ScanError>;
}

/// [`ProcessSource`] backed by the OS process table via `sysinfo`.
pub struct SysinfoProcessSource {
    sys: System,
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn snapshot(&mut self) -> Result<BTreeSet<String>, ScanError> {
        // Drop exited processes so a closed game stops matching.
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let names: BTreeSet<String> = self
            .sys
            .processes()
            .values()
            .filter_map(|p| short_name(&p.name().to_string_lossy()))
            .collect();

        if names.is_empty() {
            return Err(ScanError::Empty);
        }
        Ok(names)
    }
}

/// Normalizes a reported process name: trims it and drops a trailing `.exe`.
pub fn short_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    let len = name.len();
    let name = if len > 4
        && name.is_char_boundary(len - 4)
        && name[len - 4..].eq_ignore_ascii_case(".exe")
    {
        &name[..len - 4]
    } else {
        name
    };
    (!name.is_empty()).then(|| name.to_string())
}
