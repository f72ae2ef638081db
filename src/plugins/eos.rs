//! Alert plugin for the eos product.
//!
//! The eos platform appends one JSON alert record per line to a spool file.
//! The plugin tails that file across polls: it remembers its byte offset,
//! consumes only complete lines, and starts over when the file shrinks
//! underneath it (rotation or truncation). Malformed records are skipped.

use std::fs::File;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::path::PathBuf;

use crate::alerts::Alert;
use crate::core::errors::{CsmError, Result};
use crate::plugins::AlertSource;

/// Spool location used when the configuration does not name one.
const DEFAULT_SPOOL: &str = "/var/lib/csm/alert.spool";

/// Spool-tailing alert source.
#[derive(Debug)]
pub struct EosAlertPlugin {
    spool: PathBuf,
    offset: u64,
}

impl EosAlertPlugin {
    /// Plugin over the default spool location.
    #[must_use]
    pub fn new() -> Self {
        Self::with_spool(PathBuf::from(DEFAULT_SPOOL))
    }

    /// Plugin over a specific spool file.
    #[must_use]
    pub fn with_spool(spool: impl Into<PathBuf>) -> Self {
        Self {
            spool: spool.into(),
            offset: 0,
        }
    }
}

impl Default for EosAlertPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSource for EosAlertPlugin {
    fn start(&mut self) -> Result<()> {
        // The spool may not exist yet; it appears with the first alert.
        self.offset = 0;
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<Alert>> {
        if !self.spool.is_file() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&self.spool).map_err(|e| CsmError::io(&self.spool, e))?;
        let len = file
            .metadata()
            .map_err(|e| CsmError::io(&self.spool, e))?
            .len();
        if len < self.offset {
            // The file shrank underneath us; read it from the top again.
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| CsmError::io(&self.spool, e))?;
        let mut chunk = String::new();
        file.read_to_string(&mut chunk)
            .map_err(|e| CsmError::io(&self.spool, e))?;

        // Only complete lines are consumed; a partially written record
        // stays behind for the next poll.
        let Some(consumed) = chunk.rfind('\n').map(|newline| newline + 1) else {
            return Ok(Vec::new());
        };
        let mut alerts = Vec::new();
        for line in chunk[..consumed].lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(alert) = serde_json::from_str::<Alert>(line) {
                alerts.push(alert);
            }
        }
        self.offset += consumed as u64;
        Ok(alerts)
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::EosAlertPlugin;
    use crate::alerts::{Alert, Severity};
    use crate::plugins::AlertSource;
    use std::fs::OpenOptions;
    use std::io::Write as _;
    use std::path::Path;
    use tempfile::TempDir;

    fn record(id: &str) -> String {
        serde_json::to_string(&Alert::new(id, "disk", Severity::Warning, "smart failure")).unwrap()
    }

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn absent_spool_polls_empty() {
        let tmp = TempDir::new().unwrap();
        let mut plugin = EosAlertPlugin::with_spool(tmp.path().join("alert.spool"));
        plugin.start().unwrap();
        assert!(plugin.poll().unwrap().is_empty());
    }

    #[test]
    fn polls_pick_up_only_new_records() {
        let tmp = TempDir::new().unwrap();
        let spool = tmp.path().join("alert.spool");
        let mut plugin = EosAlertPlugin::with_spool(&spool);
        plugin.start().unwrap();

        append(&spool, &format!("{}\n{}\n", record("a-1"), record("a-2")));
        let first = plugin.poll().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "a-1");

        // Nothing new, nothing returned.
        assert!(plugin.poll().unwrap().is_empty());

        append(&spool, &format!("{}\n", record("a-3")));
        let second = plugin.poll().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "a-3");
    }

    #[test]
    fn partial_line_waits_for_completion() {
        let tmp = TempDir::new().unwrap();
        let spool = tmp.path().join("alert.spool");
        let mut plugin = EosAlertPlugin::with_spool(&spool);
        plugin.start().unwrap();

        let full = record("a-1");
        let (head, tail) = full.split_at(full.len() / 2);
        append(&spool, head);
        assert!(plugin.poll().unwrap().is_empty());

        append(&spool, &format!("{tail}\n"));
        let alerts = plugin.poll().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "a-1");
    }

    #[test]
    fn malformed_records_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let spool = tmp.path().join("alert.spool");
        let mut plugin = EosAlertPlugin::with_spool(&spool);
        plugin.start().unwrap();

        append(&spool, &format!("{}\nnot json\n{}\n", record("a-1"), record("a-2")));
        let alerts = plugin.poll().unwrap();
        let ids: Vec<_> = alerts.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);
    }

    #[test]
    fn truncated_spool_is_reread_from_the_top() {
        let tmp = TempDir::new().unwrap();
        let spool = tmp.path().join("alert.spool");
        let mut plugin = EosAlertPlugin::with_spool(&spool);
        plugin.start().unwrap();

        append(&spool, &format!("{}\n{}\n", record("a-1"), record("a-2")));
        assert_eq!(plugin.poll().unwrap().len(), 2);

        std::fs::write(&spool, format!("{}\n", record("a-3"))).unwrap();
        let alerts = plugin.poll().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "a-3");
    }
}
