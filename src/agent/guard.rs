//! Single-instance guard over the on-disk marker file.
//!
//! The marker is advisory: a single decimal PID line at a fixed path. The
//! guard reads it, probes the recorded process for liveness, and either
//! passes or reports the running instance. Check-then-write is not atomic;
//! between the read here and the marker write after the background
//! transition a second agent can slip through. That window is accepted, the
//! marker is an operator convenience rather than a lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::errors::{CsmError, Result};

/// Liveness probe for a recorded process identifier.
///
/// A seam over the kernel check so tests can script liveness.
pub trait ProcessProbe {
    /// Whether a process with `pid` currently exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by a zero-signal `kill`.
pub struct KernelProbe;

#[cfg(unix)]
impl ProcessProbe for KernelProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
    }
}

#[cfg(not(unix))]
impl ProcessProbe for KernelProbe {
    fn is_alive(&self, _pid: u32) -> bool {
        // No cheap existence check here; err on the side of "still running".
        true
    }
}

/// The filesystem record naming the running agent instance.
#[derive(Debug, Clone)]
pub struct InstanceMarker {
    path: PathBuf,
}

impl InstanceMarker {
    /// Marker at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded pid, if the marker exists and holds one.
    ///
    /// Unparsable content reads as absent; the file stays in place for the
    /// next writer to replace. The read itself is non-destructive.
    pub fn read(&self) -> Result<Option<u32>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse::<u32>().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CsmError::marker(&self.path, e)),
        }
    }

    /// Record `pid` as the running instance, creating parent directories.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CsmError::marker(&self.path, e))?;
        }
        std::fs::write(&self.path, format!("{pid}\n")).map_err(|e| CsmError::marker(&self.path, e))
    }

    /// Remove the marker, but only while it still names `pid`.
    ///
    /// Keeps a restarted agent from deleting the marker of its successor.
    pub fn remove_if_owned(&self, pid: u32) -> Result<()> {
        if self.read()? == Some(pid) {
            std::fs::remove_file(&self.path).map_err(|e| CsmError::marker(&self.path, e))?;
        }
        Ok(())
    }
}

/// Pass when no live instance is recorded.
///
/// A marker naming a live process fails benignly with the conflicting pid;
/// the caller prints a notice and exits 0. No marker, an unparsable marker,
/// or a dead pid all pass. Nothing is written here; the fresh marker is
/// written by the detached child once it knows its final pid.
pub fn acquire(marker: &InstanceMarker, probe: &dyn ProcessProbe) -> Result<()> {
    match marker.read()? {
        Some(pid) if probe.is_alive(pid) => Err(CsmError::AlreadyRunning { pid }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{acquire, InstanceMarker, KernelProbe, ProcessProbe};
    use crate::core::errors::CsmError;
    use tempfile::TempDir;

    struct AlwaysAlive;
    struct NeverAlive;

    impl ProcessProbe for AlwaysAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    impl ProcessProbe for NeverAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    fn marker_in(tmp: &TempDir) -> InstanceMarker {
        InstanceMarker::new(tmp.path().join("run").join("csm_agent.pid"))
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        marker.write(4711).unwrap();
        assert_eq!(marker.read().unwrap(), Some(4711));
    }

    #[test]
    fn absent_marker_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(marker_in(&tmp).read().unwrap(), None);
    }

    #[test]
    fn garbage_content_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        std::fs::create_dir_all(marker.path().parent().unwrap()).unwrap();
        std::fs::write(marker.path(), "not a pid\n").unwrap();
        assert_eq!(marker.read().unwrap(), None);
    }

    #[test]
    fn acquire_fails_when_recorded_pid_is_alive() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        marker.write(4711).unwrap();

        let err = acquire(&marker, &AlwaysAlive).unwrap_err();
        match err {
            CsmError::AlreadyRunning { pid } => assert_eq!(pid, 4711),
            other => panic!("expected AlreadyRunning, got {other}"),
        }
    }

    #[test]
    fn already_running_is_benign() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        marker.write(1).unwrap();
        assert!(acquire(&marker, &AlwaysAlive).unwrap_err().is_benign());
    }

    #[test]
    fn acquire_passes_on_stale_marker() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        marker.write(4711).unwrap();
        assert!(acquire(&marker, &NeverAlive).is_ok());
        // Passing leaves the stale marker untouched; the child replaces it.
        assert_eq!(marker.read().unwrap(), Some(4711));
    }

    #[test]
    fn acquire_passes_when_no_marker_exists() {
        let tmp = TempDir::new().unwrap();
        assert!(acquire(&marker_in(&tmp), &AlwaysAlive).is_ok());
    }

    #[test]
    fn remove_only_when_owned() {
        let tmp = TempDir::new().unwrap();
        let marker = marker_in(&tmp);
        marker.write(4711).unwrap();

        marker.remove_if_owned(9999).unwrap();
        assert_eq!(marker.read().unwrap(), Some(4711));

        marker.remove_if_owned(4711).unwrap();
        assert_eq!(marker.read().unwrap(), None);

        // Removing an already absent marker is not an error.
        marker.remove_if_owned(4711).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn kernel_probe_sees_own_process() {
        assert!(KernelProbe.is_alive(std::process::id()));
        assert!(!KernelProbe.is_alive(u32::MAX - 1));
    }
}
