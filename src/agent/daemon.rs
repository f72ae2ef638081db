//! Background transition: moving the agent off its controlling session.
//!
//! The classic double fork is replaced with a re-exec: the parent spawns the
//! current binary again with null stdio and an environment marker, reports
//! the child pid, and exits 0. On re-entry the child recognizes the marker,
//! starts a new session, and writes the instance marker with its own pid.
//! The parent-exits/child-continues contract of a fork is preserved.

use std::process::{Command, Stdio};

use crate::core::errors::{CsmError, Result};

use super::guard::InstanceMarker;

/// Environment variable naming the re-executed detached child.
pub const DETACHED_ENV: &str = "CSM_AGENT_DETACHED";

/// Whether this process is the detached child of a background transition.
#[must_use]
pub fn is_detached_child() -> bool {
    std::env::var_os(DETACHED_ENV).is_some_and(|value| value == "1")
}

/// Re-exec the current binary as a detached child.
///
/// Returns the child pid to report. The caller must treat this process as
/// the parent branch and exit 0 without touching the marker or any service;
/// only the child proceeds to [`complete_detach`]. A spawn failure is fatal
/// and carries the OS error detail.
pub fn spawn_detached() -> Result<u32> {
    let exe = std::env::current_exe().map_err(|e| CsmError::DetachFailed {
        details: format!("cannot resolve current executable: {e}"),
    })?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let child = Command::new(&exe)
        .args(&args)
        .env(DETACHED_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CsmError::DetachFailed {
            details: format!("cannot spawn detached agent: {e}"),
        })?;
    Ok(child.id())
}

/// Finish the transition inside the detached child.
///
/// Detaches from the parent session and records this process as the running
/// instance. Must happen before any service starts so the marker names the
/// final pid.
#[cfg(unix)]
pub fn complete_detach(marker: &InstanceMarker) -> Result<()> {
    nix::unistd::setsid().map_err(|e| CsmError::DetachFailed {
        details: format!("cannot start a new session: {e}"),
    })?;
    marker.write(std::process::id())
}

#[cfg(not(unix))]
pub fn complete_detach(_marker: &InstanceMarker) -> Result<()> {
    Err(CsmError::DetachFailed {
        details: "background transition is only supported on Unix".to_string(),
    })
}
