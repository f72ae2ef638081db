//! Alert relay: the hand-off from the monitor thread to the API push path.
//!
//! The relay is the one cross-thread boundary of the agent. The monitor
//! enqueues without blocking; a forwarder owned by the orchestrator drains
//! the queue into the API layer. When the queue is full the alert is
//! reported as undeliverable rather than stalling the detection loop.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::alerts::Alert;
use crate::core::errors::{CsmError, Result};

/// Sending half of the relay, held by the alert monitor.
#[derive(Debug)]
pub struct AlertRelay {
    tx: Sender<Alert>,
}

impl AlertRelay {
    /// Relay with room for `capacity` undelivered alerts.
    ///
    /// The receiver goes to the orchestrator's forwarder; once every sender
    /// is gone the receiver drains what is queued and then ends.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Alert>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Hand an alert to the delivery side without blocking.
    pub fn relay(&self, alert: Alert) -> Result<()> {
        self.tx.try_send(alert).map_err(|e| match e {
            TrySendError::Full(_) => CsmError::RelaySaturated,
            TrySendError::Disconnected(_) => CsmError::ChannelClosed {
                component: "alert relay",
            },
        })
    }
}
