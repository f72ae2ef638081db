//! Alert monitor: the concurrent task polling the product plugin.
//!
//! The monitor owns the resolved plugin for the process lifetime. Its thread
//! polls once immediately, then on every interval: detected alerts are
//! persisted first, then relayed toward the API layer. Stop is cooperative,
//! a signal wakes the thread out of its timer wait, so stopping is bounded
//! by one in-flight poll rather than the full interval.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::agent::relay::AlertRelay;
use crate::core::errors::{CsmError, Result};
use crate::logger::Logger;
use crate::plugins::AlertSource;

use super::AlertStorage;

/// Monitor over one plugin, one storage, one relay.
#[derive(Debug)]
pub struct AlertMonitor {
    inner: Option<Inner>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    storage: AlertStorage,
    plugin: Box<dyn AlertSource>,
    relay: AlertRelay,
    poll_interval: Duration,
    logger: Logger,
}

impl AlertMonitor {
    /// Monitor bound to its collaborators. Nothing runs until [`start`].
    ///
    /// [`start`]: AlertMonitor::start
    #[must_use]
    pub fn new(
        storage: AlertStorage,
        plugin: Box<dyn AlertSource>,
        relay: AlertRelay,
        poll_interval: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            inner: Some(Inner {
                storage,
                plugin,
                relay,
                poll_interval,
                logger,
            }),
            stop_tx: None,
            handle: None,
        }
    }

    /// Start the plugin, then the polling thread.
    ///
    /// One-shot: a monitor that has been started cannot start again. A
    /// plugin `start` failure propagates and leaves no thread behind.
    pub fn start(&mut self) -> Result<()> {
        let mut inner = self.inner.take().ok_or_else(|| CsmError::Runtime {
            details: "alert monitor already started".to_string(),
        })?;
        inner.plugin.start()?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("alert-monitor".to_string())
            .spawn(move || inner.run(&stop_rx))
            .map_err(|e| CsmError::Runtime {
                details: format!("cannot spawn alert monitor thread: {e}"),
            })?;
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the polling thread and wait for it to finish.
    ///
    /// The plugin's own `stop` runs on the monitor thread before it exits.
    /// Stopping a monitor that never started is a no-op.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the polling thread has been started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Inner {
    fn run(mut self, stop_rx: &Receiver<()>) {
        // First poll happens immediately; the interval paces the rest.
        self.tick();
        loop {
            match stop_rx.recv_timeout(self.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => self.tick(),
            }
        }
        self.plugin.stop();
    }

    fn tick(&mut self) {
        let alerts = match self.plugin.poll() {
            Ok(alerts) => alerts,
            Err(e) => {
                self.logger.warn(&format!("alert poll failed: {e}"));
                return;
            }
        };
        for alert in alerts {
            let id = alert.id.clone();
            if let Err(e) = self.storage.store(&alert) {
                self.logger.warn(&format!("cannot store alert {id}: {e}"));
                continue;
            }
            match self.relay.relay(alert) {
                Ok(()) => {}
                Err(CsmError::RelaySaturated) => {
                    self.logger
                        .warn(&format!("alert relay saturated, dropping delivery of {id}"));
                }
                Err(e) => {
                    self.logger.warn(&format!("alert relay failed for {id}: {e}"));
                }
            }
        }
    }
}
