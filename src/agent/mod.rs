//! Lifecycle orchestration: run options, owned agent state, init/run
//! sequencing.
//!
//! `init` builds every subsystem in dependency order and hands back one
//! owned [`AgentState`]; `run` consumes it. There is no ambient global, and
//! no partially initialized service ever reaches `run`: any init failure is
//! fatal before the agent becomes externally reachable.

pub mod daemon;
pub mod guard;
pub mod relay;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use crate::alerts::monitor::AlertMonitor;
use crate::alerts::{Alert, AlertStorage, AlertsService};
use crate::api::ApiServer;
use crate::core::config::Config;
use crate::core::errors::{CsmError, Result};
use crate::logger::Logger;
use crate::plugins::PluginRegistry;
use crate::storage::InMemoryKeyValueStorage;

use self::guard::{InstanceMarker, KernelProbe};
use self::relay::AlertRelay;

/// Immutable per-process options, fixed at argument parsing time.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stay in the foreground: no instance guard, no background transition,
    /// no marker, log records echoed to stderr.
    pub debug: bool,
    /// Configuration file to load.
    pub config_file: PathBuf,
    /// API port override; the configured port applies when absent.
    pub port: Option<u16>,
}

/// Everything `run` consumes, built by [`init`] in dependency order.
#[derive(Debug)]
pub struct AgentState {
    config: Config,
    logger: Logger,
    api: Arc<ApiServer>,
    monitor: AlertMonitor,
    relay_rx: Receiver<Alert>,
}

impl AgentState {
    /// Loaded configuration backing this state.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for pushing to or stopping the API layer from outside `run`.
    #[must_use]
    pub fn api_handle(&self) -> Arc<ApiServer> {
        Arc::clone(&self.api)
    }
}

/// How a completed [`run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Parent branch of the background transition; the detached child
    /// carries on with this pid. The caller reports it and exits 0.
    DetachedParent {
        /// Pid of the detached agent.
        child_pid: u32,
    },
    /// The serve loop returned and every service was stopped.
    Stopped,
}

/// Build the full service set in dependency order.
///
/// Storage comes before the alerting service that needs it; the plugin is
/// resolved before the monitor that owns it. The API layer is initialized
/// here but serves nothing until [`run`].
pub fn init(options: &RunOptions, logger: &Logger) -> Result<AgentState> {
    let config = Config::load(&options.config_file)?;

    let backing = Arc::new(InMemoryKeyValueStorage::new());
    let alert_storage = AlertStorage::new(backing);
    let alerts_service = AlertsService::new(alert_storage.clone());

    let api = Arc::new(ApiServer::new(alerts_service, logger.clone()));

    let registry = PluginRegistry::builtin(&config);
    let plugin = registry.resolve(&config.product.name, "alert")?;

    let (relay, relay_rx) = AlertRelay::bounded(config.relay.queue_capacity);
    let monitor = AlertMonitor::new(
        alert_storage,
        plugin,
        relay,
        config.monitor.poll_interval(),
        logger.clone(),
    );

    logger.info(&format!(
        "agent initialized for product {}",
        config.product.name
    ));
    Ok(AgentState {
        config,
        logger: logger.clone(),
        api,
        monitor,
        relay_rx,
    })
}

/// Drive the agent lifecycle to completion.
///
/// Outside debug mode the instance guard runs first; a live marker surfaces
/// as the benign already-running error. Then the background transition: the
/// parent returns immediately with the child pid, while the detached child
/// re-enters here, writes the marker with its own pid, and continues. The
/// monitor starts, the API serve loop blocks this thread, and when it
/// returns the monitor is stopped and the relay drained, the exact reverse
/// of startup.
pub fn run(state: AgentState, options: &RunOptions) -> Result<RunOutcome> {
    let AgentState {
        config,
        logger,
        api,
        mut monitor,
        relay_rx,
    } = state;

    let marker = InstanceMarker::new(config.paths.marker_file.clone());
    if !options.debug {
        if daemon::is_detached_child() {
            daemon::complete_detach(&marker)?;
            logger.info(&format!("agent detached with pid {}", std::process::id()));
        } else {
            guard::acquire(&marker, &KernelProbe)?;
            let child_pid = daemon::spawn_detached()?;
            return Ok(RunOutcome::DetachedParent { child_pid });
        }
    }

    monitor.start()?;

    let forwarder = {
        let api = Arc::clone(&api);
        let logger = logger.clone();
        let spawned = thread::Builder::new()
            .name("alert-relay".to_string())
            .spawn(move || {
                for alert in relay_rx {
                    if let Err(e) = api.push(&alert) {
                        logger.warn(&format!("alert push failed: {e}"));
                    }
                }
            });
        match spawned {
            Ok(handle) => handle,
            Err(e) => {
                monitor.stop();
                return Err(CsmError::Runtime {
                    details: format!("cannot spawn relay forwarder: {e}"),
                });
            }
        }
    };

    let port = options.port.unwrap_or(config.api.port);
    let served = api.run(&config.api.bind, port);

    // Reverse of startup: the serve loop has returned, now the monitor.
    // Stopping it drops the relay sender, so the forwarder drains whatever
    // is still queued and ends on its own; no in-flight alert is lost.
    monitor.stop();
    let _ = forwarder.join();

    if !options.debug {
        if let Err(e) = marker.remove_if_owned(std::process::id()) {
            logger.warn(&format!("cannot remove instance marker: {e}"));
        }
    }

    served?;
    logger.info("agent stopped");
    Ok(RunOutcome::Stopped)
}
