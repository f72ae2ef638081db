//! Binary surface: argument parsing, logger bring-up, fatal-path exit codes.

use std::path::PathBuf;

use clap::Parser;

use crate::agent::{self, RunOptions, RunOutcome};
use crate::core::config::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_DIR};
use crate::core::errors::CsmError;
use crate::logger::Logger;

/// CSM agent — lifecycle controller for the management daemon.
#[derive(Debug, Parser)]
#[command(name = "csm-agent", version, about)]
pub struct Cli {
    /// Stay in the foreground, log to the current directory, skip the
    /// background transition and the instance marker.
    #[arg(long)]
    pub debug: bool,

    /// Configuration file.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// API port, overriding the configured value.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,
}

/// Run the agent to completion and translate the outcome into an exit code.
///
/// Clean exits, the benign already-running notice, and the parent branch of
/// the detach all exit 0. Every fatal path logs the full error chain and
/// exits 1; when the logger itself cannot come up the failure goes to
/// stderr instead.
#[must_use]
pub fn run(cli: &Cli) -> i32 {
    // The logger must outlive configuration failures, so its destination
    // depends only on the debug flag, never on the config file.
    let log_dir = if cli.debug {
        PathBuf::from(".")
    } else {
        PathBuf::from(DEFAULT_LOG_DIR)
    };
    let logger = match Logger::init("csm_agent", &log_dir, cli.debug) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("cannot initialize csm_agent logging: {e}");
            return 1;
        }
    };

    let options = RunOptions {
        debug: cli.debug,
        config_file: cli.config.clone(),
        port: cli.port,
    };

    let outcome = agent::init(&options, &logger).and_then(|state| agent::run(state, &options));
    match outcome {
        Ok(RunOutcome::DetachedParent { child_pid }) => {
            println!("CSM agent started with pid {child_pid}");
            0
        }
        Ok(RunOutcome::Stopped) => 0,
        Err(CsmError::AlreadyRunning { pid }) => {
            println!("Another instance of the CSM agent with pid {pid} is active, exiting");
            0
        }
        Err(e) => {
            logger.error_chain("agent failed", &e);
            1
        }
    }
}
