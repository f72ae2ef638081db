//! Process entry point for the `csm-agent` binary.

use clap::Parser as _;

use csm_agent::cli_app::{self, Cli};

fn main() {
    let cli = Cli::parse();
    std::process::exit(cli_app::run(&cli));
}
