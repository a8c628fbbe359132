mod cli;
mod commands;

use std::env;
use std::io;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{parse_args, usage_text, Action};
use crate::commands::{run, Session};

fn main() -> ExitCode {
    init_tracing();

    let args = env::args().skip(1).collect::<Vec<_>>();
    match run_cli(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "zone_inspect_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(args: &[String]) -> Result<(), String> {
    let invocation = match parse_args(args) {
        Ok(Action::Run(invocation)) => invocation,
        Ok(Action::Help) => {
            println!("{}", usage_text());
            return Ok(());
        }
        Err(message) => return Err(format!("{message}\n{}", usage_text())),
    };

    info!(command = ?invocation.command, "zone_inspect_started");
    let session = Session::open(&invocation.options)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&invocation.command, &session, &mut out)
}

// stdout carries command output only.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}
