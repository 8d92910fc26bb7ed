// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden daemon (wardend)
//!
//! Acquires a named lock through a Consul session, prints READY once it is
//! held, and keeps it until SIGTERM/SIGINT (exit 0) or until it is lost
//! (exit 1). Startup and configuration failures exit with 2.

use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use warden_daemon::lifecycle::{self, EXIT_OK, EXIT_STARTUP};
use warden_daemon::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("wardend: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let log_guard = match lifecycle::setup_logging(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("wardend: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let code = match lifecycle::run(settings).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!("{}", e);
            // Write synchronously (tracing may be non-blocking and not flush in time)
            eprintln!("wardend: {}", e);
            e.exit_code()
        }
    };

    drop(log_guard);
    ExitCode::from(code)
}
