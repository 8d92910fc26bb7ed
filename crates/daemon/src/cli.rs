// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line interface

use crate::config::{self, ConfigError, Overrides, Settings};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "wardend",
    version,
    about = "Acquire and hold a named lock through a Consul session"
)]
pub struct Cli {
    /// Path to a TOML config file (default: $XDG_CONFIG_HOME/warden/warden.toml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

impl Cli {
    /// Resolve settings from the config file and flags
    pub fn settings(self) -> Result<Settings, ConfigError> {
        config::load(self.config.as_deref(), self.overrides)
    }
}
