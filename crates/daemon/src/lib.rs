// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wardend: holds a named lock through a Consul session

pub mod cli;
pub mod config;
pub mod lifecycle;

pub use cli::Cli;
pub use config::{ConfigError, Settings};
pub use lifecycle::LifecycleError;
