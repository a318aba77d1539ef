//! Command-line interface for setupbench.
//!
//! Provides commands for running tasks, pre-building agent images, and
//! summarizing earlier runs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
