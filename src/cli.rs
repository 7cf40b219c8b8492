// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `epwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "epwatch",
    version,
    about = "Wait for readiness on FIFOs, devices and stdin via epoll, and print what fired.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Epwatch.toml` in the current working directory. May be
    /// missing when `--stdin` is given.
    #[arg(long, value_name = "PATH", default_value = "Epwatch.toml")]
    pub config: String,

    /// Also watch standard input for readability.
    #[arg(long)]
    pub stdin: bool,

    /// Timeout per wait, in milliseconds. Waits forever if omitted.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Number of wait calls to perform before exiting.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub rounds: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EPWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print what would be watched, but don't open anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
