// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use hedgehog_link::Command;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hedgehog",
    about = "Drive a Hedgehog robot over its one-byte TCP command protocol",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Host name or IP address of the Hedgehog (overrides `[device] host`)
    #[arg(long, short = 'H', env = "HEDGEHOG_HOST", global = true)]
    pub host: Option<String>,

    /// Device port (overrides `[device] port`, default 3131)
    #[arg(long, short = 'p', global = true)]
    pub port: Option<u16>,

    /// Give up connecting after SECS seconds (0 = wait for the OS)
    #[arg(long, value_name = "SECS", global = true)]
    pub connect_timeout: Option<u64>,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and read commands from stdin, one per line (default).
    ///
    /// Accepts command names (`forward`, `forward-left`) or keys
    /// (w/a/s/d/q/e/r, space or x for stop).  An empty line sends the
    /// configured default command; `quit` or end of input disconnects.
    Drive {
        /// Send each command as-is instead of stopping first
        #[arg(long)]
        no_stop: bool,
    },
    /// Connect, send the given commands in order, then disconnect
    Send {
        #[arg(required = true, value_parser = parse_command, value_name = "COMMAND")]
        commands: Vec<Command>,
    },
    /// List the command table (name, key, wire code)
    Commands,
    /// Print the effective configuration and exit
    ShowConfig,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_command(s: &str) -> Result<Command, String> {
    s.parse::<Command>().map_err(|e| e.to_string())
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "hedgehog", &mut std::io::stdout());
}
