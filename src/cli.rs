use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// `pith` subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the runtime: binds the HTTP/SSE API and any configured
    /// channels, and serves until killed.
    Run {
        /// Path to the config file. Defaults to the normal search path
        /// (see `pith_config::load`).
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Query a running instance's `/status` endpoint and print it.
    Status {
        /// Path to the config file, used only to resolve the API's bind
        /// address.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// A single-user, self-extending conversational agent runtime.
#[derive(Parser, Debug)]
#[command(name = "pith", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}
