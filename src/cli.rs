//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Proxy and fetch Google Drive files and folders.
///
/// Drivebridge previews Drive share links and downloads their content
/// through a backend proxy, working around browser CORS restrictions and
/// per-account API quotas.
#[derive(Parser, Debug)]
#[command(name = "drivebridge")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP proxy service
    Serve {
        /// Address to bind (overrides DRIVEBRIDGE_BIND_ADDR)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Download a share link to disk using the shared API key
    Fetch {
        /// Drive file or folder share link
        url: String,

        /// Directory to save downloads into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}
