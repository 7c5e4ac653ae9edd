//! Command-line flags for the sidecar.

use clap::Parser;
use std::path::PathBuf;

/// campusd - school administration sidecar
///
/// Reads one JSON request per line on stdin and answers one JSON line per
/// request on stdout. Logs go to stderr.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Workspace directory to open on startup
    ///
    /// Same effect as sending `workspace.select` first.
    #[arg(short, long, value_name = "DIR", env = "CAMPUSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter, e.g. `info` or `campusd=debug`
    #[arg(long, default_value = "info", env = "CAMPUSD_LOG")]
    pub log_level: String,
}
