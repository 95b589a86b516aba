//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Application kernel with layered YAML configuration and hot reload.
#[derive(Parser, Debug)]
#[command(name = "appkernel", version, about, long_about = None)]
pub struct Cli {
    /// Project root. Defaults to the nearest ancestor holding a Cargo.toml.
    #[arg(long, env = "APPKERNEL_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Configuration directory. Defaults to `<root>/conf`.
    #[arg(short, long, env = "APPKERNEL_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Boot the application and serve until Ctrl-C.
    Run(RunArgs),

    /// Load the configuration directory and report problems.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// List every namespace with the file it came from.
    #[command(name = "config-list")]
    ConfigList,

    /// Display the merged configuration, or one namespace of it.
    #[command(name = "config-show")]
    ConfigShow(ShowArgs),

    /// Print a single value by dotted path, e.g. `database.pool.size`.
    #[command(name = "config-get")]
    ConfigGet {
        /// Dotted path whose first segment is the namespace.
        path: String,
    },
}

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Reload configuration when files in the config directory change.
    #[arg(long, default_value = "false")]
    pub watch: bool,
}

/// Arguments for the config-show subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Namespace to show. Shows everything when omitted.
    pub namespace: Option<String>,

    /// Print JSON instead of YAML.
    #[arg(long, default_value = "false")]
    pub json: bool,
}
