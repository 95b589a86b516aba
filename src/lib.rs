//! appkernel - an application kernel with layered YAML configuration.
//!
//! This library provides a namespaced configuration manager with cached
//! handles and hot reload, per-name file loggers, and a service container
//! with ordered boot and graceful shutdown.

pub mod cli;
pub mod config;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod memo;
pub mod project;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_yaml::Value;
use tracing::info;

use crate::cli::{Cli, Commands, RunArgs, ShowArgs};
use crate::config::ConfigManager;
use crate::kernel::App;
use crate::services::Heartbeat;

/// Runs the command selected by the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    let (root, config_dir) = resolve_dirs(&cli)?;

    match cli.command {
        Commands::Run(args) => run_app(args, root, config_dir).await,
        Commands::ConfigValidate => validate_config(&config_dir),
        Commands::ConfigList => list_config(&config_dir),
        Commands::ConfigShow(args) => show_config(&config_dir, &args),
        Commands::ConfigGet { path } => get_config_value(&config_dir, &path),
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Resolves the project root and config directory from flags, environment
/// and the working directory, in that order.
fn resolve_dirs(cli: &Cli) -> Result<(PathBuf, PathBuf)> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            project::project_root(&cwd)
        }
    };
    let config_dir = cli.config_dir.clone().unwrap_or_else(|| root.join("conf"));
    Ok((root, config_dir))
}

/// Boots the application with the built-in services and serves until
/// Ctrl-C.
async fn run_app(args: RunArgs, root: PathBuf, config_dir: PathBuf) -> Result<()> {
    let app = Arc::new(
        App::builder()
            .root(root)
            .config_dir(config_dir)
            .runner(Heartbeat::new())
            .build()?,
    );
    kernel::set_app(Arc::clone(&app));

    if args.watch {
        app.config().watch()?;
        info!(dir = ?app.config().config_dir(), "Watching configuration for changes");
    }

    info!("Application is running. Press Ctrl+C to stop.");
    app.serve().await?;
    Ok(())
}

/// Loads the configuration directory and reports what it found.
fn validate_config(config_dir: &Path) -> Result<()> {
    let config = ConfigManager::new(config_dir)?;
    let names = config.all_names();

    println!("Configuration is valid.");
    println!("Found {} namespace(s) in {}", names.len(), config_dir.display());
    Ok(())
}

/// Lists every namespace with its source file.
fn list_config(config_dir: &Path) -> Result<()> {
    let config = ConfigManager::new(config_dir)?;
    let names = config.all_names();

    if names.is_empty() {
        println!("No namespaces defined.");
        return Ok(());
    }

    for name in names {
        let source = config
            .source_of(&name)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("  {name} ({source})");
    }
    Ok(())
}

/// Displays the merged configuration or a single namespace.
fn show_config(config_dir: &Path, args: &ShowArgs) -> Result<()> {
    let config = ConfigManager::new(config_dir)?;
    let namespace = match &args.namespace {
        Some(name) => config.get(name)?,
        None => config.root(),
    };
    println!("{}", render(namespace.value(), args.json)?);
    Ok(())
}

/// Prints the value at a dotted path whose first segment is the namespace.
fn get_config_value(config_dir: &Path, path: &str) -> Result<()> {
    let (name, rest) = split_path(path);
    let config = ConfigManager::new(config_dir)?;
    let namespace = config.get(name)?;

    let value = namespace
        .get(rest)
        .with_context(|| format!("No value at '{path}'"))?;
    println!("{}", render(value, false)?);
    Ok(())
}

fn split_path(path: &str) -> (&str, &str) {
    path.split_once('.').unwrap_or((path, ""))
}

/// Formats a value for the terminal. Strings print bare.
fn render(value: &Value, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(value)?);
    }
    Ok(match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)?.trim_end().to_string(),
    })
}
