//! logiq: remote log inventory over SSH.
//!
//! Connects to a host with a password, detects which software flavor it
//! runs, negotiates sudo and inventories its log files, grouping rotated
//! copies into families.

mod commands;
mod config;
mod prompt;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use logiq_client::{HostKeyPolicy, DEFAULT_TAIL_LINES};
use tracing::error;
use tracing_subscriber::EnvFilter;

use config::Config;

/// logiq: remote log inventory over SSH
#[derive(Parser)]
#[command(name = "logiq", version, about = "Detect host flavors and inventory remote logs over SSH")]
struct Cli {
    /// Config file path (default ~/.logiq/config.toml)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Probe catalog file, replacing the built-in one
    #[arg(long = "catalog", global = true)]
    catalog: Option<PathBuf>,

    /// Host key policy: accept-any, accept-new or strict
    #[arg(long = "host-key-policy", global = true)]
    host_key_policy: Option<HostKeyPolicy>,

    /// Per-command timeout in seconds
    #[arg(long = "timeout", global = true)]
    timeout: Option<u64>,

    /// Fail when sudo is not available
    #[arg(long = "require-elevation", global = true)]
    require_elevation: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, detect the flavor and list log families
    Inspect {
        /// Target in [user@]host[:port] format
        target: String,

        /// Newest versions per family to hide
        #[arg(short = 'k', long = "keep-latest")]
        keep_latest: Option<usize>,

        /// Ask for a sudo password separate from the login password
        #[arg(long = "admin-password")]
        admin_password: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the last lines of a remote file
    Tail {
        /// Target in [user@]host[:port] format
        target: String,

        /// Absolute remote path
        path: String,

        /// Number of lines
        #[arg(short = 'n', long = "lines", default_value_t = DEFAULT_TAIL_LINES)]
        lines: usize,

        /// Ask for a sudo password separate from the login password
        #[arg(long = "admin-password")]
        admin_password: bool,
    },

    /// Test every host in a hosts file
    Bulk {
        /// TOML file with [[host]] entries
        hosts: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the probe catalog in rank order
    Probes,

    /// Manage the known hosts trust store
    KnownHosts {
        #[command(subcommand)]
        action: KnownHostsAction,
    },
}

#[derive(Subcommand)]
enum KnownHostsAction {
    /// List trusted hosts and fingerprints
    List,
    /// Forget a host's key
    Remove {
        /// host or host:port
        host: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing. RUST_LOG takes precedence.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("logiq=debug,logiq_cli=debug,logiq_client=debug,logiq_core=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("logiq: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut cfg = Config::load(&config_path)?;

    // CLI flags override the config file.
    if let Some(catalog) = cli.catalog {
        cfg.scan.catalog = Some(catalog);
    }
    if let Some(policy) = cli.host_key_policy {
        cfg.ssh.host_key_policy = policy;
    }
    if let Some(timeout) = cli.timeout {
        cfg.ssh.command_timeout_secs = timeout;
    }
    if cli.require_elevation {
        cfg.scan.require_elevation = true;
    }

    match cli.command {
        Command::Inspect {
            target,
            keep_latest,
            admin_password,
            json,
        } => {
            if let Some(keep) = keep_latest {
                cfg.scan.keep_latest = keep;
            }
            commands::inspect::run(&cfg, &target, json, admin_password).await
        }
        Command::Tail {
            target,
            path,
            lines,
            admin_password,
        } => commands::tail::run(&cfg, &target, &path, lines, admin_password).await,
        Command::Bulk { hosts, json } => commands::bulk::run(&cfg, &hosts, json).await,
        Command::Probes => commands::probes::run(&cfg).await,
        Command::KnownHosts { action } => match action {
            KnownHostsAction::List => commands::known_hosts::run_list(&cfg).await,
            KnownHostsAction::Remove { host } => {
                commands::known_hosts::run_remove(&cfg, &host).await
            }
        },
    }
}
