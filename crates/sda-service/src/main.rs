//! CLI entry point: `gen-id | trustee | client | relay`, plus the global
//! flags that locate each role's config files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sda_library::mock::MockLibraryFactory;
use sda_service::commands::{self, NodePaths};

/// Default directory every config/identity file is resolved relative to
/// when a subcommand does not override it with its own flag.
fn default_config_dir() -> PathBuf {
    dirs_like_default().join("sda")
}

// A minimal stand-in for the `dirs` crate's home-directory lookup, since
// this workspace does not otherwise depend on it: honors `$HOME` and falls
// back to the current directory if unset (e.g. in a container with no
// passwd entry for the running user).
fn dirs_like_default() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
}

#[derive(Parser)]
#[command(name = "sda-service", about = "SDA wrapper node: relay, client, or trustee")]
struct Cli {
    /// Log verbosity, 0 (quiet) through 5 (trace). Overridden by RUST_LOG
    /// if set.
    #[arg(long, short = 'd', default_value_t = 1)]
    debug: u8,

    /// Path to this node's identity file.
    #[arg(long, default_value = "identity.toml")]
    identity: PathBuf,

    /// Path to the group (roster) file.
    #[arg(long, short = 'g', default_value = "group.toml")]
    group: PathBuf,

    /// Path to the protocol parameters file.
    #[arg(long, short = 'p', default_value = "prifi.toml")]
    protocol: PathBuf,

    /// Directory `gen-id` writes new identity files into by default.
    #[arg(long, default_value_os_t = default_config_dir())]
    default_path: PathBuf,

    /// Return immediately after startup instead of blocking until Ctrl-C
    /// (used by test harnesses that drive the node from outside).
    #[arg(long)]
    nowait: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh identity keypair.
    #[command(alias = "gen")]
    GenId,
    /// Start this node as a trustee.
    #[command(alias = "t")]
    Trustee,
    /// Start this node as a client.
    #[command(alias = "c")]
    Client,
    /// Start this node as the relay.
    #[command(alias = "r")]
    Relay,
}

fn log_level_directive(debug: u8) -> &'static str {
    match debug {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level_directive(cli.debug)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let paths = NodePaths {
        identity: cli.identity.clone(),
        group: cli.group.clone(),
        protocol: cli.protocol.clone(),
        persisted_identity: cli.identity.with_file_name("identity.bin"),
    };

    // The anonymity library is an external collaborator (see DESIGN.md);
    // this binary plugs in the deterministic mock so the service actor can
    // be exercised end to end without it.
    let factory = Arc::new(MockLibraryFactory);

    let result = match cli.command {
        Command::GenId => {
            let path = cli.default_path.join("identity.toml");
            std::fs::create_dir_all(&cli.default_path)?;
            commands::gen_id::run(&path)
        }
        Command::Trustee => {
            if cli.nowait {
                return Ok(());
            }
            commands::trustee::run(&paths, factory).await
        }
        Command::Client => {
            if cli.nowait {
                return Ok(());
            }
            commands::client::run(&paths, factory).await
        }
        Command::Relay => {
            if cli.nowait {
                return Ok(());
            }
            commands::relay::run(&paths, factory).await
        }
    };

    result.map_err(anyhow::Error::from)
}
