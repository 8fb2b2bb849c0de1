// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapdesk -- WhatsApp instance sync engine.
//!
//! Binary entry point: the `serve` daemon plus operator one-shots for
//! creating, deleting, pairing, and reconciling instances.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod ops;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zapdesk_config::{ConfigError, ZapdeskConfig};

/// Zapdesk -- WhatsApp instance sync engine.
#[derive(Parser, Debug)]
#[command(name = "zapdesk", version, about, long_about = None)]
struct Cli {
    /// Explicit config file path (skips the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server, health monitor, and scheduled sweeps.
    Serve,
    /// Create an instance and wait for pairing.
    Create {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        name: String,
    },
    /// Delete an instance and its gateway session.
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Fetch a fresh pairing QR code.
    RefreshQr {
        #[arg(long)]
        id: String,
    },
    /// Reconcile repository records against the gateway inventory.
    Sync {
        #[arg(long)]
        tenant: String,
        /// Apply adoptions and cleanups instead of only reporting them.
        #[arg(long)]
        apply: bool,
    },
    /// List a tenant's instances.
    Status {
        #[arg(long)]
        tenant: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ZapdeskConfig, Vec<ConfigError>> {
    match path {
        None => zapdesk_config::load_and_validate(),
        Some(path) => {
            let config = zapdesk_config::load_config_from_path(path)
                .map_err(|e| zapdesk_config::diagnostic::figment_to_config_errors(e, &[]))?;
            zapdesk_config::validation::validate_config(&config)?;
            Ok(config)
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            zapdesk_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.server.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Create { tenant, name } => ops::run_create(config, &tenant, &name).await,
        Commands::Delete { id } => ops::run_delete(config, &id).await,
        Commands::RefreshQr { id } => ops::run_refresh_qr(config, &id).await,
        Commands::Sync { tenant, apply } => ops::run_sync(config, &tenant, apply).await,
        Commands::Status { tenant } => ops::run_status(config, &tenant).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
