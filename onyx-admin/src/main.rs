//! Onyx admin console CLI
//!
//! `onyx-admin pair <ip> --token <TOKEN>` pairs this console with an engine
//! that is in bootstrap mode (`onyx --pair`).

mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onyx_admin::tls::engine_base_url;
use onyx_admin::{
    default_common_name, pair, AdminConfig, AdminPaths, MtlsClientFactory, PairRequest,
    PairingClient,
};
use onyx_auth::{Fingerprint, PairingToken};
use tracing_subscriber::EnvFilter;

use crate::utils::{format_ago, format_date, format_timestamp_secs, truncate};

/// Onyx admin console
#[derive(Parser)]
#[command(name = "onyx-admin", version, about)]
struct Cli {
    /// Configuration directory (default: ~/.config/onyx)
    #[arg(long, env = "ONYX_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair with an engine in bootstrap mode
    Pair {
        /// Engine address
        address: String,

        /// Pairing token shown on the engine console
        #[arg(short, long, value_parser = PairingToken::parse)]
        token: PairingToken,

        /// Pairing port (default from config, normally 2305)
        #[arg(short, long)]
        port: Option<u16>,

        /// Display name for the node list
        #[arg(long)]
        name: Option<String>,

        /// Certificate common name (default: admin@<hostname>)
        #[arg(long)]
        common_name: Option<String>,
    },

    /// List paired engines
    Nodes,

    /// Show this console's identity
    Identity,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let paths = AdminPaths::resolve(cli.config_dir.clone())?;

    match cli.command {
        Commands::Pair {
            address,
            token,
            port,
            name,
            common_name,
        } => cmd_pair(&paths, address, token, port, name, common_name).await,
        Commands::Nodes => cmd_nodes(&paths),
        Commands::Identity => cmd_identity(&paths),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_pair(
    paths: &AdminPaths,
    address: String,
    token: PairingToken,
    port: Option<u16>,
    name: Option<String>,
    common_name: Option<String>,
) -> Result<()> {
    let port = match port {
        Some(port) => port,
        None => {
            AdminConfig::load(&paths.config_path())
                .context("Failed to load config")?
                .settings
                .default_port
        }
    };

    let request = PairRequest {
        address,
        port,
        token,
        common_name: common_name.unwrap_or_else(default_common_name),
        name,
    };

    eprintln!(
        "Pairing with {}:{} as {}...",
        request.address, request.port, request.common_name
    );

    let client = PairingClient::new()?;
    let report = pair(paths, &client, &request)
        .await
        .context("Pairing failed")?;

    println!("Paired with {} ({})", report.node_name, request.address);
    println!("  Subject:      {}", report.subject);
    println!("  Fingerprint:  {}", report.fingerprint);
    println!("  Valid until:  {}", format_timestamp_secs(report.not_after));
    println!("  Certificate:  {}", report.certificate_path.display());
    if let Some(warning) = &report.node_warning {
        eprintln!("warning: node list not updated: {warning}");
    }

    Ok(())
}

fn cmd_nodes(paths: &AdminPaths) -> Result<()> {
    let config = AdminConfig::load(&paths.config_path()).context("Failed to load config")?;

    if config.nodes.is_empty() {
        eprintln!("No paired nodes");
        return Ok(());
    }

    println!(
        "{:<20}  {:<36}  {:<10}  {}",
        "NAME", "ENDPOINT", "ADDED", "LAST SEEN"
    );
    println!("{:-<80}", "");
    for node in &config.nodes {
        println!(
            "{:<20}  {:<36}  {:<10}  {}",
            truncate(&node.name, 20),
            engine_base_url(&node.address, node.port),
            format_date(node.added_at),
            format_ago(node.last_seen)
        );
    }

    Ok(())
}

fn cmd_identity(paths: &AdminPaths) -> Result<()> {
    let store = paths.identity();
    let key = store
        .load_key()
        .context("Failed to load identity")?
        .context("No identity yet; run `onyx-admin pair` first")?;

    println!("Key:          {}", store.key_path().display());
    println!(
        "Fingerprint:  {}",
        Fingerprint::from_public_key(&key.public_key())
    );

    let factory = match MtlsClientFactory::from_store(&store) {
        Ok(factory) => factory,
        Err(e) => {
            println!("Certificate:  none ({e})");
            return Ok(());
        }
    };

    let info = factory.certificate_info()?;
    println!("Certificate:  {}", store.cert_path().display());
    println!(
        "  Subject:    {}",
        info.subject_common_name.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Valid:      {} to {}",
        format_timestamp_secs(info.not_before),
        format_timestamp_secs(info.not_after)
    );
    factory
        .build()
        .context("Certificate and key cannot be used for mTLS")?;
    println!("  mTLS:       ready");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_requires_token() {
        assert!(Cli::try_parse_from(["onyx-admin", "pair", "10.0.0.5"]).is_err());
    }

    #[test]
    fn test_pair_token_normalized_before_network() {
        let cli =
            Cli::try_parse_from(["onyx-admin", "pair", "10.0.0.5", "-t", "ab3d7xq2"]).unwrap();
        match cli.command {
            Commands::Pair { token, port, .. } => {
                assert_eq!(token.to_string(), "AB3D-7XQ2");
                assert!(port.is_none());
            }
            _ => panic!("expected pair"),
        }

        assert!(
            Cli::try_parse_from(["onyx-admin", "pair", "10.0.0.5", "-t", "WRONG-TOKN"]).is_err()
        );
    }

    #[test]
    fn test_pair_flags() {
        let cli = Cli::try_parse_from([
            "onyx-admin",
            "--config-dir",
            "/tmp/onyx",
            "pair",
            "10.0.0.5",
            "--token",
            "AB3D-7XQ2",
            "-p",
            "9000",
            "--name",
            "edge",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/onyx")));
        match cli.command {
            Commands::Pair { port, name, .. } => {
                assert_eq!(port, Some(9000));
                assert_eq!(name.as_deref(), Some("edge"));
            }
            _ => panic!("expected pair"),
        }
    }
}
