//! Onyx engine - security appliance control plane
//!
//! `onyx --pair` opens the bootstrap window that lets a new admin console
//! obtain a client certificate.

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use onyx_auth::{IssuancePolicy, PairingToken};
use onyx_engine::config::{DEFAULT_AUTH_DIR, DEFAULT_PAIRING_PORT};
use onyx_engine::shutdown::os_signal;
use onyx_engine::{
    parse_duration, ListenerConfig, PairingDriver, PairingListener, PairingSession,
    PairingSuccess, SessionObserver, SessionOutcome, ShutdownCoordinator, ShutdownSignal,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Onyx - secure mTLS proxy engine
#[derive(Parser)]
#[command(name = "onyx", version, about)]
struct Cli {
    /// Enable temporary pairing mode for new admin consoles
    #[arg(short, long)]
    pair: bool,

    /// Address the pairing endpoint binds to
    #[arg(long, env = "ONYX_PAIR_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Pairing endpoint port
    #[arg(long, env = "ONYX_PAIR_PORT", default_value_t = DEFAULT_PAIRING_PORT)]
    port: u16,

    /// How long each pairing window stays open (e.g., "5m", "90s")
    #[arg(long, env = "ONYX_PAIR_WINDOW", default_value = "5m", value_parser = parse_duration)]
    window: Duration,

    /// Time allowed for in-flight responses when a window closes
    #[arg(long, env = "ONYX_PAIR_GRACE", default_value = "2s", value_parser = parse_duration)]
    grace: Duration,

    /// Directory for authorization records
    #[arg(long, env = "ONYX_AUTH_DIR", default_value = DEFAULT_AUTH_DIR)]
    auth_dir: PathBuf,

    /// Validity of issued client certificates, in years
    #[arg(long, env = "ONYX_CERT_VALIDITY_YEARS", default_value_t = 1)]
    validity_years: u16,

    /// Use this token for the first window instead of generating one
    #[arg(long, env = "ONYX_PAIR_TOKEN", value_parser = PairingToken::parse, hide_env_values = true)]
    token: Option<PairingToken>,
}

impl Cli {
    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind: self.bind,
            port: self.port,
            window: self.window,
            grace: self.grace,
            auth_dir: self.auth_dir.clone(),
            policy: IssuancePolicy {
                validity_years: self.validity_years,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.pair {
        println!("Onyx Engine starting in proxy mode...");
        tracing::info!("Proxy data plane is provided separately; use --pair to pair a console");
        return Ok(());
    }

    let coordinator = ShutdownCoordinator::new();
    let mut cancel = coordinator.signal();
    let mut observer = ConsoleObserver {
        cancel: coordinator.signal(),
    };

    tokio::spawn(async move {
        loop {
            match os_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "Canceling pairing session");
                    coordinator.shutdown();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install signal handler");
                    break;
                }
            }
        }
    });

    println!("--------------------------------------------------");
    println!("ONYX BOOTSTRAP MODE");
    println!("--------------------------------------------------");
    println!("Use this mode to pair a new admin console via SSH.");

    let driver = PairingDriver::new(PairingListener::new(cli.listener_config()));
    let success = driver
        .run(&mut observer, &mut cancel, cli.token.clone())
        .await
        .context("Pairing mode failed")?;

    match success {
        Some(_) => Ok(()),
        None => anyhow::bail!("no console was paired"),
    }
}

/// Terminal front end for the pairing driver.
struct ConsoleObserver {
    cancel: ShutdownSignal,
}

impl SessionObserver for ConsoleObserver {
    fn on_listening(&mut self, session: &PairingSession) {
        let remaining = session.remaining();
        let expires_at = chrono::Duration::from_std(remaining)
            .ok()
            .and_then(|d| chrono::Local::now().checked_add_signed(d))
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        println!();
        println!("Pairing token:  {}", session.token());
        println!("Listening on:   {}", session.local_addr());
        println!("Expires:        {} ({}s)", expires_at, remaining.as_secs());
        println!();
        println!("On the admin console run:");
        println!(
            "  onyx-admin pair <this-host> --token {} --port {}",
            session.token(),
            session.local_addr().port()
        );
        println!();
    }

    fn on_success(&mut self, success: &PairingSuccess) {
        let valid_until = chrono::DateTime::from_timestamp(success.not_after, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        println!("Paired console:  {}", success.subject);
        println!("From:            {}", success.peer);
        println!("Serial:          {}", success.serial);
        println!("Valid until:     {}", valid_until);
        println!("Record:          {}", success.record_path.display());
    }

    async fn should_retry(&mut self, outcome: &SessionOutcome) -> bool {
        match outcome {
            SessionOutcome::Expired => println!("Pairing window expired."),
            SessionOutcome::Canceled => println!("\nPairing canceled."),
            SessionOutcome::Succeeded(_) => return false,
        }

        // The interrupt that canceled the session must not answer the prompt.
        self.cancel.mark_seen();

        print!("Retry pairing? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            res = stdin.read_line(&mut line) => match res {
                Ok(n) if n > 0 => is_affirmative(&line),
                _ => false,
            },
            _ = self.cancel.recv() => {
                println!();
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["onyx", "--pair"]).unwrap();
        let config = cli.listener_config();
        assert!(cli.pair);
        assert_eq!(config.port, 2305);
        assert_eq!(config.window, Duration::from_secs(300));
        assert_eq!(config.auth_dir, PathBuf::from(DEFAULT_AUTH_DIR));
        assert!(cli.token.is_none());
    }

    #[test]
    fn test_cli_accepts_operator_token() {
        let cli = Cli::try_parse_from(["onyx", "-p", "--token", "ab3d7xq2"]).unwrap();
        assert_eq!(cli.token.unwrap().to_string(), "AB3D-7XQ2");

        assert!(Cli::try_parse_from(["onyx", "--token", "WRONG-TOKN"]).is_err());
    }
}
