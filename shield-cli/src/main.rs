//! Shield activation tool
//!
//! Inspects and drives the activation state of an installation, and issues
//! license keys for vendors.
//!
//! Usage:
//!   shield --store ./state --secret <SECRET> status
//!   shield keygen
//!   shield sign --signing-key <KEY> --device <ID> --plan annual

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shield_cli::{describe_decision, info_report, keygen, load_config, open_engine, sign_license};
use shield_license::ActivationEngine;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "shield")]
#[command(about = "Shield activation engine tooling")]
struct Args {
    /// Path to a TOML config file (defaults to the compiled-in config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the encrypted activation store
    #[arg(short, long, global = true, default_value = "shield-store")]
    store: PathBuf,

    /// Secret the store key is derived from
    #[arg(long, global = true, env = "SHIELD_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the license now
    Status,
    /// Present a license key
    Activate {
        /// The license key
        key: String,
    },
    /// Print the stored activation state as JSON
    Info,
    /// Generate an issuer key pair
    Keygen,
    /// Issue a license key
    Sign {
        /// Base64 signing key from `keygen`
        #[arg(long, env = "SHIELD_SIGNING_KEY", hide_env_values = true)]
        signing_key: String,
        /// Device id to bind the key to
        #[arg(long)]
        device: String,
        /// trial, monthly, annual or perpetual
        #[arg(long, default_value = "perpetual")]
        plan: String,
        /// Explicit term in days from now
        #[arg(long)]
        days: Option<u32>,
        /// Licensee reference
        #[arg(long)]
        subject: Option<String>,
    },
    /// Delete all stored activation state
    Reset,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_ascii_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let engine = || -> Result<ActivationEngine> {
        let config = load_config(args.config.as_deref())?;
        let secret = args
            .secret
            .as_deref()
            .context("a store secret is required (--secret or SHIELD_SECRET)")?;
        debug!(store = %args.store.display(), "opening activation store");
        open_engine(config, &args.store, secret)
    };

    match args.command {
        Command::Status => println!("{}", describe_decision(&engine()?.check()?)),
        Command::Activate { ref key } => {
            let decision = engine()?.activate(key)?;
            println!("{}", describe_decision(&decision));
            if !decision.key.as_ref().is_some_and(|v| v.is_accepted()) {
                bail!("license key was not accepted");
            }
        }
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(&info_report(&engine()?)?)?);
        }
        Command::Reset => {
            engine()?.reset()?;
            println!("activation state cleared");
        }
        Command::Keygen => println!("{}", serde_json::to_string_pretty(&keygen())?),
        Command::Sign {
            ref signing_key,
            ref device,
            ref plan,
            days,
            ref subject,
        } => {
            let key = sign_license(
                signing_key,
                Some(device),
                plan,
                days,
                subject.as_deref(),
                chrono::Utc::now(),
            )?;
            println!("{key}");
        }
    }
    Ok(())
}
