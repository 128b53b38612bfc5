//! CLI harness for exercising the vault against a real data directory
//!
//! This tool allows testing:
//! - Provisioning salted and legacy accounts
//! - Login, legacy migration, and the failed-attempt wipe
//! - Lock scheduling and status
//! - Anomaly alerts over recorded activity
//! - The panic wipe

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vaultguard_core::{
    ensure_default_account, provision_account, provision_legacy_account, EventType, Vault, VerifyResult,
    DEFAULT_USERNAME,
};
use vaultguard_params::VaultConfig;
use vaultguard_storage_sqlite::SqliteVaultStore;

#[derive(Parser)]
#[command(name = "vaultguard-harness")]
#[command(about = "Duress-aware PIN vault harness", long_about = None)]
struct Cli {
    /// JSON config file (defaults apply if missing)
    #[arg(short, long, global = true, default_value = "vaultguard.json")]
    config: PathBuf,

    /// Override the data directory from the config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// PIN for the default account, created only when the store has no accounts
    #[arg(long, global = true)]
    initial_pin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Provision {
        #[arg(short, long, default_value = DEFAULT_USERNAME)]
        username: String,

        #[arg(short, long)]
        pin: String,

        /// Store an unsalted legacy digest instead
        #[arg(long)]
        legacy: bool,
    },

    /// Verify a PIN and run the post-login checks
    Login {
        #[arg(short, long, default_value = DEFAULT_USERNAME)]
        username: String,

        #[arg(short, long)]
        pin: String,
    },

    /// Record entry activity and run the activity checks
    Record {
        /// ADD_ENTRY, EDIT_ENTRY, DELETE_ENTRY, ...
        event_type: EventType,

        #[arg(short, long)]
        owner_id: Option<i64>,

        #[arg(short, long)]
        meta: Option<String>,
    },

    /// Lock an account for N minutes (0 clears)
    Lock {
        #[arg(short, long)]
        owner_id: i64,

        #[arg(short, long, default_value = "10")]
        minutes: i64,
    },

    /// Show counter and lock state
    Status {
        #[arg(short, long)]
        owner_id: Option<i64>,
    },

    /// Print the newest events
    Events {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Change a PIN
    ChangePin {
        #[arg(short, long, default_value = DEFAULT_USERNAME)]
        username: String,

        #[arg(long)]
        current: String,

        #[arg(long)]
        new: String,
    },

    /// Wipe all vault state and exit
    Panic {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = VaultConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.layout.data_dir = data_dir;
    }

    let store = Arc::new(SqliteVaultStore::open(&config.layout).context("opening vault storage")?);
    let vault = Vault::new(store.clone(), config)?;

    // Terminates here if the counter is already exhausted
    vault.startup();

    if let Some(pin) = cli.initial_pin.as_deref() {
        if let Some(id) = ensure_default_account(store.as_ref(), pin)? {
            info!("First run: created {} (id {})", DEFAULT_USERNAME, id);
        }
    }

    let result = match cli.command {
        Commands::Provision { username, pin, legacy } => {
            run_provision(&store, &username, &pin, legacy)
        }
        Commands::Login { username, pin } => run_login(&vault, &username, &pin),
        Commands::Record {
            event_type,
            owner_id,
            meta,
        } => run_record(&vault, event_type, owner_id, meta.as_deref()),
        Commands::Lock { owner_id, minutes } => run_lock(&vault, owner_id, minutes),
        Commands::Status { owner_id } => run_status(&vault, owner_id),
        Commands::Events { limit } => run_events(&vault, limit),
        Commands::ChangePin { username, current, new } => run_change_pin(&vault, &username, &current, &new),
        Commands::Panic { yes } => {
            if !yes {
                bail!("refusing to wipe without --yes");
            }
            vault.trigger_panic()
        }
    };

    if !vault.shutdown() {
        warn!("Pending lock writes were abandoned at shutdown");
    }
    result
}

fn run_provision(store: &SqliteVaultStore, username: &str, pin: &str, legacy: bool) -> anyhow::Result<()> {
    let id = if legacy {
        provision_legacy_account(store, username, pin)?
    } else {
        provision_account(store, username, pin)?
    };
    info!("Provisioned {} (legacy={})", username, legacy);
    println!("{}", id);
    Ok(())
}

fn run_login(vault: &Vault, username: &str, pin: &str) -> anyhow::Result<()> {
    let result = vault.verify(username, pin).map_err(busy_hint)?;
    let owner_id = result.session().map(|s| s.owner_id);

    match &result {
        VerifyResult::Granted(session) if vault.is_locked(session.owner_id) => {
            println!("granted {} (account locked)", session.owner_id)
        }
        VerifyResult::Granted(session) => println!("granted {}", session.owner_id),
        VerifyResult::Denied => println!("denied ({} failed)", vault.failed_attempts()),
        VerifyResult::NoSuchUser => println!("no such user ({} failed)", vault.failed_attempts()),
    }

    if let Some(alert) = vault.after_login_checks(owner_id) {
        println!("alert: {}", alert);
    }
    Ok(())
}

fn run_record(vault: &Vault, event_type: EventType, owner_id: Option<i64>, meta: Option<&str>) -> anyhow::Result<()> {
    let Some(id) = vault.record_event(owner_id, event_type, meta) else {
        bail!("event was not recorded");
    };
    println!("{}", id);

    if let Some(alert) = vault.after_activity_checks(owner_id) {
        println!("alert: {}", alert);
    }
    Ok(())
}

fn run_lock(vault: &Vault, owner_id: i64, minutes: i64) -> anyhow::Result<()> {
    vault.schedule_lock(owner_id, minutes)?;
    if !vault.flush_locks() {
        warn!("Lock write still pending");
    }
    print_lock(vault, owner_id)
}

fn run_status(vault: &Vault, owner_id: Option<i64>) -> anyhow::Result<()> {
    println!("state: {:?}", vault.duress_state());
    println!("failed attempts: {}", vault.failed_attempts());
    match owner_id {
        Some(id) => print_lock(vault, id),
        None => Ok(()),
    }
}

fn print_lock(vault: &Vault, owner_id: i64) -> anyhow::Result<()> {
    match vault.locked_until(owner_id)? {
        Some(until) if vault.is_locked(owner_id) => println!("locked until {}", until),
        Some(until) => println!("unlocked (expired {})", until),
        None => println!("unlocked"),
    }
    Ok(())
}

fn run_events(vault: &Vault, limit: usize) -> anyhow::Result<()> {
    for event in vault.recent_events(limit)? {
        let owner = event.owner_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {} {} {}",
            event.id,
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            owner,
            event.event_type,
            event.metadata.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn run_change_pin(vault: &Vault, username: &str, current: &str, new: &str) -> anyhow::Result<()> {
    match vault.change_pin(username, current, new).map_err(busy_hint)? {
        VerifyResult::Granted(_) => println!("changed"),
        VerifyResult::Denied => println!("denied"),
        VerifyResult::NoSuchUser => println!("no such user"),
    }
    Ok(())
}

/// Storage contention is not an attempt; say so instead of a bare error
fn busy_hint(e: vaultguard_core::Error) -> anyhow::Error {
    if e.is_transient() {
        warn!("Storage busy, attempt not counted: {}", e);
        anyhow::Error::new(e).context("storage busy, try again")
    } else {
        e.into()
    }
}
