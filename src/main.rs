//! notifyfwd - Forward notifications to a desktop receiver
//!
//! Pairs this machine with a receiver by showing a one-time code on the
//! receiver and asking for it back here, and can also act as the receiver.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use notifyfwd_core::{Config, DEFAULT_REQUIRED_VERSION};
use notifyfwd_pairing::{
    AddressStore, CodeEntry, FileAddressStore, PairingController, PairingOutcome, PairingPhase,
};
use notifyfwd_receiver::ReceiverState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// notifyfwd - Pair with and forward notifications to a desktop receiver
#[derive(Parser, Debug)]
#[command(name = "notifyfwd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair with a receiver using a one-time code
    Pair(PairArgs),
    /// Show the saved receiver address
    Status(StoreArgs),
    /// Forget the saved receiver address
    Forget(StoreArgs),
    /// Run a receiver that displays incoming notifications
    Receive(ReceiveArgs),
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Path of the settings file (default: ~/.config/notifyfwd/server.json)
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PairArgs {
    /// Receiver address, e.g. 192.168.1.20:19283 (http:// is assumed)
    address: String,

    /// Receiver version this client requires
    #[arg(long, default_value = DEFAULT_REQUIRED_VERSION)]
    required_version: String,

    /// Device name shown on the receiver (default: hostname)
    #[arg(long)]
    device_name: Option<String>,

    /// Reject codes older than this many seconds (no limit by default)
    #[arg(long)]
    code_ttl: Option<u64>,

    /// Connect and read timeout for each request, in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct ReceiveArgs {
    /// Listen port
    #[arg(short, long, default_value = "19283")]
    port: u16,

    /// Version reported on /api/version
    #[arg(long, default_value = DEFAULT_REQUIRED_VERSION)]
    version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    debug!("notifyfwd v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Pair(args) => pair(args).await,
        Commands::Status(args) => status(args).await,
        Commands::Forget(args) => forget(args).await,
        Commands::Receive(args) => receive(args).await,
    }
}

async fn open_store(args: &StoreArgs) -> Result<FileAddressStore> {
    let store = match &args.store {
        Some(path) => FileAddressStore::with_path(path.clone()).await,
        None => FileAddressStore::new().await,
    };
    let store = store.map_err(|e| anyhow::anyhow!("Failed to open settings: {}", e))?;
    debug!("Settings file: {}", store.path().display());
    Ok(store)
}

/// Device name reported to the receiver
fn local_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn pair(args: PairArgs) -> Result<()> {
    let timeout = Duration::from_millis(args.timeout_ms);
    let config = Config::new()
        .with_required_version(args.required_version)
        .with_device_name(args.device_name.unwrap_or_else(local_device_name))
        .with_timeouts(timeout, timeout)
        .with_challenge_ttl(args.code_ttl.map(Duration::from_secs));

    let store = Arc::new(open_store(&args.store).await?);
    let controller = PairingController::from_config(&config, store)
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

    info!("Connecting to {}...", args.address);
    match controller.connect(&args.address).await {
        Some(PairingOutcome::AwaitingCode) => {}
        Some(outcome) if outcome.is_failure() => {
            println!("  ✗ {}", outcome);
            anyhow::bail!("pairing failed");
        }
        Some(outcome) => {
            println!("{}", outcome);
            return Ok(());
        }
        None => anyhow::bail!("pairing was interrupted"),
    }

    println!();
    println!("  A verification code is now shown on the receiver.");
    println!("  Type it here and press Enter (empty line cancels).");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut entry = CodeEntry::new();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let input = match line {
            Some(line) if !line.trim().is_empty() => line.trim().to_string(),
            _ => {
                if let Some(outcome) = controller.cancel().await {
                    println!("{}", outcome);
                }
                anyhow::bail!("pairing cancelled");
            }
        };

        if !entry.update(&input) || !entry.is_complete() {
            println!("  Enter exactly 6 digits");
            continue;
        }

        match controller.submit(entry.value()).await {
            Some(PairingOutcome::CodeMismatch) => {
                println!("{}", PairingOutcome::CodeMismatch);
                entry.clear();
            }
            Some(outcome @ PairingOutcome::Confirmed { .. }) => {
                println!("  ✓ {}", outcome);
                let mut phases = controller.subscribe();
                phases
                    .wait_for(|phase| *phase == PairingPhase::Idle)
                    .await
                    .ok();
                return Ok(());
            }
            Some(outcome) if outcome.is_failure() => {
                println!("  ✗ {}", outcome);
                anyhow::bail!("pairing failed");
            }
            Some(outcome) => {
                println!("{}", outcome);
                return Ok(());
            }
            None => {
                warn!("Code submission ignored");
            }
        }
    }
}

async fn status(args: StoreArgs) -> Result<()> {
    let store = open_store(&args).await?;
    match store.server_address().await {
        Some(address) => {
            let since = store
                .saved_at()
                .await
                .map(|t| format!(" (paired {})", t.to_rfc3339()))
                .unwrap_or_default();
            println!("{}{}", address, since);
        }
        None => println!("Not paired"),
    }
    Ok(())
}

async fn forget(args: StoreArgs) -> Result<()> {
    let store = open_store(&args).await?;
    store
        .clear()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to clear settings: {}", e))?;
    println!("Forgot saved receiver address");
    Ok(())
}

async fn receive(args: ReceiveArgs) -> Result<()> {
    let state = Arc::new(ReceiverState::new(args.version));

    let mut notifications = state.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            let request = &notification.request;
            println!();
            println!("  [{}] {}", request.devicename, request.title);
            println!("  {}", request.description);
            println!();
        }
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Press Ctrl+C to stop.");
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };
    notifyfwd_receiver::serve(listener, state, shutdown).await?;

    printer.abort();
    info!("Goodbye!");
    Ok(())
}
