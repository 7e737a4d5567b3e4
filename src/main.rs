//! wallet-engine command-line client.
//!
//! Opens a session for the given identity against the configured endpoints and
//! runs one command. Settlement records and balances are printed as JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use wallet_engine::catalog::{self, AssetCatalog, StaticCatalog, NATIVE_DECIMALS};
use wallet_engine::config::{load_config, WalletConfig};
use wallet_engine::endpoints::{EndpointPool, ProbeMonitor};
use wallet_engine::keys::{self, Address};
use wallet_engine::ledger::LedgerClient;
use wallet_engine::observability::{logging, metrics};
use wallet_engine::quoting::{ExchangeQuoter, ExchangeRequest, HttpQuoter};
use wallet_engine::rpc::{HttpTransport, RpcTransport};
use wallet_engine::{Session, SettlementRecord};

#[derive(Parser)]
#[command(name = "wallet-engine")]
#[command(about = "Deterministic wallet sessions and fee-then-primary settlement", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = "wallet-engine.toml")]
    config: PathBuf,

    /// Verified identity credential.
    #[arg(short, long, env = "WALLET_ENGINE_IDENTITY", hide_env_values = true)]
    identity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the derived address
    Address,
    /// Fetch the current balance
    Balance,
    /// Probe every endpoint and print its health
    Probe,
    /// Track the balance until interrupted
    Watch,
    /// Transfer native units, paying the platform fee first
    Transfer {
        /// Destination address (base58)
        #[arg(long)]
        to: String,
        /// Amount in native units, e.g. 0.25
        #[arg(long)]
        amount: String,
    },
    /// Exchange one asset for another through the quoting service
    Swap {
        /// Asset to sell (symbol or mint)
        #[arg(long)]
        from: String,
        /// Asset to buy (symbol or mint)
        #[arg(long)]
        to: String,
        /// Amount of the sold asset, in display units
        #[arg(long)]
        amount: String,
        /// Slippage tolerance in basis points
        #[arg(long)]
        slippage_bps: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level, config.observability.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wallet-engine starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let salt = config
        .identity
        .salt
        .clone()
        .ok_or("no identity salt configured (set WALLET_ENGINE_SALT)")?;

    if let Commands::Address = cli.command {
        let keypair = keys::derive(&cli.identity, &salt)?;
        println!("{}", keypair.address());
        return Ok(());
    }

    let pool = Arc::new(EndpointPool::new(&config.endpoints, config.pool.clone())?);
    let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new());
    let ledger = LedgerClient::new(Arc::clone(&pool), Arc::clone(&transport), config.rpc.clone());

    if let Commands::Probe = cli.command {
        ledger.probe_all(config.pool.probe_timeout()).await;
        print_json(&pool.snapshot())?;
        return Ok(());
    }

    let quoter: Option<Arc<dyn ExchangeQuoter>> = if config.quoting.enabled {
        Some(Arc::new(HttpQuoter::new(&config.quoting)))
    } else {
        None
    };

    let session = Session::open(&cli.identity, &salt, &config, ledger, quoter).await?;
    let result = run(&cli.command, &session, &config, pool, transport).await;
    session.close().await;
    result
}

async fn run(
    command: &Commands,
    session: &Session,
    config: &WalletConfig,
    pool: Arc<EndpointPool>,
    transport: Arc<dyn RpcTransport>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Balance => {
            print_json(&session.balance()?)?;
        }
        Commands::Watch => {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let monitor = ProbeMonitor::new(
                pool,
                transport,
                Duration::from_secs(config.pool.probe_interval_secs),
                config.pool.probe_timeout(),
            );
            let probes = tokio::spawn(monitor.run(shutdown_rx));

            let mut ticker = tokio::time::interval(config.balance.poll_interval());
            let mut last = None;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let snapshot = session.balance()?;
                        if last != Some(snapshot) {
                            println!(
                                "{} {} ({:?})",
                                session.address(),
                                catalog::format_base_units(snapshot.lamports, NATIVE_DECIMALS),
                                snapshot.source
                            );
                            last = Some(snapshot);
                        }
                    }
                }
            }

            let _ = shutdown_tx.send(());
            let _ = probes.await;
        }
        Commands::Transfer { to, amount } => {
            let destination: Address = to.parse()?;
            let lamports = catalog::to_base_units(amount, NATIVE_DECIMALS)?;
            let record = session.transfer(destination, lamports).await?;
            report(&record)?;
        }
        Commands::Swap {
            from,
            to,
            amount,
            slippage_bps,
        } => {
            let assets = StaticCatalog::default();
            let input = assets.resolve(from).ok_or_else(|| format!("unknown asset '{}'", from))?;
            let output = assets.resolve(to).ok_or_else(|| format!("unknown asset '{}'", to))?;
            let request = ExchangeRequest {
                input_mint: input.mint,
                output_mint: output.mint,
                amount: catalog::to_base_units(amount, input.decimals)?,
                slippage_bps: slippage_bps.unwrap_or(config.settlement.default_slippage_bps),
            };
            let record = session.exchange(request).await?;
            report(&record)?;
        }
        Commands::Address | Commands::Probe => {}
    }
    Ok(())
}

/// Print the record and turn a failure outcome into the process error.
fn report(record: &SettlementRecord) -> Result<(), Box<dyn std::error::Error>> {
    print_json(record)?;
    match record.error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
