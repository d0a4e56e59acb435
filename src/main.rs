//! Fund Orchestrator
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use fund_orchestrator::agent::SocketAgent;
use fund_orchestrator::config::Config;
use fund_orchestrator::engine::FundEngine;
use fund_orchestrator::evm::EvmClient;
use fund_orchestrator::role_registry::{RoleEntry, RoleRegistry, HOT_ROLE, OPERATOR_ROLE};
use fund_orchestrator::scheduler::Scheduler;
use fund_orchestrator::state_manager::StateManager;
use fund_orchestrator::sweep::sweep_all;
use fund_orchestrator::types::{
    to_decimal_units, to_raw_units, truncate_address, Address, AssetId, NATIVE_DECIMALS,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "fund_orchestrator")]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Roles {
        #[command(subcommand)]
        command: RoleCommands,
    },

    #[command(flatten)]
    Fund(FundCommands),
}

/// Commands that need the chain client.
#[derive(Subcommand)]
enum FundCommands {
    /// Poll the fund cycle and gas check triggers until interrupted
    Run {
        #[arg(long, default_value = "60")]
        poll_seconds: u64,
    },

    /// Run one fund cycle now, ignoring the interval
    Once,

    Withdraw,

    GasTopup,

    BufferTopup,

    RevenueShare,

    SweepRemainder,

    CheckGas,

    /// Swap stable units held by the operator into native gas
    Swap {
        #[arg(long)]
        amount: Decimal,
    },

    Transfer {
        /// Sending role
        #[arg(long)]
        from: String,

        /// Role name or 0x address
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "native")]
        asset: AssetId,

        #[arg(long)]
        amount: Decimal,
    },

    Balances {
        /// Role name or 0x address
        #[arg(long)]
        wallet: String,
    },

    /// Empty one asset from several roles into a single destination
    SweepAll {
        #[arg(long)]
        asset: AssetId,

        #[arg(long)]
        to: String,

        #[arg(long = "from", required = true, num_args = 1..)]
        sources: Vec<String>,
    },

    SetStable {
        #[arg(long)]
        asset: Address,
    },
}

#[derive(Subcommand)]
enum RoleCommands {
    List,

    Add {
        #[arg(long)]
        role: String,

        #[arg(long)]
        address: Address,
    },

    Update {
        #[arg(long)]
        role: String,

        #[arg(long)]
        address: Address,
    },

    Delete {
        #[arg(long)]
        role: String,
    },

    Generate {
        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fund_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("fund_orchestrator: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Loading configuration from {}", cli.config.display());
    let config = Arc::new(Config::load(&cli.config).await?);
    info!("Configuration loaded:");
    info!("  Chain id: {}", config.blockchain.chain_id);
    info!(
        "  Subscription contract: {}",
        truncate_address(&config.blockchain.subscription_contract)
    );
    info!(
        "  Fund cycle every {}s, gas check every {}s",
        config.fund_cycle.fund_cycle_interval_seconds, config.fund_cycle.gas_check_interval_seconds
    );

    let agent = Arc::new(SocketAgent::new(config.agent_socket.clone()));
    let registry = Arc::new(RoleRegistry::load(&config.addressbook, agent).await?);

    let command = match cli.command {
        Commands::Roles { command } => return run_roles(&registry, &command).await,
        Commands::Fund(command) => command,
    };

    let evm = Arc::new(EvmClient::new(
        &config.blockchain.rpc_url,
        config.blockchain.subscription_contract,
    )?);
    let engine = FundEngine::new(config.clone(), registry.clone(), evm.clone(), evm.clone(), evm);

    info!("Loading state from {}", cli.state.display());
    let state_manager = Arc::new(StateManager::load(cli.state.clone()).await?);

    match command {
        FundCommands::Run { poll_seconds } => {
            let scheduler = Scheduler::new(
                engine.monitor.clone(),
                engine.gas_monitor.clone(),
                state_manager,
                config.fund_cycle.fund_cycle_interval_seconds,
                config.fund_cycle.gas_check_interval_seconds,
            );
            let ctrl_c = signal::ctrl_c();

            tokio::select! {
                _ = scheduler.run_polling(Duration::from_secs(poll_seconds.max(1))) => {}
                _ = ctrl_c => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                }
            }
        }
        FundCommands::Once => {
            let result = engine.monitor.run_fund_cycle().await;
            state_manager.record_fund_cycle(chrono::Utc::now()).await?;
            let report = result?;
            if report.hot_wallet_created {
                state_manager.mark_hot_wallet_generated().await?;
            }
            println!("{report:#?}");
        }
        FundCommands::Withdraw => {
            let hot = engine.registry.ensure_intermediary_wallet().await?;
            let report = engine.withdrawal.run(hot).await?;
            info!(
                "Withdrawal complete: {} withdrawn, {} failed",
                report.withdrawn_count(),
                report.failed_count()
            );
            println!("{report:#?}");
        }
        FundCommands::GasTopup => {
            let hot = engine.registry.resolve_address(HOT_ROLE).await?;
            println!("{:#?}", engine.distributor.gas_topup(hot).await?);
        }
        FundCommands::BufferTopup => {
            let hot = engine.registry.resolve_address(HOT_ROLE).await?;
            println!("{:#?}", engine.distributor.buffer_topup(hot).await?);
        }
        FundCommands::RevenueShare => {
            let hot = engine.registry.resolve_address(HOT_ROLE).await?;
            println!("{:#?}", engine.distributor.revenue_share(hot).await?);
        }
        FundCommands::SweepRemainder => {
            let hot = engine.registry.resolve_address(HOT_ROLE).await?;
            println!("{:#?}", engine.distributor.sweep_remainder(hot).await?);
        }
        FundCommands::CheckGas => {
            let result = engine.gas_monitor.check().await;
            state_manager.record_gas_check(chrono::Utc::now()).await?;
            println!("{:#?}", result?);
        }
        FundCommands::Swap { amount } => {
            let pool = config.pool_for_chain().ok_or_else(|| {
                anyhow!("no pool configured for chain {}", config.blockchain.chain_id)
            })?;
            let signer = engine.registry.resolve_signer(OPERATOR_ROLE).await?;
            let meta = engine.chain.token_metadata(pool.stable_asset).await?;
            let amount_in = to_raw_units(amount, meta.decimals)?;
            let receipt = engine
                .swapper
                .swap_to_native(
                    &pool,
                    pool.stable_asset,
                    amount_in,
                    &signer,
                    config.fund_cycle.slippage_bps,
                    config.fund_cycle.swap_deadline_seconds,
                )
                .await?;
            println!("{receipt:#?}");
        }
        FundCommands::Transfer {
            from,
            to,
            asset,
            amount,
        } => {
            let from_address = engine.registry.resolve_address(&from).await?;
            let to = engine.registry.resolve_address(&to).await?;
            let decimals = engine.balances.get_balance(asset, from_address).await?.decimals;
            let raw = to_raw_units(amount, decimals)?;
            let record = engine.emitter.emit_transfer(&from, to, asset, raw).await?;
            println!("{}", record.format_log());
        }
        FundCommands::Balances { wallet } => {
            let address = engine.registry.resolve_address(&wallet).await?;
            let native = engine.balances.get_balance(AssetId::Native, address).await?;
            println!(
                "{} {}",
                to_decimal_units(native.raw, NATIVE_DECIMALS)?,
                native.symbol
            );
            let tokens = engine
                .balances
                .list_all_accepted_asset_balances(address)
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&tokens).context("Failed to serialize balances")?
            );
        }
        FundCommands::SweepAll {
            asset,
            to,
            sources,
        } => {
            let destination = engine.registry.resolve_address(&to).await?;
            let mut resolved = Vec::with_capacity(sources.len());
            for role in sources {
                let address = engine.registry.resolve_address(&role).await?;
                resolved.push((role, address));
            }
            let native_reserve = to_raw_units(config.fund_cycle.hot_gas_target, NATIVE_DECIMALS)?;
            let results = sweep_all(
                engine.emitter.clone(),
                engine.balances.clone(),
                resolved,
                asset,
                destination,
                native_reserve,
            )
            .await?;
            println!("{results:#?}");
        }
        FundCommands::SetStable { asset } => {
            if asset.is_zero() {
                bail!("stable asset must not be the zero address");
            }
            let signer = engine.registry.resolve_signer(OPERATOR_ROLE).await?;
            let receipt = engine
                .ledger
                .set_stable_asset(&signer, asset)
                .await?
                .ensure_success()?;
            info!("Stable asset set to {} tx={:?}", asset, receipt.tx_hash);
        }
    }

    info!("Fund Orchestrator shutdown complete");
    Ok(())
}

async fn run_roles(registry: &RoleRegistry, command: &RoleCommands) -> Result<()> {
    match command {
        RoleCommands::List => {
            for (role, entry) in registry.list().await {
                let mode = if entry.signable { "signing" } else { "watch-only" };
                println!("{role:<16} {} {mode}", entry.address);
            }
        }
        RoleCommands::Add { role, address } => {
            registry.add(role, RoleEntry::watch_only(*address)).await?;
        }
        RoleCommands::Update { role, address } => {
            registry.update(role, *address).await?;
        }
        RoleCommands::Delete { role } => {
            registry.delete(role).await?;
        }
        RoleCommands::Generate { role } => {
            let address = registry.generate(role).await?;
            println!("{role} {address}");
        }
    }
    Ok(())
}
