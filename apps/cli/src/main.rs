//! AgentPay CLI
//!
//! Operator interface for the escrow reconciliation engine and settlement
//! router. All commands work on the store snapshot configured in settings.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use agentpay_core::{ChannelEndpoint, ChannelStatus, Network, PaymentSource, SettlementChannel, Side};
use agentpay_daemon::{build_provider, SyncService};
use agentpay_logging::init_logging;
use agentpay_settings::{default_settings_path, Settings};
use agentpay_settlement::{
    HttpChannelInjector, Layer, OperationKind, SettlementContext, SettlementRouter,
    StoreChannelDirectory,
};
use agentpay_store::{MemoryStore, RecordKey, Store};
use agentpay_sync::SyncEngine;

/// AgentPay - escrow payment reconciliation
#[derive(Parser)]
#[command(name = "agentpay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop until interrupted
    Run,

    /// Run a single sync pass and print the report
    Sync,

    /// Clear a payment source's checkpoint so the next pass rescans from the start
    ForceResync {
        source_id: Uuid,
    },

    /// Reset a record stuck in WaitingForManualAction
    Recover {
        source_id: Uuid,

        blockchain_identifier: String,

        /// payment (seller) or purchase (buyer)
        #[arg(long, default_value = "payment")]
        side: Side,
    },

    /// Show which layer an operation between two participants settles on
    Layer {
        participant_a: String,

        participant_b: String,

        #[arg(long, default_value = "preprod")]
        network: Network,

        #[arg(long, default_value = "submit-result")]
        operation: OperationKind,

        /// Override the resolved layer (base or channel)
        #[arg(long)]
        force: Option<Layer>,
    },

    /// Manage payment sources
    Sources {
        #[command(subcommand)]
        action: Option<SourcesAction>,
    },

    /// Print the escrow records of a payment source
    Records {
        source_id: Uuid,
    },

    /// Print one escrow record by its id
    Record {
        id: Uuid,
    },

    /// Register an open settlement channel between two participants
    Channel {
        participant_a: String,

        participant_b: String,

        #[arg(long, default_value = "preprod")]
        network: Network,

        /// Channel node HTTP endpoint of participant A
        #[arg(long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List payment sources (default)
    List,
    /// Add a payment source watching a contract address
    Add {
        contract_address: String,

        #[arg(long, default_value = "preprod")]
        network: Network,

        /// Fee rate in permille
        #[arg(long, default_value = "0")]
        fee_permille: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = Settings::load_from(&settings_path).context("loading settings")?;
    let snapshot = settings.snapshot_path();
    let store = Arc::new(
        MemoryStore::open(&snapshot).with_context(|| format!("opening store {:?}", snapshot))?,
    );

    match cli.command {
        Commands::Run => {
            run(&settings, store, snapshot).await?;
        }
        Commands::Sync => {
            sync_once(&settings, store, snapshot).await?;
        }
        Commands::ForceResync { source_id } => {
            agentpay_sync::force_resync(store.as_ref(), source_id).await?;
            store.save_to_file(&snapshot).await?;
            println!("Checkpoint cleared for source {}", source_id);
        }
        Commands::Recover { source_id, blockchain_identifier, side } => {
            let key = RecordKey::new(source_id, blockchain_identifier, side);
            let record = agentpay_sync::recover_record(store.as_ref(), &key).await?;
            store.save_to_file(&snapshot).await?;
            println!("Recovered {}", key);
            println!("State: {:?}", record.on_chain_state);
            println!("Current transaction: {}", record.current_transaction.as_deref().unwrap_or("-"));
        }
        Commands::Layer { participant_a, participant_b, network, operation, force } => {
            let router = build_router(&settings, store.clone())?;
            let mut ctx = SettlementContext::new(operation, participant_a, participant_b, network);
            if let Some(layer) = force {
                ctx = ctx.with_force_layer(layer);
            }
            let layer = router.resolve_layer(&ctx).await?;
            println!("{} between {} and {}: {}", ctx.operation, ctx.participant_a, ctx.participant_b, layer);
        }
        Commands::Sources { action } => {
            sources(store.as_ref(), action.unwrap_or(SourcesAction::List)).await?;
            store.save_to_file(&snapshot).await?;
        }
        Commands::Records { source_id } => {
            let records = store.list_records(source_id).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Record { id } => {
            let record = store
                .get_record_by_id(id)
                .await?
                .with_context(|| format!("no record with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Channel { participant_a, participant_b, network, url } => {
            let mut channel = SettlementChannel::new(network, participant_a.clone(), participant_b);
            channel.status = ChannelStatus::Open;
            channel.endpoints.push(ChannelEndpoint { participant: participant_a, http_url: url });
            let id = channel.id;
            store.upsert_channel(channel).await?;
            store.save_to_file(&snapshot).await?;
            println!("Channel {} registered", id);
        }
    }

    Ok(())
}

fn build_router(settings: &Settings, store: Arc<MemoryStore>) -> Result<SettlementRouter> {
    let base = Arc::new(build_provider(settings)?);
    let injector = Arc::new(HttpChannelInjector::new(settings.router.channel_timeout())?);
    let directory = Arc::new(StoreChannelDirectory::new(store));
    Ok(SettlementRouter::new(settings.router_config(), base, injector, directory))
}

async fn run(settings: &Settings, store: Arc<MemoryStore>, snapshot: PathBuf) -> Result<()> {
    let provider = Arc::new(build_provider(settings)?);
    let engine = Arc::new(SyncEngine::new(provider, store, settings.sync_config()));
    let service = SyncService::new(engine, Some(snapshot));

    info!("Running sync loop, press Ctrl+C to stop");
    service
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn sync_once(settings: &Settings, store: Arc<MemoryStore>, snapshot: PathBuf) -> Result<()> {
    let provider = Arc::new(build_provider(settings)?);
    let engine = Arc::new(SyncEngine::new(provider, store, settings.sync_config()));
    let service = SyncService::new(engine, Some(snapshot));

    let report = service.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.has_errors() {
        anyhow::bail!("sync pass finished with errors");
    }
    Ok(())
}

async fn sources(store: &MemoryStore, action: SourcesAction) -> Result<()> {
    match action {
        SourcesAction::List => {
            let sources = store.list_sources().await?;
            if sources.is_empty() {
                println!("No payment sources");
            }
            for source in sources {
                let checkpoint = source
                    .last_checkpoint
                    .as_ref()
                    .map(|c| format!("{} @ {}", c.tx_hash, c.block_height))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  {}  checkpoint={}{}",
                    source.id,
                    source.network,
                    source.contract_address,
                    checkpoint,
                    if source.sync_in_progress { "  (syncing)" } else { "" }
                );
            }
        }
        SourcesAction::Add { contract_address, network, fee_permille } => {
            let mut source = PaymentSource::new(network, contract_address);
            source.fee_rate_permille = fee_permille;
            let id = source.id;
            store.insert_source(source).await?;
            println!("Payment source {} added", id);
        }
    }
    Ok(())
}
