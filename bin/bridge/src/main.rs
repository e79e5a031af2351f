//! Combined local-operation CLI: `bridge deposit` and `bridge settle` run
//! the same two orchestrators the dedicated `deposit-service` and
//! `settlement-service` binaries run, selected by subcommand instead of by
//! a separate binary or the config's `mode` field.

use anyhow::{Context, Result, anyhow};
use bridge_chain::{AlloyL1Chain, ReqwestL2Rpc};
use bridge_config::Config;
use bridge_orchestrator::{DepositOrchestrator, SettlementOrchestrator};
use bridge_store::MongoStore;
use bridge_types::{DepositRecord, SettlementRecord};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "bridge", version, about = "L1 <-> L2 bridge engine")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "BRIDGE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the deposit daemon.
    Deposit,
    /// Run the settlement daemon.
    Settle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::from_toml_file(&args.config)
        .context("loading configuration")?
        .with_env_overrides()
        .context("applying environment overrides")?;

    let fatal = match args.command {
        Command::Deposit => run_deposit(config).await?,
        Command::Settle => run_settle(config).await?,
    };

    match fatal {
        Some(fatal) => {
            tracing::error!(error = %fatal, "aborting on fatal invariant violation");
            std::process::exit(1);
        }
        None => Ok(()),
    }
}

async fn run_deposit(config: Config) -> Result<Option<bridge_engine::FatalError>> {
    let l1 = Arc::new(
        AlloyL1Chain::connect(&config.rpc_provider, config.settlement_contract_address)
            .context("connecting to L1 RPC provider")?,
    );
    let l2 = Arc::new(ReqwestL2Rpc::new(config.zkwasm_rpc_url.clone()));
    let mongo = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("connecting to the document store")?;
    let collection =
        mongo.database(&config.deposit_db_name()).collection::<mongodb::bson::Document>("deposits");
    let store = Arc::new(MongoStore::<DepositRecord>::new(collection));

    let orchestrator = DepositOrchestrator::new(config, l1, l2, store);
    let (handle, join) = orchestrator.run().await;
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received");
    handle.shutdown();
    Ok(join.await.context("deposit orchestrator task panicked")?.err())
}

async fn run_settle(config: Config) -> Result<Option<bridge_engine::FatalError>> {
    let settler_key = config
        .settler_private_key
        .clone()
        .ok_or_else(|| anyhow!("settler_private_key is required to run the settlement service"))?;
    let l1 = Arc::new(
        AlloyL1Chain::connect_with_signer(&config.rpc_provider, config.settlement_contract_address, &settler_key)
            .context("connecting to L1 RPC provider with settler wallet")?,
    );
    let l2 = Arc::new(ReqwestL2Rpc::new(config.zkwasm_rpc_url.clone()));
    let mongo = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("connecting to the document store")?;
    let collection =
        mongo.database(&config.settlement_db_name()).collection::<mongodb::bson::Document>("settlements");
    let store = Arc::new(MongoStore::<SettlementRecord>::new(collection));

    let orchestrator = SettlementOrchestrator::new(config, l1, l2, store);
    let (handle, join) = orchestrator.run().await;
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received");
    handle.shutdown();
    Ok(join.await.context("settlement orchestrator task panicked")?.err())
}
