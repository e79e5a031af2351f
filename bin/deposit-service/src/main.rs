//! Entry point for the deposit daemon: loads configuration, connects to
//! L1/L2/the document store, and runs [`bridge_orchestrator::DepositOrchestrator`]
//! until shutdown or a fatal invariant violation.

use anyhow::{Context, Result};
use bridge_chain::{AlloyL1Chain, ReqwestL2Rpc};
use bridge_config::Config;
use bridge_orchestrator::DepositOrchestrator;
use bridge_store::MongoStore;
use bridge_types::DepositRecord;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "deposit-service", version, about = "L1 -> L2 deposit daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "BRIDGE_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::from_toml_file(&args.config)
        .context("loading deposit service configuration")?
        .with_env_overrides()
        .context("applying environment overrides")?;

    let l1 = Arc::new(
        AlloyL1Chain::connect(&config.rpc_provider, config.settlement_contract_address)
            .context("connecting to L1 RPC provider")?,
    );
    let l2 = Arc::new(ReqwestL2Rpc::new(config.zkwasm_rpc_url.clone()));

    let mongo = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("connecting to the document store")?;
    let collection = mongo
        .database(&config.deposit_db_name())
        .collection::<mongodb::bson::Document>("deposits");
    let store = Arc::new(MongoStore::<DepositRecord>::new(collection));

    let orchestrator = DepositOrchestrator::new(config, l1, l2, store);
    let (handle, join) = orchestrator.run().await;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received");
    handle.shutdown();

    match join.await.context("deposit orchestrator task panicked")? {
        Ok(()) => Ok(()),
        Err(fatal) => {
            tracing::error!(error = %fatal, "deposit service aborting on fatal invariant violation");
            std::process::exit(1);
        }
    }
}
