//! Entry point for the settlement daemon: loads configuration, connects to
//! L1 (with a signing wallet)/L2/the document store, and runs
//! [`bridge_orchestrator::SettlementOrchestrator`] until shutdown or a
//! fatal invariant violation.

use anyhow::{Context, Result, anyhow};
use bridge_chain::{AlloyL1Chain, ReqwestL2Rpc};
use bridge_config::Config;
use bridge_orchestrator::SettlementOrchestrator;
use bridge_store::MongoStore;
use bridge_types::SettlementRecord;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "settlement-service", version, about = "L2 -> L1 settlement daemon")]
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
        .context("loading settlement service configuration")?
        .with_env_overrides()
        .context("applying environment overrides")?;

    let settler_key = config
        .settler_private_key
        .as_deref()
        .ok_or_else(|| anyhow!("settler_private_key is required to run the settlement service"))?;
    let l1 = Arc::new(
        AlloyL1Chain::connect_with_signer(&config.rpc_provider, config.settlement_contract_address, settler_key)
            .context("connecting to L1 RPC provider with settler wallet")?,
    );
    let l2 = Arc::new(ReqwestL2Rpc::new(config.zkwasm_rpc_url.clone()));

    let mongo = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("connecting to the document store")?;
    let collection = mongo
        .database(&config.settlement_db_name())
        .collection::<mongodb::bson::Document>("settlements");
    let store = Arc::new(MongoStore::<SettlementRecord>::new(collection));

    let orchestrator = SettlementOrchestrator::new(config, l1, l2, store);
    let (handle, join) = orchestrator.run().await;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received");
    handle.shutdown();

    match join.await.context("settlement orchestrator task panicked")? {
        Ok(()) => Ok(()),
        Err(fatal) => {
            tracing::error!(error = %fatal, "settlement service aborting on fatal invariant violation");
            std::process::exit(1);
        }
    }
}
