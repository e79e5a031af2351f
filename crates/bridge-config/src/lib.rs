//! Validated configuration record for the bridging engine.
//!
//! Loading the raw TOML/env source and the deployment artifacts it comes
//! from is out of scope here; this crate only owns the typed record and
//! its validation.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML source could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML source did not parse into a [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field failed post-parse validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which daemon role a process should run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Run the deposit service.
    Deposit,
    /// Run the settlement service.
    Settlement,
}

/// The validated configuration record described in the bridging engine
/// specification's external interfaces section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// L1 JSON-RPC provider endpoint.
    pub rpc_provider: String,
    /// Admin identity key used to authenticate L2 command submissions.
    pub server_admin_key: String,
    /// L1 settlement/proxy contract address.
    pub settlement_contract_address: Address,
    /// Document store connection string.
    pub mongo_uri: String,
    /// L2 application RPC endpoint.
    #[serde(default = "default_zkwasm_rpc_url")]
    pub zkwasm_rpc_url: String,
    /// Private key used to sign L1 settlement submissions.
    pub settler_private_key: Option<String>,
    /// L1 chain id, used when signing settlement transactions.
    pub chain_id: Option<u64>,
    /// Opcode for withdraw commands, as configured by the L2 application.
    pub withdraw_opcode: u64,
    /// Opcode for deposit commands, as configured by the L2 application.
    pub deposit_opcode: u64,
    /// Historical sweep start block. Defaults to `head - 200_000` if unset.
    pub start_block: Option<u64>,
    /// Non-18-decimal token scaling. `0` recovers the literal `/10^18`
    /// conversion.
    #[serde(default)]
    pub token_precision: u32,
    /// Fixed delay between retries of a reverted settlement submission.
    #[serde(default = "default_settlement_retry_delay_secs")]
    pub settlement_retry_delay_secs: u64,
    /// Which daemon role this process runs as.
    pub mode: Mode,
}

const fn default_settlement_retry_delay_secs() -> u64 {
    30
}

fn default_zkwasm_rpc_url() -> String {
    "http://localhost:3000".to_string()
}

impl Config {
    /// Loads and validates a [`Config`] from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a [`Config`] from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-variable overrides on top of an already-parsed
    /// config, then re-validates. Mirrors the small set of secrets an
    /// operator typically injects at deploy time rather than committing to
    /// the TOML file.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = std::env::var("BRIDGE_SERVER_ADMIN_KEY") {
            self.server_admin_key = v;
        }
        if let Ok(v) = std::env::var("BRIDGE_SETTLER_PRIVATE_KEY") {
            self.settler_private_key = Some(v);
        }
        if let Ok(v) = std::env::var("BRIDGE_MONGO_URI") {
            self.mongo_uri = v;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_provider.is_empty() {
            return Err(ConfigError::Invalid("rpc_provider must not be empty".into()));
        }
        if self.mongo_uri.is_empty() {
            return Err(ConfigError::Invalid("mongo_uri must not be empty".into()));
        }
        if self.token_precision > 18 {
            return Err(ConfigError::Invalid(format!(
                "token_precision {} exceeds the 18-decimal base divisor",
                self.token_precision
            )));
        }
        if self.mode == Mode::Settlement && self.settler_private_key.is_none() {
            return Err(ConfigError::Invalid(
                "settler_private_key is required in settlement mode".into(),
            ));
        }
        Ok(())
    }

    /// The divisor applied to a raw wei amount to obtain the whole-unit
    /// `amount` field of a `DepositRecord`, per `10^(18 - token_precision)`.
    pub fn wei_divisor(&self) -> alloy_primitives::U256 {
        alloy_primitives::U256::from(10u64).pow(alloy_primitives::U256::from(18 - self.token_precision as u64))
    }

    /// The document-store database name for the deposit service, per the
    /// `<settlementContractAddress>_deposit` convention.
    pub fn deposit_db_name(&self) -> String {
        format!("{:#x}_deposit", self.settlement_contract_address)
    }

    /// The document-store database name for the settlement service.
    pub fn settlement_db_name(&self) -> String {
        format!("{:#x}_settlement", self.settlement_contract_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml(mode: &str) -> String {
        format!(
            r#"
            rpc_provider = "http://localhost:8545"
            server_admin_key = "admin"
            settlement_contract_address = "0x0000000000000000000000000000000000000001"
            mongo_uri = "mongodb://localhost:27017"
            withdraw_opcode = 3
            deposit_opcode = 2
            mode = "{mode}"
            settler_private_key = "0xdeadbeef"
            "#
        )
    }

    #[test]
    fn parses_minimal_deposit_config() {
        let cfg = Config::from_toml_str(&sample_toml("deposit")).unwrap();
        assert_eq!(cfg.zkwasm_rpc_url, "http://localhost:3000");
        assert_eq!(cfg.token_precision, 0);
        assert_eq!(cfg.settlement_retry_delay_secs, 30);
    }

    #[test]
    fn rejects_empty_rpc_provider() {
        let mut toml = sample_toml("deposit");
        toml = toml.replace(r#"rpc_provider = "http://localhost:8545""#, r#"rpc_provider = """#);
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn rejects_token_precision_above_18() {
        let mut toml = sample_toml("deposit");
        toml.push_str("token_precision = 19\n");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn settlement_mode_requires_settler_key() {
        let toml = sample_toml("settlement").replace(
            r#"settler_private_key = "0xdeadbeef""#,
            "",
        );
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn db_names_follow_contract_address_convention() {
        let cfg = Config::from_toml_str(&sample_toml("deposit")).unwrap();
        assert_eq!(
            cfg.deposit_db_name(),
            "0x0000000000000000000000000000000000000001_deposit"
        );
    }

    #[test]
    fn loads_from_a_toml_file_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, sample_toml("deposit").as_bytes()).unwrap();
        let cfg = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(cfg.rpc_provider, "http://localhost:8545");
    }

    #[test]
    fn missing_config_file_is_a_read_error() {
        let err = Config::from_toml_file("/nonexistent/bridge-config-test.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
