// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::load_config::find_in_parent;
use crate::load_config::resolve_config_path;
use crate::network::{MockChains, MockInstanceDefaults, ProductionNetwork};
use crate::rpc::RpcEndpoint;
use alloy_primitives::Address;
use anyhow::Context;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "fherate.config.yaml";
pub const ENV_PREFIX: &str = "FHERATE_";

/// Default validity window of a decryption authorization.
pub const DEFAULT_SIGNATURE_DURATION_DAYS: u64 = 10;

/// A chain that should be treated as a local mock network
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MockChainEntry {
    pub chain_id: u64,
    pub rpc_url: RpcEndpoint,
}

/// Where the rating ledger is deployed on a given chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LedgerDeployment {
    pub chain_id: u64,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecryptionConfig {
    /// How many days a freshly signed decryption authorization stays valid
    pub duration_days: u64,
    /// Directory of the persistent signature cache. Defaults to
    /// `~/.local/share/fherate/signatures` on linux
    pub cache_dir: Option<PathBuf>,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_SIGNATURE_DURATION_DAYS,
            cache_dir: None,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FheRateConfig {
    /// JSON-RPC endpoint the CLI wallet connects through
    pub rpc_url: Option<RpcEndpoint>,
    /// Hex private key of the CLI wallet, usually given as `FHERATE_PRIVATE_KEY`
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    /// Extra chains treated as mock networks, merged over the built-in registry
    pub mock_chains: Vec<MockChainEntry>,
    pub production: ProductionNetwork,
    pub mock: MockInstanceDefaults,
    pub decryption: DecryptionConfig,
    pub ledger: Vec<LedgerDeployment>,
    #[serde(skip)]
    config_file: Option<PathBuf>,
}

impl Default for FheRateConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            private_key: None,
            mock_chains: vec![],
            production: ProductionNetwork::default(),
            mock: MockInstanceDefaults::default(),
            decryption: DecryptionConfig::default(),
            ledger: vec![],
            config_file: None,
        }
    }
}

impl FheRateConfig {
    /// The mock registry with configured entries applied on top of the defaults
    pub fn mock_chains(&self) -> MockChains {
        MockChains::default().with_overrides(
            self.mock_chains
                .iter()
                .map(|entry| (entry.chain_id, entry.rpc_url.clone())),
        )
    }

    pub fn ledger_address(&self, chain_id: u64) -> Option<Address> {
        self.ledger
            .iter()
            .find(|deployment| deployment.chain_id == chain_id)
            .map(|deployment| deployment.address)
    }

    pub fn signature_cache_dir(&self) -> PathBuf {
        self.decryption
            .cache_dir
            .clone()
            .unwrap_or_else(|| OsDirs::data_dir().join("signatures"))
    }

    pub fn config_file(&self) -> Option<&PathBuf> {
        self.config_file.as_ref()
    }
}

/// Load configuration from defaults, then the yaml file, then `FHERATE_*`
/// environment variables. A missing file is not an error.
pub fn load_config(cli_file: Option<PathBuf>) -> Result<FheRateConfig> {
    let resolved_config_path = resolve_config_path(
        find_in_parent,
        env::current_dir()?,
        OsDirs::config_dir(),
        DEFAULT_CONFIG_NAME,
        cli_file,
    );
    debug!("Resolved config path: {:?}", resolved_config_path);

    let mut config: FheRateConfig = Figment::from(Serialized::defaults(FheRateConfig::default()))
        .merge(Yaml::file(&resolved_config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Could not parse configuration")?;

    if resolved_config_path.exists() {
        config.config_file = Some(resolved_config_path);
    }

    Ok(config)
}

pub struct OsDirs;
impl OsDirs {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fherate")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fherate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_deserialization() -> Result<()> {
        let config_str = r#"
rpc_url: "http://localhost:8545"
mock_chains:
  - chain_id: 1337
    rpc_url: "http://localhost:7545"
decryption:
  duration_days: 3
ledger:
  - chain_id: 31337
    address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
"#;
        let config: FheRateConfig = serde_yaml::from_str(config_str)?;
        assert_eq!(config.decryption.duration_days, 3);
        assert!(config.mock_chains().contains(1337));
        assert!(config.mock_chains().contains(31337));
        assert_eq!(
            config.ledger_address(31337),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse()?)
        );
        assert_eq!(config.ledger_address(1), None);
        assert_eq!(config.production, ProductionNetwork::sepolia());
        Ok(())
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_NAME,
                r#"
decryption:
  duration_days: 5
mock_chains:
  - chain_id: 31337
    rpc_url: "http://127.0.0.1:9545"
"#,
            )?;
            jail.set_env("FHERATE_DECRYPTION__DURATION_DAYS", "7");

            let config = load_config(Some(PathBuf::from(DEFAULT_CONFIG_NAME)))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.decryption.duration_days, 7);
            assert_eq!(
                config.mock_chains().get(31337).map(|rpc| rpc.to_string()),
                Some("http://127.0.0.1:9545".to_string())
            );
            assert!(config.config_file().is_some());
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = load_config(Some(PathBuf::from("nothing-here.yaml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(
                config.decryption.duration_days,
                DEFAULT_SIGNATURE_DURATION_DAYS
            );
            assert!(config.config_file().is_none());
            Ok(())
        });
    }
}
