// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rpc::RpcEndpoint;

/// Chain id of the default local development node.
pub const LOCAL_DEV_CHAIN_ID: u64 = 31337;
pub const LOCAL_DEV_RPC_URL: &str = "http://localhost:8545";

/// Gateway chain id local mock nodes sign against.
pub const MOCK_GATEWAY_CHAIN_ID: u64 = 55815;

/// Public configuration of the production FHE network.
///
/// Addresses are kept as strings: they arrive from configuration files and from
/// the relayer SDK, and are only trusted once the session factory has validated
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProductionNetwork {
    pub acl_contract_address: String,
    pub kms_contract_address: String,
    pub input_verifier_contract_address: String,
    pub verifying_contract_address_decryption: String,
    pub verifying_contract_address_input_verification: String,
    /// Host chain the ledger lives on
    pub chain_id: u64,
    /// Chain the KMS gateway verifies EIP-712 requests against
    pub gateway_chain_id: u64,
    pub relayer_url: RpcEndpoint,
    /// Public RPC used when no wallet is connected
    pub network_url: Option<RpcEndpoint>,
}

impl ProductionNetwork {
    /// The Sepolia testnet deployment.
    pub fn sepolia() -> Self {
        Self {
            acl_contract_address: "0x687820221192C5B662b25367F70076A37bc79b6c".to_string(),
            kms_contract_address: "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC".to_string(),
            input_verifier_contract_address: "0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4"
                .to_string(),
            verifying_contract_address_decryption: "0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"
                .to_string(),
            verifying_contract_address_input_verification:
                "0x7048C39f048125eDa9d678AEbaDfB22F7900a29F".to_string(),
            chain_id: 11155111,
            gateway_chain_id: 55815,
            relayer_url: RpcEndpoint::from_url("https://relayer.testnet.zama.cloud")
                .expect("static relayer url is valid"),
            network_url: RpcEndpoint::from_url("https://eth-sepolia.public.blastapi.io").ok(),
        }
    }
}

impl Default for ProductionNetwork {
    fn default() -> Self {
        Self::sepolia()
    }
}

/// Constants a local mock node is built with. The authority addresses
/// themselves are fetched from the node at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MockInstanceDefaults {
    pub gateway_chain_id: u64,
    pub verifying_contract_address_decryption: String,
    pub verifying_contract_address_input_verification: String,
}

impl Default for MockInstanceDefaults {
    fn default() -> Self {
        Self {
            gateway_chain_id: MOCK_GATEWAY_CHAIN_ID,
            verifying_contract_address_decryption: "0x5ffdaAB0373E62E2ea2944776209aEf29E631A64"
                .to_string(),
            verifying_contract_address_input_verification:
                "0x812b06e1CDCE800494b79fFE4f925A504a9A9810".to_string(),
        }
    }
}

/// Registry of chains treated as local mock networks, keyed by chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockChains(BTreeMap<u64, RpcEndpoint>);

impl MockChains {
    /// An empty registry. Most callers want `MockChains::default()` which
    /// carries the local development node.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Merge caller supplied entries over the registry. Later entries win.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (u64, RpcEndpoint)>,
    {
        self.0.extend(overrides);
        self
    }

    pub fn get(&self, chain_id: u64) -> Option<&RpcEndpoint> {
        self.0.get(&chain_id)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.0.contains_key(&chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }
}

impl Default for MockChains {
    fn default() -> Self {
        let mut chains = BTreeMap::new();
        if let Ok(rpc) = RpcEndpoint::from_url(LOCAL_DEV_RPC_URL) {
            chains.insert(LOCAL_DEV_CHAIN_ID, rpc);
        }
        Self(chains)
    }
}
