// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use fherate_config::{MockChains, RpcEndpoint};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::Result;
use crate::network::{MockAuthorities, NetworkProfile, ProviderOrUrl};
use crate::rpc::RpcConnector;

pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// Decides whether the target chain is a local mock network or production.
pub struct ChainResolver {
    connector: Arc<dyn RpcConnector>,
    mock_chains: MockChains,
}

impl ChainResolver {
    pub fn new(connector: Arc<dyn RpcConnector>, mock_chains: MockChains) -> Self {
        Self {
            connector,
            mock_chains,
        }
    }

    pub fn mock_chains(&self) -> &MockChains {
        &self.mock_chains
    }

    pub async fn chain_id(&self, target: &ProviderOrUrl) -> Result<u64> {
        match target {
            ProviderOrUrl::Wallet(wallet) => Ok(wallet.chain_id().await?),
            ProviderOrUrl::Url(rpc) => {
                let client = self.connector.connect(rpc).await?;
                client.chain_id().await
            }
        }
    }

    /// Resolve the target into a network profile.
    ///
    /// Only a chain in the mock registry whose node answers both probes becomes
    /// `Mock`. Every probe failure falls back to `Production`, keeping the RPC
    /// endpoint so callers can still reach the node.
    pub async fn resolve(&self, target: &ProviderOrUrl) -> Result<NetworkProfile> {
        let chain_id = self.chain_id(target).await?;

        // An explicit URL wins over the registry default
        let rpc_url = match (target.url(), self.mock_chains.get(chain_id)) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(default)) => Some(default.clone()),
            (None, None) => None,
        };

        if !self.mock_chains.contains(chain_id) {
            debug!("Chain {} is not a mock chain", chain_id);
            return Ok(NetworkProfile::Production { chain_id, rpc_url });
        }

        let Some(rpc) = rpc_url else {
            return Ok(NetworkProfile::Production { chain_id, rpc_url });
        };

        match self.fetch_mock_authorities(chain_id, &rpc).await {
            Some(authorities) => Ok(NetworkProfile::Mock {
                chain_id,
                rpc_url: rpc,
                authorities,
            }),
            None => Ok(NetworkProfile::Production {
                chain_id,
                rpc_url: Some(rpc),
            }),
        }
    }

    async fn fetch_mock_authorities(
        &self,
        chain_id: u64,
        rpc: &RpcEndpoint,
    ) -> Option<MockAuthorities> {
        let fallback = |reason: String| {
            warn!(
                "Chain {} is registered as a mock network but {} ({}). Falling back to production initialization.",
                chain_id, reason, rpc
            );
            None
        };

        // Dropped on every return below, closing the connection
        let client = match self.connector.connect(rpc).await {
            Ok(client) => client,
            Err(e) => return fallback(format!("the node is unreachable: {e}")),
        };

        let version = match client.client_version().await {
            Ok(version) => version,
            Err(e) => return fallback(format!("web3_clientVersion failed: {e}")),
        };
        if !version.to_lowercase().contains("hardhat") {
            return fallback(format!("the node reports itself as '{version}'"));
        }

        let metadata = match client.request(RELAYER_METADATA_METHOD, json!([])).await {
            Ok(metadata) => metadata,
            Err(e) => return fallback(format!("{RELAYER_METADATA_METHOD} failed: {e}")),
        };

        match MockAuthorities::from_metadata(&metadata) {
            Some(authorities) => {
                debug!("Mock authorities for chain {}: {:?}", chain_id, authorities);
                Some(authorities)
            }
            None => fallback(format!("{RELAYER_METADATA_METHOD} returned malformed metadata")),
        }
    }
}
