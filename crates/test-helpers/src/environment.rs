// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::Address;
use fherate_config::{
    MockChains, MockInstanceDefaults, ProductionNetwork, RpcEndpoint, LOCAL_DEV_CHAIN_ID,
    LOCAL_DEV_RPC_URL,
};
use fherate_fhevm::{AbortSignal, CryptoSession, ProviderOrUrl, Result, SessionFactory};

use crate::relayer::InMemoryRelayer;
use crate::rpc::{FakeNode, FakeRpcConnector, MOCK_ACL_ADDRESS};
use crate::sdk::FakeRelayerSdk;

/// A local mock node, a production relayer and a session factory wired to
/// both, all in memory.
pub struct TestEnvironment {
    pub connector: Arc<FakeRpcConnector>,
    /// Relayer methods served by the local mock node
    pub mock_relayer: Arc<InMemoryRelayer>,
    /// Relayer behind the production bootstrap
    pub production_relayer: Arc<InMemoryRelayer>,
    pub sdk: Arc<FakeRelayerSdk>,
    pub factory: SessionFactory,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_network(ProductionNetwork::sepolia())
    }

    pub fn with_network(network: ProductionNetwork) -> Self {
        let mock_acl: Address = MOCK_ACL_ADDRESS.parse().expect("valid mock acl");
        let mock_relayer = Arc::new(InMemoryRelayer::new(mock_acl));
        let production_acl = network
            .acl_contract_address
            .parse()
            .unwrap_or(Address::ZERO);
        let production_relayer = Arc::new(InMemoryRelayer::new(production_acl));

        let connector = Arc::new(FakeRpcConnector::new().with_node(
            LOCAL_DEV_RPC_URL,
            FakeNode::hardhat(LOCAL_DEV_CHAIN_ID).with_relayer(mock_relayer.clone()),
        ));
        let sdk = Arc::new(FakeRelayerSdk::new(network, production_relayer.clone()));
        let factory = SessionFactory::new(
            connector.clone(),
            sdk.clone(),
            MockChains::default(),
            MockInstanceDefaults::default(),
        );

        Self {
            connector,
            mock_relayer,
            production_relayer,
            sdk,
            factory,
        }
    }

    pub fn local_rpc() -> RpcEndpoint {
        RpcEndpoint::from_url(LOCAL_DEV_RPC_URL).expect("valid local rpc url")
    }

    /// A session against the local mock node
    pub async fn mock_session(&self) -> Result<Arc<CryptoSession>> {
        self.factory
            .create_session(
                &ProviderOrUrl::Url(Self::local_rpc()),
                &AbortSignal::never(),
                None,
            )
            .await
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
