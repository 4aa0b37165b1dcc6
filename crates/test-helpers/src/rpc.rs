// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fherate_config::RpcEndpoint;
use fherate_fhevm::{
    FhevmError, InputProofRequest, RelayerTransport, Result, RpcClient, RpcConnector,
    UserDecryptRequest, INPUT_PROOF_METHOD, RELAYER_METADATA_METHOD, USER_DECRYPT_METHOD,
};
use serde_json::{json, Value};

use crate::relayer::InMemoryRelayer;

pub const MOCK_ACL_ADDRESS: &str = "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D";
pub const MOCK_INPUT_VERIFIER_ADDRESS: &str = "0x901F8942346f7AB3a01F6D7613119Bca447Bb030";
pub const MOCK_KMS_VERIFIER_ADDRESS: &str = "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC";

pub fn mock_metadata() -> Value {
    json!({
        "ACLAddress": MOCK_ACL_ADDRESS,
        "InputVerifierAddress": MOCK_INPUT_VERIFIER_ADDRESS,
        "KMSVerifierAddress": MOCK_KMS_VERIFIER_ADDRESS,
    })
}

/// Scripted behaviour of one JSON-RPC node
#[derive(Clone)]
pub struct FakeNode {
    pub chain_id: u64,
    pub client_version: String,
    pub metadata: Option<Value>,
    pub relayer: Option<Arc<InMemoryRelayer>>,
    /// Method that never answers
    pub stall_on: Option<String>,
}

impl FakeNode {
    /// A local mock node serving authority metadata
    pub fn hardhat(chain_id: u64) -> Self {
        Self {
            chain_id,
            client_version: "HardhatNetwork/2.22.17/@fhevm/mock-utils".to_string(),
            metadata: Some(mock_metadata()),
            relayer: None,
            stall_on: None,
        }
    }

    /// A node that does not identify as a local mock node
    pub fn anvil(chain_id: u64) -> Self {
        Self {
            chain_id,
            client_version: "anvil/v1.2.3".to_string(),
            metadata: None,
            relayer: None,
            stall_on: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_relayer(mut self, relayer: Arc<InMemoryRelayer>) -> Self {
        self.relayer = Some(relayer);
        self
    }

    pub fn stalling_on(mut self, method: &str) -> Self {
        self.stall_on = Some(method.to_string());
        self
    }
}

/// Connects to `FakeNode`s by URL and tracks how many connections are open.
#[derive(Default)]
pub struct FakeRpcConnector {
    nodes: Mutex<HashMap<String, FakeNode>>,
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl FakeRpcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, url: &str, node: FakeNode) -> Self {
        self.add_node(url, node);
        self
    }

    pub fn add_node(&self, url: &str, node: FakeNode) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.insert(url.trim_end_matches('/').to_string(), node);
        }
    }

    /// Connections opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections not yet dropped
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcConnector for FakeRpcConnector {
    async fn connect(&self, rpc: &RpcEndpoint) -> Result<Box<dyn RpcClient>> {
        let node = self
            .nodes
            .lock()
            .map_err(|_| FhevmError::Rpc("poisoned".to_string()))?
            .get(rpc.as_str())
            .cloned()
            .ok_or_else(|| FhevmError::Rpc(format!("connection refused: {rpc}")))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRpcClient {
            node,
            live: self.live.clone(),
        }))
    }
}

pub struct FakeRpcClient {
    node: FakeNode,
    live: Arc<AtomicUsize>,
}

impl FakeRpcClient {
    async fn stall_if(&self, method: &str) {
        if self.node.stall_on.as_deref() == Some(method) {
            std::future::pending::<()>().await;
        }
    }

    fn relayer(&self) -> Result<&InMemoryRelayer> {
        self.node
            .relayer
            .as_deref()
            .ok_or_else(|| FhevmError::Rpc("relayer methods are not served".to_string()))
    }
}

fn first_param<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    let first = params
        .get(0)
        .cloned()
        .ok_or_else(|| FhevmError::Rpc("missing params".to_string()))?;
    serde_json::from_value(first).map_err(|e| FhevmError::Rpc(e.to_string()))
}

#[async_trait]
impl RpcClient for FakeRpcClient {
    async fn chain_id(&self) -> Result<u64> {
        self.stall_if("eth_chainId").await;
        Ok(self.node.chain_id)
    }

    async fn client_version(&self) -> Result<String> {
        self.stall_if("web3_clientVersion").await;
        Ok(self.node.client_version.clone())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.stall_if(method).await;
        match method {
            RELAYER_METADATA_METHOD => self
                .node
                .metadata
                .clone()
                .ok_or_else(|| FhevmError::Rpc(format!("method {method} not found"))),
            INPUT_PROOF_METHOD => {
                let request: InputProofRequest = first_param(params)?;
                let response = self.relayer()?.input_proof(&request).await?;
                serde_json::to_value(response).map_err(|e| FhevmError::Rpc(e.to_string()))
            }
            USER_DECRYPT_METHOD => {
                let request: UserDecryptRequest = first_param(params)?;
                self.relayer()?.user_decrypt(&request).await
            }
            _ => Err(FhevmError::Rpc(format!("method {method} not found"))),
        }
    }
}

impl Drop for FakeRpcClient {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
