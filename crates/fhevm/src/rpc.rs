// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use fherate_config::RpcEndpoint;
use serde_json::Value;
use tracing::trace;

use crate::error::{FhevmError, Result};

/// An ad-hoc JSON-RPC connection. The connection is released when the value
/// is dropped, so holders should keep it scoped to the call that needs it.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// `web3_clientVersion`
    async fn client_version(&self) -> Result<String>;

    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// Opens JSON-RPC connections to a URL
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn connect(&self, rpc: &RpcEndpoint) -> Result<Box<dyn RpcClient>>;
}

/// JSON-RPC over HTTP via alloy
pub struct AlloyRpcClient {
    provider: DynProvider,
}

impl AlloyRpcClient {
    pub async fn connect(rpc: &RpcEndpoint) -> Result<Self> {
        let url = rpc
            .as_http_url()
            .map_err(|e| FhevmError::Rpc(e.to_string()))?;
        let provider = ProviderBuilder::new()
            .connect(url.as_str())
            .await
            .map_err(|e| FhevmError::Rpc(format!("cannot connect to {rpc}: {e}")))?
            .erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl RpcClient for AlloyRpcClient {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| FhevmError::Rpc(e.to_string()))
    }

    async fn client_version(&self) -> Result<String> {
        self.provider
            .get_client_version()
            .await
            .map_err(|e| FhevmError::Rpc(e.to_string()))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        trace!("rpc request {}", method);
        self.provider
            .raw_request::<Value, Value>(method.to_string().into(), params)
            .await
            .map_err(|e| FhevmError::Rpc(format!("{method}: {e}")))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlloyRpcConnector;

#[async_trait]
impl RpcConnector for AlloyRpcConnector {
    async fn connect(&self, rpc: &RpcEndpoint) -> Result<Box<dyn RpcClient>> {
        Ok(Box::new(AlloyRpcClient::connect(rpc).await?))
    }
}
