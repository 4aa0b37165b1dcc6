// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use fherate_config::RpcEndpoint;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::error::{FhevmError, Result};
use crate::rpc::RpcConnector;

pub const INPUT_PROOF_PATH: &str = "v1/input-proof";
pub const USER_DECRYPT_PATH: &str = "v1/user-decrypt";
pub const INPUT_PROOF_METHOD: &str = "fhevm_relayer_v1_input_proof";
pub const USER_DECRYPT_METHOD: &str = "fhevm_relayer_v1_user_decrypt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProofRequest {
    pub contract_chain_id: u64,
    pub contract_address: Address,
    pub user_address: Address,
    /// Hex without 0x prefix
    pub ciphertext_with_input_verification: String,
    pub extra_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProofResponse {
    pub handles: Vec<B256>,
    /// Coprocessor signatures over the handles
    pub signatures: Vec<Bytes>,
}

/// A ciphertext handle together with the contract allowed to use it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: B256,
    pub contract_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidity {
    pub start_timestamp: String,
    pub duration_days: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequest {
    pub handle_contract_pairs: Vec<HandleContractPair>,
    pub request_validity: RequestValidity,
    pub contracts_chain_id: u64,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    /// Hex without 0x prefix
    pub signature: String,
    pub public_key: String,
    pub extra_data: Bytes,
}

/// Relayer responses are wrapped in `{"response": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

/// Proving and decryption backend of a session
#[async_trait]
pub trait RelayerTransport: Send + Sync {
    async fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse>;

    /// Returns the raw response, which only the session's codec can interpret
    async fn user_decrypt(&self, request: &UserDecryptRequest) -> Result<Value>;
}

/// The production relayer's HTTP API
#[derive(Clone)]
pub struct HttpRelayer {
    client: reqwest::Client,
    base: RpcEndpoint,
}

impl HttpRelayer {
    pub fn new(base: RpcEndpoint) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: RpcEndpoint) -> Self {
        Self { client, base }
    }

    pub fn base(&self) -> &RpcEndpoint {
        &self.base
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| FhevmError::Relayer(e.to_string()))?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FhevmError::Relayer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    FhevmError::DecryptionUnauthorized(format!("relayer answered {status}: {text}"))
                }
                _ => FhevmError::Relayer(format!("{path} answered {status}: {text}")),
            });
        }

        let envelope: Envelope<Resp> = response
            .json()
            .await
            .map_err(|e| FhevmError::Relayer(format!("malformed {path} response: {e}")))?;
        Ok(envelope.response)
    }
}

#[async_trait]
impl RelayerTransport for HttpRelayer {
    async fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse> {
        self.post(INPUT_PROOF_PATH, request).await
    }

    async fn user_decrypt(&self, request: &UserDecryptRequest) -> Result<Value> {
        self.post(USER_DECRYPT_PATH, request).await
    }
}

/// Relayer methods served directly by a local mock node.
///
/// Each call opens its own connection and releases it before returning.
pub struct JsonRpcRelayer {
    connector: Arc<dyn RpcConnector>,
    rpc: RpcEndpoint,
}

impl JsonRpcRelayer {
    pub fn new(connector: Arc<dyn RpcConnector>, rpc: RpcEndpoint) -> Self {
        Self { connector, rpc }
    }

    async fn call<Req: Serialize + Sync>(&self, method: &str, request: &Req) -> Result<Value> {
        trace!("{} via {}", method, self.rpc);
        let client = self.connector.connect(&self.rpc).await?;
        client.request(method, json!([request])).await
    }
}

#[async_trait]
impl RelayerTransport for JsonRpcRelayer {
    async fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse> {
        let value = self.call(INPUT_PROOF_METHOD, request).await?;
        serde_json::from_value(value)
            .map_err(|e| FhevmError::Relayer(format!("malformed {INPUT_PROOF_METHOD} response: {e}")))
    }

    async fn user_decrypt(&self, request: &UserDecryptRequest) -> Result<Value> {
        self.call(USER_DECRYPT_METHOD, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_names() {
        let request = UserDecryptRequest {
            handle_contract_pairs: vec![HandleContractPair {
                handle: B256::repeat_byte(1),
                contract_address: Address::repeat_byte(2),
            }],
            request_validity: RequestValidity {
                start_timestamp: "1700000000".to_string(),
                duration_days: "10".to_string(),
            },
            contracts_chain_id: 31337,
            contract_addresses: vec![Address::repeat_byte(2)],
            user_address: Address::repeat_byte(3),
            signature: "00".to_string(),
            public_key: "ab".to_string(),
            extra_data: Bytes::from_static(&[0]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["handleContractPairs"][0]["contractAddress"].is_string());
        assert_eq!(value["requestValidity"]["durationDays"], "10");
        assert_eq!(value["contractsChainId"], 31337);
    }

    #[test]
    fn test_envelope_unwrapping() {
        let raw = json!({
            "response": {
                "handles": [B256::repeat_byte(1)],
                "signatures": ["0xabcd"],
            }
        });
        let envelope: Envelope<InputProofResponse> = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.response.handles.len(), 1);
        assert_eq!(envelope.response.signatures[0], Bytes::from_static(&[0xab, 0xcd]));
    }
}
