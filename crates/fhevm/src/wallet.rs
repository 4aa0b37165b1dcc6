// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, Signature};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy::transports::TransportError;
use async_trait::async_trait;
use fherate_config::RpcEndpoint;
use serde_json::{json, Value};
use thiserror::Error as ThisError;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::eip712::Eip712Request;

/// EIP-1193 code for "user rejected the request"
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("User rejected the request")]
    Rejected,
    #[error("Wallet is disconnected")]
    Disconnected,
    #[error("Wallet RPC failed: {0}")]
    Rpc(String),
    #[error("Signing failed: {0}")]
    Signer(String),
}

impl WalletError {
    /// Classify an error response from the wallet's JSON-RPC endpoint
    pub fn from_rpc(code: i64, message: impl Display) -> Self {
        if code == USER_REJECTED_CODE {
            return Self::Rejected;
        }
        Self::Rpc(format!("{message} (code {code})"))
    }
}

impl From<TransportError> for WalletError {
    fn from(e: TransportError) -> Self {
        match e.as_error_resp() {
            Some(payload) => Self::from_rpc(payload.code, &payload.message),
            None => Self::Rpc(e.to_string()),
        }
    }
}

/// Changes pushed by the wallet. Each one invalidates the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnected,
}

/// The connected wallet, as seen by the encrypted session.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn chain_id(&self) -> Result<u64, WalletError>;

    async fn address(&self) -> Result<Address, WalletError>;

    /// JSON-RPC shaped passthrough to the wallet's node
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;

    /// Sign a decryption authorization. May wait on the user for an unbounded
    /// amount of time.
    async fn sign_typed_data(&self, request: &Eip712Request) -> Result<Signature, WalletError> {
        let address = self.address().await?;
        let payload = serde_json::to_string(&request.to_typed_data())
            .map_err(|e| WalletError::Signer(e.to_string()))?;
        let result = self
            .request("eth_signTypedData_v4", json!([address, payload]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| WalletError::Signer(format!("unexpected signature: {result}")))?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| WalletError::Signer(e.to_string()))?;
        Signature::try_from(&bytes[..]).map_err(|e| WalletError::Signer(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// A wallet backed by a local private key, optionally connected to a node.
pub struct LocalWallet {
    signer: PrivateKeySigner,
    chain_id: AtomicU64,
    provider: Option<DynProvider>,
    events: broadcast::Sender<WalletEvent>,
}

impl LocalWallet {
    /// A wallet that can sign but has no node behind it
    pub fn offline(signer: PrivateKeySigner, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            signer,
            chain_id: AtomicU64::new(chain_id),
            provider: None,
            events,
        }
    }

    pub fn random(chain_id: u64) -> Self {
        Self::offline(PrivateKeySigner::random(), chain_id)
    }

    pub async fn connect(rpc: &RpcEndpoint, private_key: &str) -> Result<Self, WalletError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| WalletError::Signer(format!("invalid private key: {e}")))?;
        let url = rpc
            .as_http_url()
            .map_err(|e| WalletError::Rpc(e.to_string()))?;
        let provider = ProviderBuilder::new()
            .connect(url.as_str())
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?
            .erased();
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))?;
        info!("Wallet {} connected to chain {}", signer.address(), chain_id);

        let (events, _) = broadcast::channel(16);
        Ok(Self {
            signer,
            chain_id: AtomicU64::new(chain_id),
            provider: Some(provider),
            events,
        })
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Push a wallet event to subscribers, tracking chain switches locally.
    pub fn notify(&self, event: WalletEvent) {
        if let WalletEvent::ChainChanged(chain_id) = event {
            self.chain_id.store(chain_id, Ordering::SeqCst);
        }
        debug!("Wallet event: {:?}", event);
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn address(&self) -> Result<Address, WalletError> {
        Ok(self.signer.address())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        match method {
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.chain_id().await?))),
            "eth_accounts" | "eth_requestAccounts" => Ok(json!([self.signer.address()])),
            _ => {
                let provider = self.provider.as_ref().ok_or(WalletError::Disconnected)?;
                Ok(provider
                    .raw_request::<Value, Value>(method.to_string().into(), params)
                    .await?)
            }
        }
    }

    async fn sign_typed_data(&self, request: &Eip712Request) -> Result<Signature, WalletError> {
        self.signer
            .sign_hash_sync(&request.signing_hash())
            .map_err(|e| WalletError::Signer(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FhevmError;

    #[tokio::test]
    async fn test_offline_wallet_signs_locally() {
        let wallet = LocalWallet::random(31337);
        let request = Eip712Request::new(
            55815,
            Address::repeat_byte(0x11),
            b"public-key",
            &[Address::repeat_byte(0xaa)],
            1_700_000_000,
            10,
        );
        let signature = wallet.sign_typed_data(&request).await.unwrap();
        assert_eq!(
            request.recover_signer(&signature),
            Some(wallet.address().await.unwrap())
        );
    }

    #[tokio::test]
    async fn test_chain_id_request() {
        let wallet = LocalWallet::random(31337);
        let chain_id = wallet.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(chain_id, json!("0x7a69"));
        assert_eq!(
            wallet.request("eth_blockNumber", json!([])).await,
            Err(WalletError::Disconnected)
        );
    }

    /// A browser-style wallet that refuses every request
    struct RefusingWallet {
        events: broadcast::Sender<WalletEvent>,
    }

    #[async_trait]
    impl Wallet for RefusingWallet {
        async fn chain_id(&self) -> Result<u64, WalletError> {
            Ok(11155111)
        }

        async fn address(&self) -> Result<Address, WalletError> {
            Ok(Address::repeat_byte(0x22))
        }

        async fn request(&self, _method: &str, _params: Value) -> Result<Value, WalletError> {
            Err(WalletError::from_rpc(
                USER_REJECTED_CODE,
                "User denied message signature",
            ))
        }

        fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
            self.events.subscribe()
        }
    }

    #[tokio::test]
    async fn test_user_rejection_code_denies_authorization() {
        let (events, _) = broadcast::channel(1);
        let wallet = RefusingWallet { events };
        let request = Eip712Request::new(
            55815,
            Address::repeat_byte(0x11),
            b"public-key",
            &[Address::repeat_byte(0xaa)],
            1_700_000_000,
            10,
        );
        let err = wallet.sign_typed_data(&request).await.unwrap_err();
        assert_eq!(err, WalletError::Rejected);
        assert_eq!(FhevmError::from(err), FhevmError::AuthorizationDenied);

        assert_eq!(
            WalletError::from_rpc(-32603, "internal error"),
            WalletError::Rpc("internal error (code -32603)".to_string())
        );
    }

    #[tokio::test]
    async fn test_chain_change_is_broadcast() {
        let wallet = LocalWallet::random(31337);
        let mut events = wallet.subscribe();
        wallet.notify(WalletEvent::ChainChanged(11155111));
        assert_eq!(events.recv().await.unwrap(), WalletEvent::ChainChanged(11155111));
        assert_eq!(wallet.chain_id().await.unwrap(), 11155111);
    }
}
