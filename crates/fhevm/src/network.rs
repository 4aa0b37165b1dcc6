// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use fherate_config::RpcEndpoint;
use serde::Serialize;
use serde_json::Value;

use crate::wallet::Wallet;

/// What the session is being built against: a live wallet or a bare RPC URL.
#[derive(Clone)]
pub enum ProviderOrUrl {
    Wallet(Arc<dyn Wallet>),
    Url(RpcEndpoint),
}

impl ProviderOrUrl {
    pub fn wallet(&self) -> Option<Arc<dyn Wallet>> {
        match self {
            ProviderOrUrl::Wallet(wallet) => Some(wallet.clone()),
            ProviderOrUrl::Url(_) => None,
        }
    }

    pub fn url(&self) -> Option<&RpcEndpoint> {
        match self {
            ProviderOrUrl::Wallet(_) => None,
            ProviderOrUrl::Url(url) => Some(url),
        }
    }
}

impl fmt::Debug for ProviderOrUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderOrUrl::Wallet(_) => f.write_str("ProviderOrUrl::Wallet"),
            ProviderOrUrl::Url(url) => write!(f, "ProviderOrUrl::Url({url})"),
        }
    }
}

impl From<RpcEndpoint> for ProviderOrUrl {
    fn from(value: RpcEndpoint) -> Self {
        ProviderOrUrl::Url(value)
    }
}

impl From<Arc<dyn Wallet>> for ProviderOrUrl {
    fn from(value: Arc<dyn Wallet>) -> Self {
        ProviderOrUrl::Wallet(value)
    }
}

/// Flat summary of a resolved network, immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub is_mock: bool,
    pub rpc_endpoint: Option<RpcEndpoint>,
}

/// Authority contracts a local mock node reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MockAuthorities {
    pub acl: Address,
    pub input_verifier: Address,
    pub kms_verifier: Address,
}

impl MockAuthorities {
    /// Parse a `fhevm_relayer_metadata` response. Every field must be a
    /// 0x-prefixed address.
    pub fn from_metadata(metadata: &Value) -> Option<Self> {
        fn field(metadata: &Value, name: &str) -> Option<Address> {
            let raw = metadata.get(name)?.as_str()?;
            if !raw.starts_with("0x") {
                return None;
            }
            raw.parse().ok()
        }

        Some(Self {
            acl: field(metadata, "ACLAddress")?,
            input_verifier: field(metadata, "InputVerifierAddress")?,
            kms_verifier: field(metadata, "KMSVerifierAddress")?,
        })
    }
}

/// Resolved network, decided once and passed explicitly downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkProfile {
    Mock {
        chain_id: u64,
        rpc_url: RpcEndpoint,
        authorities: MockAuthorities,
    },
    Production {
        chain_id: u64,
        rpc_url: Option<RpcEndpoint>,
    },
}

impl NetworkProfile {
    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkProfile::Mock { chain_id, .. } | NetworkProfile::Production { chain_id, .. } => {
                *chain_id
            }
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, NetworkProfile::Mock { .. })
    }

    pub fn descriptor(&self) -> NetworkDescriptor {
        match self {
            NetworkProfile::Mock {
                chain_id, rpc_url, ..
            } => NetworkDescriptor {
                chain_id: *chain_id,
                is_mock: true,
                rpc_endpoint: Some(rpc_url.clone()),
            },
            NetworkProfile::Production { chain_id, rpc_url } => NetworkDescriptor {
                chain_id: *chain_id,
                is_mock: false,
                rpc_endpoint: rpc_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_parsing() {
        let metadata = json!({
            "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
            "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
            "KMSVerifierAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
        });
        let authorities = MockAuthorities::from_metadata(&metadata).unwrap();
        assert_eq!(
            authorities.acl,
            "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_metadata_rejects_malformed_fields() {
        assert!(MockAuthorities::from_metadata(&json!(null)).is_none());
        assert!(MockAuthorities::from_metadata(&json!({
            "ACLAddress": "50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
            "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
            "KMSVerifierAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
        }))
        .is_none());
        assert!(MockAuthorities::from_metadata(&json!({
            "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
            "InputVerifierAddress": 42,
            "KMSVerifierAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
        }))
        .is_none());
    }
}
