// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Bytes;
use async_trait::async_trait;
use fherate_config::ProductionNetwork;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::codec::{CiphertextCodec, PublicMaterial};
use crate::error::{FhevmError, Result};
use crate::instance::{CryptoSession, InstanceConfig};
use crate::network::NetworkDescriptor;
use crate::relayer::HttpRelayer;

pub const KEY_URL_PATH: &str = "v1/keyurl";
/// CRS size used for input proofs
pub const PUBLIC_PARAMS_BITS: &str = "2048";

/// Bootstrap of the production client library.
///
/// `load` and `initialize` run at most once per process; the factory checks
/// `is_loaded` and `is_initialized` before calling them.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    fn is_loaded(&self) -> bool;

    async fn load(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<()>;

    fn network_config(&self) -> ProductionNetwork;

    async fn create_instance(
        &self,
        config: InstanceConfig,
        descriptor: NetworkDescriptor,
    ) -> Result<CryptoSession>;
}

#[derive(Debug, Deserialize)]
struct KeyUrlEnvelope {
    response: KeyUrlResponse,
}

#[derive(Debug, Deserialize)]
struct KeyUrlResponse {
    fhe_key_info: Vec<FheKeyInfo>,
    crs: BTreeMap<String, KeyLocation>,
}

#[derive(Debug, Deserialize)]
struct FheKeyInfo {
    fhe_public_key: KeyLocation,
}

#[derive(Debug, Deserialize)]
struct KeyLocation {
    data_id: String,
    urls: Vec<String>,
}

/// Production bootstrap against the relayer's HTTP API.
///
/// The ciphertext engine is supplied by the embedder. Without one the SDK
/// still loads, but cannot create instances.
pub struct HttpRelayerSdk {
    network: ProductionNetwork,
    client: reqwest::Client,
    codec: Option<Arc<dyn CiphertextCodec>>,
    material: OnceCell<PublicMaterial>,
    initialized: OnceCell<()>,
}

impl HttpRelayerSdk {
    pub fn new(network: ProductionNetwork) -> Self {
        Self {
            network,
            client: reqwest::Client::new(),
            codec: None,
            material: OnceCell::new(),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn CiphertextCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    async fn fetch_public_material(&self) -> Result<PublicMaterial> {
        let url = self
            .network
            .relayer_url
            .join(KEY_URL_PATH)
            .map_err(|e| FhevmError::init("loading the sdk", e))?;
        info!("Fetching FHE key locations from {}", url);

        let keys: KeyUrlEnvelope = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FhevmError::init("loading the sdk", e))?
            .json()
            .await
            .map_err(|e| FhevmError::init("loading the sdk", e))?;

        let public_key = keys
            .response
            .fhe_key_info
            .first()
            .map(|info| &info.fhe_public_key)
            .ok_or_else(|| FhevmError::init("loading the sdk", "relayer lists no public key"))?;
        let public_params = keys.response.crs.get(PUBLIC_PARAMS_BITS).ok_or_else(|| {
            FhevmError::init("loading the sdk", "relayer lists no 2048 bit public params")
        })?;

        Ok(PublicMaterial {
            public_key_id: public_key.data_id.clone(),
            public_key: self.download(public_key).await?,
            public_params_id: public_params.data_id.clone(),
            public_params: self.download(public_params).await?,
        })
    }

    async fn download(&self, location: &KeyLocation) -> Result<Bytes> {
        let url = location.urls.first().ok_or_else(|| {
            FhevmError::init("loading the sdk", format!("no url for {}", location.data_id))
        })?;
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FhevmError::init("loading the sdk", e))?
            .bytes()
            .await
            .map_err(|e| FhevmError::init("loading the sdk", e))?;
        info!("Downloaded {} ({} bytes)", location.data_id, bytes.len());
        Ok(Bytes::from(bytes))
    }
}

#[async_trait]
impl RelayerSdk for HttpRelayerSdk {
    fn is_loaded(&self) -> bool {
        self.material.initialized()
    }

    async fn load(&self) -> Result<()> {
        self.material
            .get_or_try_init(|| self.fetch_public_material())
            .await?;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    async fn initialize(&self) -> Result<()> {
        let material = self
            .material
            .get()
            .ok_or_else(|| FhevmError::init("initializing the sdk", "sdk is not loaded"))?;
        self.initialized
            .get_or_try_init(|| async {
                if let Some(codec) = &self.codec {
                    codec
                        .load_public_material(material)
                        .map_err(|e| FhevmError::init("initializing the sdk", e))?;
                }
                Ok::<_, FhevmError>(())
            })
            .await?;
        Ok(())
    }

    fn network_config(&self) -> ProductionNetwork {
        self.network.clone()
    }

    async fn create_instance(
        &self,
        config: InstanceConfig,
        descriptor: NetworkDescriptor,
    ) -> Result<CryptoSession> {
        let codec = self.codec.clone().ok_or_else(|| {
            FhevmError::init("creating", "no ciphertext engine is configured for production networks")
        })?;
        let transport = Arc::new(HttpRelayer::with_client(
            self.client.clone(),
            self.network.relayer_url.clone(),
        ));
        Ok(CryptoSession::new(
            config,
            descriptor,
            transport,
            codec,
            self.material.get().cloned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_url_parsing() {
        let raw = json!({
            "response": {
                "fhe_key_info": [{
                    "fhe_public_key": {
                        "data_id": "fhe-public-key",
                        "urls": ["https://keys.example.org/PublicKey/1"]
                    }
                }],
                "crs": {
                    "2048": {
                        "data_id": "crs-2048",
                        "urls": ["https://keys.example.org/CRS/1"]
                    }
                }
            }
        });
        let parsed: KeyUrlEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.response.fhe_key_info[0].fhe_public_key.data_id, "fhe-public-key");
        assert!(parsed.response.crs.contains_key(PUBLIC_PARAMS_BITS));
    }

    #[tokio::test]
    async fn test_initialize_requires_load() {
        let sdk = HttpRelayerSdk::new(ProductionNetwork::sepolia());
        assert!(!sdk.is_loaded());
        assert!(matches!(
            sdk.initialize().await,
            Err(FhevmError::InitializationFailed { .. })
        ));
        assert!(!sdk.is_initialized());
    }
}
