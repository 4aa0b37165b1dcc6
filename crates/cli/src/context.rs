// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use fherate_config::{FheRateConfig, RpcEndpoint, LOCAL_DEV_RPC_URL};
use fherate_evm_helpers::{RatingContractFactory, RatingReadContract, RatingWriteContract};
use fherate_fhevm::{
    AlloyRpcClient, KeyValueStore, LocalWallet, ProviderOrUrl, RpcClient, SessionFactory,
    SledStore, Wallet,
};
use fherate_sdk::{RatingClient, SessionHolder};
use tracing::debug;
use zeroize::Zeroizing;

use crate::helpers::{ensure_private_key, from_report};

/// Everything a command needs to reach the chain
pub struct ClientContext {
    pub config: FheRateConfig,
    pub rpc: RpcEndpoint,
}

impl ClientContext {
    /// Commands talk to the local development node unless an RPC URL is
    /// configured
    pub fn new(config: FheRateConfig) -> Result<Self> {
        let rpc = match config.rpc_url.clone() {
            Some(rpc) => rpc,
            None => RpcEndpoint::from_url(LOCAL_DEV_RPC_URL)?,
        };
        Ok(Self { config, rpc })
    }

    pub fn factory(&self) -> SessionFactory {
        SessionFactory::from_config(&self.config, None)
    }

    fn private_key(&self) -> Result<Zeroizing<String>> {
        let raw = self
            .config
            .private_key
            .as_deref()
            .context("No private key configured. Set FHERATE_PRIVATE_KEY")?;
        ensure_private_key(raw)
    }

    pub fn has_wallet(&self) -> bool {
        self.config.private_key.is_some()
    }

    pub async fn wallet(&self) -> Result<Arc<LocalWallet>> {
        let key = self.private_key()?;
        Ok(Arc::new(LocalWallet::connect(&self.rpc, &key).await?))
    }

    /// The wallet when a key is configured, the bare RPC URL otherwise
    pub async fn target(&self) -> Result<ProviderOrUrl> {
        if self.has_wallet() {
            let wallet: Arc<dyn Wallet> = self.wallet().await?;
            Ok(ProviderOrUrl::Wallet(wallet))
        } else {
            Ok(ProviderOrUrl::Url(self.rpc.clone()))
        }
    }

    async fn ledger_address(&self) -> Result<Address> {
        let chain_id = AlloyRpcClient::connect(&self.rpc).await?.chain_id().await?;
        self.config.ledger_address(chain_id).ok_or_else(|| {
            anyhow!(
                "No rating ledger configured for chain {}. Add it under `ledger` in the config",
                chain_id
            )
        })
    }

    fn http_url(&self) -> Result<String> {
        Ok(self.rpc.as_http_url()?.to_string())
    }

    pub async fn read_ledger(&self) -> Result<RatingReadContract> {
        let address = self.ledger_address().await?;
        RatingContractFactory::create_read(&self.http_url()?, &address.to_string())
            .await
            .map_err(from_report)
    }

    pub async fn write_ledger(&self) -> Result<RatingWriteContract> {
        let address = self.ledger_address().await?;
        let key = self.private_key()?;
        RatingContractFactory::create_write(&self.http_url()?, &address.to_string(), &key)
            .await
            .map_err(from_report)
    }

    /// A rating client signing with the configured key and caching decryption
    /// authorizations on disk
    pub async fn client(&self) -> Result<RatingClient<RatingWriteContract>> {
        let wallet: Arc<dyn Wallet> = self.wallet().await?;
        let ledger = self.write_ledger().await?;
        let holder = SessionHolder::new(self.factory(), wallet);

        let cache_dir = self.config.signature_cache_dir();
        debug!("Signature cache at {:?}", cache_dir);
        let store: Arc<dyn KeyValueStore> = Arc::new(
            SledStore::open(&cache_dir)
                .with_context(|| format!("Could not open the signature cache at {cache_dir:?}"))?,
        );

        Ok(RatingClient::new(ledger, holder, store)
            .with_duration_days(self.config.decryption.duration_days))
    }
}
