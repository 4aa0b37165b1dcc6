// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, Signature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::abort::AbortSignal;
use crate::error::{FhevmError, Result};
use crate::instance::CryptoSession;
use crate::storage::KeyValueStore;
use crate::wallet::Wallet;

pub const SECONDS_PER_DAY: u64 = 86_400;
/// Validity window of a freshly issued authorization
pub const DEFAULT_DURATION_DAYS: u64 = 10;
const CACHE_KEY_PREFIX: &str = "fherate:decryption-signature";

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Sorted and deduplicated contract set
pub fn canonical_contracts(contracts: &[Address]) -> Vec<Address> {
    contracts
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A time-boxed permission, signed by `user_address`, to decrypt ciphertexts
/// of `contract_addresses` under an ephemeral keypair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: String,
    private_key: String,
    /// 0x-prefixed 65 byte signature
    pub signature: String,
    pub user_address: Address,
    /// Canonical: sorted, no duplicates
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl DecryptionSignature {
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.binary_search(contract).is_ok()
    }

    pub fn parsed_signature(&self) -> Result<Signature> {
        let raw = hex::decode(self.signature.trim_start_matches("0x"))
            .map_err(|e| FhevmError::DecryptionUnauthorized(format!("signature is not hex: {e}")))?;
        Signature::try_from(&raw[..])
            .map_err(|e| FhevmError::DecryptionUnauthorized(format!("malformed signature: {e}")))
    }

    /// Cache key for a user and a canonical contract set
    pub fn cache_key(user: Address, contracts: &[Address]) -> String {
        let contracts = contracts
            .iter()
            .map(|c| format!("{c:#x}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{CACHE_KEY_PREFIX}:{user:#x}:{contracts}")
    }

    /// Return the cached authorization for `contracts`, or ask the wallet to
    /// sign a new one valid for the default window.
    pub async fn load_or_sign(
        session: &CryptoSession,
        contracts: &[Address],
        wallet: &dyn Wallet,
        storage: &dyn KeyValueStore,
        signal: &AbortSignal,
    ) -> Result<Self> {
        Self::load_or_sign_at(
            session,
            contracts,
            wallet,
            storage,
            signal,
            DEFAULT_DURATION_DAYS,
            unix_now(),
        )
        .await
    }

    /// `load_or_sign` with an explicit validity window and clock
    pub async fn load_or_sign_at(
        session: &CryptoSession,
        contracts: &[Address],
        wallet: &dyn Wallet,
        storage: &dyn KeyValueStore,
        signal: &AbortSignal,
        duration_days: u64,
        now: u64,
    ) -> Result<Self> {
        signal.throw_if_aborted()?;
        let contracts = canonical_contracts(contracts);
        if contracts.is_empty() {
            return Err(FhevmError::InvalidAddress(
                "at least one contract address is required".to_string(),
            ));
        }
        let user = wallet.address().await?;
        let key = Self::cache_key(user, &contracts);

        if let Some(cached) = Self::load(session, &key, user, &contracts, storage, now) {
            debug!("Reusing decryption signature for {}", user);
            return Ok(cached);
        }

        let issued = Self::issue(session, &contracts, wallet, signal, duration_days, now).await?;
        signal.throw_if_aborted()?;
        match serde_json::to_string(&issued) {
            Ok(raw) => {
                if let Err(e) = storage.set(&key, raw) {
                    warn!("Could not cache decryption signature: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize decryption signature: {}", e),
        }
        Ok(issued)
    }

    /// Generate a keypair and have the wallet sign a new authorization. Nothing
    /// is cached. Aborting `signal` withdraws the pending wallet prompt.
    pub async fn issue(
        session: &CryptoSession,
        contracts: &[Address],
        wallet: &dyn Wallet,
        signal: &AbortSignal,
        duration_days: u64,
        now: u64,
    ) -> Result<Self> {
        let contracts = canonical_contracts(contracts);
        let user = wallet.address().await?;
        let keypair = session.generate_keypair()?;
        let request = session.create_eip712(&keypair.public_key, &contracts, now, duration_days)?;

        info!(
            "Requesting decryption authorization from {} for {} contract(s)",
            user,
            contracts.len()
        );
        let signature = signal
            .guard(async { Ok(wallet.sign_typed_data(&request).await?) })
            .await?;

        Ok(Self {
            public_key: keypair.public_key.clone(),
            private_key: keypair.private_key.as_str().to_owned(),
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
            user_address: user,
            contract_addresses: contracts,
            start_timestamp: now,
            duration_days,
        })
    }

    /// Check this authorization can be used by `user` for `contracts` under
    /// `session` at `now`.
    pub fn verify(
        &self,
        session: &CryptoSession,
        user: Address,
        contracts: &[Address],
        now: u64,
    ) -> Result<()> {
        if self.user_address != user {
            return Err(FhevmError::DecryptionUnauthorized(format!(
                "signature belongs to {}, not {}",
                self.user_address, user
            )));
        }
        if self.contract_addresses != contracts {
            return Err(FhevmError::DecryptionUnauthorized(
                "signature covers a different contract set".to_string(),
            ));
        }
        if !self.is_valid_at(now) {
            return Err(FhevmError::DecryptionUnauthorized(format!(
                "signature expired at {}",
                self.expires_at()
            )));
        }
        let signature = self.parsed_signature()?;
        let request = session.create_eip712(
            &self.public_key,
            &self.contract_addresses,
            self.start_timestamp,
            self.duration_days,
        )?;
        match request.recover_signer(&signature) {
            Some(signer) if signer == user => Ok(()),
            _ => Err(FhevmError::DecryptionUnauthorized(
                "signature was not produced by the user on this network".to_string(),
            )),
        }
    }

    fn load(
        session: &CryptoSession,
        key: &str,
        user: Address,
        contracts: &[Address],
        storage: &dyn KeyValueStore,
        now: u64,
    ) -> Option<Self> {
        let raw = match storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No cached decryption signature under {}", key);
                return None;
            }
            Err(e) => {
                warn!("Could not read the signature cache: {}", e);
                return None;
            }
        };

        let cached = serde_json::from_str::<Self>(&raw)
            .map_err(|e| FhevmError::Storage(e.to_string()))
            .and_then(|cached| cached.verify(session, user, contracts, now).map(|_| cached));
        match cached {
            Ok(cached) => Some(cached),
            Err(e) => {
                debug!("Discarding cached decryption signature: {}", e);
                if let Err(e) = storage.remove(key) {
                    warn!("Could not evict stale decryption signature: {}", e);
                }
                None
            }
        }
    }
}

impl fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("public_key", &self.public_key)
            .field("signature", &self.signature)
            .field("user_address", &self.user_address)
            .field("contract_addresses", &self.contract_addresses)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish_non_exhaustive()
    }
}

impl Drop for DecryptionSignature {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}
