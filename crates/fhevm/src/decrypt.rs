// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::abort::AbortSignal;
use crate::error::{FhevmError, Result};
use crate::instance::CryptoSession;
use crate::relayer::HandleContractPair;
use crate::signature::{unix_now, DecryptionSignature};

/// One rater's cleartext scores, in dimension order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedRating {
    pub rater: Address,
    pub scores: Vec<u64>,
    pub timestamp: u64,
}

/// Resolves a batch of handles in one relayer round trip.
#[derive(Debug, Clone)]
pub struct BatchDecryptor {
    session: Arc<CryptoSession>,
}

impl BatchDecryptor {
    pub fn new(session: Arc<CryptoSession>) -> Self {
        Self { session }
    }

    pub async fn decrypt_all(
        &self,
        handles: &[HandleContractPair],
        signature: &DecryptionSignature,
        signal: &AbortSignal,
    ) -> Result<HashMap<B256, U256>> {
        self.decrypt_all_at(handles, signature, signal, unix_now())
            .await
    }

    /// Decrypt every handle or fail for the whole batch. The authorization is
    /// checked before anything is sent, and the relayer round trip is dropped
    /// as soon as `signal` fires.
    pub async fn decrypt_all_at(
        &self,
        handles: &[HandleContractPair],
        signature: &DecryptionSignature,
        signal: &AbortSignal,
        now: u64,
    ) -> Result<HashMap<B256, U256>> {
        signal.throw_if_aborted()?;
        if handles.is_empty() {
            return Err(FhevmError::EmptyInput);
        }
        if !signature.is_valid_at(now) {
            return Err(FhevmError::DecryptionUnauthorized(format!(
                "signature expired at {}",
                signature.expires_at()
            )));
        }
        if let Some(pair) = handles
            .iter()
            .find(|pair| !signature.covers(&pair.contract_address))
        {
            return Err(FhevmError::DecryptionUnauthorized(format!(
                "signature does not cover contract {}",
                pair.contract_address
            )));
        }

        // The same handle may appear twice, ask for it once
        let mut seen = HashSet::new();
        let unique: Vec<HandleContractPair> = handles
            .iter()
            .filter(|pair| seen.insert(pair.handle))
            .copied()
            .collect();

        debug!("Decrypting {} handles in one request", unique.len());
        let decrypted = signal
            .guard(self.session.user_decrypt(&unique, signature))
            .await?;

        let result = unique
            .iter()
            .map(|pair| {
                decrypted
                    .get(&pair.handle)
                    .map(|value| (pair.handle, *value))
                    .ok_or_else(|| {
                        FhevmError::Relayer(format!("handle {} missing from response", pair.handle))
                    })
            })
            .collect::<Result<HashMap<_, _>>>()?;
        info!("Decrypted {} handles", result.len());
        Ok(result)
    }
}

/// Flatten per-rater handle vectors, rater by rater then dimension by
/// dimension.
pub fn collect_handles(scores: &[Vec<B256>], contract: Address) -> Vec<HandleContractPair> {
    scores
        .iter()
        .flatten()
        .map(|handle| HandleContractPair {
            handle: *handle,
            contract_address: contract,
        })
        .collect()
}

/// Walk the ledger's order again and look every handle up in `decrypted`.
pub fn reconstruct_ratings(
    raters: &[Address],
    scores: &[Vec<B256>],
    timestamps: &[u64],
    decrypted: &HashMap<B256, U256>,
) -> Result<Vec<DecryptedRating>> {
    if raters.len() != scores.len() || raters.len() != timestamps.len() {
        return Err(FhevmError::Relayer(format!(
            "ledger returned {} raters, {} score lists and {} timestamps",
            raters.len(),
            scores.len(),
            timestamps.len()
        )));
    }

    raters
        .iter()
        .zip(scores)
        .zip(timestamps)
        .map(|((rater, handles), timestamp)| {
            let scores = handles
                .iter()
                .map(|handle| {
                    let value = decrypted.get(handle).ok_or_else(|| {
                        FhevmError::Relayer(format!("handle {handle} was not decrypted"))
                    })?;
                    u64::try_from(*value).map_err(|_| {
                        FhevmError::Relayer(format!("score {value} does not fit in 64 bits"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(DecryptedRating {
                rater: *rater,
                scores,
                timestamp: *timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruction_keeps_ledger_order() {
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0x0b);
        let handles = vec![
            vec![B256::repeat_byte(1), B256::repeat_byte(2)],
            vec![B256::repeat_byte(3), B256::repeat_byte(4)],
        ];
        let decrypted: HashMap<B256, U256> = [(1, 8), (2, 7), (3, 9), (4, 10)]
            .into_iter()
            .map(|(h, v)| (B256::repeat_byte(h), U256::from(v)))
            .collect();

        let flat = collect_handles(&handles, Address::repeat_byte(0xcc));
        assert_eq!(flat.len(), 4);
        assert_eq!(flat[2].handle, B256::repeat_byte(3));

        let ratings = reconstruct_ratings(&[a, b], &handles, &[100, 200], &decrypted).unwrap();
        assert_eq!(
            ratings,
            vec![
                DecryptedRating {
                    rater: a,
                    scores: vec![8, 7],
                    timestamp: 100
                },
                DecryptedRating {
                    rater: b,
                    scores: vec![9, 10],
                    timestamp: 200
                },
            ]
        );
    }

    #[test]
    fn test_reconstruction_rejects_missing_handles() {
        let handles = vec![vec![B256::repeat_byte(1)]];
        let result = reconstruct_ratings(&[Address::ZERO], &handles, &[0], &HashMap::new());
        assert!(matches!(result, Err(FhevmError::Relayer(_))));

        let result = reconstruct_ratings(&[Address::ZERO], &[], &[0], &HashMap::new());
        assert!(result.is_err());
    }
}
