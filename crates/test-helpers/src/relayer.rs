// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use fherate_fhevm::{
    compute_input_handles, FheType, FhevmError, InputProofRequest, InputProofResponse,
    MockCodec, MockDecryptEntry, RelayerTransport, Result, UserDecryptRequest,
};
use serde_json::Value;
use tracing::debug;

/// A relayer that keeps cleartexts in memory, in the format local mock nodes
/// use.
pub struct InMemoryRelayer {
    acl: Address,
    cleartexts: Mutex<HashMap<B256, U256>>,
    proof_requests: AtomicUsize,
    decrypt_requests: AtomicUsize,
    reject_decryption: AtomicBool,
    corrupt_handles: AtomicBool,
}

impl InMemoryRelayer {
    pub fn new(acl: Address) -> Self {
        Self {
            acl,
            cleartexts: Mutex::new(HashMap::new()),
            proof_requests: AtomicUsize::new(0),
            decrypt_requests: AtomicUsize::new(0),
            reject_decryption: AtomicBool::new(false),
            corrupt_handles: AtomicBool::new(false),
        }
    }

    pub fn proof_requests(&self) -> usize {
        self.proof_requests.load(Ordering::SeqCst)
    }

    pub fn decrypt_requests(&self) -> usize {
        self.decrypt_requests.load(Ordering::SeqCst)
    }

    /// Answer every user-decrypt request as unauthorized
    pub fn reject_decryption(&self, reject: bool) {
        self.reject_decryption.store(reject, Ordering::SeqCst);
    }

    /// Return handles that do not match the submitted ciphertext
    pub fn corrupt_handles(&self, corrupt: bool) {
        self.corrupt_handles.store(corrupt, Ordering::SeqCst);
    }

    pub fn insert(&self, handle: B256, value: U256) {
        if let Ok(mut cleartexts) = self.cleartexts.lock() {
            cleartexts.insert(handle, value);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<B256, U256>>> {
        self.cleartexts
            .lock()
            .map_err(|_| FhevmError::Relayer("poisoned".to_string()))
    }
}

#[async_trait]
impl RelayerTransport for InMemoryRelayer {
    async fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse> {
        self.proof_requests.fetch_add(1, Ordering::SeqCst);
        let ciphertext = hex::decode(&request.ciphertext_with_input_verification)
            .map_err(|e| FhevmError::Relayer(e.to_string()))?;
        let values = MockCodec::decode_ciphertext(&ciphertext)?;
        let types: Vec<FheType> = values.iter().map(|v| v.fhe_type).collect();
        let mut handles =
            compute_input_handles(&ciphertext, &types, self.acl, request.contract_chain_id)?;

        {
            let mut cleartexts = self.lock()?;
            for (handle, value) in handles.iter().zip(&values) {
                cleartexts.insert(*handle, value.value);
            }
        }
        debug!("Stored {} cleartexts", handles.len());

        if self.corrupt_handles.load(Ordering::SeqCst) {
            handles.reverse();
            if let Some(first) = handles.first_mut() {
                first.0[0] ^= 0xff;
            }
        }

        Ok(InputProofResponse {
            handles,
            signatures: vec![Bytes::from(vec![0x1b; 65])],
        })
    }

    async fn user_decrypt(&self, request: &UserDecryptRequest) -> Result<Value> {
        self.decrypt_requests.fetch_add(1, Ordering::SeqCst);
        if self.reject_decryption.load(Ordering::SeqCst) {
            return Err(FhevmError::DecryptionUnauthorized(
                "relayer answered 403 Forbidden".to_string(),
            ));
        }

        let cleartexts = self.lock()?;
        let entries = request
            .handle_contract_pairs
            .iter()
            .map(|pair| {
                if !request.contract_addresses.contains(&pair.contract_address) {
                    return Err(FhevmError::DecryptionUnauthorized(format!(
                        "{} is not an authorized contract",
                        pair.contract_address
                    )));
                }
                cleartexts
                    .get(&pair.handle)
                    .map(|value| MockDecryptEntry {
                        handle: pair.handle,
                        value: *value,
                    })
                    .ok_or_else(|| FhevmError::Relayer(format!("unknown handle {}", pair.handle)))
            })
            .collect::<Result<Vec<_>>>()?;
        serde_json::to_value(entries).map_err(|e| FhevmError::Relayer(e.to_string()))
    }
}
