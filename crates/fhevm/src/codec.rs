// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::fmt;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{FhevmError, Result};
use crate::handle::FheType;

/// One plaintext queued for encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainValue {
    pub fhe_type: FheType,
    pub value: U256,
}

/// Binding of an encrypted input to its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionContext {
    pub contract: Address,
    pub user: Address,
    pub acl: Address,
    pub chain_id: u64,
}

/// Network public key and CRS fetched from the relayer
#[derive(Clone, PartialEq, Eq)]
pub struct PublicMaterial {
    pub public_key_id: String,
    pub public_key: Bytes,
    pub public_params_id: String,
    pub public_params: Bytes,
}

impl fmt::Debug for PublicMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicMaterial")
            .field("public_key_id", &self.public_key_id)
            .field("public_key_len", &self.public_key.len())
            .field("public_params_id", &self.public_params_id)
            .field("public_params_len", &self.public_params.len())
            .finish()
    }
}

/// Ephemeral keypair a decryption response is re-encrypted under
pub struct Keypair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Ciphertext wire format and user-side decryption.
///
/// The mock engine is built in. Production engines wrap the TFHE and KMS
/// client libraries and are supplied by the embedder.
pub trait CiphertextCodec: Send + Sync {
    /// Hand network key material to the engine. Called once per process.
    fn load_public_material(&self, _material: &PublicMaterial) -> Result<()> {
        Ok(())
    }

    /// Pack and encrypt `values` into the blob sent for proving
    fn encrypt_input(&self, values: &[PlainValue], context: &EncryptionContext) -> Result<Bytes>;

    fn generate_keypair(&self) -> Result<Keypair>;

    /// Turn a relayer user-decrypt response into cleartexts keyed by handle
    fn decrypt_user_response(
        &self,
        response: &Value,
        private_key: &str,
        handles: &[B256],
    ) -> Result<HashMap<B256, U256>>;
}

/// Cleartext entry in a mock node's user-decrypt response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockDecryptEntry {
    pub handle: B256,
    pub value: U256,
}

const MOCK_RANDOM_SUFFIX: usize = 32;
const MOCK_ENTRY_LEN: usize = 1 + 32;

/// Cleartext packing used by local mock nodes:
/// `[count][type, value(32)]... ++ 32 random bytes`. The random suffix keeps
/// two encryptions of the same values distinct.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCodec;

impl MockCodec {
    pub fn decode_ciphertext(ciphertext: &[u8]) -> Result<Vec<PlainValue>> {
        let malformed = |reason: &str| FhevmError::Relayer(format!("malformed mock ciphertext: {reason}"));

        let (&count, body) = ciphertext.split_first().ok_or_else(|| malformed("empty"))?;
        let expected = count as usize * MOCK_ENTRY_LEN + MOCK_RANDOM_SUFFIX;
        if body.len() != expected {
            return Err(malformed("unexpected length"));
        }

        body[..count as usize * MOCK_ENTRY_LEN]
            .chunks_exact(MOCK_ENTRY_LEN)
            .map(|entry| {
                let fhe_type = FheType::from_id(entry[0]).ok_or_else(|| malformed("unknown type"))?;
                let value = U256::from_be_slice(&entry[1..]);
                if value > fhe_type.max_value() {
                    return Err(malformed("value exceeds its type"));
                }
                Ok(PlainValue { fhe_type, value })
            })
            .collect()
    }
}

impl CiphertextCodec for MockCodec {
    fn encrypt_input(&self, values: &[PlainValue], _context: &EncryptionContext) -> Result<Bytes> {
        let count = u8::try_from(values.len())
            .map_err(|_| FhevmError::InputTooLarge(format!("{} values", values.len())))?;

        let mut packed = Vec::with_capacity(1 + values.len() * MOCK_ENTRY_LEN + MOCK_RANDOM_SUFFIX);
        packed.push(count);
        for value in values {
            packed.push(value.fhe_type.id());
            packed.extend_from_slice(&value.value.to_be_bytes::<32>());
        }
        let mut suffix = [0u8; MOCK_RANDOM_SUFFIX];
        rand::thread_rng().fill_bytes(&mut suffix);
        packed.extend_from_slice(&suffix);
        Ok(packed.into())
    }

    fn generate_keypair(&self) -> Result<Keypair> {
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut secret[..]);
        Ok(Keypair {
            public_key: hex::encode(keccak256(&secret[..])),
            private_key: Zeroizing::new(hex::encode(&secret[..])),
        })
    }

    fn decrypt_user_response(
        &self,
        response: &Value,
        _private_key: &str,
        handles: &[B256],
    ) -> Result<HashMap<B256, U256>> {
        let entries: Vec<MockDecryptEntry> = serde_json::from_value(response.clone())
            .map_err(|e| FhevmError::Relayer(format!("malformed user-decrypt response: {e}")))?;
        let decrypted: HashMap<B256, U256> = entries
            .into_iter()
            .map(|entry| (entry.handle, entry.value))
            .collect();

        handles
            .iter()
            .map(|handle| {
                decrypted
                    .get(handle)
                    .map(|value| (*handle, *value))
                    .ok_or_else(|| FhevmError::Relayer(format!("handle {handle} was not decrypted")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> EncryptionContext {
        EncryptionContext {
            contract: Address::repeat_byte(1),
            user: Address::repeat_byte(2),
            acl: Address::repeat_byte(3),
            chain_id: 31337,
        }
    }

    #[test]
    fn test_mock_packing_is_salted() {
        let values = vec![
            PlainValue {
                fhe_type: FheType::Uint32,
                value: U256::from(8),
            },
            PlainValue {
                fhe_type: FheType::Bool,
                value: U256::from(1),
            },
        ];
        let first = MockCodec.encrypt_input(&values, &context()).unwrap();
        let second = MockCodec.encrypt_input(&values, &context()).unwrap();
        assert_ne!(first, second);
        assert_eq!(MockCodec::decode_ciphertext(&first).unwrap(), values);
        assert_eq!(MockCodec::decode_ciphertext(&second).unwrap(), values);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(MockCodec::decode_ciphertext(&[]).is_err());
        assert!(MockCodec::decode_ciphertext(&[1, 4, 0]).is_err());
    }

    #[test]
    fn test_decrypt_response_requires_every_handle() {
        let a = B256::repeat_byte(0xa);
        let b = B256::repeat_byte(0xb);
        let response = json!([{ "handle": a, "value": U256::from(7) }]);

        let decrypted = MockCodec.decrypt_user_response(&response, "", &[a]).unwrap();
        assert_eq!(decrypted.get(&a), Some(&U256::from(7)));

        assert!(MockCodec.decrypt_user_response(&response, "", &[a, b]).is_err());
    }

    #[test]
    fn test_keypair_debug_hides_private_key() {
        let keypair = MockCodec.generate_keypair().unwrap();
        assert_eq!(keypair.private_key.len(), 64);
        assert!(!format!("{keypair:?}").contains(keypair.private_key.as_str()));
    }
}
