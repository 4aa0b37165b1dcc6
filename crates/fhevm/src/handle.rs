// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::error::{FhevmError, Result};

/// Most values one encrypted input may carry. The proof header stores the
/// handle count in a single byte.
pub const MAX_INPUT_VALUES: usize = u8::MAX as usize;
/// Most packed bits one encrypted input may carry
pub const MAX_INPUT_BITS: u32 = 2048;

pub const HANDLE_VERSION: u8 = 0;
const HANDLE_DOMAIN: &[u8] = b"ZK-w_hdl";

/// Encrypted value types understood by the coprocessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Uint128 = 6,
    Address = 7,
    Uint256 = 8,
}

impl FheType {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => FheType::Bool,
            2 => FheType::Uint8,
            3 => FheType::Uint16,
            4 => FheType::Uint32,
            5 => FheType::Uint64,
            6 => FheType::Uint128,
            7 => FheType::Address,
            8 => FheType::Uint256,
            _ => return None,
        })
    }

    /// Width of the plaintext domain
    pub fn value_bits(self) -> u16 {
        match self {
            FheType::Bool => 1,
            FheType::Uint8 => 8,
            FheType::Uint16 => 16,
            FheType::Uint32 => 32,
            FheType::Uint64 => 64,
            FheType::Uint128 => 128,
            FheType::Address => 160,
            FheType::Uint256 => 256,
        }
    }

    /// Bits the value occupies towards an input's packing limit. Booleans are
    /// packed as two bits.
    pub fn packed_bits(self) -> u32 {
        match self {
            FheType::Bool => 2,
            other => other.value_bits() as u32,
        }
    }

    pub fn max_value(self) -> U256 {
        match self.value_bits() {
            256 => U256::MAX,
            bits => (U256::from(1u8) << bits as usize) - U256::from(1u8),
        }
    }
}

/// Derive the handle of the `index`-th value of an encrypted input.
pub fn compute_input_handle(
    ciphertext: &[u8],
    index: u8,
    fhe_type: FheType,
    acl: Address,
    chain_id: u64,
) -> B256 {
    let ciphertext_hash = keccak256(ciphertext);

    let mut preimage = Vec::with_capacity(HANDLE_DOMAIN.len() + 32 + 1 + 20 + 32);
    preimage.extend_from_slice(HANDLE_DOMAIN);
    preimage.extend_from_slice(ciphertext_hash.as_slice());
    preimage.push(index);
    preimage.extend_from_slice(acl.as_slice());
    preimage.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());

    let mut handle = keccak256(&preimage).0;
    handle[21] = index;
    handle[22..30].copy_from_slice(&chain_id.to_be_bytes());
    handle[30] = fhe_type.id();
    handle[31] = HANDLE_VERSION;
    B256::from(handle)
}

pub fn compute_input_handles(
    ciphertext: &[u8],
    types: &[FheType],
    acl: Address,
    chain_id: u64,
) -> Result<Vec<B256>> {
    if types.len() > MAX_INPUT_VALUES {
        return Err(FhevmError::InputTooLarge(format!(
            "{} values, at most {} are allowed",
            types.len(),
            MAX_INPUT_VALUES
        )));
    }
    Ok(types
        .iter()
        .enumerate()
        .map(|(index, fhe_type)| {
            compute_input_handle(ciphertext, index as u8, *fhe_type, acl, chain_id)
        })
        .collect())
}

/// Type tag embedded in a handle
pub fn handle_type(handle: &B256) -> Option<FheType> {
    FheType::from_id(handle[30])
}

/// Host chain embedded in a handle
pub fn handle_chain_id(handle: &B256) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&handle[22..30]);
    u64::from_be_bytes(raw)
}

/// `[numHandles][numSigners][handles...][signatures...]`
pub fn assemble_input_proof(handles: &[B256], signatures: &[Bytes]) -> Result<Bytes> {
    let num_handles = u8::try_from(handles.len())
        .map_err(|_| FhevmError::InputTooLarge(format!("{} handles", handles.len())))?;
    let num_signers = u8::try_from(signatures.len())
        .map_err(|_| FhevmError::Relayer(format!("{} coprocessor signatures", signatures.len())))?;

    let mut proof = Vec::with_capacity(
        2 + handles.len() * 32 + signatures.iter().map(|s| s.len()).sum::<usize>(),
    );
    proof.push(num_handles);
    proof.push(num_signers);
    for handle in handles {
        proof.extend_from_slice(handle.as_slice());
    }
    for signature in signatures {
        proof.extend_from_slice(signature);
    }
    Ok(proof.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_type_ids_round_trip() {
        for fhe_type in FheType::iter() {
            assert_eq!(FheType::from_id(fhe_type.id()), Some(fhe_type));
        }
        assert_eq!(FheType::from_id(1), None);
        assert_eq!(FheType::Uint32.to_string(), "uint32");
    }

    #[test]
    fn test_max_values() {
        assert_eq!(FheType::Bool.max_value(), U256::from(1));
        assert_eq!(FheType::Uint8.max_value(), U256::from(255));
        assert_eq!(FheType::Uint64.max_value(), U256::from(u64::MAX));
        assert_eq!(FheType::Uint256.max_value(), U256::MAX);
    }

    #[test]
    fn test_handle_layout() {
        let acl = Address::repeat_byte(0x42);
        let handle = compute_input_handle(b"ciphertext", 3, FheType::Uint32, acl, 31337);
        assert_eq!(handle[21], 3);
        assert_eq!(handle_chain_id(&handle), 31337);
        assert_eq!(handle_type(&handle), Some(FheType::Uint32));
        assert_eq!(handle[31], HANDLE_VERSION);

        // bound to the ciphertext, the index and the chain
        assert_ne!(
            handle,
            compute_input_handle(b"ciphertext", 2, FheType::Uint32, acl, 31337)
        );
        assert_ne!(
            handle,
            compute_input_handle(b"other", 3, FheType::Uint32, acl, 31337)
        );
        assert_ne!(
            handle,
            compute_input_handle(b"ciphertext", 3, FheType::Uint32, acl, 11155111)
        );
    }

    #[test]
    fn test_proof_layout() {
        let handles = vec![B256::repeat_byte(1), B256::repeat_byte(2)];
        let signatures = vec![Bytes::from(vec![0xaa; 65])];
        let proof = assemble_input_proof(&handles, &signatures).unwrap();
        assert_eq!(proof.len(), 2 + 64 + 65);
        assert_eq!(proof[0], 2);
        assert_eq!(proof[1], 1);
        assert_eq!(&proof[2..34], handles[0].as_slice());
        assert_eq!(&proof[66..], &[0xaa; 65][..]);
    }

    #[test]
    fn test_too_many_values() {
        let types = vec![FheType::Bool; MAX_INPUT_VALUES + 1];
        assert!(matches!(
            compute_input_handles(b"ct", &types, Address::ZERO, 1),
            Err(FhevmError::InputTooLarge(_))
        ));
    }
}
