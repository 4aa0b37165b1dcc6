// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{Address, Bytes, B256, U256};
use num_bigint::{BigInt, Sign};
use num_traits::One;
use tracing::debug;

use crate::codec::PlainValue;
use crate::error::{FhevmError, Result};
use crate::handle::{FheType, MAX_INPUT_BITS, MAX_INPUT_VALUES};
use crate::instance::CryptoSession;

/// Handles and proof to submit alongside an encrypted input. `handles[i]` is
/// the ciphertext of the i-th value added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputOutput {
    pub handles: Vec<B256>,
    pub input_proof: Bytes,
}

/// Accumulates plaintexts destined for one contract call.
///
/// Values are range checked as they are added. `encrypt` consumes the builder,
/// so a builder can only ever produce one proof.
#[derive(Debug)]
pub struct EncryptedInput<'a> {
    session: &'a CryptoSession,
    contract: Address,
    user: Address,
    values: Vec<PlainValue>,
    bits: u32,
}

impl<'a> EncryptedInput<'a> {
    pub(crate) fn new(session: &'a CryptoSession, contract: Address, user: Address) -> Self {
        Self {
            session,
            contract,
            user,
            values: Vec::new(),
            bits: 0,
        }
    }

    pub fn add_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.push(FheType::Bool, U256::from(value as u8))
    }

    pub fn add8(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint8, value.into())
    }

    pub fn add16(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint16, value.into())
    }

    pub fn add32(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint32, value.into())
    }

    pub fn add64(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint64, value.into())
    }

    pub fn add128(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint128, value.into())
    }

    pub fn add256(&mut self, value: impl Into<BigInt>) -> Result<&mut Self> {
        self.add(FheType::Uint256, value.into())
    }

    /// Add an address given as a 0x-prefixed hex string
    pub fn add_address(&mut self, value: &str) -> Result<&mut Self> {
        let address: Address = value
            .strip_prefix("0x")
            .and_then(|_| value.parse().ok())
            .ok_or_else(|| FhevmError::InvalidAddress(value.to_string()))?;
        self.push(FheType::Address, U256::from_be_slice(address.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn types(&self) -> Vec<FheType> {
        self.values.iter().map(|v| v.fhe_type).collect()
    }

    /// Total packed bits used so far
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Encrypt the accumulated values and fetch their validity proof.
    pub async fn encrypt(self) -> Result<EncryptedInputOutput> {
        if self.values.is_empty() {
            return Err(FhevmError::EmptyInput);
        }
        debug!(
            "Encrypting {} values ({} bits) for {}",
            self.values.len(),
            self.bits,
            self.contract
        );
        self.session
            .encrypt_values(self.contract, self.user, &self.values)
            .await
    }

    fn add(&mut self, fhe_type: FheType, value: BigInt) -> Result<&mut Self> {
        let out_of_range = || FhevmError::ValueOutOfRange {
            bits: fhe_type.value_bits(),
            value: value.to_string(),
        };
        if value.sign() == Sign::Minus || value >= BigInt::one() << fhe_type.value_bits() as usize {
            return Err(out_of_range());
        }
        let (_, bytes) = value.to_bytes_be();
        let value = U256::try_from_be_slice(&bytes).ok_or_else(out_of_range)?;
        self.push(fhe_type, value)
    }

    fn push(&mut self, fhe_type: FheType, value: U256) -> Result<&mut Self> {
        if self.values.len() >= MAX_INPUT_VALUES {
            return Err(FhevmError::InputTooLarge(format!(
                "at most {MAX_INPUT_VALUES} values per input"
            )));
        }
        let bits = self.bits + fhe_type.packed_bits();
        if bits > MAX_INPUT_BITS {
            return Err(FhevmError::InputTooLarge(format!(
                "{bits} bits exceed the {MAX_INPUT_BITS} bit limit"
            )));
        }
        self.bits = bits;
        self.values.push(PlainValue { fhe_type, value });
        Ok(self)
    }
}
