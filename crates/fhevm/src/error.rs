// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use thiserror::Error as ThisError;

use crate::wallet::WalletError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum FhevmError {
    /// The caller's abort signal fired. Not a failure, UIs should stay quiet.
    #[error("FHEVM operation was cancelled")]
    Aborted,

    #[error("FHEVM initialization failed while {stage}: {reason}")]
    InitializationFailed { stage: &'static str, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Value {value} does not fit in {bits} bits")]
    ValueOutOfRange { bits: u16, value: String },

    #[error("Encrypted input too large: {0}")]
    InputTooLarge(String),

    /// The user declined to sign the decryption authorization
    #[error("Decryption authorization was denied by the wallet")]
    AuthorizationDenied,

    #[error("Decryption is not authorized: {0}")]
    DecryptionUnauthorized(String),

    #[error("No ciphertext handles were supplied")]
    EmptyInput,

    #[error("Relayer error: {0}")]
    Relayer(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Wallet error: {0}")]
    Wallet(String),
}

impl FhevmError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, FhevmError::Aborted)
    }

    pub(crate) fn init(stage: &'static str, reason: impl ToString) -> Self {
        FhevmError::InitializationFailed {
            stage,
            reason: reason.to_string(),
        }
    }
}

impl From<WalletError> for FhevmError {
    fn from(value: WalletError) -> Self {
        match value {
            WalletError::Rejected => FhevmError::AuthorizationDenied,
            other => FhevmError::Wallet(other.to_string()),
        }
    }
}

impl From<sled::Error> for FhevmError {
    fn from(value: sled::Error) -> Self {
        FhevmError::Storage(value.to_string())
    }
}

/// Result that returns a type T or a FhevmError
pub type Result<T> = std::result::Result<T, FhevmError>;
