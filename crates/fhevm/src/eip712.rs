// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Typed-data payload a user signs to authorize off-chain decryption.
//!
//! The struct name and field layout must match what the KMS gateway verifies;
//! renaming anything here invalidates every signature issued so far.

use std::borrow::Cow;

use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde_json::{json, Value};

pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

/// A domain-scoped decryption authorization request, ready to be signed.
#[derive(Debug)]
pub struct Eip712Request {
    pub domain: Eip712Domain,
    pub message: UserDecryptRequestVerification,
}

impl Eip712Request {
    pub fn new(
        gateway_chain_id: u64,
        verifying_contract: Address,
        public_key: &[u8],
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        let domain = Eip712Domain::new(
            Some(Cow::Borrowed(DECRYPTION_DOMAIN_NAME)),
            Some(Cow::Borrowed(DECRYPTION_DOMAIN_VERSION)),
            Some(U256::from(gateway_chain_id)),
            Some(verifying_contract),
            None,
        );
        let message = UserDecryptRequestVerification {
            publicKey: Bytes::copy_from_slice(public_key),
            contractAddresses: contract_addresses.to_vec(),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
        };
        Self { domain, message }
    }

    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }

    /// Address that produced `signature` over this request, if recoverable
    pub fn recover_signer(&self, signature: &Signature) -> Option<Address> {
        signature
            .recover_address_from_prehash(&self.signing_hash())
            .ok()
    }

    /// The `eth_signTypedData_v4` JSON form, for wallets that sign remotely.
    pub fn to_typed_data(&self) -> Value {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "UserDecryptRequestVerification": [
                    { "name": "publicKey", "type": "bytes" },
                    { "name": "contractAddresses", "type": "address[]" },
                    { "name": "startTimestamp", "type": "uint256" },
                    { "name": "durationDays", "type": "uint256" },
                ],
            },
            "primaryType": "UserDecryptRequestVerification",
            "domain": {
                "name": DECRYPTION_DOMAIN_NAME,
                "version": DECRYPTION_DOMAIN_VERSION,
                "chainId": self.domain.chain_id.map(|id| id.to::<u64>()),
                "verifyingContract": self.domain.verifying_contract,
            },
            "message": {
                "publicKey": self.message.publicKey,
                "contractAddresses": self.message.contractAddresses,
                "startTimestamp": self.message.startTimestamp.to_string(),
                "durationDays": self.message.durationDays.to_string(),
            },
        })
    }
}
