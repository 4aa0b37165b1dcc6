// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{CiphertextCodec, EncryptionContext, Keypair, PlainValue, PublicMaterial};
use crate::eip712::Eip712Request;
use crate::error::{FhevmError, Result};
use crate::handle::{assemble_input_proof, compute_input_handles, FheType};
use crate::input::{EncryptedInput, EncryptedInputOutput};
use crate::network::NetworkDescriptor;
use crate::relayer::{
    HandleContractPair, InputProofRequest, RelayerTransport, RequestValidity, UserDecryptRequest,
};
use crate::signature::DecryptionSignature;

/// Validated authority addresses and chain ids a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub acl: Address,
    pub kms_verifier: Address,
    pub input_verifier: Address,
    pub verifying_contract_decryption: Address,
    pub verifying_contract_input_verification: Address,
}

/// The cryptographic client of one network.
///
/// Owned by the session factory and shared read-only (through `Arc`) by input
/// builders and decryptors until the wallet switches chain.
pub struct CryptoSession {
    config: InstanceConfig,
    descriptor: NetworkDescriptor,
    public_material: Option<PublicMaterial>,
    transport: Arc<dyn RelayerTransport>,
    codec: Arc<dyn CiphertextCodec>,
}

impl CryptoSession {
    pub fn new(
        config: InstanceConfig,
        descriptor: NetworkDescriptor,
        transport: Arc<dyn RelayerTransport>,
        codec: Arc<dyn CiphertextCodec>,
        public_material: Option<PublicMaterial>,
    ) -> Self {
        info!(
            "FHEVM session created for chain {} (mock: {})",
            descriptor.chain_id, descriptor.is_mock
        );
        Self {
            config,
            descriptor,
            public_material,
            transport,
            codec,
        }
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &NetworkDescriptor {
        &self.descriptor
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn is_mock(&self) -> bool {
        self.descriptor.is_mock
    }

    /// Network public key. Mock sessions have none.
    pub fn public_material(&self) -> Option<&PublicMaterial> {
        self.public_material.as_ref()
    }

    /// Start an encrypted input for `contract`, to be submitted by `user`.
    pub fn create_encrypted_input(&self, contract: Address, user: Address) -> EncryptedInput<'_> {
        EncryptedInput::new(self, contract, user)
    }

    pub fn generate_keypair(&self) -> Result<Keypair> {
        self.codec.generate_keypair()
    }

    /// The typed statement a user signs to authorize decryption.
    pub fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Request> {
        let public_key = hex::decode(public_key.trim_start_matches("0x"))
            .map_err(|e| FhevmError::DecryptionUnauthorized(format!("public key is not hex: {e}")))?;
        Ok(Eip712Request::new(
            self.config.gateway_chain_id,
            self.config.verifying_contract_decryption,
            &public_key,
            contracts,
            start_timestamp,
            duration_days,
        ))
    }

    /// Encrypt `values` and obtain the coprocessor's validity proof.
    pub(crate) async fn encrypt_values(
        &self,
        contract: Address,
        user: Address,
        values: &[PlainValue],
    ) -> Result<EncryptedInputOutput> {
        let context = EncryptionContext {
            contract,
            user,
            acl: self.config.acl,
            chain_id: self.config.chain_id,
        };
        let ciphertext = self.codec.encrypt_input(values, &context)?;

        let types: Vec<FheType> = values.iter().map(|v| v.fhe_type).collect();
        let expected = compute_input_handles(&ciphertext, &types, self.config.acl, self.config.chain_id)?;

        let request = InputProofRequest {
            contract_chain_id: self.config.chain_id,
            contract_address: contract,
            user_address: user,
            ciphertext_with_input_verification: hex::encode(&ciphertext),
            extra_data: Bytes::from_static(&[0]),
        };
        let response = self.transport.input_proof(&request).await?;

        if response.handles != expected {
            return Err(FhevmError::Relayer(format!(
                "relayer returned {} handles that do not match the {} computed locally",
                response.handles.len(),
                expected.len()
            )));
        }
        debug!("Input proof received for {} values", expected.len());

        let input_proof = assemble_input_proof(&response.handles, &response.signatures)?;
        Ok(EncryptedInputOutput {
            handles: response.handles,
            input_proof,
        })
    }

    /// Decrypt `handles` under an authorization. Returns cleartexts for exactly
    /// the requested handles.
    pub async fn user_decrypt(
        &self,
        handles: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<B256, U256>> {
        let request = UserDecryptRequest {
            handle_contract_pairs: handles.to_vec(),
            request_validity: RequestValidity {
                start_timestamp: signature.start_timestamp.to_string(),
                duration_days: signature.duration_days.to_string(),
            },
            contracts_chain_id: self.config.chain_id,
            contract_addresses: signature.contract_addresses.clone(),
            user_address: signature.user_address,
            signature: signature.signature.trim_start_matches("0x").to_string(),
            public_key: signature.public_key.trim_start_matches("0x").to_string(),
            extra_data: Bytes::from_static(&[0]),
        };
        let response = self.transport.user_decrypt(&request).await?;

        let requested: Vec<B256> = handles.iter().map(|pair| pair.handle).collect();
        self.codec
            .decrypt_user_response(&response, signature.private_key(), &requested)
    }
}

impl fmt::Debug for CryptoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoSession")
            .field("config", &self.config)
            .field("descriptor", &self.descriptor)
            .field("public_material", &self.public_material)
            .finish_non_exhaustive()
    }
}
