// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy::primitives::{Address, Signature};
use async_trait::async_trait;
use fherate_fhevm::{Eip712Request, LocalWallet, Wallet, WalletError, WalletEvent};
use serde_json::Value;
use tokio::sync::broadcast;

/// An offline wallet that counts signing prompts and can refuse them.
pub struct TestWallet {
    inner: LocalWallet,
    signatures: AtomicUsize,
    reject: AtomicBool,
    hold: AtomicBool,
}

impl TestWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            inner: LocalWallet::random(chain_id),
            signatures: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
            hold: AtomicBool::new(false),
        }
    }

    /// Number of signing prompts answered, refused ones included
    pub fn signatures(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    /// Refuse every further signing prompt
    pub fn reject_signatures(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Leave every further signing prompt unanswered
    pub fn hold_signatures(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn notify(&self, event: WalletEvent) {
        self.inner.notify(event);
    }

    pub fn address(&self) -> Address {
        self.inner.signer().address()
    }
}

#[async_trait]
impl Wallet for TestWallet {
    async fn chain_id(&self) -> Result<u64, WalletError> {
        self.inner.chain_id().await
    }

    async fn address(&self) -> Result<Address, WalletError> {
        Wallet::address(&self.inner).await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.inner.request(method, params).await
    }

    async fn sign_typed_data(&self, request: &Eip712Request) -> Result<Signature, WalletError> {
        self.signatures.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected);
        }
        self.inner.sign_typed_data(request).await
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.inner.subscribe()
    }
}
