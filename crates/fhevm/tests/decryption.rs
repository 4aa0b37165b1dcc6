// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use fherate_fhevm::{
    collect_handles, AbortController, AbortSignal, BatchDecryptor, CryptoSession, DecryptionSignature, FhevmError,
    HandleContractPair, InMemoryStore, KeyValueStore, ProviderOrUrl, SledStore, Wallet,
    DEFAULT_DURATION_DAYS, SECONDS_PER_DAY,
};
use fherate_test_helpers::{TestEnvironment, TestWallet, GENESIS_TIMESTAMP};
use tempfile::tempdir;

const NOW: u64 = GENESIS_TIMESTAMP;

fn ledger() -> Address {
    Address::repeat_byte(0xc0)
}

/// Encrypt `values` so the relayer knows their cleartexts
async fn encrypted(session: &CryptoSession, values: &[u32]) -> Result<Vec<B256>> {
    let mut input = session.create_encrypted_input(ledger(), Address::repeat_byte(0x05));
    for value in values {
        input.add32(*value)?;
    }
    Ok(input.encrypt().await?.handles)
}

async fn sign(
    session: &CryptoSession,
    wallet: &TestWallet,
    store: &dyn KeyValueStore,
    contracts: &[Address],
    now: u64,
) -> fherate_fhevm::Result<DecryptionSignature> {
    DecryptionSignature::load_or_sign_at(
        session,
        contracts,
        wallet,
        store,
        &AbortSignal::never(),
        DEFAULT_DURATION_DAYS,
        now,
    )
    .await
}

#[tokio::test]
async fn test_signature_is_cached() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let first = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let second = sign(&session, &wallet, &store, &[ledger()], NOW + 60).await?;

    assert_eq!(wallet.signatures(), 1);
    assert_eq!(first, second);
    assert_eq!(first.user_address, wallet.address());
    assert_eq!(first.start_timestamp, NOW);
    assert_eq!(first.duration_days, DEFAULT_DURATION_DAYS);
    assert!(first.signature.starts_with("0x"));
    first.verify(&session, wallet.address(), &[ledger()], NOW)?;
    Ok(())
}

#[tokio::test]
async fn test_contract_order_shares_one_signature() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();
    let other = Address::repeat_byte(0x0a);

    let first = sign(&session, &wallet, &store, &[ledger(), other], NOW).await?;
    let second = sign(&session, &wallet, &store, &[other, ledger(), other], NOW).await?;

    assert_eq!(wallet.signatures(), 1);
    assert_eq!(first.contract_addresses, vec![other, ledger()]);
    assert_eq!(first, second);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_signature_is_replaced() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let first = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let later = first.expires_at();
    let second = sign(&session, &wallet, &store, &[ledger()], later).await?;

    assert_eq!(wallet.signatures(), 2);
    assert_eq!(second.start_timestamp, later);
    assert_ne!(first.public_key, second.public_key);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rejected_prompt_caches_nothing() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    wallet.reject_signatures(true);
    let store = InMemoryStore::new();

    let result = sign(&session, &wallet, &store, &[ledger()], NOW).await;
    assert_eq!(result.unwrap_err(), FhevmError::AuthorizationDenied);
    assert!(store.is_empty());

    wallet.reject_signatures(false);
    sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    assert_eq!(wallet.signatures(), 2);
    Ok(())
}

#[tokio::test]
async fn test_signature_from_another_network_is_not_reused() -> Result<()> {
    let env = TestEnvironment::new();
    let wallet = Arc::new(TestWallet::new(11155111));
    let store = InMemoryStore::new();

    let mock = env.mock_session().await?;
    let production = env
        .factory
        .create_session(
            &ProviderOrUrl::Wallet(wallet.clone() as Arc<dyn Wallet>),
            &AbortSignal::never(),
            None,
        )
        .await?;

    let first = sign(&mock, &wallet, &store, &[ledger()], NOW).await?;
    let second = sign(&production, &wallet, &store, &[ledger()], NOW).await?;
    assert_eq!(wallet.signatures(), 2);
    assert_ne!(first, second);
    assert!(first.verify(&production, wallet.address(), &[ledger()], NOW).is_err());
    Ok(())
}

#[tokio::test]
async fn test_signature_survives_restart() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let dir = tempdir()?;
    let path = dir.path().join("signatures");

    let first = {
        let store = SledStore::open(&path)?;
        sign(&session, &wallet, &store, &[ledger()], NOW).await?
    };
    let store = SledStore::open(&path)?;
    let second = sign(&session, &wallet, &store, &[ledger()], NOW + SECONDS_PER_DAY).await?;

    assert_eq!(wallet.signatures(), 1);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_batch_returns_exactly_the_requested_handles() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let alice = encrypted(&session, &[8, 7]).await?;
    let bob = encrypted(&session, &[9, 10]).await?;
    // an unrelated ciphertext the relayer also knows about
    encrypted(&session, &[1]).await?;

    let signature = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let pairs = collect_handles(&[alice.clone(), bob.clone()], ledger());
    let decrypted = BatchDecryptor::new(session.clone())
        .decrypt_all_at(&pairs, &signature, &AbortSignal::never(), NOW)
        .await?;

    assert_eq!(decrypted.len(), 4);
    assert_eq!(decrypted[&alice[0]], U256::from(8));
    assert_eq!(decrypted[&alice[1]], U256::from(7));
    assert_eq!(decrypted[&bob[0]], U256::from(9));
    assert_eq!(decrypted[&bob[1]], U256::from(10));
    assert_eq!(env.mock_relayer.decrypt_requests(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_handles_are_requested_once() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let handles = encrypted(&session, &[3]).await?;
    let signature = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let pairs = collect_handles(&[handles.clone(), handles.clone()], ledger());

    let decrypted = BatchDecryptor::new(session)
        .decrypt_all_at(&pairs, &signature, &AbortSignal::never(), NOW)
        .await?;
    assert_eq!(decrypted.len(), 1);
    assert_eq!(decrypted[&handles[0]], U256::from(3));
    Ok(())
}

#[tokio::test]
async fn test_batch_rejects_before_any_request() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let handles = encrypted(&session, &[5]).await?;
    let signature = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let decryptor = BatchDecryptor::new(session);
    let never = AbortSignal::never();

    assert_eq!(
        decryptor.decrypt_all_at(&[], &signature, &never, NOW).await,
        Err(FhevmError::EmptyInput)
    );

    let pairs = collect_handles(&[handles.clone()], ledger());
    let expired = decryptor
        .decrypt_all_at(&pairs, &signature, &never, signature.expires_at())
        .await;
    assert!(matches!(expired, Err(FhevmError::DecryptionUnauthorized(_))));

    let uncovered = [HandleContractPair {
        handle: handles[0],
        contract_address: Address::repeat_byte(0xee),
    }];
    let result = decryptor
        .decrypt_all_at(&uncovered, &signature, &never, NOW)
        .await;
    assert!(matches!(result, Err(FhevmError::DecryptionUnauthorized(_))));

    assert_eq!(env.mock_relayer.decrypt_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_relayer_refusal_is_unauthorized() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let handles = encrypted(&session, &[5]).await?;
    let signature = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    env.mock_relayer.reject_decryption(true);

    let pairs = collect_handles(&[handles], ledger());
    let result = BatchDecryptor::new(session)
        .decrypt_all_at(&pairs, &signature, &AbortSignal::never(), NOW)
        .await;
    assert!(matches!(result, Err(FhevmError::DecryptionUnauthorized(_))));
    Ok(())
}

#[tokio::test]
async fn test_abort_withdraws_the_wallet_prompt() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = Arc::new(TestWallet::new(31337));
    wallet.hold_signatures(true);
    let store = Arc::new(InMemoryStore::new());
    let controller = AbortController::new();

    let pending = tokio::spawn({
        let session = session.clone();
        let wallet = wallet.clone();
        let store = store.clone();
        let signal = controller.signal();
        async move {
            DecryptionSignature::load_or_sign_at(
                &session,
                &[ledger()],
                wallet.as_ref(),
                store.as_ref(),
                &signal,
                DEFAULT_DURATION_DAYS,
                NOW,
            )
            .await
        }
    });
    while wallet.signatures() == 0 {
        tokio::task::yield_now().await;
    }
    controller.abort();

    assert_eq!(pending.await?.unwrap_err(), FhevmError::Aborted);
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_aborted_batch_sends_nothing() -> Result<()> {
    let env = TestEnvironment::new();
    let session = env.mock_session().await?;
    let wallet = TestWallet::new(31337);
    let store = InMemoryStore::new();

    let handles = encrypted(&session, &[4]).await?;
    let signature = sign(&session, &wallet, &store, &[ledger()], NOW).await?;
    let controller = AbortController::new();
    controller.abort();

    let pairs = collect_handles(&[handles], ledger());
    let result = BatchDecryptor::new(session)
        .decrypt_all_at(&pairs, &signature, &controller.signal(), NOW)
        .await;
    assert_eq!(result, Err(FhevmError::Aborted));
    assert_eq!(env.mock_relayer.decrypt_requests(), 0);
    Ok(())
}
