// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use fherate_config::ProductionNetwork;
use fherate_fhevm::{FhevmError, SessionState, Wallet, WalletEvent};
use fherate_sdk::SessionHolder;
use fherate_test_helpers::{FakeNode, TestEnvironment, TestWallet};
use tracing_test::traced_test;

fn holder(env: &TestEnvironment, chain_id: u64) -> (Arc<TestWallet>, Arc<SessionHolder>) {
    let wallet = Arc::new(TestWallet::new(chain_id));
    let holder = SessionHolder::new(env.factory.clone(), wallet.clone() as Arc<dyn Wallet>);
    (wallet, holder)
}

/// Poll until `condition` holds
async fn eventually(condition: impl Fn() -> bool) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_session_is_cached_per_chain() -> Result<()> {
    let env = TestEnvironment::new();
    let (_, holder) = holder(&env, 31337);

    let first = holder.session().await?;
    let opened = env.connector.opened();
    let second = holder.session().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.connector.opened(), opened);
    assert!(holder.cached(31337).is_some());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_callers_share_one_creation() -> Result<()> {
    let env = TestEnvironment::new();
    let (_, holder) = holder(&env, 11155111);

    let (a, b) = tokio::join!(holder.session(), holder.session());
    assert!(Arc::ptr_eq(&a?, &b?));
    assert_eq!(env.sdk.instances(), 1);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_chain_change_rebuilds() -> Result<()> {
    let env = TestEnvironment::new();
    let (wallet, holder) = holder(&env, 31337);
    assert!(holder.session().await?.is_mock());

    wallet.notify(WalletEvent::ChainChanged(11155111));
    let rebuild = holder
        .handle_event(WalletEvent::ChainChanged(11155111))
        .ok_or_else(|| eyre::eyre!("no rebuild started"))?;
    assert!(holder.cached(31337).is_none());
    rebuild.await?;

    assert!(holder.cached(31337).is_none());
    let rebuilt = holder.cached(11155111).ok_or_else(|| eyre::eyre!("not rebuilt"))?;
    assert!(!rebuilt.is_mock());
    assert_eq!(env.sdk.loads(), 1);
    assert!(logs_contain("Wallet switched to chain 11155111"));
    Ok(())
}

#[tokio::test]
async fn test_account_change_drops_the_session() -> Result<()> {
    let env = TestEnvironment::new();
    let (_, holder) = holder(&env, 31337);
    holder.session().await?;

    assert!(holder
        .handle_event(WalletEvent::AccountsChanged(vec![]))
        .is_none());
    assert!(holder.cached(31337).is_none());
    assert_eq!(env.factory.state(), Some(SessionState::Ready));
    Ok(())
}

#[tokio::test]
async fn test_disconnect_aborts_creation_in_flight() -> Result<()> {
    let env = TestEnvironment::new();
    env.connector.add_node(
        "http://localhost:8545",
        FakeNode::hardhat(31337).stalling_on("fhevm_relayer_metadata"),
    );
    let (_, holder) = holder(&env, 31337);

    let pending = tokio::spawn({
        let holder = holder.clone();
        async move { holder.session().await }
    });
    let connector = env.connector.clone();
    eventually(move || connector.live() > 0).await?;

    holder.handle_event(WalletEvent::Disconnected);

    assert_eq!(pending.await?.unwrap_err(), FhevmError::Aborted);
    assert_eq!(env.connector.live(), 0);
    assert_eq!(env.factory.state(), None);
    assert!(holder.cached(31337).is_none());
    Ok(())
}

#[tokio::test]
async fn test_listener_follows_wallet_events() -> Result<()> {
    let env = TestEnvironment::new();
    let (wallet, holder) = holder(&env, 31337);
    let listener = holder.listen();
    holder.session().await?;

    wallet.notify(WalletEvent::ChainChanged(11155111));
    let watched = holder.clone();
    eventually(move || watched.cached(11155111).is_some()).await?;

    wallet.notify(WalletEvent::Disconnected);
    let watched = holder.clone();
    eventually(move || watched.cached(11155111).is_none()).await?;
    assert_eq!(env.factory.state(), None);

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn test_disconnect_aborts_a_stalled_rebuild() -> Result<()> {
    let env = TestEnvironment::new();
    env.connector.add_node(
        "http://localhost:8545",
        FakeNode::hardhat(31337).stalling_on("fhevm_relayer_metadata"),
    );
    let (wallet, holder) = holder(&env, 11155111);
    let listener = holder.listen();
    holder.session().await?;

    wallet.notify(WalletEvent::ChainChanged(31337));
    let connector = env.connector.clone();
    eventually(move || connector.live() > 0).await?;
    assert!(holder.cached(11155111).is_none());

    wallet.notify(WalletEvent::Disconnected);
    let connector = env.connector.clone();
    eventually(move || connector.live() == 0).await?;
    assert_eq!(env.factory.state(), None);

    // the listener is still following events
    wallet.notify(WalletEvent::ChainChanged(11155111));
    let watched = holder.clone();
    eventually(move || watched.cached(11155111).is_some()).await?;

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn test_session_is_cached_under_the_wallet_chain() -> Result<()> {
    let mut network = ProductionNetwork::sepolia();
    network.chain_id = 1;
    let env = TestEnvironment::with_network(network);
    let (_, holder) = holder(&env, 11155111);

    let first = holder.session().await?;
    assert!(holder.cached(11155111).is_some());
    let second = holder.session().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.sdk.instances(), 1);
    Ok(())
}
