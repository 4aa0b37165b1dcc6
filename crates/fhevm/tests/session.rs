// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fherate_config::{ProductionNetwork, RpcEndpoint};
use fherate_fhevm::{
    AbortController, AbortSignal, FhevmError, ProviderOrUrl, RelayerSdk, SessionState, Wallet,
};
use fherate_test_helpers::{FakeNode, SdkStage, TestEnvironment, TestWallet};
use tokio::sync::mpsc;

use SessionState::*;

fn sepolia_wallet() -> ProviderOrUrl {
    let wallet: Arc<dyn Wallet> = Arc::new(TestWallet::new(11155111));
    ProviderOrUrl::Wallet(wallet)
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<SessionState>) -> Vec<SessionState> {
    let mut states = vec![];
    while let Ok(state) = receiver.try_recv() {
        states.push(state);
    }
    states
}

#[tokio::test]
async fn test_mock_session_skips_sdk_bootstrap() -> Result<()> {
    let env = TestEnvironment::new();
    let (sink, mut updates) = mpsc::unbounded_channel();

    let session = env
        .factory
        .create_session(
            &ProviderOrUrl::Url(TestEnvironment::local_rpc()),
            &AbortSignal::never(),
            Some(&sink),
        )
        .await?;

    assert!(session.is_mock());
    assert_eq!(session.chain_id(), 31337);
    assert_eq!(session.config().gateway_chain_id, 55815);
    assert_eq!(drain(&mut updates), vec![Creating, Ready]);
    assert_eq!(env.sdk.loads(), 0);
    assert_eq!(env.sdk.initializations(), 0);
    assert_eq!(env.factory.state(), Some(Ready));
    assert_eq!(env.connector.live(), 0);
    Ok(())
}

#[tokio::test]
async fn test_production_session_reports_every_stage() -> Result<()> {
    let env = TestEnvironment::new();
    let (sink, mut updates) = mpsc::unbounded_channel();

    let session = env
        .factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), Some(&sink))
        .await?;

    assert!(!session.is_mock());
    assert_eq!(session.chain_id(), 11155111);
    assert_eq!(
        drain(&mut updates),
        vec![
            SdkLoading,
            SdkLoaded,
            SdkInitializing,
            SdkInitialized,
            Creating,
            Ready
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_sdk_bootstrap_runs_once() -> Result<()> {
    let env = TestEnvironment::new();
    env.factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), None)
        .await?;

    let (sink, mut updates) = mpsc::unbounded_channel();
    env.factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), Some(&sink))
        .await?;

    assert_eq!(drain(&mut updates), vec![Creating, Ready]);
    assert_eq!(env.sdk.loads(), 1);
    assert_eq!(env.sdk.initializations(), 1);
    assert_eq!(env.sdk.instances(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_signal_never_yields_a_session() {
    let env = TestEnvironment::new();
    let controller = AbortController::new();
    controller.abort();

    for target in [
        sepolia_wallet(),
        ProviderOrUrl::Url(TestEnvironment::local_rpc()),
    ] {
        let result = env
            .factory
            .create_session(&target, &controller.signal(), None)
            .await;
        assert_eq!(result.unwrap_err(), FhevmError::Aborted);
    }
    assert_eq!(env.sdk.loads(), 0);
    assert_eq!(env.connector.opened(), 0);
}

#[tokio::test]
async fn test_abort_at_each_checkpoint() {
    for stage in [SdkStage::Load, SdkStage::Initialize, SdkStage::Create] {
        let env = TestEnvironment::new();
        let controller = AbortController::new();
        env.sdk.abort_after(stage, controller.clone());

        let result = env
            .factory
            .create_session(&sepolia_wallet(), &controller.signal(), None)
            .await;
        assert_eq!(result.unwrap_err(), FhevmError::Aborted, "stage {stage:?}");
    }
}

#[tokio::test]
async fn test_abort_interrupts_a_pending_stage() {
    let env = TestEnvironment::new();
    let controller = AbortController::new();
    env.sdk.abort_during(SdkStage::Initialize, controller.clone());

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        env.factory
            .create_session(&sepolia_wallet(), &controller.signal(), None),
    )
    .await
    .expect("aborted stage must not hang");
    assert_eq!(result.unwrap_err(), FhevmError::Aborted);
    assert!(!env.sdk.is_initialized());
}

#[tokio::test]
async fn test_abort_releases_probe_connection() -> Result<()> {
    let env = TestEnvironment::new();
    env.connector.add_node(
        "http://localhost:8545",
        FakeNode::hardhat(31337).stalling_on("fhevm_relayer_metadata"),
    );
    let controller = AbortController::new();

    let task = env.factory.start(
        ProviderOrUrl::Url(TestEnvironment::local_rpc()),
        controller.signal(),
    );
    while env.connector.live() == 0 {
        tokio::task::yield_now().await;
    }
    controller.abort();

    assert_eq!(task.wait().await.unwrap_err(), FhevmError::Aborted);
    assert_eq!(env.connector.live(), 0);
    Ok(())
}

#[tokio::test]
async fn test_load_failure_is_fatal_and_retryable() -> Result<()> {
    let env = TestEnvironment::new();
    env.sdk.fail_at(Some(SdkStage::Load));

    let err = env
        .factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FhevmError::InitializationFailed {
            stage: "loading the sdk",
            ..
        }
    ));
    assert!(!err.is_aborted());

    env.sdk.fail_at(None);
    env.factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), None)
        .await?;
    assert_eq!(env.sdk.loads(), 2);
    Ok(())
}

#[tokio::test]
async fn test_malformed_acl_is_rejected() {
    let network = ProductionNetwork {
        acl_contract_address: "0xnot-an-address".to_string(),
        ..ProductionNetwork::sepolia()
    };
    let env = TestEnvironment::with_network(network);

    let result = env
        .factory
        .create_session(&sepolia_wallet(), &AbortSignal::never(), None)
        .await;
    assert_eq!(
        result.unwrap_err(),
        FhevmError::InvalidAddress("0xnot-an-address".to_string())
    );
    assert_eq!(env.sdk.instances(), 0);
}

#[tokio::test]
async fn test_unreachable_url_fails_initialization() {
    let env = TestEnvironment::new();
    let url = RpcEndpoint::from_url("http://localhost:1").unwrap();

    let result = env
        .factory
        .create_session(&ProviderOrUrl::Url(url), &AbortSignal::never(), None)
        .await;
    assert!(matches!(
        result,
        Err(FhevmError::InitializationFailed {
            stage: "resolving the network",
            ..
        })
    ));
}

#[tokio::test]
async fn test_started_session_streams_transitions() -> Result<()> {
    let env = TestEnvironment::new();
    let mut task = env.factory.start(sepolia_wallet(), AbortSignal::never());

    let mut states = vec![];
    while let Some(state) = task.updates.recv().await {
        states.push(state);
    }
    assert_eq!(states.last(), Some(&Ready));
    assert_eq!(states.len(), 6);

    let session = task.wait().await?;
    assert_eq!(session.chain_id(), 11155111);
    Ok(())
}

#[tokio::test]
async fn test_teardown_restarts_the_sequence() -> Result<()> {
    let env = TestEnvironment::new();
    let mut states = env.factory.subscribe();
    env.mock_session().await?;
    assert_eq!(*states.borrow_and_update(), Some(Ready));

    env.factory.teardown();
    assert_eq!(env.factory.state(), None);

    env.mock_session().await?;
    assert_eq!(env.factory.state(), Some(Ready));
    Ok(())
}
