// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::Address;
use fherate_config::{FheRateConfig, MockChains, MockInstanceDefaults, ProductionNetwork, RpcEndpoint};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::abort::AbortSignal;
use crate::codec::{CiphertextCodec, MockCodec};
use crate::error::{FhevmError, Result};
use crate::instance::{CryptoSession, InstanceConfig};
use crate::network::{MockAuthorities, NetworkProfile, ProviderOrUrl};
use crate::relayer::JsonRpcRelayer;
use crate::resolver::ChainResolver;
use crate::rpc::{AlloyRpcConnector, RpcConnector};
use crate::sdk::{HttpRelayerSdk, RelayerSdk};
use crate::state::{SessionState, SessionStateCell, StatusSink};

/// Parse a 0x-prefixed address coming from configuration
pub fn parse_address(raw: &str) -> Result<Address> {
    raw.strip_prefix("0x")
        .and_then(|_| raw.parse().ok())
        .ok_or_else(|| FhevmError::InvalidAddress(raw.to_string()))
}

/// Builds `CryptoSession`s and owns the process-wide `SessionState`.
///
/// Cheap to clone: clones share the SDK bootstrap and the state.
#[derive(Clone)]
pub struct SessionFactory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    resolver: ChainResolver,
    connector: Arc<dyn RpcConnector>,
    sdk: Arc<dyn RelayerSdk>,
    mock: MockInstanceDefaults,
    state: SessionStateCell,
}

/// A `create_session` running in the background
pub struct SessionTask {
    /// Transitions of this attempt, closed when it finishes
    pub updates: mpsc::UnboundedReceiver<SessionState>,
    pub handle: JoinHandle<Result<Arc<CryptoSession>>>,
}

impl SessionTask {
    pub async fn wait(self) -> Result<Arc<CryptoSession>> {
        self.handle
            .await
            .map_err(|e| FhevmError::init("creating", e))?
    }
}

struct StatusReporter<'a> {
    cell: &'a SessionStateCell,
    sink: Option<&'a StatusSink>,
}

impl StatusReporter<'_> {
    fn report(&self, state: SessionState) {
        if !self.cell.advance(state) {
            return;
        }
        info!("FHEVM session state: {}", state);
        if let Some(sink) = self.sink {
            // the caller stopped listening
            let _ = sink.send(state);
        }
    }
}

/// Keep cancellation and typed failures, wrap everything else with its stage.
fn stage(stage: &'static str) -> impl Fn(FhevmError) -> FhevmError {
    move |err| match err {
        FhevmError::Aborted
        | FhevmError::InitializationFailed { .. }
        | FhevmError::InvalidAddress(_) => err,
        other => FhevmError::init(stage, other),
    }
}

impl SessionFactory {
    pub fn new(
        connector: Arc<dyn RpcConnector>,
        sdk: Arc<dyn RelayerSdk>,
        mock_chains: MockChains,
        mock: MockInstanceDefaults,
    ) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                resolver: ChainResolver::new(connector.clone(), mock_chains),
                connector,
                sdk,
                mock,
                state: SessionStateCell::new(),
            }),
        }
    }

    /// Factory over real JSON-RPC connections and the production relayer.
    /// `codec` is the production ciphertext engine, if any.
    pub fn from_config(config: &FheRateConfig, codec: Option<Arc<dyn CiphertextCodec>>) -> Self {
        let mut sdk = HttpRelayerSdk::new(config.production.clone());
        if let Some(codec) = codec {
            sdk = sdk.with_codec(codec);
        }
        Self::new(
            Arc::new(AlloyRpcConnector),
            Arc::new(sdk),
            config.mock_chains(),
            config.mock.clone(),
        )
    }

    pub fn resolver(&self) -> &ChainResolver {
        &self.inner.resolver
    }

    pub fn state(&self) -> Option<SessionState> {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionState>> {
        self.inner.state.subscribe()
    }

    /// Forget the current session, e.g. on wallet disconnect. The SDK
    /// bootstrap is kept.
    pub fn teardown(&self) {
        self.inner.state.teardown();
    }

    /// Run `create_session` on its own task, streaming its transitions.
    pub fn start(&self, target: ProviderOrUrl, signal: AbortSignal) -> SessionTask {
        let (sender, updates) = mpsc::unbounded_channel();
        let factory = self.clone();
        let handle = tokio::spawn(async move {
            factory
                .create_session(&target, &signal, Some(&sender))
                .await
        });
        SessionTask { updates, handle }
    }

    /// Build a session for `target`.
    ///
    /// `signal` is checked at every stage boundary and races every stage, so a
    /// cancelled call always ends in `Aborted` and never yields a session.
    pub async fn create_session(
        &self,
        target: &ProviderOrUrl,
        signal: &AbortSignal,
        on_status: Option<&StatusSink>,
    ) -> Result<Arc<CryptoSession>> {
        signal.throw_if_aborted()?;
        self.inner.state.restart();
        let status = StatusReporter {
            cell: &self.inner.state,
            sink: on_status,
        };

        let profile = signal
            .guard(self.inner.resolver.resolve(target))
            .await
            .map_err(stage("resolving the network"))?;
        signal.throw_if_aborted()?;

        if let NetworkProfile::Mock {
            chain_id,
            rpc_url,
            authorities,
        } = &profile
        {
            status.report(SessionState::Creating);
            let session = self.create_mock_session(&profile, *chain_id, rpc_url, authorities)?;
            signal.throw_if_aborted()?;
            status.report(SessionState::Ready);
            return Ok(Arc::new(session));
        }

        let sdk = &self.inner.sdk;
        if !sdk.is_loaded() {
            status.report(SessionState::SdkLoading);
            signal
                .guard(sdk.load())
                .await
                .map_err(stage("loading the sdk"))?;
            status.report(SessionState::SdkLoaded);
        }
        signal.throw_if_aborted()?;

        if !sdk.is_initialized() {
            status.report(SessionState::SdkInitializing);
            signal
                .guard(sdk.initialize())
                .await
                .map_err(stage("initializing the sdk"))?;
            status.report(SessionState::SdkInitialized);
        }
        signal.throw_if_aborted()?;

        let network = sdk.network_config();
        let config = production_instance_config(&network)?;
        if network.chain_id != profile.chain_id() {
            warn!(
                "Connected to chain {} but the production network is chain {}",
                profile.chain_id(),
                network.chain_id
            );
        }

        status.report(SessionState::Creating);
        let session = signal
            .guard(sdk.create_instance(config, profile.descriptor()))
            .await
            .map_err(stage("creating"))?;
        signal.throw_if_aborted()?;

        status.report(SessionState::Ready);
        Ok(Arc::new(session))
    }

    fn create_mock_session(
        &self,
        profile: &NetworkProfile,
        chain_id: u64,
        rpc_url: &RpcEndpoint,
        authorities: &MockAuthorities,
    ) -> Result<CryptoSession> {
        let mock = &self.inner.mock;
        let config = InstanceConfig {
            chain_id,
            gateway_chain_id: mock.gateway_chain_id,
            acl: authorities.acl,
            kms_verifier: authorities.kms_verifier,
            input_verifier: authorities.input_verifier,
            verifying_contract_decryption: parse_address(
                &mock.verifying_contract_address_decryption,
            )?,
            verifying_contract_input_verification: parse_address(
                &mock.verifying_contract_address_input_verification,
            )?,
        };
        let transport = Arc::new(JsonRpcRelayer::new(
            self.inner.connector.clone(),
            rpc_url.clone(),
        ));
        Ok(CryptoSession::new(
            config,
            profile.descriptor(),
            transport,
            Arc::new(MockCodec),
            None,
        ))
    }
}

fn production_instance_config(network: &ProductionNetwork) -> Result<InstanceConfig> {
    Ok(InstanceConfig {
        chain_id: network.chain_id,
        gateway_chain_id: network.gateway_chain_id,
        acl: parse_address(&network.acl_contract_address)?,
        kms_verifier: parse_address(&network.kms_contract_address)?,
        input_verifier: parse_address(&network.input_verifier_contract_address)?,
        verifying_contract_decryption: parse_address(
            &network.verifying_contract_address_decryption,
        )?,
        verifying_contract_input_verification: parse_address(
            &network.verifying_contract_address_input_verification,
        )?,
    })
}
