// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fherate_config::ProductionNetwork;
use fherate_fhevm::{
    AbortController, CryptoSession, FhevmError, InstanceConfig, MockCodec, NetworkDescriptor,
    RelayerSdk, Result,
};

use crate::relayer::InMemoryRelayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkStage {
    Load,
    Initialize,
    Create,
}

struct StageHook {
    stage: SdkStage,
    controller: AbortController,
    /// Keep the stage pending after aborting instead of completing it
    stall: bool,
}

/// Production bootstrap that counts its stages and never touches the network.
pub struct FakeRelayerSdk {
    network: ProductionNetwork,
    relayer: Arc<InMemoryRelayer>,
    loads: AtomicUsize,
    initializations: AtomicUsize,
    instances: AtomicUsize,
    loaded: AtomicBool,
    initialized: AtomicBool,
    failing: Mutex<Option<SdkStage>>,
    hooks: Mutex<Vec<StageHook>>,
}

impl FakeRelayerSdk {
    pub fn new(network: ProductionNetwork, relayer: Arc<InMemoryRelayer>) -> Self {
        Self {
            network,
            relayer,
            loads: AtomicUsize::new(0),
            initializations: AtomicUsize::new(0),
            instances: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            failing: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    /// Make `stage` fail until cleared with `None`
    pub fn fail_at(&self, stage: Option<SdkStage>) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = stage;
        }
    }

    /// Abort `controller` while `stage` runs, then let the stage complete
    pub fn abort_after(&self, stage: SdkStage, controller: AbortController) {
        self.hook(stage, controller, false);
    }

    /// Abort `controller` while `stage` runs and never complete the stage
    pub fn abort_during(&self, stage: SdkStage, controller: AbortController) {
        self.hook(stage, controller, true);
    }

    fn hook(&self, stage: SdkStage, controller: AbortController, stall: bool) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(StageHook {
                stage,
                controller,
                stall,
            });
        }
    }

    async fn run_stage(&self, stage: SdkStage) -> Result<()> {
        let mut stall = false;
        if let Ok(hooks) = self.hooks.lock() {
            for hook in hooks.iter().filter(|hook| hook.stage == stage) {
                hook.controller.abort();
                stall |= hook.stall;
            }
        }
        if stall {
            std::future::pending::<()>().await;
        }
        let failing = self.failing.lock().map(|f| *f).unwrap_or(None);
        if failing == Some(stage) {
            return Err(FhevmError::Relayer(format!("{stage:?} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayerSdk for FakeRelayerSdk {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.run_stage(SdkStage::Load).await?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        self.run_stage(SdkStage::Initialize).await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn network_config(&self) -> ProductionNetwork {
        self.network.clone()
    }

    async fn create_instance(
        &self,
        config: InstanceConfig,
        descriptor: NetworkDescriptor,
    ) -> Result<CryptoSession> {
        self.instances.fetch_add(1, Ordering::SeqCst);
        self.run_stage(SdkStage::Create).await?;
        Ok(CryptoSession::new(
            config,
            descriptor,
            self.relayer.clone(),
            Arc::new(MockCodec),
            None,
        ))
    }
}
