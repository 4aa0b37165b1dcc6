// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fherate_fhevm::{
    AbortController, AbortSignal, CryptoSession, ProviderOrUrl, Result, SessionFactory,
    StatusSink, Wallet, WalletEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps the session of the connected wallet.
///
/// At most one `create_session` runs at a time. Sessions are cached per chain
/// and invalidated by the wallet's events: a chain switch rebuilds, an account
/// switch drops the session, a disconnect aborts any creation in flight and
/// tears the factory down.
pub struct SessionHolder {
    factory: SessionFactory,
    wallet: Arc<dyn Wallet>,
    sessions: Mutex<HashMap<u64, Arc<CryptoSession>>>,
    controller: Mutex<AbortController>,
    creating: tokio::sync::Mutex<()>,
    /// Bumped on every invalidation so a creation that started before it is
    /// never cached
    epoch: AtomicU64,
}

impl SessionHolder {
    pub fn new(factory: SessionFactory, wallet: Arc<dyn Wallet>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            wallet,
            sessions: Mutex::new(HashMap::new()),
            controller: Mutex::new(AbortController::new()),
            creating: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    pub fn cached(&self, chain_id: u64) -> Option<Arc<CryptoSession>> {
        lock(&self.sessions).get(&chain_id).cloned()
    }

    /// The session for the wallet's current chain, created on first use.
    pub async fn session(&self) -> Result<Arc<CryptoSession>> {
        self.session_with_status(None).await
    }

    pub async fn session_with_status(
        &self,
        on_status: Option<&StatusSink>,
    ) -> Result<Arc<CryptoSession>> {
        let signal = lock(&self.controller).signal();
        self.session_under(&signal, on_status).await
    }

    /// Create or reuse the session while `signal` holds. A wallet event that
    /// aborts the signal also releases a caller still waiting for its turn.
    async fn session_under(
        &self,
        signal: &AbortSignal,
        on_status: Option<&StatusSink>,
    ) -> Result<Arc<CryptoSession>> {
        let _creating = signal
            .guard(async { Ok(self.creating.lock().await) })
            .await?;

        let chain_id = self.wallet.chain_id().await?;
        if let Some(session) = self.cached(chain_id) {
            return Ok(session);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let target = ProviderOrUrl::Wallet(self.wallet.clone());
        let session = self
            .factory
            .create_session(&target, signal, on_status)
            .await?;

        if self.epoch.load(Ordering::SeqCst) == epoch {
            // keyed by the wallet's chain, which is what lookups use
            lock(&self.sessions).insert(chain_id, session.clone());
        } else {
            debug!("Wallet changed while the session was created, not caching it");
        }
        Ok(session)
    }

    /// Apply one wallet event. Invalidation happens before this returns. A
    /// chain switch also starts the rebuild on its own task, returned so
    /// callers can wait on it; a later event aborts it.
    pub fn handle_event(self: &Arc<Self>, event: WalletEvent) -> Option<JoinHandle<()>> {
        match event {
            WalletEvent::ChainChanged(chain_id) => {
                info!("Wallet switched to chain {}, rebuilding the session", chain_id);
                let signal = self.invalidate(true);
                let holder = self.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = holder.session_under(&signal, None).await {
                        if e.is_aborted() {
                            debug!("Session rebuild was cancelled");
                        } else {
                            warn!("Could not rebuild the session for chain {}: {}", chain_id, e);
                        }
                    }
                }))
            }
            WalletEvent::AccountsChanged(accounts) => {
                info!("Wallet accounts changed to {:?}, dropping the session", accounts);
                self.invalidate(false);
                None
            }
            WalletEvent::Disconnected => {
                info!("Wallet disconnected, tearing the session down");
                self.invalidate(true);
                self.factory.teardown();
                None
            }
        }
    }

    /// Follow the wallet's events until the wallet goes away.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let holder = self.clone();
        let mut events = self.wallet.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        // rebuilds run detached so the next event is never held up
                        holder.handle_event(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // the latest state is what matters
                        warn!("Missed {} wallet events, dropping the session", skipped);
                        holder.invalidate(true);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Drop cached sessions, aborting creation in flight when `abort` is set.
    /// Returns the signal later creations run under.
    fn invalidate(&self, abort: bool) -> AbortSignal {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let signal = {
            let mut controller = lock(&self.controller);
            if abort {
                controller.abort();
                *controller = AbortController::new();
            }
            controller.signal()
        };
        lock(&self.sessions).clear();
        signal
    }
}
