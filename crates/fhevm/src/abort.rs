// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::future::Future;

use tokio::sync::watch;

use crate::error::{FhevmError, Result};

/// Owner side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct AbortController {
    sender: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Abort every operation holding a signal from this controller. Idempotent.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation signal threaded through every long running stage.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        AbortController::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Checkpoint: fail with `Aborted` if the signal has fired.
    pub fn throw_if_aborted(&self) -> Result<()> {
        if self.is_aborted() {
            return Err(FhevmError::Aborted);
        }
        Ok(())
    }

    /// Resolves once the signal fires. Pends forever if the controller is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Race `fut` against the signal. On abort the future is dropped, which
    /// releases whatever connection it was holding.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.throw_if_aborted()?;
        tokio::select! {
            biased;
            _ = self.aborted() => Err(FhevmError::Aborted),
            result = fut => result,
        }
    }
}
