// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Progress of a session through its initialization sequence.
///
/// Variants are declared in transition order so `Ord` reflects progress. The
/// mock path skips straight to `Creating`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    SdkLoading,
    SdkLoaded,
    SdkInitializing,
    SdkInitialized,
    Creating,
    Ready,
}

/// Receives the transitions of a single `create_session` call
pub type StatusSink = mpsc::UnboundedSender<SessionState>;

/// Process-wide view of the current session's progress.
///
/// `None` means no session: either nothing was created yet or the last one was
/// torn down. Within one session, state only moves forward.
#[derive(Debug)]
pub struct SessionStateCell {
    sender: watch::Sender<Option<SessionState>>,
}

impl SessionStateCell {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn current(&self) -> Option<SessionState> {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionState>> {
        self.sender.subscribe()
    }

    /// Move forward to `next`. Returns false and leaves the state untouched if
    /// `next` would be a backward transition.
    pub fn advance(&self, next: SessionState) -> bool {
        self.sender.send_if_modified(|current| match current {
            Some(state) if *state >= next => {
                debug!("Ignoring backward session transition {} -> {}", state, next);
                false
            }
            _ => {
                *current = Some(next);
                true
            }
        })
    }

    /// Start a new sequence. Used when a fresh `create_session` begins after a
    /// teardown or a failed attempt.
    pub fn restart(&self) {
        self.sender.send_replace(None);
    }

    pub fn teardown(&self) {
        if self.sender.send_replace(None).is_some() {
            info!("FHEVM session torn down");
        }
    }
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}
