// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::sync::Arc;

use alloy::primitives::{TxHash, U256};
use eyre::{bail, Result};
use fherate_evm_helpers::{ActivityInfo, RatingLedgerWrite};
use fherate_fhevm::{
    collect_handles, reconstruct_ratings, unix_now, AbortSignal, BatchDecryptor, DecryptedRating,
    DecryptionSignature, KeyValueStore, DEFAULT_DURATION_DAYS,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::holder::SessionHolder;
use crate::stats::ActivityStatistics;

/// Where `decrypt_ratings` is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecryptionProgress {
    FetchingHandles,
    /// Waiting on the wallet to sign the decryption authorization
    AwaitingAuthorization,
    Decrypting,
    Done,
}

pub type ProgressSink = mpsc::UnboundedSender<DecryptionProgress>;

fn report(progress: Option<&ProgressSink>, step: DecryptionProgress) {
    debug!("Decryption progress: {:?}", step);
    if let Some(progress) = progress {
        // the caller stopped listening
        let _ = progress.send(step);
    }
}

/// Rating flows over one ledger deployment, signed by the holder's wallet.
pub struct RatingClient<L> {
    ledger: L,
    sessions: Arc<SessionHolder>,
    signatures: Arc<dyn KeyValueStore>,
    duration_days: u64,
}

impl<L: RatingLedgerWrite> RatingClient<L> {
    pub fn new(ledger: L, sessions: Arc<SessionHolder>, signatures: Arc<dyn KeyValueStore>) -> Self {
        Self {
            ledger,
            sessions,
            signatures,
            duration_days: DEFAULT_DURATION_DAYS,
        }
    }

    /// Validity window of authorizations this client asks for
    pub fn with_duration_days(mut self, duration_days: u64) -> Self {
        self.duration_days = duration_days;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn sessions(&self) -> &Arc<SessionHolder> {
        &self.sessions
    }

    /// Encrypt one score per dimension and submit them.
    pub async fn submit_rating(&self, activity_id: U256, scores: &[u32]) -> Result<TxHash> {
        let activity = self.ledger.get_activity(activity_id).await?;
        check_scores(&activity, scores)?;

        let session = self.sessions.session().await?;
        let user = self.sessions.wallet().address().await?;
        let mut input = session.create_encrypted_input(self.ledger.contract_address(), user);
        for score in scores {
            input.add32(*score)?;
        }
        let encrypted = input.encrypt().await?;

        let tx = self
            .ledger
            .submit_rating(activity_id, encrypted.handles, encrypted.input_proof)
            .await?;
        info!("Rating for activity {} submitted in {}", activity_id, tx);
        Ok(tx)
    }

    /// Decrypt every rating of an activity, in ledger order.
    ///
    /// An activity nobody rated yields an empty list without prompting the
    /// wallet. Aborting `signal` cancels session creation, the wallet prompt
    /// and the relayer round trip alike.
    pub async fn decrypt_ratings(
        &self,
        activity_id: U256,
        signal: &AbortSignal,
        progress: Option<&ProgressSink>,
    ) -> Result<Vec<DecryptedRating>> {
        report(progress, DecryptionProgress::FetchingHandles);
        let snapshot = self.ledger.get_all_ratings(activity_id).await?;
        if snapshot.is_empty() {
            report(progress, DecryptionProgress::Done);
            return Ok(vec![]);
        }

        let session = signal.guard(self.sessions.session()).await?;
        let contract = self.ledger.contract_address();

        report(progress, DecryptionProgress::AwaitingAuthorization);
        let now = unix_now();
        let signature = DecryptionSignature::load_or_sign_at(
            &session,
            &[contract],
            self.sessions.wallet().as_ref(),
            self.signatures.as_ref(),
            signal,
            self.duration_days,
            now,
        )
        .await?;

        report(progress, DecryptionProgress::Decrypting);
        let handles = collect_handles(&snapshot.scores, contract);
        let decrypted = BatchDecryptor::new(session)
            .decrypt_all_at(&handles, &signature, signal, now)
            .await?;
        let ratings = reconstruct_ratings(
            &snapshot.raters,
            &snapshot.scores,
            &snapshot.timestamps,
            &decrypted,
        )?;

        report(progress, DecryptionProgress::Done);
        Ok(ratings)
    }

    /// Decrypt and aggregate an activity's ratings
    pub async fn statistics(
        &self,
        activity_id: U256,
        signal: &AbortSignal,
        progress: Option<&ProgressSink>,
    ) -> Result<(ActivityInfo, ActivityStatistics)> {
        let activity = self.ledger.get_activity(activity_id).await?;
        let ratings = self.decrypt_ratings(activity_id, signal, progress).await?;
        let stats = ActivityStatistics::compute(&activity.dimensions, &ratings);
        Ok((activity, stats))
    }
}

/// One score per dimension, each within `1..=scale`
pub fn check_scores(activity: &ActivityInfo, scores: &[u32]) -> Result<()> {
    if scores.len() != activity.dimensions.len() {
        bail!(
            "Activity {} has {} dimensions but {} scores were given",
            activity.id,
            activity.dimensions.len(),
            scores.len()
        );
    }
    let scale = u32::from(activity.scale);
    if let Some(score) = scores.iter().find(|s| **s < 1 || **s > scale) {
        bail!("Score {} is outside the 1-{} scale", score, scale);
    }
    Ok(())
}
