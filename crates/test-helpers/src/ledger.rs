// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use eyre::{bail, eyre, OptionExt, Result};
use fherate_evm_helpers::{
    ActivityInfo, NewActivity, RatingLedgerRead, RatingLedgerWrite, RatingsSnapshot,
};

/// First block timestamp of the in-memory chain
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

struct Rating {
    rater: Address,
    handles: Vec<B256>,
    timestamp: u64,
}

#[derive(Default)]
struct LedgerState {
    activities: Vec<ActivityInfo>,
    ratings: HashMap<U256, Vec<Rating>>,
    clock: u64,
    transactions: u64,
}

impl LedgerState {
    fn tick(&mut self) -> (u64, TxHash) {
        self.clock += 1;
        self.transactions += 1;
        (
            GENESIS_TIMESTAMP + self.clock,
            keccak256(self.transactions.to_be_bytes()),
        )
    }

    fn activity_mut(&mut self, activity_id: U256) -> Result<&mut ActivityInfo> {
        self.activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_eyre("ActivityNotFound")
    }
}

/// A rating ledger kept in memory with the contract's rules. Clones share
/// state; `connect` switches the sending account.
#[derive(Clone)]
pub struct InMemoryLedger {
    address: Address,
    sender: Address,
    state: Arc<Mutex<LedgerState>>,
    rating_reads: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new(address: Address, sender: Address) -> Self {
        Self {
            address,
            sender,
            state: Arc::new(Mutex::new(LedgerState::default())),
            rating_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The same ledger, used by another account
    pub fn connect(&self, sender: Address) -> Self {
        Self {
            sender,
            ..self.clone()
        }
    }

    /// How many times `get_all_ratings` was called
    pub fn rating_reads(&self) -> usize {
        self.rating_reads.load(Ordering::SeqCst)
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|_| eyre!("ledger state poisoned"))
    }
}

#[async_trait]
impl RatingLedgerRead for InMemoryLedger {
    fn contract_address(&self) -> Address {
        self.address
    }

    async fn get_activity(&self, activity_id: U256) -> Result<ActivityInfo> {
        self.state()?
            .activities
            .iter()
            .find(|a| a.id == activity_id)
            .cloned()
            .ok_or_eyre("ActivityNotFound")
    }

    async fn get_activity_count(&self) -> Result<U256> {
        Ok(U256::from(self.state()?.activities.len()))
    }

    async fn get_activity_raters(&self, activity_id: U256) -> Result<Vec<Address>> {
        Ok(self.get_all_ratings(activity_id).await?.raters)
    }

    async fn get_all_ratings(&self, activity_id: U256) -> Result<RatingsSnapshot> {
        self.rating_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state()?;
        let mut snapshot = RatingsSnapshot::default();
        for rating in state.ratings.get(&activity_id).into_iter().flatten() {
            snapshot.raters.push(rating.rater);
            snapshot.scores.push(rating.handles.clone());
            snapshot.timestamps.push(rating.timestamp);
        }
        Ok(snapshot)
    }

    async fn get_creator_activities(&self, creator: Address) -> Result<Vec<U256>> {
        Ok(self
            .state()?
            .activities
            .iter()
            .filter(|a| a.creator == creator)
            .map(|a| a.id)
            .collect())
    }

    async fn get_participant_activities(&self, participant: Address) -> Result<Vec<U256>> {
        let state = self.state()?;
        let mut ids: Vec<U256> = state
            .ratings
            .iter()
            .filter(|(_, ratings)| ratings.iter().any(|r| r.rater == participant))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_rating_timestamp(&self, activity_id: U256, user: Address) -> Result<u64> {
        Ok(self
            .state()?
            .ratings
            .get(&activity_id)
            .and_then(|ratings| ratings.iter().rev().find(|r| r.rater == user))
            .map(|r| r.timestamp)
            .unwrap_or_default())
    }

    async fn get_user_rating(&self, activity_id: U256, user: Address) -> Result<Vec<B256>> {
        Ok(self
            .state()?
            .ratings
            .get(&activity_id)
            .and_then(|ratings| ratings.iter().rev().find(|r| r.rater == user))
            .map(|r| r.handles.clone())
            .unwrap_or_default())
    }

    async fn has_user_rated(&self, activity_id: U256, user: Address) -> Result<bool> {
        Ok(self
            .state()?
            .ratings
            .get(&activity_id)
            .is_some_and(|ratings| ratings.iter().any(|r| r.rater == user)))
    }
}

#[async_trait]
impl RatingLedgerWrite for InMemoryLedger {
    async fn create_activity(&self, activity: NewActivity) -> Result<U256> {
        if activity.title.is_empty() {
            bail!("EmptyTitle");
        }
        if activity.dimensions.is_empty() {
            bail!("EmptyDimensions");
        }
        if activity.scale == 0 {
            bail!("InvalidScale");
        }
        let mut state = self.state()?;
        let (now, _) = state.tick();
        if activity.end_time <= now {
            bail!("InvalidEndTime");
        }
        let id = U256::from(state.activities.len());
        state.activities.push(ActivityInfo {
            id,
            creator: self.sender,
            title: activity.title,
            description: activity.description,
            cover_image_url: activity.cover_image_url,
            dimensions: activity.dimensions,
            scale: activity.scale,
            end_time: activity.end_time,
            allow_multiple: activity.allow_multiple,
            participant_count: 0,
            active: true,
            created_at: now,
        });
        Ok(id)
    }

    async fn submit_rating(
        &self,
        activity_id: U256,
        handles: Vec<B256>,
        input_proof: Bytes,
    ) -> Result<TxHash> {
        // the proof must commit to exactly these handles
        let committed = input_proof
            .get(2..2 + handles.len() * 32)
            .filter(|_| input_proof.first() == Some(&(handles.len() as u8)))
            .ok_or_eyre("InvalidInputProof")?;
        if committed
            .chunks_exact(32)
            .zip(&handles)
            .any(|(raw, handle)| raw != handle.as_slice())
        {
            bail!("InvalidInputProof");
        }

        let mut state = self.state()?;
        let (now, tx) = state.tick();
        let activity = state.activity_mut(activity_id)?;
        if !activity.active || activity.end_time <= now {
            bail!("ActivityEnded");
        }
        if handles.len() != activity.dimensions.len() {
            bail!("MismatchedScoreCount");
        }
        let allow_multiple = activity.allow_multiple;

        let sender = self.sender;
        let ratings = state.ratings.entry(activity_id).or_default();
        let first_rating = !ratings.iter().any(|r| r.rater == sender);
        if !first_rating && !allow_multiple {
            bail!("AlreadyRated");
        }
        ratings.push(Rating {
            rater: sender,
            handles,
            timestamp: now,
        });
        if first_rating {
            state.activity_mut(activity_id)?.participant_count += 1;
        }
        Ok(tx)
    }

    async fn close_activity(&self, activity_id: U256) -> Result<TxHash> {
        let mut state = self.state()?;
        let (_, tx) = state.tick();
        let sender = self.sender;
        let activity = state.activity_mut(activity_id)?;
        if activity.creator != sender {
            bail!("NotCreator");
        }
        activity.active = false;
        Ok(tx)
    }
}
