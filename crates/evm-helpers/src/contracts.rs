// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::providers::fillers::BlobGasFiller;
use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::{Address, Bytes, TxHash, B256, U256},
    providers::fillers::{
        ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    providers::{Identity, Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionReceipt,
    signers::local::PrivateKeySigner,
    sol,
};
use async_trait::async_trait;
use eyre::{bail, OptionExt, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

static NONCE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub async fn next_pending_nonce<P>(provider: &P, from: Address) -> eyre::Result<u64>
where
    P: Provider<Ethereum> + Send + Sync,
{
    provider
        .get_transaction_count(from)
        .pending()
        .await
        .map_err(Into::into)
}

sol! {
    #[derive(Debug)]
    struct Activity {
        uint256 id;
        address creator;
        string title;
        string description;
        string coverImageUrl;
        string[] dimensions;
        uint8 scale;
        uint256 endTime;
        bool allowMultiple;
        uint256 participantCount;
        bool active;
        uint256 createdAt;
    }

    #[derive(Debug)]
    #[sol(rpc)]
    contract FHERating {
        event ActivityCreated(uint256 indexed activityId, address indexed creator, string title, uint256 endTime);
        event RatingSubmitted(uint256 indexed activityId, address indexed rater, uint256 timestamp);
        event ActivityClosed(uint256 indexed activityId, uint256 timestamp);

        function createActivity(string title, string description, string coverImageUrl, string[] dimensions, uint8 scale, uint256 endTime, bool allowMultiple) external returns (uint256 activityId);
        function closeActivity(uint256 activityId) external;
        function submitRating(uint256 activityId, bytes32[] encryptedHandles, bytes inputProof) external;
        function getActivity(uint256 activityId) external view returns (Activity memory);
        function getActivityCount() external view returns (uint256);
        function getActivityRaters(uint256 activityId) external view returns (address[] memory);
        function getAllRatings(uint256 activityId) external view returns (address[] memory raters, bytes32[][] memory allScores, uint256[] memory timestamps);
        function getCreatorActivities(address creator) external view returns (uint256[] memory);
        function getParticipantActivities(address participant) external view returns (uint256[] memory);
        function getRatingTimestamp(uint256 activityId, address user) external view returns (uint256);
        function getUserRating(uint256 activityId, address user) external view returns (bytes32[] memory encryptedScores);
        function hasUserRated(uint256 activityId, address user) external view returns (bool);
    }
}

/// An activity as stored by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInfo {
    pub id: U256,
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
    pub dimensions: Vec<String>,
    /// Highest score a rater may give
    pub scale: u8,
    pub end_time: u64,
    pub allow_multiple: bool,
    pub participant_count: u64,
    pub active: bool,
    pub created_at: u64,
}

impl From<Activity> for ActivityInfo {
    fn from(value: Activity) -> Self {
        Self {
            id: value.id,
            creator: value.creator,
            title: value.title,
            description: value.description,
            cover_image_url: value.coverImageUrl,
            dimensions: value.dimensions,
            scale: value.scale,
            end_time: value.endTime.saturating_to(),
            allow_multiple: value.allowMultiple,
            participant_count: value.participantCount.saturating_to(),
            active: value.active,
            created_at: value.createdAt.saturating_to(),
        }
    }
}

/// Parameters of `createActivity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
    pub dimensions: Vec<String>,
    pub scale: u8,
    pub end_time: u64,
    pub allow_multiple: bool,
}

/// Every rating of an activity, in ledger order. `scores[i]` holds the
/// ciphertext handles of `raters[i]`, one per dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingsSnapshot {
    pub raters: Vec<Address>,
    pub scores: Vec<Vec<B256>>,
    pub timestamps: Vec<u64>,
}

impl RatingsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.raters.is_empty()
    }
}

/// Trait for read-only operations on the rating ledger
#[async_trait]
pub trait RatingLedgerRead: Send + Sync {
    /// Address ciphertext handles are bound to
    fn contract_address(&self) -> Address;

    async fn get_activity(&self, activity_id: U256) -> Result<ActivityInfo>;

    async fn get_activity_count(&self) -> Result<U256>;

    async fn get_activity_raters(&self, activity_id: U256) -> Result<Vec<Address>>;

    /// All raters with their encrypted scores and submission times
    async fn get_all_ratings(&self, activity_id: U256) -> Result<RatingsSnapshot>;

    async fn get_creator_activities(&self, creator: Address) -> Result<Vec<U256>>;

    async fn get_participant_activities(&self, participant: Address) -> Result<Vec<U256>>;

    async fn get_rating_timestamp(&self, activity_id: U256, user: Address) -> Result<u64>;

    async fn get_user_rating(&self, activity_id: U256, user: Address) -> Result<Vec<B256>>;

    async fn has_user_rated(&self, activity_id: U256, user: Address) -> Result<bool>;
}

/// Trait for write operations on the rating ledger
#[async_trait]
pub trait RatingLedgerWrite: RatingLedgerRead {
    /// Create an activity and return its id
    async fn create_activity(&self, activity: NewActivity) -> Result<U256>;

    /// Submit one encrypted score per dimension with their validity proof
    async fn submit_rating(
        &self,
        activity_id: U256,
        handles: Vec<B256>,
        input_proof: Bytes,
    ) -> Result<TxHash>;

    async fn close_activity(&self, activity_id: U256) -> Result<TxHash>;
}

/// Generic type to represent different provider types
pub trait ProviderType: Send {
    type Provider: Provider + Send + Sync + 'static;
}

/// Marker type for read-only provider
#[derive(Clone)]
pub struct ReadOnly;
impl ProviderType for ReadOnly {
    type Provider = RatingReadOnlyProvider;
}
/// Marker type for read-write provider
#[derive(Clone)]
pub struct ReadWrite;
impl ProviderType for ReadWrite {
    type Provider = RatingWriteProvider;
}

/// Generic rating ledger contract
#[derive(Clone)]
pub struct RatingContract<T: ProviderType> {
    pub provider: Arc<T::Provider>,
    pub contract_address: Address,
    /// Account transactions are sent from. Unset for read-only contracts.
    pub sender: Option<Address>,
    _marker: PhantomData<T>,
}

impl RatingContract<ReadWrite> {
    pub async fn new(
        http_rpc_url: &str,
        private_key: &str,
        contract_address: &str,
    ) -> Result<RatingContract<ReadWrite>> {
        RatingContractFactory::create_write(http_rpc_url, contract_address, private_key).await
    }

    pub fn get_provider(&self) -> Arc<RatingWriteProvider> {
        self.provider.clone()
    }

    pub fn address(&self) -> &Address {
        &self.contract_address
    }

    async fn send_locked<F, Fut>(&self, send: F) -> Result<TransactionReceipt>
    where
        F: FnOnce(u64) -> Fut + Send,
        Fut: std::future::Future<Output = Result<TransactionReceipt>> + Send,
    {
        let from = self.sender.ok_or_eyre("contract has no sender")?;
        let _guard = NONCE_LOCK.lock().await;
        let nonce = next_pending_nonce(&*self.provider, from).await?;
        let receipt = send(nonce).await?;
        if !receipt.status() {
            bail!("transaction {} reverted", receipt.transaction_hash);
        }
        Ok(receipt)
    }
}

impl RatingContract<ReadOnly> {
    pub async fn read_only(
        http_rpc_url: &str,
        contract_address: &str,
    ) -> Result<RatingContract<ReadOnly>> {
        RatingContractFactory::create_read(http_rpc_url, contract_address).await
    }

    pub fn get_provider(&self) -> Arc<RatingReadOnlyProvider> {
        self.provider.clone()
    }

    pub fn address(&self) -> &Address {
        &self.contract_address
    }
}

/// Type alias for read-only provider
pub type RatingReadOnlyProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider,
>;

/// Type alias for read-write provider
pub type RatingWriteProvider = FillProvider<
    JoinFill<
        JoinFill<
            JoinFill<
                Identity,
                JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
            >,
            WalletFiller<EthereumWallet>,
        >,
        NonceFiller,
    >,
    RootProvider<Ethereum>,
    Ethereum,
>;

/// Type aliases for the two contract variants
pub type RatingReadContract = RatingContract<ReadOnly>;
pub type RatingWriteContract = RatingContract<ReadWrite>;

// Factory for creating contract instances
pub struct RatingContractFactory;

impl RatingContractFactory {
    /// Create a write-capable contract
    pub async fn create_write(
        http_rpc_url: &str,
        contract_address: &str,
        private_key: &str,
    ) -> Result<RatingContract<ReadWrite>> {
        let contract_address = contract_address.parse()?;

        let signer: PrivateKeySigner = private_key.trim().parse()?;
        let sender = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .with_cached_nonce_management()
            .connect(http_rpc_url)
            .await?;

        Ok(RatingContract::<ReadWrite> {
            provider: Arc::new(provider),
            contract_address,
            sender: Some(sender),
            _marker: PhantomData,
        })
    }

    /// Create a read-only contract
    pub async fn create_read(
        http_rpc_url: &str,
        contract_address: &str,
    ) -> Result<RatingContract<ReadOnly>> {
        let contract_address = contract_address.parse()?;

        let provider = ProviderBuilder::new().connect(http_rpc_url).await?;

        Ok(RatingContract::<ReadOnly> {
            provider: Arc::new(provider),
            contract_address,
            sender: None,
            _marker: PhantomData,
        })
    }
}

// Implement RatingLedgerRead for any RatingContract regardless of provider type
#[async_trait]
impl<T: Send + Sync> RatingLedgerRead for RatingContract<T>
where
    T: ProviderType,
{
    fn contract_address(&self) -> Address {
        self.contract_address
    }

    async fn get_activity(&self, activity_id: U256) -> Result<ActivityInfo> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let activity = contract.getActivity(activity_id).call().await?;
        Ok(activity.into())
    }

    async fn get_activity_count(&self) -> Result<U256> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let count = contract.getActivityCount().call().await?;
        Ok(count)
    }

    async fn get_activity_raters(&self, activity_id: U256) -> Result<Vec<Address>> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let raters = contract.getActivityRaters(activity_id).call().await?;
        Ok(raters)
    }

    async fn get_all_ratings(&self, activity_id: U256) -> Result<RatingsSnapshot> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let ratings = contract.getAllRatings(activity_id).call().await?;
        Ok(RatingsSnapshot {
            raters: ratings.raters,
            scores: ratings.allScores,
            timestamps: ratings
                .timestamps
                .into_iter()
                .map(|t| t.saturating_to())
                .collect(),
        })
    }

    async fn get_creator_activities(&self, creator: Address) -> Result<Vec<U256>> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let ids = contract.getCreatorActivities(creator).call().await?;
        Ok(ids)
    }

    async fn get_participant_activities(&self, participant: Address) -> Result<Vec<U256>> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let ids = contract.getParticipantActivities(participant).call().await?;
        Ok(ids)
    }

    async fn get_rating_timestamp(&self, activity_id: U256, user: Address) -> Result<u64> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let timestamp = contract.getRatingTimestamp(activity_id, user).call().await?;
        Ok(timestamp.saturating_to())
    }

    async fn get_user_rating(&self, activity_id: U256, user: Address) -> Result<Vec<B256>> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let handles = contract.getUserRating(activity_id, user).call().await?;
        Ok(handles)
    }

    async fn has_user_rated(&self, activity_id: U256, user: Address) -> Result<bool> {
        let contract = FHERating::new(self.contract_address, &self.provider);
        let rated = contract.hasUserRated(activity_id, user).call().await?;
        Ok(rated)
    }
}

// Implement RatingLedgerWrite only for contracts with ReadWrite marker
#[async_trait]
impl RatingLedgerWrite for RatingContract<ReadWrite> {
    async fn create_activity(&self, activity: NewActivity) -> Result<U256> {
        let receipt = self
            .send_locked(|nonce| async move {
                let contract = FHERating::new(self.contract_address, &self.provider);
                let builder = contract
                    .createActivity(
                        activity.title,
                        activity.description,
                        activity.cover_image_url,
                        activity.dimensions,
                        activity.scale,
                        U256::from(activity.end_time),
                        activity.allow_multiple,
                    )
                    .nonce(nonce);
                Ok::<_, eyre::Report>(builder.send().await?.get_receipt().await?)
            })
            .await?;

        let activity_id = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<FHERating::ActivityCreated>().ok())
            .map(|log| log.inner.data.activityId)
            .ok_or_eyre("createActivity emitted no ActivityCreated event")?;
        info!(
            "Activity {} created in tx {}",
            activity_id, receipt.transaction_hash
        );
        Ok(activity_id)
    }

    async fn submit_rating(
        &self,
        activity_id: U256,
        handles: Vec<B256>,
        input_proof: Bytes,
    ) -> Result<TxHash> {
        let receipt = self
            .send_locked(|nonce| async move {
                let contract = FHERating::new(self.contract_address, &self.provider);
                let builder = contract
                    .submitRating(activity_id, handles, input_proof)
                    .nonce(nonce);
                Ok::<_, eyre::Report>(builder.send().await?.get_receipt().await?)
            })
            .await?;
        info!(
            "Rating for activity {} submitted in tx {}",
            activity_id, receipt.transaction_hash
        );
        Ok(receipt.transaction_hash)
    }

    async fn close_activity(&self, activity_id: U256) -> Result<TxHash> {
        let receipt = self
            .send_locked(|nonce| async move {
                let contract = FHERating::new(self.contract_address, &self.provider);
                let builder = contract.closeActivity(activity_id).nonce(nonce);
                Ok::<_, eyre::Report>(builder.send().await?.get_receipt().await?)
            })
            .await?;
        info!(
            "Activity {} closed in tx {}",
            activity_id, receipt.transaction_hash
        );
        Ok(receipt.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_conversion() {
        let activity = Activity {
            id: U256::from(3),
            creator: Address::repeat_byte(1),
            title: "Conference talks".to_string(),
            description: "Rate the talks".to_string(),
            coverImageUrl: String::new(),
            dimensions: vec!["Content".to_string(), "Delivery".to_string()],
            scale: 10,
            endTime: U256::from(1_700_086_400u64),
            allowMultiple: false,
            participantCount: U256::from(2),
            active: true,
            createdAt: U256::from(1_700_000_000u64),
        };
        let info = ActivityInfo::from(activity);
        assert_eq!(info.id, U256::from(3));
        assert_eq!(info.dimensions.len(), 2);
        assert_eq!(info.end_time, 1_700_086_400);
        assert_eq!(info.participant_count, 2);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["allowMultiple"], false);
        assert_eq!(json["coverImageUrl"], "");
    }

    #[test]
    fn test_out_of_range_times_saturate() {
        let activity = Activity {
            id: U256::ZERO,
            creator: Address::ZERO,
            title: String::new(),
            description: String::new(),
            coverImageUrl: String::new(),
            dimensions: vec![],
            scale: 5,
            endTime: U256::MAX,
            allowMultiple: true,
            participantCount: U256::ZERO,
            active: false,
            createdAt: U256::ZERO,
        };
        assert_eq!(ActivityInfo::from(activity).end_time, u64::MAX);
    }
}
