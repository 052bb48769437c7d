//! Persistence contracts
//!
//! Services only see these traits. Entities are borrowed for the length of
//! one read-modify-write; nothing is cached between calls.
//!
//! Lookups that find nothing fail with [`GameError::NotFound`], keyed
//! updates that match zero rows fail with [`GameError::NothingUpdated`].
//!
//! [`GameError::NotFound`]: crate::common::errors::GameError::NotFound
//! [`GameError::NothingUpdated`]: crate::common::errors::GameError::NothingUpdated

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;

use crate::common::errors::Result;
use crate::common::types::{
    AdditionalInfo, AdditionalInfoId, AdditionalInfoType, Balance, BalanceId, BalanceTransaction,
    Company, CompanyId, CompanyShare, Game, Round, Settings, Team, TeamId, TransactionId,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// The game singleton
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn get(&self) -> Result<Game>;
    async fn update(&self, game: &Game) -> Result<()>;
}

/// The settings singleton
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self) -> Result<Settings>;
    async fn update(&self, settings: &Settings) -> Result<()>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn create(&self, team: &Team) -> Result<TeamId>;
    async fn update(&self, team: &Team) -> Result<()>;
    async fn get_by_id(&self, id: TeamId) -> Result<Team>;
    async fn get_by_credentials(&self, credentials: &str, game_id: i64) -> Result<Team>;
    async fn get_all_by_game_id(&self, game_id: i64) -> Result<Vec<Team>>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn create(&self, amount: i64) -> Result<BalanceId>;
    async fn get_by_id(&self, id: BalanceId) -> Result<Balance>;
    async fn update(&self, balance: &Balance) -> Result<()>;
}

/// Balance transactions. `get`, `update` and `delete` address the shares
/// slot of a round: the row with neither additional info nor random event.
#[async_trait]
pub trait BalanceTransactionStore: Send + Sync {
    async fn get(&self, balance_id: BalanceId, round: Round) -> Result<BalanceTransaction>;
    async fn create(&self, transaction: &BalanceTransaction) -> Result<TransactionId>;
    async fn update(&self, transaction: &BalanceTransaction) -> Result<()>;
    async fn delete(&self, balance_id: BalanceId, round: Round) -> Result<()>;
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn get_all_not_archived(&self) -> Result<Vec<Company>>;
}

#[async_trait]
pub trait CompanySharePriceStore: Send + Sync {
    async fn get_prices_by_company_ids_and_round(
        &self,
        company_ids: &[CompanyId],
        round: Round,
    ) -> Result<Vec<CompanyShare>>;

    async fn get_all_by_round(&self, round: Round) -> Result<Vec<CompanyShare>>;
}

#[async_trait]
pub trait AdditionalInfoStore: Send + Sync {
    async fn get_by_id(&self, id: AdditionalInfoId) -> Result<AdditionalInfo>;
    async fn get_by_ids(&self, ids: &[AdditionalInfoId]) -> Result<Vec<AdditionalInfo>>;
    /// Infos of a type whose company (if any) is not archived
    async fn get_all_actual_by_type(&self, info_type: AdditionalInfoType) -> Result<Vec<AdditionalInfo>>;
    async fn update(&self, info: &AdditionalInfo) -> Result<()>;
}

/// Write to the transaction table performed as part of a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionWrite {
    Create(BalanceTransaction),
    /// Overwrite the shares slot of `(balance_id, round)`
    Update(BalanceTransaction),
    /// Remove the shares slot of a round
    Delete { balance_id: BalanceId, round: Round },
}

/// Multi-entity write of one settlement, applied all-or-nothing.
///
/// The balance is written only if it still holds `expected_amount`,
/// otherwise the whole commit fails with `ConcurrentModification`.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementCommit {
    pub balance_id: BalanceId,
    pub expected_amount: i64,
    pub new_amount: i64,
    pub transaction: TransactionWrite,
    pub team: Team,
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn commit(&self, commit: &SettlementCommit) -> Result<()>;
}

/// Every store the services need, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub games: Arc<dyn GameStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub teams: Arc<dyn TeamStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub transactions: Arc<dyn BalanceTransactionStore>,
    pub companies: Arc<dyn CompanyStore>,
    pub prices: Arc<dyn CompanySharePriceStore>,
    pub additional_infos: Arc<dyn AdditionalInfoStore>,
    pub settlement: Arc<dyn SettlementStore>,
}

impl Stores {
    /// Use one backend for every store
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: GameStore
            + SettingsStore
            + TeamStore
            + BalanceStore
            + BalanceTransactionStore
            + CompanyStore
            + CompanySharePriceStore
            + AdditionalInfoStore
            + SettlementStore
            + 'static,
    {
        Self {
            games: backend.clone(),
            settings: backend.clone(),
            teams: backend.clone(),
            balances: backend.clone(),
            transactions: backend.clone(),
            companies: backend.clone(),
            prices: backend.clone(),
            additional_infos: backend.clone(),
            settlement: backend,
        }
    }
}
