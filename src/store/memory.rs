//! In-memory store
//!
//! Backs tests and the database-less binary mode. All tables live behind
//! one mutex, which makes [`SettlementStore::commit`] trivially atomic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{
    AdditionalInfoStore, BalanceStore, BalanceTransactionStore, CompanySharePriceStore,
    CompanyStore, GameStore, SettingsStore, SettlementCommit, SettlementStore, TeamStore,
    TransactionWrite,
};
use crate::common::errors::{GameError, Result};
use crate::common::types::{
    AdditionalInfo, AdditionalInfoId, AdditionalInfoType, Balance, BalanceId, BalanceTransaction,
    Company, CompanyId, CompanyShare, Game, Round, Settings, Team, TeamId, TransactionId,
};

#[derive(Default)]
struct Tables {
    game: Game,
    settings: Settings,
    teams: BTreeMap<TeamId, Team>,
    balances: BTreeMap<BalanceId, Balance>,
    transactions: BTreeMap<TransactionId, BalanceTransaction>,
    companies: BTreeMap<CompanyId, Company>,
    prices: Vec<CompanyShare>,
    additional_infos: BTreeMap<AdditionalInfoId, AdditionalInfo>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn shares_slot(&self, balance_id: BalanceId, round: Round) -> Option<TransactionId> {
        self.transactions
            .values()
            .find(|tr| tr.balance_id == balance_id && tr.round == round && tr.is_shares_transaction())
            .map(|tr| tr.id)
    }

    fn is_company_active(&self, company_id: Option<CompanyId>) -> bool {
        company_id
            .and_then(|id| self.companies.get(&id))
            .map_or(true, |company| !company.archived)
    }
}

/// Process-local implementation of every store trait
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given settings instead of the defaults
    pub fn with_settings(settings: Settings) -> Self {
        let store = Self::default();
        store.tables.lock().settings = settings;
        store
    }

    pub fn insert_company(&self, name: impl Into<String>) -> CompanyId {
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.companies.insert(
            id,
            Company {
                id,
                name: name.into(),
                archived: false,
            },
        );
        id
    }

    pub fn archive_company(&self, company_id: CompanyId) {
        if let Some(company) = self.tables.lock().companies.get_mut(&company_id) {
            company.archived = true;
        }
    }

    /// Set the price of a company in a round, replacing an earlier one
    pub fn set_price(&self, company_id: CompanyId, round: Round, price: i64) {
        let mut tables = self.tables.lock();
        if let Some(share) = tables
            .prices
            .iter_mut()
            .find(|s| s.company_id == company_id && s.round == round)
        {
            share.price = price;
            return;
        }
        let id = tables.next_id();
        tables.prices.push(CompanyShare {
            id,
            company_id,
            round,
            price,
        });
    }

    /// Insert an additional info; its `id` field is ignored and assigned here
    pub fn insert_additional_info(&self, mut info: AdditionalInfo) -> AdditionalInfoId {
        let mut tables = self.tables.lock();
        info.id = tables.next_id();
        let id = info.id;
        tables.additional_infos.insert(id, info);
        id
    }

    /// All transactions recorded against a balance, in creation order
    pub fn transactions_for(&self, balance_id: BalanceId) -> Vec<BalanceTransaction> {
        self.tables
            .lock()
            .transactions
            .values()
            .filter(|tr| tr.balance_id == balance_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GameStore for InMemoryStore {
    async fn get(&self) -> Result<Game> {
        Ok(self.tables.lock().game.clone())
    }

    async fn update(&self, game: &Game) -> Result<()> {
        self.tables.lock().game = game.clone();
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn get(&self) -> Result<Settings> {
        Ok(self.tables.lock().settings.clone())
    }

    async fn update(&self, settings: &Settings) -> Result<()> {
        self.tables.lock().settings = settings.clone();
        Ok(())
    }
}

#[async_trait]
impl TeamStore for InMemoryStore {
    async fn create(&self, team: &Team) -> Result<TeamId> {
        let mut tables = self.tables.lock();
        let duplicate = tables
            .teams
            .values()
            .any(|t| t.game_id == team.game_id && t.credentials == team.credentials);
        if duplicate {
            return Err(GameError::DuplicateCredentials);
        }
        let id = tables.next_id();
        let mut team = team.clone();
        team.id = id;
        tables.teams.insert(id, team);
        Ok(id)
    }

    async fn update(&self, team: &Team) -> Result<()> {
        let mut tables = self.tables.lock();
        let stored = tables
            .teams
            .get_mut(&team.id)
            .ok_or_else(|| GameError::NothingUpdated(format!("team {}", team.id)))?;
        *stored = team.clone();
        stored.updated_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn get_by_id(&self, id: TeamId) -> Result<Team> {
        self.tables
            .lock()
            .teams
            .get(&id)
            .cloned()
            .ok_or_else(|| GameError::NotFound(format!("team {id}")))
    }

    async fn get_by_credentials(&self, credentials: &str, game_id: i64) -> Result<Team> {
        self.tables
            .lock()
            .teams
            .values()
            .find(|t| t.game_id == game_id && t.credentials == credentials)
            .cloned()
            .ok_or_else(|| GameError::NotFound("team with credentials".into()))
    }

    async fn get_all_by_game_id(&self, game_id: i64) -> Result<Vec<Team>> {
        Ok(self
            .tables
            .lock()
            .teams
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BalanceStore for InMemoryStore {
    async fn create(&self, amount: i64) -> Result<BalanceId> {
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.balances.insert(id, Balance { id, amount });
        Ok(id)
    }

    async fn get_by_id(&self, id: BalanceId) -> Result<Balance> {
        self.tables
            .lock()
            .balances
            .get(&id)
            .copied()
            .ok_or_else(|| GameError::NotFound(format!("balance {id}")))
    }

    async fn update(&self, balance: &Balance) -> Result<()> {
        let mut tables = self.tables.lock();
        let stored = tables
            .balances
            .get_mut(&balance.id)
            .ok_or_else(|| GameError::NothingUpdated(format!("balance {}", balance.id)))?;
        *stored = *balance;
        Ok(())
    }
}

#[async_trait]
impl BalanceTransactionStore for InMemoryStore {
    async fn get(&self, balance_id: BalanceId, round: Round) -> Result<BalanceTransaction> {
        let tables = self.tables.lock();
        tables
            .shares_slot(balance_id, round)
            .and_then(|id| tables.transactions.get(&id).cloned())
            .ok_or_else(|| {
                GameError::NotFound(format!("transaction of balance {balance_id} in round {round}"))
            })
    }

    async fn create(&self, transaction: &BalanceTransaction) -> Result<TransactionId> {
        let mut tables = self.tables.lock();
        insert_transaction(&mut tables, transaction)
    }

    async fn update(&self, transaction: &BalanceTransaction) -> Result<()> {
        let mut tables = self.tables.lock();
        overwrite_shares_slot(&mut tables, transaction)
    }

    async fn delete(&self, balance_id: BalanceId, round: Round) -> Result<()> {
        let mut tables = self.tables.lock();
        delete_shares_slot(&mut tables, balance_id, round)
    }
}

fn insert_transaction(tables: &mut Tables, transaction: &BalanceTransaction) -> Result<TransactionId> {
    if transaction.is_shares_transaction()
        && tables
            .shares_slot(transaction.balance_id, transaction.round)
            .is_some()
    {
        return Err(GameError::Internal(format!(
            "shares transaction of balance {} in round {} already exists",
            transaction.balance_id, transaction.round
        )));
    }
    let id = tables.next_id();
    let mut transaction = transaction.clone();
    transaction.id = id;
    tables.transactions.insert(id, transaction);
    Ok(id)
}

fn overwrite_shares_slot(tables: &mut Tables, transaction: &BalanceTransaction) -> Result<()> {
    let id = tables
        .shares_slot(transaction.balance_id, transaction.round)
        .ok_or_else(|| {
            GameError::NothingUpdated(format!(
                "transaction of balance {} in round {}",
                transaction.balance_id, transaction.round
            ))
        })?;
    if let Some(stored) = tables.transactions.get_mut(&id) {
        stored.amount = transaction.amount;
        stored.details = transaction.details.clone();
        stored.additional_info_id = transaction.additional_info_id;
        stored.random_event_id = transaction.random_event_id;
    }
    Ok(())
}

fn delete_shares_slot(tables: &mut Tables, balance_id: BalanceId, round: Round) -> Result<()> {
    let id = tables.shares_slot(balance_id, round).ok_or_else(|| {
        GameError::NothingUpdated(format!("transaction of balance {balance_id} in round {round}"))
    })?;
    tables.transactions.remove(&id);
    Ok(())
}

#[async_trait]
impl CompanyStore for InMemoryStore {
    async fn get_all_not_archived(&self) -> Result<Vec<Company>> {
        Ok(self
            .tables
            .lock()
            .companies
            .values()
            .filter(|c| !c.archived)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CompanySharePriceStore for InMemoryStore {
    async fn get_prices_by_company_ids_and_round(
        &self,
        company_ids: &[CompanyId],
        round: Round,
    ) -> Result<Vec<CompanyShare>> {
        Ok(self
            .tables
            .lock()
            .prices
            .iter()
            .filter(|s| s.round == round && company_ids.contains(&s.company_id))
            .copied()
            .collect())
    }

    async fn get_all_by_round(&self, round: Round) -> Result<Vec<CompanyShare>> {
        let tables = self.tables.lock();
        Ok(tables
            .prices
            .iter()
            .filter(|s| s.round == round && tables.is_company_active(Some(s.company_id)))
            .copied()
            .collect())
    }
}

#[async_trait]
impl AdditionalInfoStore for InMemoryStore {
    async fn get_by_id(&self, id: AdditionalInfoId) -> Result<AdditionalInfo> {
        self.tables
            .lock()
            .additional_infos
            .get(&id)
            .cloned()
            .ok_or_else(|| GameError::NotFound(format!("additional info {id}")))
    }

    async fn get_by_ids(&self, ids: &[AdditionalInfoId]) -> Result<Vec<AdditionalInfo>> {
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.additional_infos.get(id).cloned())
            .collect())
    }

    async fn get_all_actual_by_type(&self, info_type: AdditionalInfoType) -> Result<Vec<AdditionalInfo>> {
        let tables = self.tables.lock();
        Ok(tables
            .additional_infos
            .values()
            .filter(|info| info.info_type == info_type && tables.is_company_active(info.company_id))
            .cloned()
            .collect())
    }

    async fn update(&self, info: &AdditionalInfo) -> Result<()> {
        let mut tables = self.tables.lock();
        let stored = tables
            .additional_infos
            .get_mut(&info.id)
            .ok_or_else(|| GameError::NothingUpdated(format!("additional info {}", info.id)))?;
        *stored = info.clone();
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn commit(&self, commit: &SettlementCommit) -> Result<()> {
        let mut tables = self.tables.lock();

        let current = tables
            .balances
            .get(&commit.balance_id)
            .map(|b| b.amount)
            .ok_or_else(|| GameError::NotFound(format!("balance {}", commit.balance_id)))?;
        if current != commit.expected_amount {
            return Err(GameError::ConcurrentModification {
                balance_id: commit.balance_id,
            });
        }
        if !tables.teams.contains_key(&commit.team.id) {
            return Err(GameError::NothingUpdated(format!("team {}", commit.team.id)));
        }

        // the transaction write is the only step left that can fail
        match &commit.transaction {
            TransactionWrite::Create(transaction) => {
                insert_transaction(&mut tables, transaction)?;
            }
            TransactionWrite::Update(transaction) => overwrite_shares_slot(&mut tables, transaction)?,
            TransactionWrite::Delete { balance_id, round } => {
                delete_shares_slot(&mut tables, *balance_id, *round)?
            }
        }

        if let Some(balance) = tables.balances.get_mut(&commit.balance_id) {
            balance.amount = commit.new_amount;
        }
        let mut team = commit.team.clone();
        team.updated_at = Some(chrono::Utc::now());
        tables.teams.insert(team.id, team);
        Ok(())
    }
}
