//! Purchase settlement
//!
//! Applies or reverses a team's per-round purchase against its balance and
//! holdings. Every check runs on working copies first; the store only sees
//! one [`SettlementCommit`] per call, on the success path.
//!
//! A team owns at most one shares transaction per round. Buying shares again
//! in the same round is a redo: the old change set is reverted and replaced.

use rand::seq::SliceRandom;
use tracing::{debug, instrument, trace};

use super::TeamService;
use crate::common::errors::{ErrorKind, GameError, Result, ResultExt};
use crate::common::types::{
    AdditionalInfo, AdditionalInfoId, AdditionalInfoType, Balance, BalanceTransaction,
    DetailedTeam, Game, Round, Team, TeamId,
};
use crate::ledger::ShareChanges;
use crate::store::{SettlementCommit, TransactionWrite};

/// What a team wants to buy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseRequest {
    /// Signed share deltas, priced at the current round
    Shares(ShareChanges),
    AdditionalInfo(AdditionalInfoId),
}

impl PurchaseRequest {
    /// Build a request from the optional parts of an inbound call.
    ///
    /// Exactly one of non-empty share changes or an info id must be given.
    pub fn new(
        shares_changes: Option<ShareChanges>,
        additional_info_id: Option<AdditionalInfoId>,
    ) -> Result<Self> {
        let shares_changes = shares_changes.filter(|changes| !changes.is_empty());
        match (shares_changes, additional_info_id) {
            (Some(changes), None) => Ok(PurchaseRequest::Shares(changes)),
            (None, Some(id)) => Ok(PurchaseRequest::AdditionalInfo(id)),
            _ => Err(GameError::EmptyPurchase),
        }
    }
}

impl TeamService {
    /// Settle a purchase and return the new balance amount
    #[instrument(skip(self, request))]
    pub async fn purchase(&self, team_id: TeamId, request: PurchaseRequest) -> Result<i64> {
        if !self.is_trade_period() {
            debug!("cannot do purchase because is not trade period");
            return Err(GameError::NoTradePeriod);
        }

        let _guard = self.locks.acquire(team_id).await;

        let game = self.stores.games.get().await.context("games.get")?;
        let team = self.stores.teams.get_by_id(team_id).await.context("teams.get_by_id")?;
        let balance = self
            .stores
            .balances
            .get_by_id(team.balance_id)
            .await
            .context("balances.get_by_id")?;

        match request {
            PurchaseRequest::Shares(changes) => self.purchase_shares(&game, team, balance, changes).await,
            PurchaseRequest::AdditionalInfo(id) => {
                let info = self
                    .stores
                    .additional_infos
                    .get_by_id(id)
                    .await
                    .context("additional_infos.get_by_id")?;
                self.purchase_additional_info(&game, team, balance, &info).await
            }
        }
    }

    /// Undo this round's shares purchase and return the refreshed team view
    #[instrument(skip(self))]
    pub async fn reset_transaction(&self, team_id: TeamId) -> Result<DetailedTeam> {
        {
            let _guard = self.locks.acquire(team_id).await;

            let game = self.stores.games.get().await.context("games.get")?;
            let mut team = self.stores.teams.get_by_id(team_id).await.context("teams.get_by_id")?;
            let balance = self
                .stores
                .balances
                .get_by_id(team.balance_id)
                .await
                .context("balances.get_by_id")?;
            let transaction = self
                .stores
                .transactions
                .get(balance.id, game.current_round)
                .await
                .context("transactions.get")?;

            let new_amount = balance
                .amount
                .checked_add(transaction.amount)
                .ok_or(GameError::AmountOverflow)?;
            if new_amount < 0 {
                return Err(GameError::InsufficientBalance {
                    required: -transaction.amount,
                    available: balance.amount,
                });
            }
            if let Some(details) = &transaction.details {
                team.shares
                    .revert_changes(details)
                    .context("revert round transaction")?;
            }

            trace!(
                team_id,
                balance = balance.amount,
                refund = transaction.amount,
                "reset round transaction"
            );

            self.commit(SettlementCommit {
                balance_id: balance.id,
                expected_amount: balance.amount,
                new_amount,
                transaction: TransactionWrite::Delete {
                    balance_id: balance.id,
                    round: game.current_round,
                },
                team,
            })
            .await?;
        }

        self.get_detailed_by_id(team_id).await
    }

    /// Buy one not yet owned company info of the current round, chosen at random
    #[instrument(skip(self))]
    pub async fn purchase_random_additional_info(&self, team_id: TeamId) -> Result<(AdditionalInfo, i64)> {
        if !self.is_trade_period() {
            debug!("cannot buy additional info because is not trade period");
            return Err(GameError::NoTradePeriod);
        }

        let _guard = self.locks.acquire(team_id).await;

        let game = self.stores.games.get().await.context("games.get")?;
        let team = self.stores.teams.get_by_id(team_id).await.context("teams.get_by_id")?;
        let balance = self
            .stores
            .balances
            .get_by_id(team.balance_id)
            .await
            .context("balances.get_by_id")?;

        let candidates: Vec<AdditionalInfo> = self
            .stores
            .additional_infos
            .get_all_actual_by_type(AdditionalInfoType::CompanyInfo)
            .await
            .context("additional_infos.get_all_actual_by_type")?
            .into_iter()
            .filter(|info| info.round == game.current_round && !team.owns_additional_info(info.id))
            .collect();

        let info = candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(GameError::NoAdditionalInfos)?;

        let new_amount = self.purchase_additional_info(&game, team, balance, &info).await?;
        Ok((info, new_amount))
    }

    async fn purchase_additional_info(
        &self,
        game: &Game,
        mut team: Team,
        balance: Balance,
        info: &AdditionalInfo,
    ) -> Result<i64> {
        let new_amount = balance
            .amount
            .checked_sub(info.cost)
            .ok_or(GameError::AmountOverflow)?;
        if new_amount < 0 {
            return Err(GameError::InsufficientBalance {
                required: info.cost,
                available: balance.amount,
            });
        }

        trace!(
            team_id = team.id,
            additional_info_id = info.id,
            cost = info.cost,
            balance = balance.amount,
            "purchase additional info"
        );

        team.additional_info_ids.push(info.id);
        self.commit(SettlementCommit {
            balance_id: balance.id,
            expected_amount: balance.amount,
            new_amount,
            transaction: TransactionWrite::Create(BalanceTransaction::additional_info(
                balance.id,
                game.current_round,
                info.cost,
                info.id,
            )),
            team,
        })
        .await?;

        Ok(new_amount)
    }

    async fn purchase_shares(
        &self,
        game: &Game,
        mut team: Team,
        balance: Balance,
        changes: ShareChanges,
    ) -> Result<i64> {
        let round = game.current_round;
        let existing = match self.stores.transactions.get(balance.id, round).await {
            Ok(transaction) => Some(transaction),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.context("transactions.get")),
        };

        // holdings as they would look once this request replaces the round's purchase
        let mut shares = team.shares.clone();
        if let Some(details) = existing.as_ref().and_then(|tr| tr.details.as_ref()) {
            shares
                .revert_changes(details)
                .context("revert round transaction")?;
        }
        if shares.merge_changes(&changes).is_err() {
            debug!(team_id = team.id, ?changes, "share changes would make holdings negative");
            return Err(GameError::IncorrectShareCount);
        }

        let amount = self.shares_cost(&changes, round).await?;

        let (new_amount, transaction) = match existing {
            None => {
                let new_amount = balance
                    .amount
                    .checked_sub(amount)
                    .ok_or(GameError::AmountOverflow)?;
                if new_amount < 0 {
                    return Err(GameError::InsufficientBalance {
                        required: amount,
                        available: balance.amount,
                    });
                }
                let transaction = BalanceTransaction::shares(balance.id, round, amount, changes);
                (new_amount, TransactionWrite::Create(transaction))
            }
            Some(mut transaction) => {
                let available = balance
                    .amount
                    .checked_add(transaction.amount)
                    .ok_or(GameError::AmountOverflow)?;
                let new_amount = available.checked_sub(amount).ok_or(GameError::AmountOverflow)?;
                if new_amount < 0 {
                    return Err(GameError::InsufficientBalance {
                        required: amount,
                        available,
                    });
                }
                transaction.amount = amount;
                transaction.details = Some(changes);
                (new_amount, TransactionWrite::Update(transaction))
            }
        };

        trace!(
            team_id = team.id,
            team_name = %team.name,
            purchase_amount = amount,
            balance = balance.amount,
            redo = matches!(transaction, TransactionWrite::Update(_)),
            "purchase shares"
        );

        team.shares = shares;
        self.commit(SettlementCommit {
            balance_id: balance.id,
            expected_amount: balance.amount,
            new_amount,
            transaction,
            team,
        })
        .await?;

        Ok(new_amount)
    }

    /// Net cost of share changes at the prices of `round`; unpriced companies cost nothing
    async fn shares_cost(&self, changes: &ShareChanges, round: Round) -> Result<i64> {
        let company_ids: Vec<_> = changes.keys().copied().collect();
        let prices = self
            .stores
            .prices
            .get_prices_by_company_ids_and_round(&company_ids, round)
            .await
            .context("prices.get_prices_by_company_ids_and_round")?;

        changes.iter().try_fold(0i64, |total, (company_id, delta)| {
            let price = prices
                .iter()
                .find(|share| share.company_id == *company_id)
                .map_or(0, |share| share.price);
            price
                .checked_mul(*delta)
                .and_then(|cost| total.checked_add(cost))
                .ok_or(GameError::IncorrectShareCount)
        })
    }

    async fn commit(&self, commit: SettlementCommit) -> Result<()> {
        self.stores
            .settlement
            .commit(&commit)
            .await
            .context("settlement.commit")
    }
}
