//! Team service
//!
//! Owns the two permission flags flipped by the period controllers, team
//! registration, the detailed team view and the final standings. Purchases
//! live in [`settlement`].

pub mod locks;
pub mod settlement;

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument, trace};

use crate::common::errors::{ErrorKind, GameError, Result, ResultExt};
use crate::common::types::{DetailedTeam, GameStatistics, PriceTable, Round, Team, TeamId, TeamResult};
use crate::store::Stores;

pub use locks::TeamLocks;
pub use settlement::PurchaseRequest;

/// Input of [`TeamService::create_team`]
#[derive(Debug, Clone)]
pub struct CreateParams {
    pub name: String,
    pub credentials: String,
}

/// Input of [`TeamService::update_team`]
#[derive(Debug, Clone)]
pub struct UpdateParams {
    pub id: TeamId,
    pub name: String,
    pub members: Vec<String>,
}

pub struct TeamService {
    stores: Stores,
    is_trade_period: AtomicBool,
    is_registration_period: AtomicBool,
    locks: TeamLocks,
}

impl TeamService {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            is_trade_period: AtomicBool::new(false),
            is_registration_period: AtomicBool::new(false),
            locks: TeamLocks::new(),
        }
    }

    /// Trade period subscriber
    pub fn set_trade_period_active(&self, is_trade: bool) {
        trace!(is_trade, "team service: trade period updated");
        self.is_trade_period.store(is_trade, Ordering::SeqCst);
    }

    /// Registration period subscriber
    pub fn set_registration_period_active(&self, is_registration: bool) {
        trace!(is_registration, "team service: registration period updated");
        self.is_registration_period.store(is_registration, Ordering::SeqCst);
    }

    pub fn is_trade_period(&self) -> bool {
        self.is_trade_period.load(Ordering::SeqCst)
    }

    pub fn is_registration_period(&self) -> bool {
        self.is_registration_period.load(Ordering::SeqCst)
    }

    /// Register a team in the current game with the default starting balance
    #[instrument(skip(self, params), fields(name = %params.name))]
    pub async fn create_team(&self, params: CreateParams) -> Result<TeamId> {
        if !self.is_registration_period() {
            debug!("cannot create team because is not registration period");
            return Err(GameError::NoRegistrationPeriod);
        }

        let settings = self.stores.settings.get().await.context("settings.get")?;
        let game = self.stores.games.get().await.context("games.get")?;

        match self
            .stores
            .teams
            .get_by_credentials(&params.credentials, game.current_game)
            .await
        {
            Ok(_) => return Err(GameError::DuplicateCredentials),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.context("teams.get_by_credentials")),
        }

        let balance_id = self
            .stores
            .balances
            .create(settings.default_balance_amount)
            .await
            .context("balances.create")?;

        let team = Team::new(params.name, params.credentials, balance_id, game.current_game);
        let id = self.stores.teams.create(&team).await.context("teams.create")?;

        trace!(team_id = id, balance_id, "team created");
        Ok(id)
    }

    #[instrument(skip(self, params), fields(team_id = params.id))]
    pub async fn update_team(&self, params: UpdateParams) -> Result<()> {
        let mut team = self
            .stores
            .teams
            .get_by_id(params.id)
            .await
            .context("teams.get_by_id")?;

        team.name = params.name;
        team.members = params.members;

        self.stores.teams.update(&team).await.context("teams.update")
    }

    /// Team with its balance, purchased infos and holdings over every active company
    #[instrument(skip(self))]
    pub async fn get_detailed_by_id(&self, id: TeamId) -> Result<DetailedTeam> {
        let mut team = self.stores.teams.get_by_id(id).await.context("teams.get_by_id")?;
        let balance = self
            .stores
            .balances
            .get_by_id(team.balance_id)
            .await
            .context("balances.get_by_id")?;

        let companies = self
            .stores
            .companies
            .get_all_not_archived()
            .await
            .context("companies.get_all_not_archived")?;
        team.shares.densify(companies.iter().map(|c| c.id));

        let game = self.stores.games.get().await.context("games.get")?;
        let has_transaction_in_this_round = match self
            .stores
            .transactions
            .get(team.balance_id, game.current_round)
            .await
        {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.context("transactions.get")),
        };

        let additional_infos = if team.additional_info_ids.is_empty() {
            Vec::new()
        } else {
            self.stores
                .additional_infos
                .get_by_ids(&team.additional_info_ids)
                .await
                .context("additional_infos.get_by_ids")?
        };

        Ok(DetailedTeam {
            team,
            additional_infos,
            balance: balance.amount,
            has_transaction_in_this_round,
        })
    }

    pub async fn get_all_for_current_game(&self) -> Result<Vec<Team>> {
        let game = self.stores.games.get().await.context("games.get")?;
        self.stores
            .teams
            .get_all_by_game_id(game.current_game)
            .await
            .context("teams.get_all_by_game_id")
    }

    /// Standings of the current game, valuing holdings at the prices of `round`.
    ///
    /// Ordered by score, best first; ties keep the earlier registered team first.
    #[instrument(skip(self))]
    pub async fn statistics_by_game(&self, round: Round) -> Result<GameStatistics> {
        let teams = self.get_all_for_current_game().await?;
        if teams.is_empty() {
            return Err(GameError::NoTeams);
        }

        let prices: PriceTable = self
            .stores
            .prices
            .get_all_by_round(round)
            .await
            .context("prices.get_all_by_round")?
            .into_iter()
            .map(|share| (share.company_id, share.price))
            .collect();

        let mut results = teams
            .iter()
            .map(|team| {
                Ok(TeamResult {
                    id: team.id,
                    team_name: team.name.clone(),
                    score: team.shares.value_at(&prices)?,
                })
            })
            .collect::<Result<Vec<TeamResult>>>()?;
        results.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

        Ok(GameStatistics { results })
    }
}
