//! Admin-editable game settings
//!
//! Some settings have effects beyond their own row: the round duration
//! retimes future trade periods, the default balance resets the balances of
//! teams waiting for the game to start, and the default info cost reprices
//! every actual company info.

use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};

use crate::common::errors::{Result, ResultExt};
use crate::common::types::{AdditionalInfoType, Balance, GameState, Settings};
use crate::games::GameService;
use crate::store::Stores;

/// New values for every setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateParams {
    pub rounds_count: i32,
    pub round_duration: Duration,
    pub link_to_pdf: String,
    pub enable_random_events: bool,
    pub default_balance_amount: i64,
    pub default_additional_info_cost: i64,
}

pub struct SettingsService {
    stores: Stores,
    games: Arc<GameService>,
}

impl SettingsService {
    pub fn new(stores: Stores, games: Arc<GameService>) -> Self {
        Self { stores, games }
    }

    pub async fn get(&self) -> Result<Settings> {
        self.stores.settings.get().await.context("settings.get")
    }

    #[instrument(skip(self))]
    pub async fn update(&self, params: UpdateParams) -> Result<()> {
        let mut settings = self.get().await?;

        settings.rounds_count = params.rounds_count;
        if settings.round_duration != params.round_duration {
            self.games.update_trade_period(params.round_duration);
        }
        settings.round_duration = params.round_duration;
        settings.enable_random_events = params.enable_random_events;
        settings.link_to_pdf = params.link_to_pdf;

        if settings.default_balance_amount != params.default_balance_amount {
            self.reset_team_balances(params.default_balance_amount).await?;
        }
        settings.default_balance_amount = params.default_balance_amount;

        if settings.default_additional_info_cost != params.default_additional_info_cost {
            self.reprice_company_infos(params.default_additional_info_cost).await?;
        }
        settings.default_additional_info_cost = params.default_additional_info_cost;

        self.stores.settings.update(&settings).await.context("settings.update")
    }

    /// Give every team of the current game the new starting balance, unless play has begun
    async fn reset_team_balances(&self, amount: i64) -> Result<()> {
        let game = self.stores.games.get().await.context("games.get")?;
        if game.state == GameState::Started {
            return Ok(());
        }

        let teams = self
            .stores
            .teams
            .get_all_by_game_id(game.current_game)
            .await
            .context("teams.get_all_by_game_id")?;

        trace!(teams = teams.len(), amount, "reset team balances");
        for team in teams {
            self.stores
                .balances
                .update(&Balance {
                    id: team.balance_id,
                    amount,
                })
                .await
                .context("balances.update")?;
        }
        Ok(())
    }

    async fn reprice_company_infos(&self, cost: i64) -> Result<()> {
        let infos = self
            .stores
            .additional_infos
            .get_all_actual_by_type(AdditionalInfoType::CompanyInfo)
            .await
            .context("additional_infos.get_all_actual_by_type")?;

        trace!(infos = infos.len(), cost, "reprice company infos");
        for mut info in infos {
            info.cost = cost;
            self.stores
                .additional_infos
                .update(&info)
                .await
                .context("additional_infos.update")?;
        }
        Ok(())
    }
}
