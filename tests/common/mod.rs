//! Common test utilities and fixtures
#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use investment_game::common::types::{AdditionalInfoId, CompanyId, TeamId};
use investment_game::settings::SettingsService;
use investment_game::store::{GameStore, InMemoryStore, Stores};
use investment_game::teams::CreateParams;
use investment_game::{
    register_period_subscribers, AdditionalInfo, AdditionalInfoType, GameService, GameState,
    Notification, NotificationSink, PeriodController, Settings, TeamService,
};

/// Trade period length used by the fixtures
pub const ROUND_DURATION: Duration = Duration::from_secs(300);

/// Registration window length used by the fixtures
pub const REGISTRATION_DURATION: Duration = Duration::from_secs(900);

/// Notification sink that keeps every message in order
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify_trade_period_changed(&self, is_trade: bool) {
        self.messages.lock().push(Notification::TradePeriodChanged {
            is_trade_stage: is_trade,
        });
    }

    fn notify_game_state_changed(&self, state: GameState) {
        self.messages
            .lock()
            .push(Notification::GameStateChanged { game_state: state });
    }

    fn notify_registration_period_changed(&self, is_registration: bool) {
        self.messages.lock().push(Notification::RegistrationPeriodChanged {
            is_registration_stage: is_registration,
        });
    }
}

/// Fully wired engine on top of an in-memory store
pub struct World {
    pub store: Arc<InMemoryStore>,
    pub stores: Stores,
    pub teams: Arc<TeamService>,
    pub games: Arc<GameService>,
    pub settings: SettingsService,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn world() -> World {
    world_with_settings(Settings {
        round_duration: ROUND_DURATION,
        ..Settings::default()
    })
}

pub fn world_with_settings(settings: Settings) -> World {
    build_world(settings, |store| store as Arc<dyn GameStore>)
}

/// Default world whose game row goes through `wrap`, for stores with injected behavior
pub fn world_with_game_store<F>(wrap: F) -> World
where
    F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn GameStore>,
{
    build_world(
        Settings {
            round_duration: ROUND_DURATION,
            ..Settings::default()
        },
        wrap,
    )
}

fn build_world<F>(settings: Settings, wrap_games: F) -> World
where
    F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn GameStore>,
{
    let store = Arc::new(InMemoryStore::with_settings(settings.clone()));
    let mut stores = Stores::from_backend(Arc::clone(&store));
    stores.games = wrap_games(Arc::clone(&store));

    let trade = Arc::new(PeriodController::new("trade", settings.round_duration));
    let registration = Arc::new(PeriodController::new("registration", REGISTRATION_DURATION));
    let notifier = Arc::new(RecordingNotifier::default());
    let sink: Arc<dyn NotificationSink> = notifier.clone();

    let teams = Arc::new(TeamService::new(stores.clone()));
    register_period_subscribers(&trade, &registration, &teams, &sink);

    let games = Arc::new(GameService::new(&stores, trade, registration, sink));
    let settings = SettingsService::new(stores.clone(), Arc::clone(&games));

    World {
        store,
        stores,
        teams,
        games,
        settings,
        notifier,
    }
}

impl World {
    /// Register a team through an open registration window, then restore the window
    pub async fn register_team(&self, name: &str) -> TeamId {
        let was_open = self.teams.is_registration_period();
        self.teams.set_registration_period_active(true);
        let id = self
            .teams
            .create_team(CreateParams {
                name: name.to_string(),
                credentials: format!("{name}-secret"),
            })
            .await
            .expect("team registration failed");
        self.teams.set_registration_period_active(was_open);
        id
    }

    /// Company priced at `price` in round 0
    pub fn company(&self, name: &str, price: i64) -> CompanyId {
        let id = self.store.insert_company(name);
        self.store.set_price(id, 0, price);
        id
    }

    pub fn company_info(&self, cost: i64, round: i32) -> AdditionalInfoId {
        self.store.insert_additional_info(AdditionalInfo {
            id: 0,
            name: format!("company info costing {cost}"),
            description: "quarterly results".to_string(),
            info_type: AdditionalInfoType::CompanyInfo,
            cost,
            company_id: None,
            round,
        })
    }

    pub async fn balance_of(&self, team_id: TeamId) -> i64 {
        self.teams
            .get_detailed_by_id(team_id)
            .await
            .expect("team should exist")
            .balance
    }

    pub fn open_trade(&self) {
        self.teams.set_trade_period_active(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_team_gets_default_balance() {
        let world = world();
        let id = world.register_team("alpha").await;
        assert_eq!(world.balance_of(id).await, 10_000);
        assert!(!world.teams.is_registration_period());
    }
}
