//! Integration tests for the game lifecycle and its timed periods
//!
//! Timed tests run on a paused tokio clock, so a five minute trade period
//! elapses instantly once every task is idle.

mod common;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use common::{world, world_with_game_store, REGISTRATION_DURATION, ROUND_DURATION};
use investment_game::games::UpdateParams;
use investment_game::store::{GameStore, InMemoryStore};
use investment_game::teams::CreateParams;
use investment_game::{
    ErrorKind, Game, GameState, Notification, PurchaseRequest, Result, ShareChanges, TradeState,
};

const TASK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Game store whose trade-state reverts take a while to land, like a slow database write
struct LaggingRevertStore {
    inner: Arc<InMemoryStore>,
    lag: Duration,
}

#[async_trait]
impl GameStore for LaggingRevertStore {
    async fn get(&self) -> Result<Game> {
        GameStore::get(self.inner.as_ref()).await
    }

    async fn update(&self, game: &Game) -> Result<()> {
        if game.trade_state == TradeState::NotStarted {
            tokio::time::sleep(self.lag).await;
        }
        GameStore::update(self.inner.as_ref(), game).await
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_full_round_flow() {
    let world = world();
    world.games.start_registration().await.unwrap();

    let team_id = world
        .teams
        .create_team(CreateParams {
            name: "alpha".to_string(),
            credentials: "alpha-secret".to_string(),
        })
        .await
        .unwrap();
    let company = world.store.insert_company("acme");
    world.store.set_price(company, 1, 100);

    world.games.start_game().await.unwrap();
    world.games.start_round().await.unwrap();
    assert_eq!(world.games.get().await.unwrap().current_round, 1);

    world.games.start_trade().await.unwrap();
    let balance = world
        .teams
        .purchase(team_id, PurchaseRequest::Shares(ShareChanges::from([(company, 5)])))
        .await
        .unwrap();
    assert_eq!(balance, 9_500);

    tokio::time::sleep(ROUND_DURATION + Duration::from_secs(1)).await;

    let err = world
        .teams
        .purchase(team_id, PurchaseRequest::Shares(ShareChanges::from([(company, 1)])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTradePeriod);

    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);
    assert_eq!(world.games.get().await.unwrap().trade_state, TradeState::NotStarted);

    let stats = world.teams.statistics_by_game(1).await.unwrap();
    assert_eq!(stats.results.len(), 1);
    assert_eq!(stats.results[0].score, 500);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_follow_phase_order() {
    let world = world();

    world.games.start_registration().await.unwrap();
    world.games.stop_registration().await.unwrap();
    world.games.start_trade().await.unwrap();
    world.games.stop_trade().await;
    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);

    assert_eq!(
        world.notifier.take(),
        vec![
            Notification::GameStateChanged { game_state: GameState::Opened },
            Notification::RegistrationPeriodChanged { is_registration_stage: true },
            Notification::GameStateChanged { game_state: GameState::Closed },
            Notification::RegistrationPeriodChanged { is_registration_stage: false },
            Notification::TradePeriodChanged { is_trade_stage: true },
            Notification::TradePeriodChanged { is_trade_stage: false },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_trade_is_immediate() {
    let world = world();
    world.games.start_trade().await.unwrap();
    assert!(world.teams.is_trade_period());

    let started = tokio::time::Instant::now();
    world.games.stop_trade().await;

    assert!(!world.teams.is_trade_period());
    assert!(started.elapsed() < ROUND_DURATION);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_trade_does_not_open_second_period() {
    let world = world();
    world.games.start_trade().await.unwrap();
    world.games.start_trade().await.unwrap();

    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);

    let opened = world
        .notifier
        .take()
        .into_iter()
        .filter(|n| *n == Notification::TradePeriodChanged { is_trade_stage: true })
        .count();
    assert_eq!(opened, 1);
}

#[tokio::test(start_paused = true)]
async fn test_registration_timeout_closes_opened_game() {
    let world = world();
    world.games.start_registration().await.unwrap();

    tokio::time::sleep(REGISTRATION_DURATION + Duration::from_secs(1)).await;
    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);

    assert_eq!(world.games.get().await.unwrap().state, GameState::Closed);
    let err = world
        .teams
        .create_team(CreateParams {
            name: "late".to_string(),
            credentials: "late".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoRegistrationPeriod);
}

#[tokio::test(start_paused = true)]
async fn test_trade_end_keeps_admin_changes_made_during_period() {
    let world = world();
    world.games.start_trade().await.unwrap();

    world.games.start_round().await.unwrap();
    world.games.start_round().await.unwrap();

    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);

    let game = world.games.get().await.unwrap();
    assert_eq!(game.current_round, 2);
    assert_eq!(game.trade_state, TradeState::NotStarted);
}

#[tokio::test(start_paused = true)]
async fn test_update_can_start_and_stop_trade() {
    let world = world();

    world
        .games
        .update(UpdateParams {
            state: GameState::Paused,
            current_round: 3,
            trade_state: TradeState::Started,
        })
        .await
        .unwrap();
    assert!(world.teams.is_trade_period());
    assert_eq!(world.games.get().await.unwrap().current_round, 3);

    world
        .games
        .update(UpdateParams {
            state: GameState::Paused,
            current_round: 3,
            trade_state: TradeState::NotStarted,
        })
        .await
        .unwrap();
    assert!(!world.teams.is_trade_period());
}

#[tokio::test]
async fn test_new_game_isolates_teams() {
    let world = world();
    world.register_team("old").await;

    world.games.create_new_game().await.unwrap();
    world.register_team("new").await;

    let teams = world.teams.get_all_for_current_game().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].name, "new");
    assert_eq!(teams[0].game_id, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_open_periods() {
    let world = world();
    world.games.start_registration().await.unwrap();
    world.games.start_trade().await.unwrap();

    assert!(world.games.shutdown(Duration::from_secs(5)).await);

    assert!(!world.teams.is_trade_period());
    assert!(!world.teams.is_registration_period());
    assert!(!world.games.trade_controller().is_running());
    assert!(!world.games.registration_controller().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_restarted_trade_keeps_started_state_despite_slow_revert() {
    let world = world_with_game_store(|inner| {
        Arc::new(LaggingRevertStore {
            inner,
            lag: Duration::from_millis(50),
        }) as Arc<dyn GameStore>
    });

    world.games.start_trade().await.unwrap();
    world.games.stop_trade().await;
    world.games.start_trade().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(world.teams.is_trade_period());
    assert_eq!(world.games.get().await.unwrap().trade_state, TradeState::Started);

    // the new period still reverts the state when it ends
    world.games.stop_trade().await;
    assert!(world.games.wait_for_period_tasks(TASK_TIMEOUT).await);
    assert_eq!(world.games.get().await.unwrap().trade_state, TradeState::NotStarted);
}
