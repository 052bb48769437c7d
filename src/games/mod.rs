//! Game phase orchestration
//!
//! [`GameService`] drives the game singleton through its lifecycle and runs
//! the two timed phases:
//!
//! - the trade period, opened by `start_trade` and reverted to
//!   `TradeState::NotStarted` by a detached task when it ends;
//! - the registration period, opened when the game enters `Opened` and
//!   moving the game to `Closed` when it elapses on its own.
//!
//! The game row is always persisted before a period is started or stopped,
//! so period end handlers read the fresh state. Every read-modify-write of
//! the game row, the end handlers included, runs under one async lock, and an
//! end handler leaves the row alone once a newer period of its kind is open.

pub mod tasks;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace};

use crate::common::errors::{Result, ResultExt};
use crate::common::traits::NotificationSink;
use crate::common::types::{Game, GameState, Round, TradeState};
use crate::period::{PeriodController, PeriodEnd};
use crate::store::{GameStore, Stores};
use crate::teams::TeamService;

pub use tasks::TaskRegistry;

/// Administrative bulk update of the game row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateParams {
    pub state: GameState,
    pub current_round: Round,
    pub trade_state: TradeState,
}

pub struct GameService {
    games: Arc<dyn GameStore>,
    trade: Arc<PeriodController>,
    registration: Arc<PeriodController>,
    notifier: Arc<dyn NotificationSink>,
    tasks: TaskRegistry,
    /// Serializes writes of the game row
    write_lock: Arc<Mutex<()>>,
}

impl GameService {
    pub fn new(
        stores: &Stores,
        trade: Arc<PeriodController>,
        registration: Arc<PeriodController>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            games: Arc::clone(&stores.games),
            trade,
            registration,
            notifier,
            tasks: TaskRegistry::new(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn trade_controller(&self) -> &Arc<PeriodController> {
        &self.trade
    }

    pub fn registration_controller(&self) -> &Arc<PeriodController> {
        &self.registration
    }

    pub async fn get(&self) -> Result<Game> {
        self.games.get().await.context("games.get")
    }

    #[instrument(skip(self))]
    pub async fn update(&self, params: UpdateParams) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;

        game.current_round = params.current_round;

        let trade_state_changed = game.trade_state != params.trade_state;
        game.trade_state = params.trade_state;

        let state_changed = game.state != params.state;
        game.state = params.state;
        if state_changed && game.state == GameState::Started {
            game.current_round = 1;
        }

        self.save(&game).await?;

        if state_changed {
            self.on_game_state_change(game.state).await;
        }

        if trade_state_changed {
            match game.trade_state {
                TradeState::Started => self.spawn_trade_period(),
                TradeState::NotStarted => {
                    self.trade.stop().await;
                }
            }
        }

        Ok(())
    }

    /// Begin the next play-through: bump the game counter and reset everything else
    #[instrument(skip(self))]
    pub async fn create_new_game(&self) -> Result<()> {
        trace!("create new game");

        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;
        game.current_game += 1;
        game.state = GameState::Closed;
        game.current_round = 0;
        game.trade_state = TradeState::NotStarted;
        self.save(&game).await?;

        self.on_game_state_change(GameState::Closed).await;
        self.trade.stop().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn start_game(&self) -> Result<()> {
        trace!("start game");

        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;
        game.state = GameState::Started;
        game.current_round = 0;
        game.trade_state = TradeState::NotStarted;
        self.save(&game).await?;

        self.on_game_state_change(GameState::Started).await;
        self.trade.stop().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn start_registration(&self) -> Result<()> {
        trace!("start registration");
        self.set_state(GameState::Opened).await
    }

    #[instrument(skip(self))]
    pub async fn stop_registration(&self) -> Result<()> {
        trace!("stop registration");
        self.set_state(GameState::Closed).await
    }

    #[instrument(skip(self))]
    pub async fn start_round(&self) -> Result<()> {
        trace!("start round");

        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;
        game.current_round += 1;
        self.save(&game).await
    }

    /// Open the trade period; returns once it is open, not when it ends
    #[instrument(skip(self))]
    pub async fn start_trade(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;
        game.trade_state = TradeState::Started;
        self.save(&game).await?;

        self.spawn_trade_period();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop_trade(&self) {
        trace!("called stop trade");
        self.trade.stop().await;
    }

    /// Length of trade periods started from now on
    pub fn update_trade_period(&self, period: Duration) {
        trace!(?period, "trade period updated");
        self.trade.set_duration(period);
    }

    /// Stop both periods and wait for their end handlers
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("stopping game periods");
        self.trade.stop().await;
        self.registration.stop().await;
        self.wait_for_period_tasks(timeout).await
    }

    /// Wait for the detached period tasks spawned so far
    pub async fn wait_for_period_tasks(&self, timeout: Duration) -> bool {
        self.tasks.join_all(timeout).await
    }

    async fn set_state(&self, state: GameState) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let mut game = self.get().await?;
        game.state = state;
        self.save(&game).await?;

        self.on_game_state_change(state).await;
        Ok(())
    }

    async fn save(&self, game: &Game) -> Result<()> {
        self.games.update(game).await.context("games.update")
    }

    async fn on_game_state_change(&self, state: GameState) {
        self.notifier.notify_game_state_changed(state);

        match state {
            GameState::Opened => {
                trace!("start registration period");
                self.spawn_registration_period();
            }
            GameState::Closed | GameState::Started => {
                trace!("stop registration period");
                self.registration.stop().await;
            }
            GameState::Paused | GameState::StopGenerally => {}
        }
    }

    fn spawn_trade_period(&self) {
        let Some(period) = self.trade.begin() else {
            debug!("trade period already running");
            return;
        };

        let games = Arc::clone(&self.games);
        let trade = Arc::clone(&self.trade);
        let write_lock = Arc::clone(&self.write_lock);
        self.tasks.spawn("trade period", async move {
            trace!("start trade period");
            let end = period.wait().await;
            trace!(?end, "stopped trade period");

            let _write = write_lock.lock().await;
            if trade.is_running() {
                debug!("newer trade period already open, keeping trade state");
                return;
            }
            if let Err(e) = revert_trade_state(games.as_ref()).await {
                error!(error = %e, "failed to revert trade state");
            }
        });
    }

    fn spawn_registration_period(&self) {
        let Some(period) = self.registration.begin() else {
            debug!("registration period already running");
            return;
        };

        let games = Arc::clone(&self.games);
        let notifier = Arc::clone(&self.notifier);
        let registration = Arc::clone(&self.registration);
        let write_lock = Arc::clone(&self.write_lock);
        self.tasks.spawn("registration period", async move {
            if period.wait().await != PeriodEnd::Elapsed {
                return;
            }
            trace!("registration period elapsed");

            let _write = write_lock.lock().await;
            if registration.is_running() {
                debug!("newer registration period already open, keeping game state");
                return;
            }

            match close_registration(games.as_ref()).await {
                Ok(true) => notifier.notify_game_state_changed(GameState::Closed),
                Ok(false) => {}
                Err(e) => error!(error = %e, "failed to close registration"),
            }
        });
    }
}

/// Trade period end handler. Reloads the game so admin changes made
/// during the period survive.
async fn revert_trade_state(games: &dyn GameStore) -> Result<()> {
    let mut game = games.get().await.context("games.get")?;
    game.trade_state = TradeState::NotStarted;
    games.update(&game).await.context("games.update")
}

/// Registration timeout handler; only a game still `Opened` is closed
async fn close_registration(games: &dyn GameStore) -> Result<bool> {
    let mut game = games.get().await.context("games.get")?;
    if game.state != GameState::Opened {
        return Ok(false);
    }
    game.state = GameState::Closed;
    games.update(&game).await.context("games.update")?;
    Ok(true)
}

/// Connect the period controllers to the team gate and the notifier.
///
/// The team gate is registered first so clients are only told about a
/// period once purchases or registrations already follow it.
pub fn register_period_subscribers(
    trade: &PeriodController,
    registration: &PeriodController,
    teams: &Arc<TeamService>,
    notifier: &Arc<dyn NotificationSink>,
) {
    let gate = Arc::clone(teams);
    trade.register_subscriber(move |active| gate.set_trade_period_active(active));
    let sink = Arc::clone(notifier);
    trade.register_subscriber(move |active| sink.notify_trade_period_changed(active));

    let gate = Arc::clone(teams);
    registration.register_subscriber(move |active| gate.set_registration_period_active(active));
    let sink = Arc::clone(notifier);
    registration.register_subscriber(move |active| sink.notify_registration_period_changed(active));
}
