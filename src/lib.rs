//! Investment game engine
//!
//! Backend core of a turn-based classroom investment game: timed trade and
//! registration periods, purchase settlement against team balances and
//! holdings, and the game lifecycle around them.

pub mod common;
pub mod config;
pub mod games;
pub mod ledger;
pub mod notifier;
pub mod period;
pub mod settings;
pub mod store;
pub mod teams;

// Re-export commonly used types
pub use common::errors::{ErrorKind, GameError, Result, ResultExt};
pub use common::traits::NotificationSink;
pub use common::types::{
    AdditionalInfo, AdditionalInfoType, Balance, BalanceTransaction, Company, CompanyShare,
    DetailedTeam, Game, GameState, GameStatistics, Notification, Settings, Team, TeamResult,
    TradeState,
};
pub use config::types::AppConfig;
pub use games::{register_period_subscribers, GameService, TaskRegistry};
pub use ledger::{ShareChanges, TeamShares};
pub use notifier::BroadcastNotifier;
pub use period::{ActivePeriod, PeriodController, PeriodEnd, StopOutcome};
pub use settings::SettingsService;
pub use store::{InMemoryStore, PgStore, Stores};
pub use teams::{PurchaseRequest, TeamService};
