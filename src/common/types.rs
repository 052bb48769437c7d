//! Domain types shared by every service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::common::errors::GameError;
use crate::ledger::{ShareChanges, TeamShares};

pub type TeamId = i64;
pub type BalanceId = i64;
pub type CompanyId = i64;
pub type AdditionalInfoId = i64;
pub type TransactionId = i64;
pub type RandomEventId = i64;
pub type Round = i32;

/// Game-level lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum GameState {
    /// Registration closed, game not running
    Closed,
    Paused,
    /// Registration open
    Opened,
    Started,
    StopGenerally,
}

impl From<GameState> for i8 {
    fn from(state: GameState) -> Self {
        match state {
            GameState::Closed => -1,
            GameState::Paused => 0,
            GameState::Opened => 1,
            GameState::Started => 2,
            GameState::StopGenerally => 3,
        }
    }
}

impl TryFrom<i8> for GameState {
    type Error = GameError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(GameState::Closed),
            0 => Ok(GameState::Paused),
            1 => Ok(GameState::Opened),
            2 => Ok(GameState::Started),
            3 => Ok(GameState::StopGenerally),
            other => Err(GameError::Internal(format!("unknown game state {other}"))),
        }
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameState::Closed => write!(f, "closed"),
            GameState::Paused => write!(f, "paused"),
            GameState::Opened => write!(f, "opened"),
            GameState::Started => write!(f, "started"),
            GameState::StopGenerally => write!(f, "stop_generally"),
        }
    }
}

/// Trade-level state, orthogonal to [`GameState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum TradeState {
    NotStarted,
    Started,
}

impl From<TradeState> for i8 {
    fn from(state: TradeState) -> Self {
        match state {
            TradeState::NotStarted => 0,
            TradeState::Started => 1,
        }
    }
}

impl TryFrom<i8> for TradeState {
    type Error = GameError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TradeState::NotStarted),
            1 => Ok(TradeState::Started),
            other => Err(GameError::Internal(format!("unknown trade state {other}"))),
        }
    }
}

/// The game singleton row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub state: GameState,
    pub current_round: Round,
    pub trade_state: TradeState,
    /// Counter identifying the current play-through
    pub current_game: i64,
}

impl Default for Game {
    fn default() -> Self {
        Self {
            state: GameState::Closed,
            current_round: 0,
            trade_state: TradeState::NotStarted,
            current_game: 1,
        }
    }
}

/// A registered team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub name: String,
    pub members: Vec<String>,
    #[serde(skip_serializing, default)]
    pub credentials: String,
    pub balance_id: BalanceId,
    pub shares: TeamShares,
    /// Purchased additional infos, in purchase order
    pub additional_info_ids: Vec<AdditionalInfoId>,
    pub random_event_id: Option<RandomEventId>,
    pub game_id: i64,
}

impl Team {
    /// Create an unsaved team; the store assigns the id
    pub fn new(
        name: impl Into<String>,
        credentials: impl Into<String>,
        balance_id: BalanceId,
        game_id: i64,
    ) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            updated_at: None,
            name: name.into(),
            members: Vec::new(),
            credentials: credentials.into(),
            balance_id,
            shares: TeamShares::default(),
            additional_info_ids: Vec::new(),
            random_event_id: None,
            game_id,
        }
    }

    pub fn owns_additional_info(&self, id: AdditionalInfoId) -> bool {
        self.additional_info_ids.contains(&id)
    }
}

/// Money owned by exactly one team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub amount: i64,
}

/// A purchase record against a balance in a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTransaction {
    pub id: TransactionId,
    pub balance_id: BalanceId,
    pub round: Round,
    /// Signed net cost
    pub amount: i64,
    /// Share deltas applied by this transaction
    pub details: Option<ShareChanges>,
    pub additional_info_id: Option<AdditionalInfoId>,
    pub random_event_id: Option<RandomEventId>,
}

impl BalanceTransaction {
    /// New shares transaction, the one slot per (balance, round)
    pub fn shares(balance_id: BalanceId, round: Round, amount: i64, details: ShareChanges) -> Self {
        Self {
            id: 0,
            balance_id,
            round,
            amount,
            details: Some(details),
            additional_info_id: None,
            random_event_id: None,
        }
    }

    pub fn additional_info(
        balance_id: BalanceId,
        round: Round,
        amount: i64,
        additional_info_id: AdditionalInfoId,
    ) -> Self {
        Self {
            id: 0,
            balance_id,
            round,
            amount,
            details: None,
            additional_info_id: Some(additional_info_id),
            random_event_id: None,
        }
    }

    /// True for the unique per-round shares slot
    pub fn is_shares_transaction(&self) -> bool {
        self.additional_info_id.is_none() && self.random_event_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

/// Price of a company in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyShare {
    pub id: i64,
    pub company_id: CompanyId,
    pub round: Round,
    pub price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum AdditionalInfoType {
    CompanyInfo,
    Analytics,
}

impl From<AdditionalInfoType> for i8 {
    fn from(value: AdditionalInfoType) -> Self {
        match value {
            AdditionalInfoType::CompanyInfo => 1,
            AdditionalInfoType::Analytics => 2,
        }
    }
}

impl TryFrom<i8> for AdditionalInfoType {
    type Error = GameError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AdditionalInfoType::CompanyInfo),
            2 => Ok(AdditionalInfoType::Analytics),
            other => Err(GameError::Internal(format!("unknown additional info type {other}"))),
        }
    }
}

/// A purchasable piece of information, available in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInfo {
    pub id: AdditionalInfoId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub info_type: AdditionalInfoType,
    pub cost: i64,
    pub company_id: Option<CompanyId>,
    pub round: Round,
}

/// Admin-editable game settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rounds_count: i32,
    pub round_duration: Duration,
    pub link_to_pdf: String,
    pub enable_random_events: bool,
    pub default_balance_amount: i64,
    pub default_additional_info_cost: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rounds_count: 3,
            round_duration: Duration::from_secs(300),
            link_to_pdf: String::new(),
            enable_random_events: false,
            default_balance_amount: 10_000,
            default_additional_info_cost: 0,
        }
    }
}

/// Team view returned to the team itself
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedTeam {
    pub team: Team,
    pub additional_infos: Vec<AdditionalInfo>,
    pub balance: i64,
    pub has_transaction_in_this_round: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResult {
    pub id: TeamId,
    pub team_name: String,
    pub score: i64,
}

/// Final standings of the current game
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GameStatistics {
    pub results: Vec<TeamResult>,
}

/// Outbound message fanned out to connected team clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Notification {
    TradePeriodChanged {
        #[serde(rename = "isTradeStage")]
        is_trade_stage: bool,
    },
    GameStateChanged {
        #[serde(rename = "gameState")]
        game_state: GameState,
    },
    RegistrationPeriodChanged {
        #[serde(rename = "isRegistrationStage")]
        is_registration_stage: bool,
    },
}

/// Price lookup keyed by company
pub type PriceTable = BTreeMap<CompanyId, i64>;
