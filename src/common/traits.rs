//! Trait definitions for outbound collaborators

use crate::common::types::GameState;

/// Sink for phase-change notifications
///
/// The engine only reports what changed; fan-out to connected clients is
/// the sink's job. Methods are called synchronously from period
/// subscribers, so implementations must return quickly.
pub trait NotificationSink: Send + Sync {
    /// Trade period opened (`true`) or closed (`false`)
    fn notify_trade_period_changed(&self, is_trade: bool);

    /// Game moved to a new lifecycle state
    fn notify_game_state_changed(&self, state: GameState);

    /// Registration period opened (`true`) or closed (`false`)
    fn notify_registration_period_changed(&self, is_registration: bool);
}
