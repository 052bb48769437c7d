//! Notification fan-out
//!
//! [`BroadcastNotifier`] turns phase changes into [`Notification`] messages
//! on a tokio broadcast channel. A transport layer subscribes and forwards
//! the JSON encoding to connected clients.

use tokio::sync::broadcast;
use tracing::trace;

use crate::common::channels::{create_notification_channel, create_notification_channel_with_size};
use crate::common::traits::NotificationSink;
use crate::common::types::{GameState, Notification};

/// [`NotificationSink`] backed by a broadcast channel
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = create_notification_channel();
        Self { tx }
    }

    pub fn with_capacity(size: usize) -> Self {
        let (tx, _) = create_notification_channel_with_size(size);
        Self { tx }
    }

    /// Receive every notification sent after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, notification: Notification) {
        trace!(?notification, "sending notification");
        // no receivers is fine; nobody is connected yet
        let _ = self.tx.send(notification);
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify_trade_period_changed(&self, is_trade: bool) {
        self.send(Notification::TradePeriodChanged {
            is_trade_stage: is_trade,
        });
    }

    fn notify_game_state_changed(&self, state: GameState) {
        self.send(Notification::GameStateChanged { game_state: state });
    }

    fn notify_registration_period_changed(&self, is_registration: bool) {
        self.send(Notification::RegistrationPeriodChanged {
            is_registration_stage: is_registration,
        });
    }
}
