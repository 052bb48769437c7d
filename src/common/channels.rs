//! Channel type definitions for notification fan-out

use tokio::sync::broadcast;

use super::types::Notification;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new notification channel with the default buffer size
pub fn create_notification_channel() -> (broadcast::Sender<Notification>, broadcast::Receiver<Notification>) {
    broadcast::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new notification channel with a custom buffer size
pub fn create_notification_channel_with_size(
    size: usize,
) -> (broadcast::Sender<Notification>, broadcast::Receiver<Notification>) {
    broadcast::channel(size)
}
