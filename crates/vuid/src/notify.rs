//! Outbound notification bus.
//!
//! Single broadcast channel from the supervisor to every external consumer
//! (indicator, transport adapters, the daemon's notification log).

use tokio::sync::broadcast;
use tracing::trace;
use vui_core::{Notification, NotificationEnvelope};

#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<NotificationEnvelope>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEnvelope> {
        self.sender.subscribe()
    }

    /// Publish a notification, returning how many subscribers received it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, notification: Notification) -> usize {
        let envelope = NotificationEnvelope::new(notification);
        match self.sender.send(envelope) {
            Ok(count) => count,
            Err(e) => {
                trace!(
                    notification = e.0.notification_type.as_str(),
                    "no notification subscribers"
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};
    use vui_core::NotificationType;

    #[tokio::test]
    async fn publish_and_receive() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        assert_eq!(notifier.publish(Notification::set_stack(":a")), 1);

        let received = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("timeout")
            .expect("recv");
        assert_eq!(received.notification_type, NotificationType::SetStack);
        assert_eq!(received.payload, Notification::set_stack(":a"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive() {
        let notifier = Notifier::new(8);
        let mut rx1 = notifier.subscribe();
        let mut rx2 = notifier.subscribe();

        notifier.publish(Notification::set_pickup(true));

        assert_eq!(rx1.recv().await.unwrap().payload, Notification::set_pickup(true));
        assert_eq!(rx2.recv().await.unwrap().payload, Notification::set_pickup(true));
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let notifier = Notifier::new(8);
        assert_eq!(notifier.publish(Notification::set_pickup(false)), 0);
    }
}
