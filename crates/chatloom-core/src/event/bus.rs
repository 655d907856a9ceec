//! Broadcast event bus for distributing `SessionEvent` to subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no active subscribers
//! is a no-op, so the store and orchestrator publish unconditionally.

use chatloom_types::event::SessionEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for session change notifications.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_types::chat::SessionId;

    fn title_event(title: &str) -> SessionEvent {
        SessionEvent::TitleChanged {
            session_id: SessionId::new(),
            title: title.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::SessionsChanged { active: None });

        let received = rx.recv().await.unwrap();
        assert_eq!(received, SessionEvent::SessionsChanged { active: None });
    }

    #[tokio::test]
    async fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.clone().subscribe();

        bus.clone().publish(title_event("Tokio tips"));

        assert!(matches!(rx1.recv().await.unwrap(), SessionEvent::TitleChanged { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), SessionEvent::TitleChanged { .. }));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(title_event("orphan"));
    }

    #[test]
    fn lagged_receiver_reports_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(title_event(&format!("title {i}")));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
