//! Process-wide advisory shown while the credential is out of quota.

use tokio::sync::watch;

/// A dismissible notice shown outside any transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub message: String,
}

/// Holds at most one advisory. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct AdvisoryState {
    sender: watch::Sender<Option<Advisory>>,
}

impl AdvisoryState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Show `message`, replacing any current advisory.
    pub fn raise(&self, message: impl Into<String>) {
        let advisory = Advisory {
            message: message.into(),
        };
        self.sender.send_replace(Some(advisory));
    }

    pub fn dismiss(&self) {
        self.sender.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<Advisory> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Advisory>> {
        self.sender.subscribe()
    }
}

impl Default for AdvisoryState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::classify::QUOTA_ADVISORY;

    #[test]
    fn test_raise_and_dismiss() {
        let state = AdvisoryState::new();
        assert!(state.current().is_none());

        state.raise(QUOTA_ADVISORY);
        assert_eq!(state.current().unwrap().message, QUOTA_ADVISORY);

        state.dismiss();
        assert!(state.current().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let state = AdvisoryState::new();
        let mut rx = state.subscribe();

        state.clone().raise("slow down");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().message, "slow down");

        state.dismiss();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn test_dismiss_without_advisory_does_not_notify() {
        let state = AdvisoryState::new();
        let rx = state.subscribe();
        state.dismiss();
        assert!(!rx.has_changed().unwrap());
    }
}
