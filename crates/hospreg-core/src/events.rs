//! Events the client publishes for whatever UI is attached.

use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Visual hint for a transient message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeStyle {
    Success,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub style: NoticeStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend rejected the token; the UI should route to `login_route`.
    SessionExpired { login_route: String },
    /// Show a short-lived message.
    Notice(Notification),
}

/// Fire-and-forget publisher. Sending never blocks and never fails the caller.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers attached");
        }
    }

    pub fn notify(&self, text: impl Into<String>, style: NoticeStyle) {
        self.emit(ClientEvent::Notice(Notification {
            text: text.into(),
            style,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.notify("hello", NoticeStyle::Neutral);
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.notify("first", NoticeStyle::Success);
        bus.emit(ClientEvent::SessionExpired {
            login_route: "/pages/login/Login".to_string(),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Notice(Notification {
                text: "first".to_string(),
                style: NoticeStyle::Success,
            })
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientEvent::SessionExpired { .. }
        ));
    }
}
