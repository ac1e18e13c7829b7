//! The service messenger: a broadcast bus for the two things a job
//! reports without being asked — going unresponsive, and surfacing an
//! error the core itself can't interpret.

use tokio::sync::broadcast;

/// One of these fires at most once per job per condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// The isolate stopped answering `ping` within
    /// `unresponsive_polling_interval + unresponsive_timeout`.
    Unresponsive {
        /// The snap whose isolate went quiet.
        snap_id: String,
    },
    /// The isolate pushed a `{error, id: null}` frame on the `command`
    /// channel — an error with no in-flight call to attribute it to.
    UnhandledError {
        /// The snap that raised it.
        snap_id: String,
        /// The error message, verbatim.
        message: String,
    },
}

/// A cloneable handle onto the event bus. Events are only delivered to
/// subscribers that already exist when `publish` runs — a subscriber
/// created after an event was published never sees it, matching
/// `tokio::sync::broadcast`'s normal semantics.
#[derive(Clone)]
pub struct ServiceMessenger {
    tx: broadcast::Sender<ServiceEvent>,
}

impl ServiceMessenger {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A `SendError` (no subscribers) is not an
    /// error condition here — nobody watching is a legitimate state.
    pub fn publish(&self, event: ServiceEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ServiceMessenger {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let messenger = ServiceMessenger::default();
        let mut rx = messenger.subscribe();

        messenger.publish(ServiceEvent::Unresponsive {
            snap_id: "A".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ServiceEvent::Unresponsive {
                snap_id: "A".to_string()
            }
        );
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let messenger = ServiceMessenger::default();
        messenger.publish(ServiceEvent::UnhandledError {
            snap_id: "A".to_string(),
            message: "x".to_string(),
        });
    }
}
