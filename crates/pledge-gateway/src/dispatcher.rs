use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use pledge_types::events::GatewayEvent;

const BROADCAST_CAPACITY: usize = 1024;

/// Fans events out to every connected session.
///
/// Sessions are either connected or not: there is no presence list and no
/// room concept, only a count of live sockets.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Events pre-serialised once, shared by every session's send task.
    broadcast_tx: broadcast::Sender<Arc<str>>,
    sessions: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected sessions. Returns how many
    /// receivers it was queued for.
    pub fn broadcast(&self, event: &GatewayEvent) -> usize {
        let json: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("Dropping unserialisable gateway event: {}", e);
                return 0;
            }
        };
        // Err only means nobody is listening
        self.inner.broadcast_tx.send(json).unwrap_or(0)
    }

    pub fn session_opened(&self) -> usize {
        self.inner.sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn session_closed(&self) -> usize {
        self.inner.sessions.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pledge_types::models::ChatMessage;
    use uuid::Uuid;

    use super::*;

    fn event(text: &str) -> GatewayEvent {
        GatewayEvent::ChatMessage(ChatMessage {
            id: Uuid::new_v4(),
            text: text.into(),
            sender: "Ana".into(),
            user_id: None,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        assert_eq!(dispatcher.broadcast(&event("hello")), 2);

        for rx in [&mut a, &mut b] {
            let json = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["type"], "chat message");
            assert_eq!(value["data"]["text"], "hello");
        }
    }

    #[test]
    fn broadcast_without_sessions_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.broadcast(&event("nobody home")), 0);
    }

    #[test]
    fn session_count_tracks_open_and_close() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.session_opened(), 1);
        assert_eq!(dispatcher.session_opened(), 2);
        assert_eq!(dispatcher.session_closed(), 1);
        assert_eq!(dispatcher.session_opened(), 2);
    }
}
