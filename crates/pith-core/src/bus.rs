use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::event::{EventEnvelope, TurnEvent};

/// Bounded per-subscriber buffer. A subscriber that falls this far behind
/// the producer is considered lagged rather than back-pressuring the
/// orchestrator.
const CHANNEL_CAPACITY: usize = 256;

struct SessionChannel {
    tx: broadcast::Sender<EventEnvelope>,
    seq: AtomicU64,
}

/// Per-session, many-subscribers-one-producer event fan-out.
///
/// Publication never blocks: a subscriber that cannot keep up has its
/// oldest unread events silently dropped by the underlying broadcast
/// channel, and learns about it as a `SubscriberLagged` event the next
/// time it polls, in place of whatever it missed.
#[derive(Default)]
pub struct EventBus {
    sessions: Mutex<HashMap<String, Arc<SessionChannel>>>,
}

/// A session's live event stream as seen by one subscriber.
pub struct Subscription {
    rx: broadcast::Receiver<EventEnvelope>,
}

impl Subscription {
    /// Await the next event, in publication order, unless this subscriber
    /// has lagged — in which case the next call instead yields a single
    /// `SubscriberLagged` event in place of everything that was dropped,
    /// after which publication order resumes.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(EventEnvelope {
                        turn_id: String::new(),
                        seq: 0,
                        event: TurnEvent::SubscriberLagged { skipped },
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_for(&self, sessions: &mut HashMap<String, Arc<SessionChannel>>, session_id: &str) -> Arc<SessionChannel> {
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                Arc::new(SessionChannel { tx, seq: AtomicU64::new(0) })
            })
            .clone()
    }

    /// Subscribe to a session's event stream, creating the channel if this
    /// is the first subscriber.
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        let mut sessions = self.sessions.lock().await;
        let channel = self.channel_for(&mut sessions, session_id);
        Subscription { rx: channel.tx.subscribe() }
    }

    /// Publish an event for `session_id` under `turn_id`, stamping it with
    /// the next sequence number for that session. A session with no
    /// subscribers simply drops the event (`broadcast::Sender::send`
    /// returning an error is not a failure here).
    pub async fn publish(&self, session_id: &str, turn_id: &str, event: TurnEvent) {
        let mut sessions = self.sessions.lock().await;
        let channel = self.channel_for(&mut sessions, session_id);
        let seq = channel.seq.fetch_add(1, Ordering::Relaxed);
        let _ = channel.tx.send(EventEnvelope { turn_id: turn_id.to_string(), seq, event });
    }

    /// Publish an event to every session that has ever had a subscriber,
    /// for events with no single owning session — extension hot-reload
    /// outcomes in particular (§8, scenarios S2/S3), which are a
    /// process-wide occurrence rather than something one turn produces.
    /// A process with no sessions yet simply has nothing to publish to.
    pub async fn publish_all(&self, turn_id: &str, event: TurnEvent) {
        let sessions = self.sessions.lock().await;
        for channel in sessions.values() {
            let seq = channel.seq.fetch_add(1, Ordering::Relaxed);
            let _ = channel.tx.send(EventEnvelope { turn_id: turn_id.to_string(), seq, event: event.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_delivered_in_publication_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("s1").await;
        bus.publish("s1", "t1", TurnEvent::AssistantDelta { text: "a".into() }).await;
        bus.publish("s1", "t1", TurnEvent::AssistantDelta { text: "b".into() }).await;

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish("s1", "t1", TurnEvent::TurnFinished { status: crate::event::TurnStatus::Ok }).await;
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_subscriber_lagged() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("s1").await;
        for i in 0..(CHANNEL_CAPACITY + 10) {
            bus.publish("s1", "t1", TurnEvent::AssistantDelta { text: i.to_string() }).await;
        }
        let event = sub.next().await.unwrap();
        assert!(matches!(event.event, TurnEvent::SubscriberLagged { .. }));
    }

    #[tokio::test]
    async fn separate_sessions_are_independent() {
        let bus = EventBus::new();
        let mut sub_a = bus.subscribe("a").await;
        let mut sub_b = bus.subscribe("b").await;
        bus.publish("a", "t1", TurnEvent::AssistantDelta { text: "only-a".into() }).await;

        let event = sub_a.next().await.unwrap();
        assert!(matches!(event.event, TurnEvent::AssistantDelta { text } if text == "only-a"));

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub_b.next()).await;
        assert!(result.is_err(), "subscriber on session b should not see session a's events");
    }

    #[tokio::test]
    async fn publish_all_reaches_every_known_session() {
        let bus = EventBus::new();
        let mut sub_a = bus.subscribe("a").await;
        let mut sub_b = bus.subscribe("b").await;

        bus.publish_all("", TurnEvent::ReloadFailure { kind: "reserved_prefix".into(), detail: "MCP__x".into() }).await;

        let event_a = sub_a.next().await.unwrap();
        let event_b = sub_b.next().await.unwrap();
        assert!(matches!(event_a.event, TurnEvent::ReloadFailure { .. }));
        assert!(matches!(event_b.event, TurnEvent::ReloadFailure { .. }));
    }
}
