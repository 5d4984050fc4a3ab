use tokio::sync::broadcast;

use crate::models::FeedEvent;

/// Best-effort fan-out of dispatch activity.
///
/// Backed by a bounded broadcast channel: publishing never waits, a subscriber
/// that falls behind loses the oldest events, and publishing with nobody
/// listening is a no-op.
#[derive(Clone)]
pub struct FeedBroadcast {
    sender: broadcast::Sender<FeedEvent>,
}

impl FeedBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: FeedEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("No feed listeners");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let feed = FeedBroadcast::new(4);
        feed.publish(FeedEvent::new("nobody listens", 6, 1));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_event() {
        let feed = FeedBroadcast::new(4);
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();

        feed.publish(FeedEvent::new("sunset", 5, 2));

        assert_eq!(a.recv().await.unwrap().prompt, "sunset");
        let event = b.recv().await.unwrap();
        assert_eq!(event.steps, 5);
        assert_eq!(event.concurrent_requests, 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_never_blocks_publisher() {
        let feed = FeedBroadcast::new(2);
        let mut slow = feed.subscribe();

        for i in 0..10 {
            feed.publish(FeedEvent::new(format!("p{}", i), 1, 1));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(_))));
        assert_eq!(slow.recv().await.unwrap().prompt, "p8");
    }
}
