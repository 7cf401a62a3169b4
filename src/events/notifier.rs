//! Named-subscriber fan-out with per-delivery deadlines.
//!
//! # Responsibilities
//! - Register and remove named subscribers, each with a bounded queue
//! - Deliver every broadcast to each subscriber on its own task
//! - Drop a delivery, with a warning, once its deadline passes
//! - Force the shared status flag down whenever an error is broadcast

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::NotifyConfig;
use crate::events::types::{Event, EventKind};
use crate::health::StatusFlag;
use crate::observability::metrics;

/// Receiving end handed to a subscriber.
///
/// After unsubscribe it still yields what was queued before the close,
/// then `None`.
#[derive(Debug)]
pub struct EventQueue {
    name: String,
    rx: mpsc::Receiver<Event>,
    closed: CancellationToken,
}

impl EventQueue {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            event = self.rx.recv() => event,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// Take a notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Sending half of a subscription.
///
/// `closed` is cancelled exactly once, by [`Subscription::close`]; a
/// delivery that has not committed by then is abandoned. Sends hold `gate`
/// for reading and closing takes it for writing, so no send lands after
/// `close` returns.
#[derive(Debug, Clone)]
pub(crate) struct Subscription {
    tx: mpsc::Sender<Event>,
    closed: CancellationToken,
    gate: Arc<RwLock<()>>,
}

impl Subscription {
    fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            tx,
            closed: CancellationToken::new(),
            gate: Arc::new(RwLock::new(())),
        }
    }

    fn close(&self) {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.closed.cancel();
    }
}

/// Outcome of one bounded send.
#[derive(Debug)]
pub(crate) enum SendOutcome {
    Delivered,
    /// The deadline passed; the event is handed back for reporting.
    TimedOut(Event),
    /// The subscription closed before the event could be queued.
    Closed,
}

/// Queue `event` on `queue`, waiting at most `deadline` for room.
pub(crate) async fn try_send_with_deadline(
    queue: &Subscription,
    event: Event,
    deadline: Duration,
) -> SendOutcome {
    let reserve = async {
        tokio::select! {
            biased;
            _ = queue.closed.cancelled() => None,
            permit = queue.tx.reserve() => permit.ok(),
        }
    };

    match time::timeout(deadline, reserve).await {
        Err(_) => SendOutcome::TimedOut(event),
        Ok(None) => SendOutcome::Closed,
        Ok(Some(permit)) => {
            let _gate = queue.gate.read().unwrap_or_else(PoisonError::into_inner);
            if queue.closed.is_cancelled() {
                return SendOutcome::Closed;
            }
            permit.send(event);
            SendOutcome::Delivered
        }
    }
}

/// Per-kind delivery deadlines.
#[derive(Debug, Clone, Copy)]
struct DeliveryPolicy {
    error_deadline: Duration,
    status_deadline: Duration,
}

impl DeliveryPolicy {
    fn deadline_for(&self, kind: EventKind) -> Duration {
        match kind {
            EventKind::Error => self.error_deadline,
            EventKind::Status => self.status_deadline,
        }
    }

    /// Time a whole batch may take for one subscriber: the longest deadline
    /// among its events.
    fn budget_for(&self, events: &[Event]) -> Duration {
        events
            .iter()
            .map(|event| self.deadline_for(event.kind()))
            .max()
            .unwrap_or_default()
    }
}

/// Registry of named subscribers and the broadcaster that feeds them.
#[derive(Debug)]
pub struct Notifier {
    subscribers: DashMap<String, Subscription>,
    status: Arc<StatusFlag>,
    policy: DeliveryPolicy,
    queue_capacity: usize,
}

impl Notifier {
    /// Create a notifier that forces `status` down on every error broadcast.
    pub fn new(status: Arc<StatusFlag>, config: &NotifyConfig) -> Self {
        Self {
            subscribers: DashMap::new(),
            status,
            policy: DeliveryPolicy {
                error_deadline: Duration::from_millis(config.error_deadline_ms),
                status_deadline: Duration::from_millis(config.status_deadline_ms),
            },
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// Register a subscriber.
    ///
    /// # Panics
    /// If `name` is already registered. Subscriber names are fixed by the
    /// code that owns them, so a clash is a wiring bug.
    pub fn subscribe(&self, name: &str) -> EventQueue {
        let opened = match self.subscribers.entry(name.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.queue_capacity);
                let subscription = Subscription::new(tx);
                let closed = subscription.closed.clone();
                slot.insert(subscription);
                Some((rx, closed))
            }
        };
        let Some((rx, closed)) = opened else {
            panic!("duplicated subscriber: {name}");
        };

        metrics::record_subscribers(self.subscribers.len());
        tracing::debug!(component = "notifier", subscriber = %name, "Subscriber registered");

        EventQueue {
            name: name.to_string(),
            rx,
            closed,
        }
    }

    /// Close and remove a subscriber. Unknown names are ignored.
    pub fn unsubscribe(&self, name: &str) {
        if let Some((_, subscription)) = self.subscribers.remove(name) {
            subscription.close();
            metrics::record_subscribers(self.subscribers.len());
            tracing::debug!(component = "notifier", subscriber = %name, "Subscriber removed");
        }
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.subscribers.contains_key(name)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver one event to every current subscriber.
    pub async fn broadcast(&self, event: Event) {
        self.broadcast_batch(vec![event]).await;
    }

    /// Deliver `events`, in order, to every current subscriber.
    ///
    /// Each subscriber gets its own task, so a stalled one costs the caller
    /// at most the longest deadline in the batch. Returns once every
    /// delivery has landed, timed out, or been abandoned.
    pub async fn broadcast_batch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let targets: Vec<(String, Subscription)> = self
            .subscribers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let events = Arc::new(events);
        let mut deliveries = JoinSet::new();
        for (name, subscription) in targets {
            deliveries.spawn(deliver(name, subscription, events.clone(), self.policy));
        }

        if events.iter().any(Event::is_error) {
            self.status.mark_down();
        }

        while let Some(result) = deliveries.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }
}

async fn deliver(
    name: String,
    subscription: Subscription,
    events: Arc<Vec<Event>>,
    policy: DeliveryPolicy,
) {
    let batch_deadline = Instant::now() + policy.budget_for(&events);

    for event in events.iter() {
        let remaining = batch_deadline.saturating_duration_since(Instant::now());
        let deadline = policy.deadline_for(event.kind()).min(remaining);
        match try_send_with_deadline(&subscription, event.clone(), deadline).await {
            SendOutcome::Delivered => metrics::record_notification("delivered"),
            SendOutcome::Closed => {
                metrics::record_notification("closed");
                return;
            }
            SendOutcome::TimedOut(event) => {
                metrics::record_notification("dropped");
                report_timeout(&name, &event, deadline);
            }
        }
    }
}

fn report_timeout(name: &str, event: &Event, deadline: Duration) {
    match event.kind() {
        EventKind::Error => match event.as_error() {
            Ok(cause) => tracing::warn!(
                component = "notifier",
                subscriber = %name,
                error = %cause,
                deadline_ms = deadline.as_millis() as u64,
                "Timed out sending an error notification, dropped"
            ),
            Err(e) => panic!("error notification for '{name}' carries a non-error payload: {e}"),
        },
        EventKind::Status => tracing::warn!(
            component = "notifier",
            subscriber = %name,
            up = event.as_status().map(|s| s.up).unwrap_or_default(),
            deadline_ms = deadline.as_millis() as u64,
            "Notification to subscriber took too long, dropped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use std::time::Instant;

    fn notifier(capacity: usize) -> (Arc<StatusFlag>, Notifier) {
        let status = Arc::new(StatusFlag::new());
        let config = NotifyConfig {
            error_deadline_ms: 300,
            status_deadline_ms: 1000,
            queue_capacity: capacity,
        };
        (status.clone(), Notifier::new(status, &config))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let (_, notifier) = notifier(4);
        let mut a = notifier.subscribe("a");
        let mut b = notifier.subscribe("b");

        notifier.broadcast(Event::status(true, true)).await;

        assert_eq!(a.recv().await, Some(Event::status(true, true)));
        assert_eq!(b.recv().await, Some(Event::status(true, true)));
        assert_eq!(a.name(), "a");
    }

    #[tokio::test]
    #[should_panic(expected = "duplicated subscriber")]
    async fn test_duplicate_subscriber_panics() {
        let (_, notifier) = notifier(4);
        let _first = notifier.subscribe("menu");
        let _second = notifier.subscribe("menu");
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe() {
        let (_, notifier) = notifier(4);
        let _first = notifier.subscribe("menu");
        notifier.unsubscribe("menu");
        assert!(!notifier.is_subscribed("menu"));

        let mut second = notifier.subscribe("menu");
        notifier.broadcast(Event::status(true, false)).await;
        assert_eq!(second.recv().await, Some(Event::status(true, false)));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let (_, notifier) = notifier(4);
        let mut queue = notifier.subscribe("gone");
        notifier.unsubscribe("gone");
        notifier.unsubscribe("gone");
        notifier.unsubscribe("never-registered");

        assert_eq!(queue.recv().await, None);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_does_not_block_others() {
        let (_, notifier) = notifier(1);
        let _stalled = notifier.subscribe("stalled");
        let mut healthy: Vec<_> = (0..3)
            .map(|i| notifier.subscribe(&format!("healthy-{i}")))
            .collect();

        // Fill the stalled queue.
        notifier.broadcast(Event::status(true, true)).await;
        for queue in &mut healthy {
            assert!(queue.try_recv().is_some());
        }

        let wall = Instant::now();
        let virtual_start = time::Instant::now();
        notifier.broadcast(Event::status(true, false)).await;

        // Bounded by the single status deadline, not by the stalled consumer.
        assert!(virtual_start.elapsed() >= Duration::from_millis(1000));
        assert!(virtual_start.elapsed() < Duration::from_millis(1100));
        assert!(wall.elapsed() < Duration::from_secs(1));
        for queue in &mut healthy {
            assert_eq!(queue.try_recv(), Some(Event::status(true, false)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_order_preserved() {
        let (_, notifier) = notifier(4);
        let mut queue = notifier.subscribe("ordered");

        notifier
            .broadcast_batch(vec![
                Event::error(BackendError::Http("connection refused".into())),
                Event::status(false, false),
            ])
            .await;

        assert!(queue.recv().await.unwrap().is_error());
        assert_eq!(queue.recv().await, Some(Event::status(false, false)));
    }

    #[tokio::test]
    async fn test_error_broadcast_forces_status_down() {
        let (status, notifier) = notifier(4);
        status.mark_up();
        assert!(status.is_up());

        notifier.broadcast(Event::error(BackendError::Timeout(50))).await;
        assert!(!status.is_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_abandons_pending_delivery() {
        let (_, notifier) = notifier(1);
        let notifier = Arc::new(notifier);
        let mut queue = notifier.subscribe("slow");
        notifier.broadcast(Event::status(true, true)).await;

        let pending = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.broadcast(Event::status(true, false)).await })
        };
        tokio::task::yield_now().await;
        notifier.unsubscribe("slow");
        pending.await.unwrap();

        assert_eq!(queue.recv().await, Some(Event::status(true, true)));
        assert_eq!(queue.recv().await, None);
    }

    async fn fill_stalled(notifier: &Notifier, healthy: &mut [EventQueue]) {
        notifier.broadcast(Event::status(true, true)).await;
        for queue in healthy {
            assert!(queue.try_recv().is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_dropped_after_error_deadline() {
        let (_, notifier) = notifier(1);
        let mut stalled = notifier.subscribe("stalled");
        let mut healthy = vec![notifier.subscribe("menu"), notifier.subscribe("icon")];
        fill_stalled(&notifier, &mut healthy).await;

        let start = time::Instant::now();
        notifier
            .broadcast(Event::error(BackendError::Http("connection refused".into())))
            .await;

        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(400));
        for queue in &mut healthy {
            assert!(queue.try_recv().unwrap().is_error());
        }
        assert_eq!(stalled.try_recv(), Some(Event::status(true, true)));
        assert_eq!(stalled.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_batch_bounded_by_longest_deadline() {
        let (_, notifier) = notifier(1);
        let _stalled = notifier.subscribe("stalled");
        let mut healthy = vec![notifier.subscribe("menu")];
        fill_stalled(&notifier, &mut healthy).await;

        let start = time::Instant::now();
        notifier
            .broadcast_batch(vec![
                Event::error(BackendError::Timeout(50)),
                Event::status(false, false),
            ])
            .await;

        // Error and status share one budget of the status deadline.
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1100));
        assert!(healthy[0].try_recv().unwrap().is_error());
        assert_eq!(healthy[0].try_recv(), Some(Event::status(false, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_ends_after_close_while_delivery_pending() {
        let (_, notifier) = notifier(1);
        let notifier = Arc::new(notifier);
        let mut queue = notifier.subscribe("slow");
        notifier.broadcast(Event::status(true, true)).await;

        let pending = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.broadcast(Event::status(true, false)).await })
        };
        tokio::task::yield_now().await;
        notifier.unsubscribe("slow");

        // The pending task still holds a sender; recv must not wait for it.
        assert_eq!(queue.recv().await, Some(Event::status(true, true)));
        assert_eq!(queue.recv().await, None);
        pending.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsubscribe_racing_delivery_never_writes_after_close() {
        for round in 0..200 {
            let (_, notifier) = notifier(1);
            let notifier = Arc::new(notifier);
            let mut queue = notifier.subscribe("racer");
            notifier.broadcast(Event::status(true, true)).await;

            let pending = {
                let notifier = notifier.clone();
                tokio::spawn(async move { notifier.broadcast(Event::status(true, false)).await })
            };
            let closer = {
                let notifier = notifier.clone();
                tokio::spawn(async move { notifier.unsubscribe("racer") })
            };

            // Free the slot so the pending delivery competes with the close.
            assert_eq!(queue.try_recv(), Some(Event::status(true, true)));
            closer.await.unwrap();

            let queued_before_close = std::iter::from_fn(|| queue.try_recv()).count();
            pending.await.unwrap();

            assert!(queued_before_close <= 1, "round {round}");
            assert_eq!(queue.try_recv(), None, "round {round}: written after close");
            assert_eq!(queue.recv().await, None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_churn_during_broadcast() {
        let (_, notifier) = notifier(8);
        let notifier = Arc::new(notifier);
        let done = CancellationToken::new();

        let producer = {
            let notifier = notifier.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let mut sent = 0u64;
                while !done.is_cancelled() {
                    notifier.broadcast(Event::status(true, false)).await;
                    sent += 1;
                    tokio::task::yield_now().await;
                }
                sent
            })
        };

        let mut churners = JoinSet::new();
        for worker in 0..4 {
            let notifier = notifier.clone();
            churners.spawn(async move {
                for round in 0..200 {
                    let name = format!("w{worker}-{round}");
                    let mut queue = notifier.subscribe(&name);
                    tokio::task::yield_now().await;
                    notifier.unsubscribe(&name);

                    while queue.try_recv().is_some() {}
                    tokio::task::yield_now().await;
                    assert_eq!(queue.try_recv(), None, "{name} written after close");
                    assert!(!notifier.is_subscribed(&name));
                }
            });
        }
        while let Some(result) = churners.join_next().await {
            result.unwrap();
        }

        done.cancel();
        assert!(producer.await.unwrap() > 0);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
