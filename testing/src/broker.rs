//! In-memory topic broker.
//!
//! [`InMemoryBroker`] implements [`Connector`], and the connections and
//! channels it hands out implement [`BrokerConnection`] and [`BrokerChannel`].
//! Routing follows topic-exchange rules through [`topic_matches`]:
//!
//! - a published message is copied once into every queue with at least one
//!   matching binding on the target exchange
//! - a message that matches nothing is dropped
//! - an exclusive or auto-deleting queue disappears when the channel that
//!   declared it is closed, which ends its delivery stream
//!
//! Failures can be injected per operation so error paths of the emitter,
//! consumer and connection manager can be driven without a real broker.

use event_relay_core::error::RelayError;
use event_relay_core::routing::topic_matches;
use event_relay_core::transport::{
    AckMode, BoxFuture, BrokerChannel, BrokerConnection, Connector, Delivery, DeliveryAcker,
    DeliveryStream, ExchangeSpec, OutboundMessage, QueueSpec,
};
use std::collections::{HashMap, HashSet};
use std::future::ready;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type DeliveryResult = Result<Delivery, RelayError>;

/// A message the broker accepted from a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Target exchange
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Raw body
    pub body: Vec<u8>,
    /// Content type property
    pub content_type: String,
}

impl PublishedMessage {
    /// The body as UTF-8 text (lossy).
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A `(exchange, pattern)` pair bound to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Source exchange
    pub exchange: String,
    /// Routing pattern
    pub pattern: String,
}

struct QueueState {
    owner: u64,
    transient: bool,
    bindings: Vec<Binding>,
    sender: UnboundedSender<DeliveryResult>,
    receiver: Option<UnboundedReceiver<DeliveryResult>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueState>,
    published: Vec<PublishedMessage>,
    next_queue: u64,
    next_channel: u64,
    open_channels: usize,
    dials: usize,
    acks: usize,
    connect_failures: usize,
    bind_failures: HashSet<String>,
    channel_failures: bool,
    publish_failures: bool,
    disconnected: bool,
}

type Shared = Arc<Mutex<BrokerState>>;

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory topic broker for tests.
///
/// Clones share the same broker.
///
/// # Example
///
/// ```
/// use event_relay_core::transport::Connector;
/// use event_relay_testing::InMemoryBroker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// broker.fail_next_connects(2);
///
/// assert!(broker.connect("amqp://test").await.is_err());
/// assert!(broker.connect("amqp://test").await.is_err());
/// assert!(broker.connect("amqp://test").await.is_ok());
/// assert_eq!(broker.dial_count(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Shared,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` dials fail with [`RelayError::ConnectionFailed`].
    pub fn fail_next_connects(&self, n: usize) {
        lock(&self.state).connect_failures = n;
    }

    /// Reject every binding that uses `pattern`.
    pub fn fail_bind(&self, pattern: impl Into<String>) {
        lock(&self.state).bind_failures.insert(pattern.into());
    }

    /// Make `open_channel` fail on every connection.
    pub fn fail_channels(&self, fail: bool) {
        lock(&self.state).channel_failures = fail;
    }

    /// Make every publish fail synchronously.
    pub fn fail_publishes(&self, fail: bool) {
        lock(&self.state).publish_failures = fail;
    }

    /// Push a transport error into every consumed delivery stream.
    pub fn fail_deliveries(&self, reason: &str) {
        let state = lock(&self.state);
        for queue in state.queues.values().filter(|q| q.receiver.is_none()) {
            let _ = queue
                .sender
                .send(Err(RelayError::ConsumeFailed(reason.to_string())));
        }
    }

    /// Remove an exchange, as an operator deleting it would. Bindings that
    /// reference it stop routing.
    pub fn delete_exchange(&self, name: &str) {
        let mut state = lock(&self.state);
        state.exchanges.remove(name);
        for queue in state.queues.values_mut() {
            queue.bindings.retain(|b| b.exchange != name);
        }
    }

    /// Simulate the broker going away: every queue is dropped, which ends all
    /// delivery streams, and no further channels can be opened.
    pub fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.queues.clear();
        state.disconnected = true;
    }

    /// Number of dial attempts so far, including failed ones.
    #[must_use]
    pub fn dial_count(&self) -> usize {
        lock(&self.state).dials
    }

    /// The declaration of `name`, if it was declared.
    #[must_use]
    pub fn exchange(&self, name: &str) -> Option<ExchangeSpec> {
        lock(&self.state).exchanges.get(name).cloned()
    }

    /// Every message accepted by an exchange, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    /// Names of the queues that currently exist.
    #[must_use]
    pub fn queues(&self) -> Vec<String> {
        lock(&self.state).queues.keys().cloned().collect()
    }

    /// Bindings of `queue`, in bind order.
    #[must_use]
    pub fn bindings(&self, queue: &str) -> Vec<Binding> {
        lock(&self.state)
            .queues
            .get(queue)
            .map(|q| q.bindings.clone())
            .unwrap_or_default()
    }

    /// Number of queues that have an active consumer.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        lock(&self.state)
            .queues
            .values()
            .filter(|q| q.receiver.is_none())
            .count()
    }

    /// Number of channels opened and not yet closed.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        lock(&self.state).open_channels
    }

    /// Number of deliveries acknowledged by consumers.
    #[must_use]
    pub fn ack_count(&self) -> usize {
        lock(&self.state).acks
    }

    /// Wait until at least `n` queues are being consumed.
    ///
    /// Returns `false` if that does not happen within the polling window.
    pub async fn wait_for_consumers(&self, n: usize) -> bool {
        crate::eventually(|| self.consumer_count() >= n).await
    }
}

impl Connector for InMemoryBroker {
    fn connect<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn BrokerConnection>, RelayError>> {
        let mut state = lock(&self.state);
        state.dials += 1;

        let result = if state.connect_failures > 0 {
            state.connect_failures -= 1;
            Err(RelayError::ConnectionFailed(format!(
                "connection refused: {address}"
            )))
        } else {
            state.disconnected = false;
            Ok(Arc::new(InMemoryConnection {
                state: Arc::clone(&self.state),
            }) as Arc<dyn BrokerConnection>)
        };

        Box::pin(ready(result))
    }
}

/// Connection handed out by [`InMemoryBroker`].
pub struct InMemoryConnection {
    state: Shared,
}

impl BrokerConnection for InMemoryConnection {
    fn open_channel(&self) -> BoxFuture<'_, Result<Box<dyn BrokerChannel>, RelayError>> {
        let mut state = lock(&self.state);

        let result = if state.disconnected {
            Err(RelayError::ChannelFailed("connection closed".to_string()))
        } else if state.channel_failures {
            Err(RelayError::ChannelFailed("channel limit reached".to_string()))
        } else {
            state.next_channel += 1;
            state.open_channels += 1;
            Ok(Box::new(InMemoryChannel {
                id: state.next_channel,
                state: Arc::clone(&self.state),
                closed: AtomicBool::new(false),
            }) as Box<dyn BrokerChannel>)
        };

        Box::pin(ready(result))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), RelayError>> {
        Box::pin(ready(Ok(())))
    }
}

/// Channel handed out by [`InMemoryConnection`].
pub struct InMemoryChannel {
    id: u64,
    state: Shared,
    closed: AtomicBool,
}

impl InMemoryChannel {
    fn declare_exchange_now(&self, exchange: &ExchangeSpec) -> Result<(), RelayError> {
        let mut state = lock(&self.state);
        match state.exchanges.get(&exchange.name) {
            Some(existing) if existing != exchange => Err(RelayError::DeclareFailed {
                exchange: exchange.name.clone(),
                reason: "PRECONDITION_FAILED - inequivalent arg for exchange".to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                state
                    .exchanges
                    .insert(exchange.name.clone(), exchange.clone());
                Ok(())
            }
        }
    }

    fn declare_queue_now(&self, queue: &QueueSpec) -> String {
        let mut state = lock(&self.state);

        let name = if queue.name.is_empty() {
            state.next_queue += 1;
            format!("amq.gen-{}", state.next_queue)
        } else {
            queue.name.clone()
        };

        if !state.queues.contains_key(&name) {
            let (sender, receiver) = mpsc::unbounded_channel();
            state.queues.insert(
                name.clone(),
                QueueState {
                    owner: self.id,
                    transient: queue.exclusive || queue.auto_delete,
                    bindings: Vec::new(),
                    sender,
                    receiver: Some(receiver),
                },
            );
        }

        name
    }

    fn bind_now(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), RelayError> {
        let mut state = lock(&self.state);
        let failure = |reason: &str| RelayError::BindFailed {
            queue: queue.to_string(),
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if state.bind_failures.contains(pattern) {
            return Err(failure("ACCESS_REFUSED - binding rejected"));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(failure("NOT_FOUND - no exchange"));
        }

        let Some(target) = state.queues.get_mut(queue) else {
            return Err(failure("NOT_FOUND - no queue"));
        };

        let binding = Binding {
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
        };
        if !target.bindings.contains(&binding) {
            target.bindings.push(binding);
        }
        Ok(())
    }

    fn publish_now(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), RelayError> {
        let mut state = lock(&self.state);
        let failure = |reason: &str| RelayError::PublishFailed {
            routing_key: routing_key.to_string(),
            reason: reason.to_string(),
        };

        if state.publish_failures {
            return Err(failure("channel closed"));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(failure("NOT_FOUND - no exchange"));
        }

        for queue in state.queues.values() {
            let routed = queue
                .bindings
                .iter()
                .any(|b| b.exchange == exchange && topic_matches(&b.pattern, routing_key));
            if routed {
                let _ = queue
                    .sender
                    .send(Ok(Delivery::new(routing_key, message.body.clone())));
            }
        }

        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: message.body,
            content_type: message.content_type,
        });
        Ok(())
    }

    fn consume_now(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream, RelayError> {
        let receiver = {
            let mut state = lock(&self.state);
            let Some(target) = state.queues.get_mut(queue) else {
                return Err(RelayError::ConsumeFailed(format!(
                    "NOT_FOUND - no queue '{queue}'"
                )));
            };
            target.receiver.take().ok_or_else(|| {
                RelayError::ConsumeFailed(format!(
                    "ACCESS_REFUSED - queue '{queue}' already has a consumer"
                ))
            })?
        };

        let state = Arc::clone(&self.state);
        let stream = async_stream::stream! {
            let mut receiver = receiver;
            while let Some(item) = receiver.recv().await {
                yield item.map(|mut delivery| {
                    if ack_mode == AckMode::AfterDispatch {
                        delivery.acker = Some(Arc::new(CountingAcker {
                            state: Arc::clone(&state),
                        }) as Arc<dyn DeliveryAcker>);
                    }
                    delivery
                });
            }
        };

        Ok(Box::pin(stream))
    }

    fn close_now(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = lock(&self.state);
        state.open_channels = state.open_channels.saturating_sub(1);
        state
            .queues
            .retain(|_, queue| !(queue.transient && queue.owner == self.id));
    }
}

impl BrokerChannel for InMemoryChannel {
    fn declare_exchange<'a>(
        &'a self,
        exchange: &'a ExchangeSpec,
    ) -> BoxFuture<'a, Result<(), RelayError>> {
        Box::pin(ready(self.declare_exchange_now(exchange)))
    }

    fn declare_queue<'a>(
        &'a self,
        queue: &'a QueueSpec,
    ) -> BoxFuture<'a, Result<String, RelayError>> {
        Box::pin(ready(Ok(self.declare_queue_now(queue))))
    }

    fn bind_queue<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<(), RelayError>> {
        Box::pin(ready(self.bind_now(queue, exchange, pattern)))
    }

    fn publish<'a>(
        &'a self,
        exchange: &'a str,
        routing_key: &'a str,
        message: OutboundMessage,
    ) -> BoxFuture<'a, Result<(), RelayError>> {
        Box::pin(ready(self.publish_now(exchange, routing_key, message)))
    }

    fn consume<'a>(
        &'a self,
        queue: &'a str,
        ack_mode: AckMode,
    ) -> BoxFuture<'a, Result<DeliveryStream, RelayError>> {
        Box::pin(ready(self.consume_now(queue, ack_mode)))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), RelayError>> {
        self.close_now();
        Box::pin(ready(Ok(())))
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.close_now();
    }
}

struct CountingAcker {
    state: Shared,
}

impl DeliveryAcker for CountingAcker {
    fn ack(&self) -> BoxFuture<'_, Result<(), RelayError>> {
        lock(&self.state).acks += 1;
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn channel(broker: &InMemoryBroker) -> Box<dyn BrokerChannel> {
        let connection = broker.connect("memory").await.unwrap();
        connection.open_channel().await.unwrap()
    }

    #[tokio::test]
    async fn routes_by_topic_pattern() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        channel
            .declare_exchange(&ExchangeSpec::topic("logs_topic"))
            .await
            .unwrap();
        let queue = channel
            .declare_queue(&QueueSpec::anonymous())
            .await
            .unwrap();
        channel
            .bind_queue(&queue, "logs_topic", "log.*")
            .await
            .unwrap();
        let mut deliveries = channel.consume(&queue, AckMode::Auto).await.unwrap();

        let publisher = self::channel(&broker).await;
        publisher
            .publish("logs_topic", "log.INFO", OutboundMessage::json(b"a".to_vec()))
            .await
            .unwrap();
        publisher
            .publish("logs_topic", "audit.INFO", OutboundMessage::json(b"b".to_vec()))
            .await
            .unwrap();
        publisher
            .publish("logs_topic", "log.ERROR", OutboundMessage::json(b"c".to_vec()))
            .await
            .unwrap();

        let first = deliveries.next().await.unwrap().unwrap();
        let second = deliveries.next().await.unwrap().unwrap();
        assert_eq!(first.routing_key, "log.INFO");
        assert_eq!(second.routing_key, "log.ERROR");
        assert_eq!(second.body, b"c");
        assert_eq!(broker.published().len(), 3);
    }

    #[tokio::test]
    async fn overlapping_bindings_deliver_once() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        channel
            .declare_exchange(&ExchangeSpec::topic("logs_topic"))
            .await
            .unwrap();
        let queue = channel
            .declare_queue(&QueueSpec::anonymous())
            .await
            .unwrap();
        for pattern in ["log.*", "log.INFO", "#"] {
            channel.bind_queue(&queue, "logs_topic", pattern).await.unwrap();
        }
        let mut deliveries = channel.consume(&queue, AckMode::Auto).await.unwrap();
        channel
            .publish("logs_topic", "log.INFO", OutboundMessage::json(b"x".to_vec()))
            .await
            .unwrap();

        assert!(deliveries.next().await.is_some());
        broker.disconnect();
        assert!(deliveries.next().await.is_none());
    }

    #[tokio::test]
    async fn redeclaring_with_other_properties_is_rejected() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        let spec = ExchangeSpec::topic("logs_topic");
        channel.declare_exchange(&spec).await.unwrap();
        channel.declare_exchange(&spec).await.unwrap();

        let transient = ExchangeSpec {
            durable: false,
            ..spec
        };
        let result = channel.declare_exchange(&transient).await;
        assert!(matches!(result, Err(RelayError::DeclareFailed { .. })));
    }

    #[tokio::test]
    async fn publish_to_missing_exchange_fails() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        let result = channel
            .publish("nowhere", "log.INFO", OutboundMessage::json(b"x".to_vec()))
            .await;
        assert!(matches!(result, Err(RelayError::PublishFailed { .. })));
    }

    #[tokio::test]
    async fn closing_the_owning_channel_removes_anonymous_queues() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        let queue = channel
            .declare_queue(&QueueSpec::anonymous())
            .await
            .unwrap();
        assert_eq!(broker.queues(), vec![queue]);
        assert_eq!(broker.open_channels(), 1);

        channel.close().await.unwrap();

        assert!(broker.queues().is_empty());
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_delivery_streams() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        let queue = channel
            .declare_queue(&QueueSpec::anonymous())
            .await
            .unwrap();
        let mut deliveries = channel.consume(&queue, AckMode::Auto).await.unwrap();

        broker.disconnect();

        assert!(deliveries.next().await.is_none());
        let connection = broker.connect("memory").await.unwrap();
        broker.disconnect();
        assert!(connection.open_channel().await.is_err());
    }

    #[tokio::test]
    async fn after_dispatch_deliveries_carry_an_acker() {
        let broker = InMemoryBroker::new();
        let channel = channel(&broker).await;
        channel
            .declare_exchange(&ExchangeSpec::topic("logs_topic"))
            .await
            .unwrap();
        let queue = channel
            .declare_queue(&QueueSpec::anonymous())
            .await
            .unwrap();
        channel.bind_queue(&queue, "logs_topic", "#").await.unwrap();
        let mut deliveries = channel
            .consume(&queue, AckMode::AfterDispatch)
            .await
            .unwrap();
        channel
            .publish("logs_topic", "log.INFO", OutboundMessage::json(b"x".to_vec()))
            .await
            .unwrap();

        let delivery = deliveries.next().await.unwrap().unwrap();
        delivery.acker.unwrap().ack().await.unwrap();

        assert_eq!(broker.ack_count(), 1);
    }
}
