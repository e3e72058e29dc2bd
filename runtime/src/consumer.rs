//! Event Consumer.
//!
//! A consumer owns one channel and one anonymous queue for the lifetime of its
//! listen loop:
//!
//! 1. open a channel and declare the exchange (repeating the declaration made
//!    at construction is harmless)
//! 2. declare an exclusive, auto-deleting, broker-named queue
//! 3. bind the queue once per topic pattern; the first failed binding aborts
//! 4. pull deliveries and hand each one to its own dispatch task
//!
//! Malformed bodies are dispatched as the empty envelope and counted. Only
//! transport failures end the loop.
//!
//! # Delivery Guarantee
//!
//! With the default [`AckMode::Auto`] the broker forgets a message as soon as
//! it reaches this process. A crash between receipt and a successful sink call
//! loses that message: delivery is at-most-once. [`AckMode::AfterDispatch`]
//! acknowledges only after the handler finished, trading that loss for
//! possible redelivery after a crash.
//!
//! # Concurrency
//!
//! By default every delivery gets a detached task and nothing bounds how many
//! run at once. Setting [`DispatchConfig::max_in_flight`] makes the pull loop
//! wait for a free slot instead, which applies backpressure to the queue.

use crate::dispatch::Dispatcher;
use crate::stats::DispatchStats;
use crate::topology::{close_quietly, declare_exchange};
use event_relay_core::config::{DispatchConfig, RelayConfig};
use event_relay_core::envelope::Envelope;
use event_relay_core::error::RelayError;
use event_relay_core::routing::EXCHANGE_NAME;
use event_relay_core::transport::{
    AckMode, BrokerChannel, BrokerConnection, Delivery, DeliveryStream, QueueSpec,
};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Consumes bound routing keys and dispatches envelopes.
pub struct Consumer {
    connection: Arc<dyn BrokerConnection>,
    exchange: String,
    dispatcher: Arc<Dispatcher>,
    dispatch: DispatchConfig,
    ack_mode: AckMode,
}

impl Consumer {
    /// Create a consumer on the default exchange with unbounded dispatch and
    /// auto-acknowledgement, declaring the exchange up front.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the exchange cannot be declared.
    pub async fn new(
        connection: Arc<dyn BrokerConnection>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, RelayError> {
        let consumer = Self {
            connection,
            exchange: EXCHANGE_NAME.to_string(),
            dispatcher,
            dispatch: DispatchConfig::default(),
            ack_mode: AckMode::Auto,
        };
        consumer.setup().await?;
        Ok(consumer)
    }

    /// Create a consumer using the exchange, dispatch and ack settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the exchange cannot be declared.
    pub async fn from_config(
        connection: Arc<dyn BrokerConnection>,
        dispatcher: Arc<Dispatcher>,
        config: &RelayConfig,
    ) -> Result<Self, RelayError> {
        let consumer = Self {
            connection,
            exchange: config.exchange.clone(),
            dispatcher,
            dispatch: config.dispatch,
            ack_mode: config.ack_mode,
        };
        consumer.setup().await?;
        Ok(consumer)
    }

    /// Counters for this consumer's deliveries.
    #[must_use]
    pub fn stats(&self) -> &Arc<DispatchStats> {
        self.dispatcher.stats()
    }

    async fn setup(&self) -> Result<(), RelayError> {
        let channel = self.connection.open_channel().await?;
        let declared = declare_exchange(channel.as_ref(), &self.exchange).await;
        close_quietly(channel.as_ref()).await;
        declared
    }

    /// Bind to `topics` and consume until the transport fails.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the loop, including
    /// [`RelayError::DeliveryStreamClosed`] when the broker closes the channel.
    /// Per-message problems never end the loop.
    pub async fn listen<S: AsRef<str>>(&self, topics: &[S]) -> Result<(), RelayError> {
        self.listen_until(topics, std::future::pending::<()>()).await
    }

    /// Like [`Consumer::listen`], but returns `Ok(())` once `shutdown` completes.
    ///
    /// Dispatch tasks already running are left to finish on their own.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the loop.
    pub async fn listen_until<S, F>(&self, topics: &[S], shutdown: F) -> Result<(), RelayError>
    where
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        let channel = self.connection.open_channel().await?;
        let result = self.run(channel.as_ref(), topics, shutdown).await;
        close_quietly(channel.as_ref()).await;
        result
    }

    async fn run<S, F>(
        &self,
        channel: &dyn BrokerChannel,
        topics: &[S],
        shutdown: F,
    ) -> Result<(), RelayError>
    where
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        let patterns: Vec<&str> = topics.iter().map(|t| t.as_ref()).collect();

        declare_exchange(channel, &self.exchange).await?;
        let queue = channel.declare_queue(&QueueSpec::anonymous()).await?;

        for pattern in &patterns {
            channel.bind_queue(&queue, &self.exchange, pattern).await?;
            tracing::debug!(queue = %queue, pattern = %pattern, "Queue bound");
        }

        let mut deliveries = channel.consume(&queue, self.ack_mode).await?;
        let slots = self
            .dispatch
            .max_in_flight
            .map(|n| Arc::new(Semaphore::new(n)));

        tracing::info!(
            exchange = %self.exchange,
            queue = %queue,
            topics = ?patterns,
            max_in_flight = ?self.dispatch.max_in_flight,
            ack_mode = ?self.ack_mode,
            "Waiting for messages"
        );

        tokio::pin!(shutdown);

        loop {
            // The slot is taken before pulling, so a full pool stops the pull
            // and shutdown is still observed while waiting for it.
            let (permit, next) = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(queue = %queue, "Shutdown requested, leaving listen loop");
                    return Ok(());
                }
                pulled = next_delivery(&mut deliveries, slots.as_ref()) => pulled?,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    tracing::error!(queue = %queue, error = %e, "Delivery stream failed");
                    return Err(e);
                }
                None => {
                    tracing::error!(queue = %queue, "Delivery stream closed by broker");
                    return Err(RelayError::DeliveryStreamClosed);
                }
            };

            self.spawn_dispatch(delivery, permit);
        }
    }

    fn spawn_dispatch(&self, delivery: Delivery, permit: Option<OwnedSemaphorePermit>) {
        let stats = Arc::clone(self.stats());
        stats.record_received();

        let (envelope, decode_error) = Envelope::decode_lenient(&delivery.body);
        if let Some(e) = decode_error {
            tracing::warn!(
                routing_key = %delivery.routing_key,
                error = %e,
                "Malformed message body, dispatching empty envelope"
            );
            stats.record_decode_failure();
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let guard = InFlight::start(stats, permit);

        tokio::spawn(async move {
            dispatcher.handle(envelope).await;

            if let Some(acker) = delivery.acker {
                if let Err(e) = acker.ack().await {
                    tracing::warn!(error = %e, "Failed to acknowledge delivery");
                    guard.stats.record_ack_failure();
                }
            }

            drop(guard);
        });
    }
}

/// A dispatch slot, if dispatch is bounded, and what the stream yielded.
type Pulled = (Option<OwnedSemaphorePermit>, Option<Result<Delivery, RelayError>>);

/// Wait for a dispatch slot, if dispatch is bounded, then for the next delivery.
async fn next_delivery(
    deliveries: &mut DeliveryStream,
    slots: Option<&Arc<Semaphore>>,
) -> Result<Pulled, RelayError> {
    let permit = match slots {
        Some(slots) => Some(
            Arc::clone(slots)
                .acquire_owned()
                .await
                .map_err(|e| RelayError::ConsumeFailed(e.to_string()))?,
        ),
        None => None,
    };

    Ok((permit, deliveries.next().await))
}

/// Tracks one running dispatch task and holds its concurrency slot.
struct InFlight {
    stats: Arc<DispatchStats>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl InFlight {
    fn start(stats: Arc<DispatchStats>, permit: Option<OwnedSemaphorePermit>) -> Self {
        stats.task_started();
        Self {
            stats,
            _permit: permit,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.stats.task_finished();
    }
}
