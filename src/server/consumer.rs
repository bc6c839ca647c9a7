//! Inbound consumption loop.
//!
//! Pulls from the durable JetStream consumer, hands each message to the
//! channel manager on its own task and settles it according to the returned
//! [`Disposition`]. A semaphore bounds how many messages are in flight, and
//! the consumer never hands out more unacknowledged messages than that.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, AckKind};
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::error::{Result, ServerError};
use crate::nats::client::{delivery_from_message, ConsumerLimits, NatsClient};
use crate::server::config::MAX_IN_FLIGHT_LIMIT;
use crate::server::context::ServerContext;
use crate::server::manager::{Disposition, MessageChannelManager};

/// Consecutive receive errors tolerated before the loop gives up.
const MAX_STREAM_ERRORS: u32 = 10;

pub struct Server {
    ctx: Arc<ServerContext>,
    manager: Arc<MessageChannelManager>,
    nats: NatsClient,
    max_in_flight: usize,
    limits: ConsumerLimits,
    progress_interval: Duration,
}

impl Server {
    pub fn new(ctx: Arc<ServerContext>, nats: NatsClient) -> Self {
        let max_in_flight = ctx.settings.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        let limits = ConsumerLimits {
            max_ack_pending: max_in_flight,
            ack_wait: ctx.settings.ack_wait(),
        };
        let progress_interval = ctx.settings.progress_interval();
        let manager = Arc::new(MessageChannelManager::new(
            Arc::clone(&ctx),
            Arc::new(nats.clone()),
        ));
        Self {
            ctx,
            manager,
            nats,
            max_in_flight,
            limits,
            progress_interval,
        }
    }

    /// Consume until `shutdown` resolves, then wait for in-flight messages and
    /// tear the server down.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let consumer = self.nats.inbound_consumer(self.limits).await?;
        let mut messages = consumer
            .stream()
            .max_messages_per_batch(self.max_in_flight)
            .messages()
            .await
            .map_err(|e| ServerError::Transport(format!("failed to open message stream: {}", e)))?;

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut backoff = StreamErrorBackoff::default();
        let mut outcome = Ok(());

        tracing::info!(
            "Server ready! Consuming '{}' with consumer '{}' (max {} in flight, ack wait {:?})",
            self.nats.config().inbound_subject,
            self.nats.config().consumer_name,
            self.max_in_flight,
            self.limits.ack_wait
        );

        tokio::pin!(shutdown);
        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => permit
                    .map_err(|e| ServerError::Transport(format!("intake closed: {}", e)))?,
            };

            let next = tokio::select! {
                _ = &mut shutdown => break,
                next = messages.next() => next,
            };

            let msg = match next {
                Some(Ok(msg)) => {
                    backoff.reset();
                    msg
                }
                Some(Err(e)) => {
                    tracing::error!("Error receiving message: {}", e);
                    match backoff.on_error() {
                        Some(delay) => {
                            tokio::select! {
                                _ = &mut shutdown => break,
                                _ = tokio::time::sleep(delay) => continue,
                            }
                        }
                        None => {
                            outcome = Err(ServerError::Transport(format!(
                                "inbound stream failed {} times in a row: {}",
                                MAX_STREAM_ERRORS, e
                            )));
                            break;
                        }
                    }
                }
                None => {
                    tracing::warn!("Inbound message stream ended");
                    break;
                }
            };

            let manager = Arc::clone(&self.manager);
            let progress_interval = self.progress_interval;
            tokio::spawn(async move {
                let disposition = handle_with_progress(&manager, &msg, progress_interval).await;
                settle(&msg, disposition).await;
                // Release the context before the permit so teardown sees it unshared
                drop(manager);
                drop(permit);
            });
        }

        tracing::info!("Shutting down, waiting for in-flight messages");
        let all_permits = u32::try_from(self.max_in_flight)
            .map_err(|_| ServerError::Config(format!("max_in_flight {} too large", self.max_in_flight)))?;
        let _drained = permits
            .acquire_many(all_permits)
            .await
            .map_err(|e| ServerError::Transport(format!("intake closed: {}", e)))?;

        self.shutdown().await?;
        outcome
    }

    /// Flush outstanding replies and release the server context.
    async fn shutdown(self) -> Result<()> {
        let flushed = self.nats.flush().await;

        drop(self.manager);
        match Arc::try_unwrap(self.ctx) {
            Ok(ctx) => ctx.shutdown(),
            Err(_) => tracing::warn!("Server context still shared; store released with its last handle"),
        }

        flushed
    }
}

/// Run one handling, telling the transport it is still in progress every
/// `interval` so a slow action is not redelivered mid-flight.
async fn handle_with_progress(
    manager: &MessageChannelManager,
    msg: &jetstream::Message,
    interval: Duration,
) -> Disposition {
    let handling = manager.handle(delivery_from_message(msg));
    tokio::pin!(handling);

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            disposition = &mut handling => return disposition,
            _ = ticker.tick() => {
                if let Err(e) = msg.ack_with(AckKind::Progress).await {
                    tracing::warn!("Failed to extend ack deadline: {}", e);
                }
            }
        }
    }
}

/// Transport acknowledgement for a disposition.
pub fn ack_kind(disposition: Disposition) -> AckKind {
    match disposition {
        Disposition::Ack => AckKind::Ack,
        Disposition::Reject => AckKind::Term,
        Disposition::Redeliver => AckKind::Nak(None),
    }
}

async fn settle(msg: &jetstream::Message, disposition: Disposition) {
    if let Err(e) = msg.ack_with(ack_kind(disposition)).await {
        tracing::error!("Failed to settle message as {:?}: {}", disposition, e);
    }
}

/// Delay schedule for consecutive receive errors.
#[derive(Debug, Default)]
struct StreamErrorBackoff {
    consecutive: u32,
}

impl StreamErrorBackoff {
    /// Delay before the next receive, or `None` once the stream is considered broken.
    fn on_error(&mut self) -> Option<Duration> {
        self.consecutive += 1;
        if self.consecutive > MAX_STREAM_ERRORS {
            return None;
        }
        let delay = Duration::from_millis(100) * 2u32.pow(self.consecutive - 1);
        Some(delay.min(Duration::from_secs(5)))
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }
}
