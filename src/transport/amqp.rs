/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! The AMQP transport.
//!
//! Topology: one topic exchange per space. Each agent owns a channel and two
//! exclusive queues: a direct queue bound with the agent's id as routing
//! key, and a broadcast queue bound with the literal [`BROADCAST_ROUTING_KEY`]
//! (a fixed word, not an AMQP wildcard, so broadcast bindings never match
//! point-to-point routing keys). Point-to-point publishes use the
//! destination id as routing key; broadcasts use the broadcast key.
//!
//! Messages travel as the canonical JSON envelope in UTF-8. Deliveries are
//! acknowledged after hand-off to the agent's mailbox (at-least-once); the
//! agent-level `meta.id` makes duplicate detection possible but the core does
//! not deduplicate. A supervisor task reconnects with bounded exponential
//! backoff on connection loss and re-binds every live agent.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::common::config::{AmqpOptions, CONFIG};
use crate::message::{Message, SpaceError, BROADCAST_ID};
use crate::transport::{AgentRegistration, Transport};

/// The routing key broadcasts are published and bound with.
pub(crate) const BROADCAST_ROUTING_KEY: &str = "__broadcast__";

/// A space transport backed by an AMQP 0.9.1 broker.
pub(crate) struct AmqpTransport {
    options: AmqpOptions,
    link: Mutex<AmqpLink>,
    bindings: DashMap<String, AmqpBinding>,
    shutdown: CancellationToken,
}

/// The live connection and the channel publishes go out on.
struct AmqpLink {
    connection: Connection,
    publish_channel: Channel,
}

/// One attached agent: its registration (kept for re-binding after a
/// reconnect) and the token stopping its consumer task.
struct AmqpBinding {
    registration: AgentRegistration,
    consumer_stop: CancellationToken,
}

impl fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpTransport")
            .field("exchange", &self.options.exchange)
            .field("agents", &self.bindings.len())
            .finish()
    }
}

impl AmqpTransport {
    /// Connects to the broker, declares the space's exchange, and starts the
    /// connection supervisor.
    pub(crate) async fn connect(options: AmqpOptions) -> Result<Arc<Self>, SpaceError> {
        let connection = Self::connect_with_retry(&options).await?;
        let publish_channel = connection.create_channel().await.map_err(transport_error)?;
        declare_exchange(&publish_channel, &options.exchange).await?;
        let transport = Arc::new(Self {
            options,
            link: Mutex::new(AmqpLink {
                connection,
                publish_channel,
            }),
            bindings: DashMap::new(),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(Self::supervise(Arc::downgrade(&transport)));
        Ok(transport)
    }

    /// Dials the broker under the configured retry policy: doubling backoff,
    /// capped, bounded in attempts.
    async fn connect_with_retry(options: &AmqpOptions) -> Result<Connection, SpaceError> {
        let mut backoff = Duration::from_millis(options.retry.initial_backoff_ms);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Connection::connect(&options.uri(), connection_properties()).await {
                Ok(connection) => {
                    info!(host = %options.hostname, attempt, "connected to AMQP broker");
                    return Ok(connection);
                }
                Err(connect_error) if attempt < options.retry.max_attempts => {
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %connect_error,
                        "AMQP connect failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    let doubled = backoff.as_millis() as u64 * 2;
                    backoff = Duration::from_millis(doubled.min(options.retry.max_backoff_ms));
                }
                Err(connect_error) => {
                    return Err(SpaceError::Transport(format!(
                        "unable to connect to AMQP broker after {attempt} attempts: {connect_error}"
                    )));
                }
            }
        }
    }

    /// Declares and binds one agent's queues on `connection` and starts its
    /// consumer task. Returns the token that stops the consumer.
    async fn bind_agent(
        &self,
        connection: &Connection,
        registration: &AgentRegistration,
    ) -> Result<CancellationToken, SpaceError> {
        let channel = connection.create_channel().await.map_err(transport_error)?;
        let direct_queue = self.direct_queue_name(&registration.id);
        let broadcast_queue = self.broadcast_queue_name(&registration.id);
        let exclusive = QueueDeclareOptions {
            exclusive: true,
            ..QueueDeclareOptions::default()
        };
        channel
            .queue_declare(&direct_queue, exclusive, FieldTable::default())
            .await
            .map_err(|declare_error| queue_error(&registration.id, declare_error))?;
        channel
            .queue_declare(&broadcast_queue, exclusive, FieldTable::default())
            .await
            .map_err(|declare_error| queue_error(&registration.id, declare_error))?;
        channel
            .queue_bind(
                &direct_queue,
                &self.options.exchange,
                &registration.id,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(transport_error)?;
        channel
            .queue_bind(
                &broadcast_queue,
                &self.options.exchange,
                BROADCAST_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(transport_error)?;

        let direct_consumer = channel
            .basic_consume(
                &direct_queue,
                &format!("{}-direct", registration.id),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(transport_error)?;
        let broadcast_consumer = channel
            .basic_consume(
                &broadcast_queue,
                &format!("{}-broadcast", registration.id),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(transport_error)?;

        let stop = self.shutdown.child_token();
        let deliveries = futures::stream::select(direct_consumer, broadcast_consumer);
        tokio::spawn(consume_loop(
            registration.clone(),
            deliveries,
            stop.clone(),
        ));
        trace!(agent = %registration.id, "bound to AMQP topology");
        Ok(stop)
    }

    /// Watches connection health and rebuilds the topology after a loss.
    async fn supervise(transport: Weak<Self>) {
        loop {
            tokio::time::sleep(Duration::from_millis(CONFIG.timeouts.amqp_poll_ms)).await;
            let Some(transport) = transport.upgrade() else {
                break;
            };
            if transport.shutdown.is_cancelled() {
                break;
            }
            let connected = {
                let link = transport.link.lock().await;
                link.connection.status().connected()
            };
            if connected {
                continue;
            }
            warn!("AMQP connection lost, reconnecting");
            if let Err(rebuild_error) = transport.rebuild().await {
                error!(error = %rebuild_error, "AMQP reconnect failed");
            }
        }
    }

    /// Re-dials the broker, re-declares the exchange, and re-binds every
    /// live agent on the fresh connection.
    async fn rebuild(&self) -> Result<(), SpaceError> {
        let connection = Self::connect_with_retry(&self.options).await?;
        let publish_channel = connection.create_channel().await.map_err(transport_error)?;
        declare_exchange(&publish_channel, &self.options.exchange).await?;

        let snapshot: Vec<AgentRegistration> = self
            .bindings
            .iter()
            .map(|entry| entry.registration.clone())
            .collect();
        let mut rebound = Vec::with_capacity(snapshot.len());
        for registration in &snapshot {
            let stop = self.bind_agent(&connection, registration).await?;
            rebound.push((registration.id.clone(), stop));
        }

        {
            let mut link = self.link.lock().await;
            *link = AmqpLink {
                connection,
                publish_channel,
            };
        }
        for (id, stop) in rebound {
            if let Some(mut binding) = self.bindings.get_mut(&id) {
                let stale = std::mem::replace(&mut binding.consumer_stop, stop);
                stale.cancel();
            }
        }
        info!("AMQP connection re-established");
        Ok(())
    }

    fn direct_queue_name(&self, id: &str) -> String {
        format!("{}.{id}.direct", self.options.exchange)
    }

    fn broadcast_queue_name(&self, id: &str) -> String {
        format!("{}.{id}.broadcast", self.options.exchange)
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn attach(&self, registration: AgentRegistration) -> Result<(), SpaceError> {
        // Exclusive queues catch duplicates across connections; within this
        // space's own connection the owner may redeclare, so check locally
        // first.
        if self.bindings.contains_key(&registration.id) {
            return Err(SpaceError::DuplicateAgentId(registration.id));
        }
        let stop = {
            let link = self.link.lock().await;
            self.bind_agent(&link.connection, &registration).await?
        };
        self.bindings.insert(
            registration.id.clone(),
            AmqpBinding {
                registration,
                consumer_stop: stop,
            },
        );
        Ok(())
    }

    async fn detach(&self, id: &str) -> Result<(), SpaceError> {
        let Some((_, binding)) = self.bindings.remove(id) else {
            return Err(SpaceError::AgentNotFound(id.to_string()));
        };
        binding.consumer_stop.cancel();
        let link = self.link.lock().await;
        for queue in [self.direct_queue_name(id), self.broadcast_queue_name(id)] {
            if let Err(delete_error) = link
                .publish_channel
                .queue_delete(&queue, QueueDeleteOptions::default())
                .await
            {
                warn!(queue = %queue, error = %delete_error, "AMQP queue delete failed");
            }
        }
        trace!(agent = %id, "detached from AMQP topology");
        Ok(())
    }

    #[instrument(skip(self, message), fields(to = %message.to, action = %message.action.name))]
    async fn publish(&self, message: Message) {
        let routing_key = if message.is_broadcast() {
            BROADCAST_ROUTING_KEY
        } else {
            message.to.as_str()
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(encode_error) => {
                error!(error = %encode_error, "failed to encode message, dropped");
                return;
            }
        };
        let link = self.link.lock().await;
        match link
            .publish_channel
            .basic_publish(
                &self.options.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
        {
            Ok(confirm) => {
                if let Err(publish_error) = confirm.await {
                    error!(error = %publish_error, "AMQP publish unconfirmed, message dropped");
                }
            }
            Err(publish_error) => {
                error!(error = %publish_error, "AMQP publish failed, message dropped");
            }
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
        self.bindings.clear();
        let link = self.link.lock().await;
        if let Err(close_error) = link.connection.close(200, "space shutdown").await {
            debug!(error = %close_error, "AMQP connection close reported an error");
        }
    }
}

/// Consumes deliveries for one agent until stopped or the stream ends.
async fn consume_loop(
    registration: AgentRegistration,
    mut deliveries: impl Stream<Item = Result<Delivery, lapin::Error>> + Send + Unpin + 'static,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            next = deliveries.next() => {
                match next {
                    Some(Ok(delivery)) => handle_delivery(&registration, delivery).await,
                    Some(Err(consume_error)) => {
                        warn!(agent = %registration.id, error = %consume_error, "AMQP consumer error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    trace!(agent = %registration.id, "AMQP consumer stopped");
}

/// Decodes, filters, and hands one delivery to the agent's mailbox, then
/// acknowledges it.
async fn handle_delivery(registration: &AgentRegistration, delivery: Delivery) {
    let message: Message = match serde_json::from_slice(&delivery.data) {
        Ok(message) => message,
        Err(decode_error) => {
            warn!(agent = %registration.id, error = %decode_error, "undecodable AMQP payload dropped");
            ack(delivery).await;
            return;
        }
    };
    if message.to != BROADCAST_ID && message.to != registration.id {
        trace!(agent = %registration.id, to = %message.to, "stray routed message dropped");
        ack(delivery).await;
        return;
    }
    if message.is_broadcast()
        && message.from == registration.id
        && !registration.receive_own_broadcasts
    {
        trace!(agent = %registration.id, "own broadcast filtered");
        ack(delivery).await;
        return;
    }
    registration.mailbox.deliver(message).await;
    ack(delivery).await;
}

async fn ack(delivery: Delivery) {
    if let Err(ack_error) = delivery.ack(BasicAckOptions::default()).await {
        warn!(error = %ack_error, "AMQP ack failed");
    }
}

async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), SpaceError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(transport_error)
}

fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}

fn transport_error(error: lapin::Error) -> SpaceError {
    SpaceError::Transport(error.to_string())
}

/// Classifies a queue-declare failure: an exclusive queue owned elsewhere
/// means the agent id is already taken on this broker.
fn queue_error(id: &str, error: lapin::Error) -> SpaceError {
    let text = error.to_string();
    if text.contains("RESOURCE_LOCKED") || text.contains("RESOURCE-LOCKED") {
        SpaceError::DuplicateAgentId(id.to_string())
    } else {
        SpaceError::Transport(text)
    }
}
