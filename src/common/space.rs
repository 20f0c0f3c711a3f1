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

use std::fmt::Debug;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, instrument, trace, warn};

use crate::agent::{Idle, ManagedAgent};
use crate::common::config::{AmqpOptions, CONFIG};
use crate::common::context::AgentContext;
use crate::common::types::PendingMap;
use crate::message::{schema, SpaceError};
use crate::transport::amqp::AmqpTransport;
use crate::transport::local::LocalTransport;
use crate::transport::Transport;

/// A container that binds agents to a transport.
///
/// A `Space` enforces the core invariants (unique agent ids, send-time
/// validation and stamping, broadcast and point-to-point delivery) while
/// delegating the actual fan-out to its transport. The in-process and AMQP
/// transports yield identical observable behavior.
///
/// Spaces are clonable; clones share the same membership and transport.
#[derive(Debug, Clone)]
pub struct Space {
    inner: Arc<SpaceInner>,
}

/// Shared state behind a [`Space`] and every [`AgentContext`] in it.
#[derive(Debug)]
pub(crate) struct SpaceInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) agents: DashMap<String, AgentSlot>,
    pub(crate) cancellation_token: CancellationToken,
}

/// Per-agent control data kept by the space for removal and shutdown.
#[derive(Debug)]
pub(crate) struct AgentSlot {
    pub(crate) tracker: TaskTracker,
    pub(crate) cancellation_token: CancellationToken,
}

impl SpaceInner {
    /// Detaches the agent from the transport, cancels its worker, and waits
    /// for it to stop.
    pub(crate) async fn remove_agent(&self, id: &str) -> Result<(), SpaceError> {
        let Some((_, slot)) = self.agents.remove(id) else {
            return Err(SpaceError::AgentNotFound(id.to_string()));
        };
        if let Err(detach_error) = self.transport.detach(id).await {
            warn!(agent = %id, error = %detach_error, "transport detach failed during removal");
        }
        slot.cancellation_token.cancel();
        slot.tracker.wait().await;
        trace!(agent = %id, "agent removed");
        Ok(())
    }
}

impl Space {
    /// Creates a space on the in-process transport.
    #[must_use]
    pub fn local() -> Self {
        Self::with_transport(Arc::new(LocalTransport::default()))
    }

    /// Creates a space on the AMQP transport, connecting to the broker the
    /// options describe (see [`AmqpOptions::from_env`]).
    pub async fn amqp(options: AmqpOptions) -> Result<Self, SpaceError> {
        let transport = AmqpTransport::connect(options).await?;
        Ok(Self::with_transport(transport))
    }

    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(SpaceInner {
                transport,
                agents: DashMap::new(),
                cancellation_token: CancellationToken::new(),
            }),
        }
    }

    /// Creates an agent builder bound to this space under the given id.
    ///
    /// The id is validated here; uniqueness is enforced when the builder's
    /// `start()` binds it to the transport.
    ///
    /// # Errors
    ///
    /// Fails when the id violates the agent id rules or is already live in
    /// this space.
    pub fn new_agent<Model>(
        &self,
        id: impl Into<String>,
    ) -> Result<ManagedAgent<Idle, Model>, SpaceError>
    where
        Model: Default + Send + Debug + 'static,
    {
        let id = id.into();
        schema::validate_agent_id(&id)?;
        if self.inner.agents.contains_key(&id) {
            return Err(SpaceError::DuplicateAgentId(id));
        }
        let (inbox_tx, inbox) = mpsc::channel(CONFIG.limits.agent_inbox_capacity);
        let context = AgentContext {
            id: id.clone(),
            space: self.inner.clone(),
            pending: Arc::new(PendingMap::new()),
            live: Arc::new(AtomicBool::new(false)),
            cancellation_token: self.inner.cancellation_token.child_token(),
        };
        trace!(agent = %id, "created agent builder");
        Ok(ManagedAgent::new(id, context, inbox, inbox_tx))
    }

    /// The number of agents currently live in this space.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.inner.agents.len()
    }

    /// Removes the agent with the given id: no further deliveries, the
    /// current handler finishes, outstanding requests fail with
    /// `space-closed`, and `before_remove` runs before the worker stops.
    pub async fn remove(&self, id: &str) -> Result<(), SpaceError> {
        self.inner.remove_agent(id).await
    }

    /// Initiates an orderly shutdown of the whole space.
    ///
    /// Every agent is removed concurrently; if the configured shutdown
    /// timeout expires, remaining workers are cancelled forcefully. The
    /// transport is released last.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let ids: Vec<String> = self
            .inner
            .agents
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        trace!(count = ids.len(), "shutting down space");
        let stop_futures: Vec<_> = ids
            .iter()
            .map(|id| async move {
                if let Err(remove_error) = self.inner.remove_agent(id).await {
                    error!(agent = %id, error = %remove_error, "error removing agent during shutdown");
                }
            })
            .collect();

        let timeout_ms = CONFIG.timeouts.system_shutdown_ms;
        if tokio_timeout(Duration::from_millis(timeout_ms), join_all(stop_futures))
            .await
            .is_err()
        {
            error!(
                "space shutdown timeout expired after {timeout_ms} ms, cancelling remaining workers"
            );
            self.inner.cancellation_token.cancel();
        }

        self.inner.transport.close().await;
        trace!("space shutdown complete");
        Ok(())
    }
}
