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

use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::instrument;

use crate::common::context::AgentContext;
use crate::message::{ActionError, Message};

/// A clonable external reference to a live agent.
///
/// `AgentHandle` is returned by
/// [`ManagedAgent::start`](crate::agent::ManagedAgent::start) and lets code
/// outside the agent's worker send and request on the agent's behalf, and
/// remove it from its space. Handles can be cloned freely; equality and
/// hashing are based solely on the agent's id.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    context: AgentContext,
    tracker: TaskTracker,
}

impl PartialEq for AgentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.context.id == other.context.id
    }
}

impl Eq for AgentHandle {}

impl Hash for AgentHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.id.hash(state);
    }
}

impl AgentHandle {
    pub(crate) fn new(context: AgentContext, tracker: TaskTracker) -> Self {
        Self { context, tracker }
    }

    /// The agent's unique id within its space.
    pub fn id(&self) -> &str {
        &self.context.id
    }

    /// Stamps, validates, and publishes a message as this agent. See
    /// [`AgentContext::send`].
    pub async fn send(&self, message: Message) -> Result<String, ActionError> {
        self.context.send(message).await
    }

    /// Sends a message as this agent and awaits the correlated reply. See
    /// [`AgentContext::request`].
    pub async fn request(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Value, ActionError> {
        self.context.request(message, timeout).await
    }

    /// Removes the agent from its space and waits for its worker to stop.
    ///
    /// The agent finishes the message it is handling, its outstanding
    /// requests fail with `space-closed`, and `before_remove` runs before the
    /// worker exits.
    #[instrument(skip(self), fields(agent = %self.context.id))]
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.context
            .space
            .remove_agent(&self.context.id)
            .await?;
        self.tracker.wait().await;
        Ok(())
    }
}
