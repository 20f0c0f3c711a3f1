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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::common::space::SpaceInner;
use crate::common::types::PendingMap;
use crate::message::{schema, ActionError, Message};
use crate::transport::Transport;

/// A clonable handle to one agent's messaging capabilities.
///
/// An `AgentContext` is shared by the agent's worker, its external
/// [`AgentHandle`](crate::common::AgentHandle), and every
/// [`MessageContext`](crate::message::MessageContext) handed to handlers. It
/// stamps and validates outbound messages, publishes them through the space's
/// transport, and maintains the pending-request table that backs the
/// synchronous [`request`](AgentContext::request).
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub(crate) id: String,
    pub(crate) space: Arc<SpaceInner>,
    pub(crate) pending: Arc<PendingMap>,
    pub(crate) live: Arc<AtomicBool>,
    pub(crate) cancellation_token: CancellationToken,
}

impl AgentContext {
    /// The owning agent's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stamps, validates, and publishes a message on behalf of this agent.
    ///
    /// Fills `from` and a fresh `meta.id`, preserving all caller-supplied
    /// metadata. Validation failures (including a forged `from`) fail
    /// synchronously with a `schema-error`; nothing is published. Delivery
    /// failures are asynchronous: they are logged by the transport and the
    /// message is dropped.
    ///
    /// Returns the stamped `meta.id`.
    #[instrument(skip(self, message), fields(agent = %self.id))]
    pub async fn send(&self, message: Message) -> Result<String, ActionError> {
        let stamped = schema::stamp(message, &self.id)?;
        let message_id = stamped.id().unwrap_or_default().to_string();
        trace!(
            to = %stamped.to,
            action = %stamped.action.name,
            message_id = %message_id,
            "sending"
        );
        self.space.transport.publish(stamped).await;
        Ok(message_id)
    }

    /// Sends a message and synchronously awaits the correlated reply.
    ///
    /// A one-shot waiter keyed by the stamped `meta.id` is recorded *before*
    /// publishing, so even an instant reply cannot be missed. The call
    /// resolves with the value of the matching `[response]`, fails with the
    /// error of the matching `[error]`, or fails with `timeout` when the
    /// deadline expires. On timeout the waiter is withdrawn and a late
    /// reply falls through to the fire-and-forget callbacks.
    ///
    /// Fails immediately with `recursive-request` when addressed to this
    /// agent's own id (the worker cannot answer while it waits), and with
    /// `space-closed` when the agent is not live on the bus (during
    /// `after_add`/`before_remove`, or after removal).
    #[instrument(skip(self, message), fields(agent = %self.id))]
    pub async fn request(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Value, ActionError> {
        if !self.live.load(Ordering::Acquire) {
            return Err(ActionError::space_closed(format!(
                "\"{}\" is not live on the bus; request() is unavailable here",
                self.id
            )));
        }
        if message.to == self.id {
            return Err(ActionError::recursive_request(&self.id));
        }
        let stamped = schema::stamp(message, &self.id)?;
        let message_id = stamped.id().unwrap_or_default().to_string();

        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.insert(message_id.clone(), waiter_tx);
        trace!(message_id = %message_id, "request published, awaiting reply");
        self.space.transport.publish(stamped).await;

        match tokio::time::timeout(timeout, waiter_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ActionError::space_closed(
                "request cancelled by space shutdown",
            )),
            Err(_) => {
                self.pending.remove(&message_id);
                Err(ActionError::timeout(format!(
                    "no reply to {message_id} within {timeout:?}"
                )))
            }
        }
    }

    /// Completes every outstanding request waiter with `error`.
    pub(crate) fn fail_pending(&self, error: ActionError) {
        let keys: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, waiter)) = self.pending.remove(&key) {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }
}

assert_impl_all!(AgentContext: Send, Sync);
