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

use crate::agent::ActionArgs;
use crate::common::AgentContext;
use crate::message::error::ActionError;
use crate::message::schema::Message;

/// The context of a single action invocation, handed to the handler.
///
/// A `MessageContext` owns a copy of the message being handled and a clone of
/// the agent's messaging capabilities, so the handler's asynchronous tail can
/// reply, send, and issue requests after the synchronous borrow of the agent
/// has ended. Explicit replies through [`MessageContext::respond_with`]
/// suppress the auto-reply of the handler's return value.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// The message currently being handled.
    message: Message,
    /// The handling agent's messaging capabilities.
    agent: AgentContext,
    /// Set once the handler has replied explicitly.
    replied: Arc<AtomicBool>,
}

impl MessageContext {
    pub(crate) fn new(message: Message, agent: AgentContext, replied: Arc<AtomicBool>) -> Self {
        Self {
            message,
            agent,
            replied,
        }
    }

    /// The message currently being handled.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The id of the agent that sent the current message.
    pub fn sender(&self) -> &str {
        &self.message.from
    }

    /// The invocation's arguments, ready for by-name binding.
    pub fn args(&self) -> ActionArgs {
        ActionArgs::new(self.message.action.args.clone())
    }

    /// Sends a `[response]` carrying `value` to the sender of the current
    /// message, correlated through `meta.parent_id`.
    ///
    /// Callable any number of times per invocation; the first call suppresses
    /// the auto-reply of the handler's return value.
    pub async fn respond_with(&self, value: impl Into<Value>) -> Result<String, ActionError> {
        self.replied.store(true, Ordering::Release);
        self.agent
            .send(Message::response_to(&self.message, value.into()))
            .await
    }

    /// Sends an `[error]` reply to the sender of the current message,
    /// correlated through `meta.parent_id`.
    pub async fn raise_with(&self, error: ActionError) -> Result<String, ActionError> {
        self.agent
            .send(Message::error_to(&self.message, &error))
            .await
    }

    /// Sends a message from the handling agent. See [`AgentContext::send`].
    pub async fn send(&self, message: Message) -> Result<String, ActionError> {
        self.agent.send(message).await
    }

    /// Sends a message and awaits the correlated reply. See
    /// [`AgentContext::request`].
    pub async fn request(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Value, ActionError> {
        self.agent.request(message, timeout).await
    }
}
