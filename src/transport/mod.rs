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

//! The transport seam: how stamped messages reach agent inboxes.
//!
//! A transport owns routing only; agent semantics (dispatch, access control,
//! replies) live entirely in the worker, which is what keeps the in-process
//! and AMQP transports observably identical.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::common::types::{MessageSender, PendingMap};
use crate::message::{ActionError, Message, SpaceError, ERROR_ACTION};

pub(crate) mod amqp;
pub(crate) mod local;

/// The delivery endpoint of one agent.
///
/// Delivery first offers `[response]`/`[error]` messages to the agent's
/// pending-request table: a matching waiter is completed directly, which is
/// what lets a worker blocked inside `request` observe its reply. Everything
/// else, including waiter-less replies, is enqueued for the worker.
#[derive(Debug, Clone)]
pub(crate) struct Mailbox {
    inbox: MessageSender,
    pending: Arc<PendingMap>,
}

impl Mailbox {
    pub(crate) fn new(inbox: MessageSender, pending: Arc<PendingMap>) -> Self {
        Self { inbox, pending }
    }

    pub(crate) async fn deliver(&self, message: Message) {
        if message.is_reply() {
            let waiter = message
                .parent_id()
                .and_then(|parent_id| self.pending.remove(parent_id))
                .map(|(_, waiter)| waiter);
            if let Some(waiter) = waiter {
                if waiter.send(reply_outcome(&message)).is_err() {
                    trace!("late reply dropped: waiter already gone");
                }
                return;
            }
        }
        if self.inbox.send(message).await.is_err() {
            trace!("inbox closed, message dropped");
        }
    }
}

/// Converts a reply message into the outcome its request waiter resolves to.
fn reply_outcome(message: &Message) -> Result<Value, ActionError> {
    if message.action.name == ERROR_ACTION {
        Err(ActionError::from_reply(message))
    } else {
        Ok(message
            .action
            .args
            .get("value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// What a transport needs to deliver to one agent.
#[derive(Debug, Clone)]
pub(crate) struct AgentRegistration {
    pub(crate) id: String,
    pub(crate) mailbox: Mailbox,
    pub(crate) receive_own_broadcasts: bool,
}

/// Uniform interface over message fan-out.
///
/// `publish` takes a stamped, validated message and delivers it to one inbox
/// (point-to-point; unknown ids are dropped silently) or to every current
/// member (broadcast, honoring the sender's own-broadcast flag). Delivery
/// failures are logged and the message dropped; they never reach the sender.
#[async_trait]
pub(crate) trait Transport: Send + Sync + Debug {
    /// Binds an agent's mailbox under its id. Fails with a duplicate-id
    /// error when the id is taken.
    async fn attach(&self, registration: AgentRegistration) -> Result<(), SpaceError>;

    /// Releases the binding for `id`; no further deliveries occur.
    async fn detach(&self, id: &str) -> Result<(), SpaceError>;

    /// Delivers a stamped message per the addressing rules.
    async fn publish(&self, message: Message);

    /// Releases all transport resources.
    async fn close(&self);
}
