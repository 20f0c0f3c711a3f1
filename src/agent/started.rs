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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{instrument, trace, warn};

use crate::agent::registry::AccessPolicy;
use crate::agent::ManagedAgent;
use crate::message::{
    ActionError, Message, MessageContext, ERROR_ACTION, RESPONSE_ACTION,
};

/// Type-state marker for a [`ManagedAgent`] that is live in its space.
///
/// A `Started` agent is owned by its worker task, which dequeues messages
/// strictly in FIFO order and drives each through the per-message lifecycle:
/// reply routing, registry lookup, the access gate, `before_action`, handler
/// invocation, `after_action`, and the auto-reply. Handlers for successive
/// messages execute serially; different agents run independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Started;

impl<Model: Default + Send + Debug + 'static> ManagedAgent<Started, Model> {
    /// The worker loop. Runs `after_add`, marks the agent live, then
    /// processes the inbox until removal or shutdown; on the way out it fails
    /// outstanding request waiters and runs `before_remove`.
    #[instrument(skip(self, ready), fields(agent = %self.id))]
    pub(crate) async fn wake(&mut self, ready: oneshot::Sender<()>) {
        let hook = self.after_add.clone();
        (hook.as_ref())(self).await;
        self.context.live.store(true, Ordering::Release);
        let _ = ready.send(());

        let cancel_token = self.context.cancellation_token.clone();
        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => {
                    trace!("worker cancelled");
                    break;
                }
                incoming = self.inbox.recv() => {
                    let Some(message) = incoming else {
                        trace!("inbox closed");
                        break;
                    };
                    self.dispatch(message).await;
                }
            }
        }

        self.context.live.store(false, Ordering::Release);
        self.context.fail_pending(ActionError::space_closed(
            "space closed while a request was outstanding",
        ));
        let hook = self.before_remove.clone();
        (hook.as_ref())(self).await;
        trace!("worker stopped");
    }

    /// Drives one dequeued message through the per-message lifecycle.
    async fn dispatch(&mut self, message: Message) {
        trace!(
            agent = %self.id,
            from = %message.from,
            action = %message.action.name,
            "dispatching"
        );

        // Replies whose waiter was already completed at delivery time arrive
        // here only when no request claimed them.
        if message.is_reply() {
            self.consume_reply(message).await;
            return;
        }

        let lookup = self
            .registry
            .find(&message.action.name)
            .map(|entry| (entry.handler.clone(), entry.help.access_policy));
        let Some((handler, policy)) = lookup else {
            if message.is_broadcast() {
                trace!(
                    agent = %self.id,
                    action = %message.action.name,
                    "broadcast for unknown action dropped"
                );
            } else {
                self.reply_error(
                    &message,
                    &ActionError::no_such_action(&message.action.name, &self.id),
                )
                .await;
            }
            return;
        };

        self.current = Some(message.clone());

        // Access gate.
        match policy {
            AccessPolicy::Permitted => {}
            AccessPolicy::Denied => {
                self.reply_error(
                    &message,
                    &ActionError::access_denied(&message.action.name, &self.id),
                )
                .await;
                self.current = None;
                return;
            }
            AccessPolicy::RequiresConfirmation => {
                let gate = self.request_permission.clone();
                match (gate.as_ref())(self, &message).await {
                    Ok(true) => {}
                    Ok(false) => {
                        self.reply_error(
                            &message,
                            &ActionError::access_denied(&message.action.name, &self.id),
                        )
                        .await;
                        self.current = None;
                        return;
                    }
                    Err(error) => {
                        self.reply_error(&message, &ActionError::callback(format!("{error:#}")))
                            .await;
                        self.current = None;
                        return;
                    }
                }
            }
        }

        // before_action; a failure skips the handler and after_action.
        let hook = self.before_action.clone();
        if let Err(error) = (hook.as_ref())(self, &message).await {
            self.reply_error(&message, &ActionError::callback(format!("{error:#}")))
                .await;
            self.current = None;
            return;
        }

        // Invoke the handler and capture its value or error.
        let replied = Arc::new(AtomicBool::new(false));
        let invocation =
            MessageContext::new(message.clone(), self.context.clone(), replied.clone());
        let outcome = (handler.as_ref())(self, invocation).await;
        let (value, error) = match outcome {
            Ok(value) => (value, None),
            Err(failure) => (None, Some(ActionError::from_handler(failure))),
        };

        // after_action runs unconditionally after the invocation.
        let hook = self.after_action.clone();
        let after = (hook.as_ref())(self, &message, value.as_ref(), error.as_ref()).await;

        if let Err(failure) = after {
            self.reply_error(&message, &ActionError::callback(format!("{failure:#}")))
                .await;
        } else if let Some(error) = &error {
            self.reply_error(&message, error).await;
        } else if let Some(value) = value {
            if !replied.load(Ordering::Acquire) {
                let reply = Message::response_to(&message, value);
                if let Err(error) = self.context.send(reply).await {
                    warn!(agent = %self.id, %error, "failed to send auto-reply");
                }
            }
        }
        self.current = None;
    }

    /// Routes a waiter-less `[response]`/`[error]` to the fire-and-forget
    /// callbacks.
    async fn consume_reply(&mut self, message: Message) {
        self.current = Some(message.clone());
        if message.action.name == RESPONSE_ACTION {
            let value = message
                .action
                .args
                .get("value")
                .cloned()
                .unwrap_or(Value::Null);
            let hook = self.handle_action_value.clone();
            (hook.as_ref())(self, value, &message).await;
        } else if message.action.name == ERROR_ACTION {
            let error = ActionError::from_reply(&message);
            let hook = self.handle_action_error.clone();
            (hook.as_ref())(self, error, &message).await;
        }
        self.current = None;
    }

    /// Sends an `[error]` reply correlated to `original`. Replies never
    /// trigger further auto-replies.
    async fn reply_error(&mut self, original: &Message, error: &ActionError) {
        let reply = Message::error_to(original, error);
        if let Err(send_error) = self.context.send(reply).await {
            warn!(
                agent = %self.id,
                error = %send_error,
                "failed to send error reply"
            );
        }
    }
}
