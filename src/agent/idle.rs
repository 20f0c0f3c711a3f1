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
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{instrument, trace};

use crate::agent::registry::ActionHelp;
use crate::agent::{ManagedAgent, Started};
use crate::common::space::AgentSlot;
use crate::common::types::{
    ActionHandler, FallibleHookFuture, HandlerFuture, HookFuture, PermissionFuture,
};
use crate::common::AgentHandle;
use crate::message::{ActionError, Message, MessageContext, SpaceError};
use crate::transport::{AgentRegistration, Mailbox, Transport};

/// Type-state marker for a [`ManagedAgent`] that has been configured but not
/// yet joined to its space.
///
/// In the `Idle` state the agent is a builder: actions are registered with
/// [`ManagedAgent::act_on`], lifecycle hooks attached, and the own-broadcast
/// flag set. Calling [`ManagedAgent::start`] joins the space and transitions
/// the agent to the [`Started`] state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Idle;

impl<Model: Default + Send + Debug + 'static> ManagedAgent<Idle, Model> {
    /// Registers a public action under `name` with its descriptor and handler.
    ///
    /// The handler receives the agent (for synchronous state access) and an
    /// owned [`MessageContext`] (current message, argument binding, replies)
    /// for its asynchronous tail. Its resolved `Ok(Some(value))` is
    /// auto-replied as `[response]` unless the handler replied explicitly;
    /// `Ok(None)` replies nothing; a failure replies `[error]`.
    ///
    /// # Errors
    ///
    /// Fails at construction when `name` is reserved (`[response]`,
    /// `[error]`) or already registered on this agent.
    pub fn act_on(
        &mut self,
        name: &str,
        help: ActionHelp,
        handler: impl Fn(&mut ManagedAgent<Started, Model>, MessageContext) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    ) -> Result<&mut Self, SpaceError> {
        self.registry.register(name, help, Arc::new(handler))?;
        Ok(self)
    }

    /// Controls whether broadcasts sent by this agent are delivered back to
    /// it. Defaults to `true`.
    pub fn receive_own_broadcasts(&mut self, enabled: bool) -> &mut Self {
        self.receive_own_broadcasts = enabled;
        self
    }

    /// Sets the hook invoked after the agent joins its space, before it
    /// begins processing incoming messages. The agent may `send` during this
    /// hook but must not `request`.
    pub fn after_add(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>) -> HookFuture + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_add = Arc::new(hook);
        self
    }

    /// Sets the hook invoked before the agent leaves its space, after it has
    /// stopped processing incoming messages. The agent may `send` final
    /// messages during this hook but must not `request`.
    pub fn before_remove(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>) -> HookFuture + Send + Sync + 'static,
    ) -> &mut Self {
        self.before_remove = Arc::new(hook);
        self
    }

    /// Sets the hook invoked before every permitted action. A failure replies
    /// `callback-error` to the sender and skips the handler.
    pub fn before_action(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>, &Message) -> FallibleHookFuture
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.before_action = Arc::new(hook);
        self
    }

    /// Sets the hook invoked after every attempted action, observing the
    /// captured return value or error.
    pub fn after_action(
        &mut self,
        hook: impl Fn(
                &mut ManagedAgent<Started, Model>,
                &Message,
                Option<&serde_json::Value>,
                Option<&ActionError>,
            ) -> FallibleHookFuture
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.after_action = Arc::new(hook);
        self
    }

    /// Sets the callback consulted for `requires-confirmation` actions. A
    /// truthy result allows the invocation; a falsy result denies it; a
    /// failure replies `callback-error`. The callback runs on the agent's
    /// worker and may block it.
    pub fn request_permission(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>, &Message) -> PermissionFuture
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.request_permission = Arc::new(hook);
        self
    }

    /// Sets the fire-and-forget consumer for `[response]` replies that no
    /// `request` waiter claimed.
    pub fn handle_action_value(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>, serde_json::Value, &Message) -> HookFuture
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.handle_action_value = Arc::new(hook);
        self
    }

    /// Sets the fire-and-forget consumer for `[error]` replies that no
    /// `request` waiter claimed.
    pub fn handle_action_error(
        &mut self,
        hook: impl Fn(&mut ManagedAgent<Started, Model>, ActionError, &Message) -> HookFuture
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.handle_action_error = Arc::new(hook);
        self
    }

    /// Joins the agent to its space and starts its worker.
    ///
    /// Binds the agent's mailbox to the transport under its id (failing on a
    /// duplicate), spawns the worker task, runs the `after_add` hook, and
    /// returns once the agent is live and processing messages.
    #[instrument(skip(self), fields(agent = %self.id))]
    pub async fn start(self) -> Result<AgentHandle, SpaceError> {
        let registration = AgentRegistration {
            id: self.id.clone(),
            mailbox: Mailbox::new(self.inbox_tx.clone(), self.context.pending.clone()),
            receive_own_broadcasts: self.receive_own_broadcasts,
        };
        let space = self.context.space.clone();
        space.transport.attach(registration).await?;

        let tracker = TaskTracker::new();
        let slot = AgentSlot {
            tracker: tracker.clone(),
            cancellation_token: self.context.cancellation_token.clone(),
        };
        if space.agents.insert(self.id.clone(), slot).is_some() {
            space.transport.detach(&self.id).await.ok();
            return Err(SpaceError::DuplicateAgentId(self.id.clone()));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = AgentHandle::new(self.context.clone(), tracker.clone());
        let mut agent = self.into_phase::<Started>();
        tracker.spawn(async move { agent.wake(ready_tx).await });
        tracker.close();
        let _ = ready_rx.await;
        trace!("agent started");
        Ok(handle)
    }

    pub(crate) fn register_help(&mut self) {
        let help = ActionHelp::new(
            "Returns the introspected actions on this agent: all of them, or \
             a single one when action_name is given.",
        )
        .arg(
            "action_name",
            "string",
            "(Optional) The name of an action to request help for",
        )
        .returns("object", "Action descriptors keyed by action name");
        let handler: ActionHandler<Model> = Arc::new(|agent, context| {
            let listing = match context.args().optional::<String>("action_name") {
                Ok(Some(name)) => agent.registry.help_for(&name),
                Ok(None) => agent.registry.help_all(),
                Err(error) => return Box::pin(async move { Err(error) }) as HandlerFuture,
            };
            Box::pin(async move { Ok(Some(listing)) })
        });
        self.registry
            .register("help", help, handler)
            .expect("the built-in help action registers into an empty registry");
    }
}
