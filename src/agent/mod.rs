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

//! The core agent structure and its type-state phases.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::context::AgentContext;
use crate::common::types::{
    AfterActionHook, ErrorHook, FallibleHookFuture, HookFuture, LifecycleHook, MessageHook,
    MessageSender, PermissionFuture, PermissionHook, ValueHook,
};
use crate::message::{ActionError, Message};

pub(crate) mod idle;
pub(crate) mod registry;
pub(crate) mod started;

pub use idle::Idle;
pub use registry::{AccessPolicy, ActionArgs, ActionHelp, ParamHelp};
pub use started::Started;

use registry::ActionRegistry;

/// A participant in a space, generic over its lifecycle phase and its
/// user-defined state (`model`).
///
/// A `ManagedAgent<Idle, Model>` is a builder: actions are registered with
/// [`act_on`](ManagedAgent::act_on), lifecycle hooks attached, and the agent
/// joined to its space with [`start`](ManagedAgent::start). Starting yields a
/// `ManagedAgent<Started, Model>` owned by a dedicated worker task that
/// processes the inbox strictly in FIFO order, plus an
/// [`AgentHandle`](crate::common::AgentHandle) for the outside world.
///
/// Handlers and hooks receive `&mut` access to the agent (including the
/// public `model` field) for synchronous state changes, and return a boxed
/// future for asynchronous work.
pub struct ManagedAgent<Phase, Model: Default + Send + Debug + 'static> {
    /// The user-defined state of this agent.
    pub model: Model,
    pub(crate) id: String,
    pub(crate) registry: ActionRegistry<Model>,
    pub(crate) receive_own_broadcasts: bool,
    pub(crate) context: AgentContext,
    pub(crate) inbox: mpsc::Receiver<Message>,
    pub(crate) inbox_tx: MessageSender,
    pub(crate) current: Option<Message>,
    pub(crate) after_add: LifecycleHook<Model>,
    pub(crate) before_remove: LifecycleHook<Model>,
    pub(crate) before_action: MessageHook<Model>,
    pub(crate) after_action: AfterActionHook<Model>,
    pub(crate) request_permission: PermissionHook<Model>,
    pub(crate) handle_action_value: ValueHook<Model>,
    pub(crate) handle_action_error: ErrorHook<Model>,
    pub(crate) phase: PhantomData<Phase>,
}

impl<Phase, Model: Default + Send + Debug + 'static> Debug for ManagedAgent<Phase, Model> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedAgent")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("registry", &self.registry)
            .field("receive_own_broadcasts", &self.receive_own_broadcasts)
            .finish()
    }
}

impl<Phase, Model: Default + Send + Debug + 'static> ManagedAgent<Phase, Model> {
    /// The agent's unique id within its space.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A clone of the agent's messaging capabilities, usable from the
    /// asynchronous tail of handlers and hooks.
    pub fn context(&self) -> AgentContext {
        self.context.clone()
    }

    /// The message currently being handled. Valid only during a handler or a
    /// surrounding callback.
    pub fn current_message(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    pub(crate) fn into_phase<Next>(self) -> ManagedAgent<Next, Model> {
        ManagedAgent {
            model: self.model,
            id: self.id,
            registry: self.registry,
            receive_own_broadcasts: self.receive_own_broadcasts,
            context: self.context,
            inbox: self.inbox,
            inbox_tx: self.inbox_tx,
            current: self.current,
            after_add: self.after_add,
            before_remove: self.before_remove,
            before_action: self.before_action,
            after_action: self.after_action,
            request_permission: self.request_permission,
            handle_action_value: self.handle_action_value,
            handle_action_error: self.handle_action_error,
            phase: PhantomData,
        }
    }
}

impl<Model: Default + Send + Debug + 'static> ManagedAgent<Idle, Model> {
    pub(crate) fn new(
        id: String,
        context: AgentContext,
        inbox: mpsc::Receiver<Message>,
        inbox_tx: MessageSender,
    ) -> Self {
        let mut agent = Self {
            model: Model::default(),
            id,
            registry: ActionRegistry::default(),
            receive_own_broadcasts: true,
            context,
            inbox,
            inbox_tx,
            current: None,
            after_add: noop_lifecycle(),
            before_remove: noop_lifecycle(),
            before_action: Arc::new(|_agent, _message| {
                Box::pin(async { Ok(()) }) as FallibleHookFuture
            }),
            after_action: Arc::new(|_agent, _message, _value, _error| {
                Box::pin(async { Ok(()) }) as FallibleHookFuture
            }),
            request_permission: default_request_permission(),
            handle_action_value: default_handle_action_value(),
            handle_action_error: default_handle_action_error(),
            phase: PhantomData,
        };
        agent.register_help();
        agent
    }
}

fn noop_lifecycle<Model: Default + Send + Debug + 'static>() -> LifecycleHook<Model> {
    Arc::new(|_agent| Box::pin(async {}) as HookFuture)
}

fn default_request_permission<Model: Default + Send + Debug + 'static>() -> PermissionHook<Model> {
    Arc::new(|agent, _message| {
        let agent_id = agent.id.clone();
        Box::pin(async move {
            Err(anyhow::anyhow!(
                "\"{agent_id}\" must set request_permission to expose requires-confirmation actions"
            ))
        }) as PermissionFuture
    })
}

fn default_handle_action_value<Model: Default + Send + Debug + 'static>() -> ValueHook<Model> {
    Arc::new(|agent, value: Value, _message| {
        debug!(
            agent = %agent.id,
            %value,
            "a value was returned from an action; set handle_action_value to consume it"
        );
        Box::pin(async {}) as HookFuture
    })
}

fn default_handle_action_error<Model: Default + Send + Debug + 'static>() -> ErrorHook<Model> {
    Arc::new(|agent, error: ActionError, _message| {
        debug!(
            agent = %agent.id,
            %error,
            "an error was raised from an action; set handle_action_error to consume it"
        );
        Box::pin(async {}) as HookFuture
    })
}
