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

//! Common internal type aliases for futures, handlers, hooks, and channels.
//!
//! Handlers and hooks take the agent by `&mut` for synchronous state access
//! and return a `'static` boxed future for their asynchronous tail; the tail
//! carries owned data (typically a [`MessageContext`]) rather than borrows,
//! which is what lets the worker await it after the borrow has ended.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::agent::{ManagedAgent, Started};
use crate::message::{ActionError, Message, MessageContext};

/// The future returned by an action handler: an optional return value
/// (auto-replied as `[response]` unless the handler replied explicitly) or a
/// failure (replied as `[error]`).
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = anyhow::Result<Option<Value>>> + Send + 'static>>;

/// The future returned by infallible lifecycle hooks (`after_add`,
/// `before_remove`, `handle_action_value`, `handle_action_error`).
pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The future returned by fallible lifecycle hooks (`before_action`,
/// `after_action`); failures surface as `callback-error` replies.
pub type FallibleHookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// The future returned by `request_permission`: whether the proposed
/// invocation may proceed.
pub type PermissionFuture = Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'static>>;

/// Crate-internal: a registered action handler.
pub(crate) type ActionHandler<Model> = Arc<
    dyn Fn(&mut ManagedAgent<Started, Model>, MessageContext) -> HandlerFuture + Send + Sync,
>;

/// Crate-internal: `after_add` / `before_remove`.
pub(crate) type LifecycleHook<Model> =
    Arc<dyn Fn(&mut ManagedAgent<Started, Model>) -> HookFuture + Send + Sync>;

/// Crate-internal: `before_action`.
pub(crate) type MessageHook<Model> =
    Arc<dyn Fn(&mut ManagedAgent<Started, Model>, &Message) -> FallibleHookFuture + Send + Sync>;

/// Crate-internal: `after_action`, observing the captured value or error.
pub(crate) type AfterActionHook<Model> = Arc<
    dyn Fn(
            &mut ManagedAgent<Started, Model>,
            &Message,
            Option<&Value>,
            Option<&ActionError>,
        ) -> FallibleHookFuture
        + Send
        + Sync,
>;

/// Crate-internal: `request_permission`.
pub(crate) type PermissionHook<Model> =
    Arc<dyn Fn(&mut ManagedAgent<Started, Model>, &Message) -> PermissionFuture + Send + Sync>;

/// Crate-internal: `handle_action_value`.
pub(crate) type ValueHook<Model> = Arc<
    dyn Fn(&mut ManagedAgent<Started, Model>, Value, &Message) -> HookFuture + Send + Sync,
>;

/// Crate-internal: `handle_action_error`.
pub(crate) type ErrorHook<Model> = Arc<
    dyn Fn(&mut ManagedAgent<Started, Model>, ActionError, &Message) -> HookFuture + Send + Sync,
>;

/// Crate-internal: the sender half of an agent's inbox.
pub(crate) type MessageSender = mpsc::Sender<Message>;

/// Crate-internal: the outcome a request waiter resolves to.
pub(crate) type RequestOutcome = Result<Value, ActionError>;

/// Crate-internal: the pending-request table, keyed by the stamped `meta.id`.
pub(crate) type PendingMap = DashMap<String, oneshot::Sender<RequestOutcome>>;
