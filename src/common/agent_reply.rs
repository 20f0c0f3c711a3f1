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

//! Convenient boxed-future constructors for handlers and hooks.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::common::types::{FallibleHookFuture, HandlerFuture, HookFuture};

/// A utility namespace for creating the boxed futures handlers and hooks
/// return.
///
/// Action handlers registered with
/// [`ManagedAgent::act_on`](crate::agent::ManagedAgent::act_on) return a
/// [`HandlerFuture`]; lifecycle hooks return a [`HookFuture`] or a
/// [`FallibleHookFuture`]. These helpers cover the common synchronous cases
/// so a handler that finishes its work before any await point does not have
/// to spell out the pinning.
///
/// It acts purely as a namespace and is not intended to be instantiated.
pub struct AgentReply;

impl AgentReply {
    /// A handler future that immediately resolves to the given return value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> HandlerFuture {
        let value = value.into();
        Box::pin(async move { Ok(Some(value)) })
    }

    /// A handler future that immediately resolves with no return value, so no
    /// auto-reply is sent.
    #[must_use]
    pub fn nothing() -> HandlerFuture {
        Box::pin(async { Ok(None) })
    }

    /// A handler future that immediately fails with the given error.
    #[must_use]
    pub fn fail(error: anyhow::Error) -> HandlerFuture {
        Box::pin(async move { Err(error) })
    }

    /// An immediately resolving, no-operation hook future.
    #[must_use]
    pub fn immediate() -> HookFuture {
        Box::pin(async {})
    }

    /// An immediately succeeding fallible hook future.
    #[must_use]
    pub fn ok() -> FallibleHookFuture {
        Box::pin(async { Ok(()) })
    }

    /// Wraps an existing future into a `Pin<Box<F>>`.
    #[inline]
    pub fn from_async<F>(future: F) -> Pin<Box<F>>
    where
        F: Future + Sized,
    {
        Box::pin(future)
    }
}
