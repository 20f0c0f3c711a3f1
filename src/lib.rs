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

#![forbid(unsafe_code)]
// #![warn(missing_docs)]

//! # Ambit
//!
//! Ambit is an agent messaging substrate built on top of Tokio. Heterogeneous
//! participants (model drivers, automation scripts, OS adapters, human
//! frontends) join a shared **space** as uniformly addressable **agents** and
//! invoke one another's named, typed **actions** by exchanging validated
//! messages.
//!
//! ## Key Concepts
//!
//! - **Agents (`ManagedAgent`)**: participants built with a type-state builder
//!   (`Idle` → `Started`), each owning a FIFO inbox and a single worker task.
//! - **Actions**: named operations with a declarative descriptor
//!   ([`ActionHelp`](crate::agent::ActionHelp)): argument schema, return
//!   description, and an access policy (`permitted`, `denied`,
//!   `requires-confirmation`).
//! - **Spaces (`Space`)**: containers binding agents to a transport and
//!   enforcing the core invariants (unique ids, validation, delivery).
//! - **Transports**: an in-process transport and an AMQP transport with
//!   identical observable behavior.
//! - **Requests**: a synchronous `request` built on asynchronous delivery,
//!   correlated through `meta.parent_id` and resolved by one-shot waiters.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ambit::prelude::*;
//!
//! let space = Space::local();
//! let mut calc = space.new_agent::<CalcModel>("Calc")?;
//! calc.act_on(
//!     "add",
//!     ActionHelp::new("Adds two integers")
//!         .arg("a", "integer", "First addend")
//!         .arg("b", "integer", "Second addend")
//!         .returns("integer", "The sum"),
//!     |_agent, context| {
//!         Box::pin(async move {
//!             let a: i64 = context.args().required("a")?;
//!             let b: i64 = context.args().required("b")?;
//!             Ok(Some((a + b).into()))
//!         })
//!     },
//! )?;
//! let calc = calc.start().await?;
//! ```

/// Internal utilities and structures shared throughout the crate.
pub(crate) mod common;

/// Defines the core agent structures, the action registry, and dispatch logic.
pub(crate) mod agent;

/// Defines the message schema, reply contexts, and the error taxonomy.
pub(crate) mod message;

/// Defines the transport seam and its local and AMQP implementations.
pub(crate) mod transport;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Core Types
/// *   [`crate::common::Space`]: Entry point; owns membership and a transport.
/// *   [`crate::agent::ManagedAgent`]: The agent builder/worker structure.
/// *   [`crate::agent::Idle`] / [`crate::agent::Started`]: Type-state markers.
/// *   [`crate::common::AgentHandle`]: External reference to a live agent.
/// *   [`crate::common::AgentContext`]: Clonable messaging capability handle.
/// *   [`crate::common::AgentReply`]: Helpers for handler/hook return futures.
/// *   [`crate::message::Message`] / [`crate::message::Action`]: The envelope.
/// *   [`crate::message::MessageContext`]: Per-invocation reply context.
/// *   [`crate::agent::ActionHelp`] / [`crate::agent::ParamHelp`]: Descriptors.
/// *   [`crate::agent::ActionArgs`]: By-name argument binding.
/// *   [`crate::agent::AccessPolicy`]: Per-action access policy.
/// *   [`crate::message::ActionError`] / [`crate::message::ErrorKind`]: The
///     wire-level error taxonomy.
/// *   [`crate::message::SpaceError`]: Space lifecycle and registration errors.
/// *   [`crate::common::AmqpOptions`] / [`crate::common::RetryPolicy`]: AMQP
///     transport configuration.
pub mod prelude {
    pub use crate::agent::{
        AccessPolicy, ActionArgs, ActionHelp, Idle, ManagedAgent, ParamHelp, Started,
    };
    pub use crate::common::{
        AgentContext, AgentHandle, AgentReply, AmqpOptions, FallibleHookFuture, HandlerFuture,
        HookFuture, PermissionFuture, RetryPolicy, Space, SpaceConfig,
    };
    pub use crate::message::{
        Action, ActionError, ErrorKind, Message, MessageContext, SpaceError, BROADCAST_ID,
        ERROR_ACTION, RESPONSE_ACTION,
    };
}
