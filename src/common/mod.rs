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

//! Common utilities and structures shared throughout the crate.

pub(crate) mod agent_handle;
pub(crate) mod agent_reply;
pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod space;
pub(crate) mod types;

pub use agent_handle::AgentHandle;
pub use agent_reply::AgentReply;
pub use config::{AmqpOptions, LimitsConfig, RetryPolicy, SpaceConfig, TimeoutConfig};
pub use context::AgentContext;
pub use space::Space;
pub use types::{FallibleHookFuture, HandlerFuture, HookFuture, PermissionFuture};
