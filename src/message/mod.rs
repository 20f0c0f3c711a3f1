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

//! The wire-level message schema, per-invocation reply contexts, and the
//! error taxonomy shared by both transports.

pub(crate) mod error;
pub(crate) mod message_context;
pub(crate) mod schema;

pub use error::{ActionError, ErrorKind, SpaceError};
pub use message_context::MessageContext;
pub use schema::{
    Action, Message, BROADCAST_ID, ERROR_ACTION, META_ID, META_PARENT_ID, RESPONSE_ACTION,
};
