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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use static_assertions::assert_impl_all;

use crate::message::error::{ActionError, SpaceError};

/// The reserved recipient id denoting a broadcast to every agent in a space.
pub const BROADCAST_ID: &str = "*";

/// The reserved action name carrying a successful return value.
pub const RESPONSE_ACTION: &str = "[response]";

/// The reserved action name carrying a structured error.
pub const ERROR_ACTION: &str = "[error]";

/// Reserved `meta` key: the globally unique id assigned at send time.
pub const META_ID: &str = "id";

/// Reserved `meta` key: the `meta.id` of the message that caused this one.
pub const META_PARENT_ID: &str = "parent_id";

/// A named operation invocation: the action name plus a mapping of named
/// arguments. Argument values are opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The name of the action to invoke on the recipient.
    pub name: String,
    /// Named arguments, bound to the handler's declared parameters by name.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Action {
    /// Creates an action with the given name and no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
        }
    }

    /// Adds a named argument, consuming and returning the action for chaining.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// The canonical message envelope that flows through a space.
///
/// Only `to` and `action` are required of a sender; the space stamps `from`
/// and `meta.id` at send time and rejects callers that try to forge the
/// sender.
/// Unknown `meta` keys pass through unchanged, which is how applications
/// attach their own correlation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Free-form metadata. The keys `id` and `parent_id` are reserved and
    /// managed by the space; everything else is opaque to the core.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    /// The sender's agent id, stamped by the space at send time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    /// The recipient's agent id, or [`BROADCAST_ID`] for a broadcast.
    pub to: String,
    /// The invoked action.
    pub action: Action,
}

impl Message {
    /// Creates a partial message addressed to a single agent.
    pub fn addressed_to(to: impl Into<String>, action: Action) -> Self {
        Self {
            meta: Map::new(),
            from: String::new(),
            to: to.into(),
            action,
        }
    }

    /// Creates a partial broadcast message, addressed to [`BROADCAST_ID`].
    pub fn broadcast(action: Action) -> Self {
        Self::addressed_to(BROADCAST_ID, action)
    }

    /// Attaches a metadata entry, consuming and returning the message.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// The globally unique message id, present once the message is stamped.
    pub fn id(&self) -> Option<&str> {
        self.meta.get(META_ID).and_then(Value::as_str)
    }

    /// The id of the message that caused this one, present on replies.
    pub fn parent_id(&self) -> Option<&str> {
        self.meta.get(META_PARENT_ID).and_then(Value::as_str)
    }

    /// Whether this message is addressed to every agent in the space.
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_ID
    }

    /// Whether this message carries a `[response]` or `[error]` reply.
    pub fn is_reply(&self) -> bool {
        self.action.name == RESPONSE_ACTION || self.action.name == ERROR_ACTION
    }

    /// Builds the `[response]` reply to `original` carrying `value`.
    ///
    /// The reply is addressed to the original sender and correlated through
    /// `meta.parent_id`.
    pub fn response_to(original: &Message, value: Value) -> Self {
        let mut reply = Self::addressed_to(
            original.from.clone(),
            Action::new(RESPONSE_ACTION).arg("value", value),
        );
        if let Some(id) = original.id() {
            reply = reply.with_meta(META_PARENT_ID, id);
        }
        reply
    }

    /// Builds the `[error]` reply to `original` carrying `error`.
    pub fn error_to(original: &Message, error: &ActionError) -> Self {
        let mut reply = Self::addressed_to(original.from.clone(), error.to_action());
        if let Some(id) = original.id() {
            reply = reply.with_meta(META_PARENT_ID, id);
        }
        reply
    }
}

assert_impl_all!(Message: Send, Sync);
assert_impl_all!(Action: Send, Sync);

/// Validates an agent id before it may join a space.
///
/// Ids are caller-chosen flat strings: 1 to 255 characters, not the reserved
/// broadcast id, and not within the `amq.`-prefixed namespace reserved by
/// AMQP brokers.
pub(crate) fn validate_agent_id(id: &str) -> Result<(), SpaceError> {
    if id.is_empty() || id.len() > 255 {
        return Err(SpaceError::InvalidAgentId {
            id: id.to_string(),
            reason: "id must be between 1 and 255 characters".to_string(),
        });
    }
    if id == BROADCAST_ID {
        return Err(SpaceError::InvalidAgentId {
            id: id.to_string(),
            reason: format!("id cannot be \"{BROADCAST_ID}\""),
        });
    }
    if id.starts_with("amq.") {
        return Err(SpaceError::InvalidAgentId {
            id: id.to_string(),
            reason: "id cannot start with \"amq.\"".to_string(),
        });
    }
    Ok(())
}

/// Validates a partial message and stamps it for sending on behalf of `from`.
///
/// Fills `from`, assigns a fresh unique `meta.id`, and preserves every
/// caller-supplied `meta` entry (including `parent_id`). Fails with a
/// schema error when the partial is malformed or when the caller tried to
/// forge the `from` field.
pub(crate) fn stamp(mut message: Message, from: &str) -> Result<Message, ActionError> {
    if message.to.is_empty() {
        return Err(ActionError::schema("'to' must be a non-empty string"));
    }
    if message.action.name.is_empty() {
        return Err(ActionError::schema(
            "'action.name' must be a non-empty string",
        ));
    }
    if !message.from.is_empty() && message.from != from {
        return Err(ActionError::schema(format!(
            "'from' field value '{}' does not match this agent's id '{from}'",
            message.from
        )));
    }
    if let Some(parent_id) = message.meta.get(META_PARENT_ID) {
        if !parent_id.is_string() {
            return Err(ActionError::schema("'meta.parent_id' must be a string"));
        }
    }
    message.from = from.to_string();
    message.meta.insert(
        META_ID.to_string(),
        Value::String(uuid::Uuid::new_v4().to_string()),
    );
    Ok(message)
}
