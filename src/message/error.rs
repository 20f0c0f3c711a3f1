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

use serde_json::Value;

use crate::message::schema::{Action, Message, ERROR_ACTION};

/// The short error tags that travel on the wire in `[error]` messages.
///
/// The first seven are the kinds the core itself emits. `RecursiveRequest`
/// is raised locally and never leaves the caller. `Custom` represents tags
/// raised explicitly by handlers via `raise_with` or received from foreign
/// participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Send-time validation failure; raised locally, nothing is published.
    Schema,
    /// Point-to-point send to an agent that does not expose the action.
    NoSuchAction,
    /// The access gate rejected the action.
    AccessDenied,
    /// A lifecycle callback (`before_action`, `after_action`,
    /// `request_permission`) failed.
    Callback,
    /// The action handler itself failed.
    Handler,
    /// A `request` exceeded its deadline.
    Timeout,
    /// An outstanding `request` was cancelled by removal or shutdown, or the
    /// agent is not live on the bus.
    SpaceClosed,
    /// A `request` addressed to the caller's own id; raised locally.
    RecursiveRequest,
    /// Any other tag, carried verbatim.
    Custom(String),
}

impl ErrorKind {
    /// The wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Schema => "schema-error",
            Self::NoSuchAction => "no-such-action",
            Self::AccessDenied => "access-denied",
            Self::Callback => "callback-error",
            Self::Handler => "handler-error",
            Self::Timeout => "timeout",
            Self::SpaceClosed => "space-closed",
            Self::RecursiveRequest => "recursive-request",
            Self::Custom(tag) => tag,
        }
    }

    /// Parses a wire tag, falling back to [`ErrorKind::Custom`] for tags the
    /// core does not define.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "schema-error" => Self::Schema,
            "no-such-action" => Self::NoSuchAction,
            "access-denied" => Self::AccessDenied,
            "callback-error" => Self::Callback,
            "handler-error" => Self::Handler,
            "timeout" => Self::Timeout,
            "space-closed" => Self::SpaceClosed,
            "recursive-request" => Self::RecursiveRequest,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by or about an action invocation.
///
/// `ActionError` is the value carried by `[error]` messages (`args.type` and
/// `args.message`), raised locally by `request`, and handed to
/// `handle_action_error` and `after_action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    /// The short tag classifying the error.
    pub kind: ErrorKind,
    /// A human-readable description.
    pub message: String,
}

impl ActionError {
    /// Creates an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A send-time validation failure.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    /// An unknown action on a point-to-point recipient.
    pub fn no_such_action(action: &str, agent: &str) -> Self {
        Self::new(
            ErrorKind::NoSuchAction,
            format!("\"{action}\" not found on \"{agent}\""),
        )
    }

    /// An access gate denial.
    pub fn access_denied(action: &str, agent: &str) -> Self {
        Self::new(
            ErrorKind::AccessDenied,
            format!("\"{agent}.{action}\" not permitted"),
        )
    }

    /// A lifecycle callback failure.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Callback, message)
    }

    /// An action handler failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    /// A `request` deadline expiry.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// A `request` cancelled by shutdown, or issued while not live.
    pub fn space_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SpaceClosed, message)
    }

    /// A `request` addressed to the caller's own agent.
    pub fn recursive_request(agent: &str) -> Self {
        Self::new(
            ErrorKind::RecursiveRequest,
            format!("recursive request on self: \"{agent}\" cannot await a reply from its own worker"),
        )
    }

    /// Classifies a failure escaping an action handler.
    ///
    /// A handler that fails with an `ActionError` keeps its kind (this is how
    /// custom tags travel); any other failure becomes a `handler-error`.
    pub(crate) fn from_handler(error: anyhow::Error) -> Self {
        match error.downcast::<ActionError>() {
            Ok(action_error) => action_error,
            Err(other) => Self::handler(format!("{other:#}")),
        }
    }

    /// Reconstructs the error carried by an `[error]` message.
    pub(crate) fn from_reply(message: &Message) -> Self {
        let kind = message
            .action
            .args
            .get("type")
            .and_then(Value::as_str)
            .map(ErrorKind::parse)
            .unwrap_or(ErrorKind::Handler);
        let text = message
            .action
            .args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::new(kind, text)
    }

    /// Renders this error as the `[error]` action it travels in.
    pub(crate) fn to_action(&self) -> Action {
        Action::new(ERROR_ACTION)
            .arg("type", self.kind.as_str())
            .arg("message", self.message.clone())
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ActionError {}

/// Errors raised by space lifecycle and registration operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceError {
    /// An agent with this id is already live in the space.
    DuplicateAgentId(String),
    /// The id does not satisfy the agent id rules.
    InvalidAgentId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },
    /// No live agent carries this id.
    AgentNotFound(String),
    /// An action with this name is already registered on the agent.
    DuplicateAction(String),
    /// The action name is reserved by the core.
    ReservedAction(String),
    /// The transport failed.
    Transport(String),
}

impl std::fmt::Display for SpaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateAgentId(id) => write!(f, "agent id already exists: '{id}'"),
            Self::InvalidAgentId { id, reason } => {
                write!(f, "invalid agent id '{id}': {reason}")
            }
            Self::AgentNotFound(id) => write!(f, "agent '{id}' does not exist"),
            Self::DuplicateAction(name) => {
                write!(f, "action '{name}' is already registered")
            }
            Self::ReservedAction(name) => write!(f, "action name '{name}' is reserved"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

impl std::error::Error for SpaceError {}
