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

//! Per-agent action registration and introspection.
//!
//! Dispatch is by action *name*, not by type: each registered action pairs a
//! declarative descriptor ([`ActionHelp`]) with a handler, and argument
//! binding pulls named values out of a generic map ([`ActionArgs`]). Type
//! information in descriptors is descriptive, not enforced at dispatch.

use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::types::ActionHandler;
use crate::message::error::SpaceError;
use crate::message::schema::{ERROR_ACTION, RESPONSE_ACTION};

/// The access policy attached to an action at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    /// The action may be invoked by any agent.
    #[default]
    Permitted,
    /// Invocations are always rejected with `access-denied`.
    Denied,
    /// Each invocation is routed through the agent's `request_permission`
    /// callback before the handler runs.
    RequiresConfirmation,
}

/// Describes one declared argument or return value: a type name and a
/// human-readable description. Purely informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamHelp {
    /// The declared type, e.g. `"string"` or `"integer"`.
    #[serde(rename = "type", default)]
    pub type_name: String,
    /// What the value means.
    #[serde(default)]
    pub description: String,
}

impl ParamHelp {
    /// Creates a parameter description.
    pub fn new(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            description: description.into(),
        }
    }
}

/// The declarative descriptor registered alongside an action handler.
///
/// This is the shape returned by the built-in `help` action, keyed by action
/// name: description, argument schema, return description, and access policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionHelp {
    /// What the action does.
    #[serde(default)]
    pub description: String,
    /// Declared arguments by name.
    #[serde(default)]
    pub args: BTreeMap<String, ParamHelp>,
    /// The declared return value, if the action returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ParamHelp>,
    /// The access policy applied by the gate before the handler runs.
    #[serde(default)]
    pub access_policy: AccessPolicy,
}

impl ActionHelp {
    /// Creates a descriptor with the given description, no arguments, no
    /// return value, and the default `permitted` policy.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Declares an argument, consuming and returning the descriptor.
    #[must_use]
    pub fn arg(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.args
            .insert(name.into(), ParamHelp::new(type_name, description));
        self
    }

    /// Declares the return value, consuming and returning the descriptor.
    #[must_use]
    pub fn returns(
        mut self,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.returns = Some(ParamHelp::new(type_name, description));
        self
    }

    /// Sets the access policy, consuming and returning the descriptor.
    #[must_use]
    pub fn access(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }
}

/// The arguments of one action invocation, bound by name.
///
/// Extraction deserializes into the requested type; a missing required
/// argument or a type mismatch fails the handler with a descriptive error.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs(Map<String, Value>);

impl ActionArgs {
    pub(crate) fn new(args: Map<String, Value>) -> Self {
        Self(args)
    }

    /// Extracts a required argument by name.
    pub fn required<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| anyhow!("missing required argument '{name}'"))?;
        serde_json::from_value(value.clone())
            .map_err(|error| anyhow!("invalid argument '{name}': {error}"))
    }

    /// Extracts an optional argument by name. Absent and `null` values both
    /// yield `None`.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|error| anyhow!("invalid argument '{name}': {error}")),
        }
    }

    /// The raw value of an argument, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The number of supplied arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One registered action: its exposed name, descriptor, and handler.
pub(crate) struct ActionEntry<Model: Default + Send + Debug + 'static> {
    pub(crate) name: String,
    pub(crate) help: ActionHelp,
    pub(crate) handler: ActionHandler<Model>,
}

/// The ordered per-agent registry of actions.
///
/// Registration order is preserved and reflected by the `help` projection.
/// Registering a reserved name or the same name twice fails at construction.
pub(crate) struct ActionRegistry<Model: Default + Send + Debug + 'static> {
    entries: Vec<ActionEntry<Model>>,
}

impl<Model: Default + Send + Debug + 'static> Default for ActionRegistry<Model> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<Model: Default + Send + Debug + 'static> Debug for ActionRegistry<Model> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field(
                "actions",
                &self
                    .entries
                    .iter()
                    .map(|entry| entry.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<Model: Default + Send + Debug + 'static> ActionRegistry<Model> {
    pub(crate) fn register(
        &mut self,
        name: &str,
        help: ActionHelp,
        handler: ActionHandler<Model>,
    ) -> Result<(), SpaceError> {
        if name == RESPONSE_ACTION || name == ERROR_ACTION {
            return Err(SpaceError::ReservedAction(name.to_string()));
        }
        if self.find(name).is_some() {
            return Err(SpaceError::DuplicateAction(name.to_string()));
        }
        self.entries.push(ActionEntry {
            name: name.to_string(),
            help,
            handler,
        });
        Ok(())
    }

    pub(crate) fn find(&self, name: &str) -> Option<&ActionEntry<Model>> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// The full introspected registry, keyed by action name in registration
    /// order.
    pub(crate) fn help_all(&self) -> Value {
        let mut listing = Map::new();
        for entry in &self.entries {
            listing.insert(
                entry.name.clone(),
                serde_json::to_value(&entry.help).unwrap_or(Value::Null),
            );
        }
        Value::Object(listing)
    }

    /// The single named entry, or an empty mapping for unknown names.
    pub(crate) fn help_for(&self, name: &str) -> Value {
        let mut listing = Map::new();
        if let Some(entry) = self.find(name) {
            listing.insert(
                entry.name.clone(),
                serde_json::to_value(&entry.help).unwrap_or(Value::Null),
            );
        }
        Value::Object(listing)
    }
}
