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

use std::env;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Configuration for a space runtime.
///
/// Values are compiled defaults; the AMQP connection additionally reads the
/// environment through [`AmqpOptions::from_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration.
    pub limits: LimitsConfig,
}

/// Timeout-related configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// System-wide shutdown timeout in milliseconds; expiry force-cancels
    /// remaining workers.
    pub system_shutdown_ms: u64,
    /// How often the AMQP supervisor checks connection health, in
    /// milliseconds.
    pub amqp_poll_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            system_shutdown_ms: 30_000,
            amqp_poll_ms: 1_000,
        }
    }
}

/// Limits and capacity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Bounded capacity of each agent's inbox channel.
    pub agent_inbox_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            agent_inbox_capacity: 256,
        }
    }
}

lazy_static! {
    /// Process-wide runtime configuration.
    pub(crate) static ref CONFIG: SpaceConfig = SpaceConfig::default();
}

/// Connection options for the AMQP transport.
///
/// [`AmqpOptions::from_env`] reads `AMQP_HOST`, `AMQP_PORT`, `AMQP_USERNAME`,
/// `AMQP_PASSWORD`, and `AMQP_VHOST`; TLS, heartbeat, the exchange name, and
/// the retry policy are programmatic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpOptions {
    /// Broker hostname.
    pub hostname: String,
    /// Broker port.
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// The virtual host to open.
    pub virtual_host: String,
    /// The topic exchange this space publishes through; also prefixes queue
    /// names so multiple spaces can share one broker.
    pub exchange: String,
    /// Connect with `amqps` instead of `amqp`.
    pub use_tls: bool,
    /// Heartbeat interval in seconds.
    pub heartbeat: u16,
    /// Reconnect policy applied at connect time and on connection loss.
    pub retry: RetryPolicy,
}

impl Default for AmqpOptions {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
            exchange: "ambit".to_string(),
            use_tls: false,
            heartbeat: 60,
            retry: RetryPolicy::default(),
        }
    }
}

impl AmqpOptions {
    /// Builds options from the environment, falling back to the defaults
    /// (`localhost:5672`, `guest`/`guest`, vhost `/`).
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(hostname) = env::var("AMQP_HOST") {
            options.hostname = hostname;
        }
        if let Some(port) = env::var("AMQP_PORT").ok().and_then(|p| p.parse().ok()) {
            options.port = port;
        }
        if let Ok(username) = env::var("AMQP_USERNAME") {
            options.username = username;
        }
        if let Ok(password) = env::var("AMQP_PASSWORD") {
            options.password = password;
        }
        if let Ok(virtual_host) = env::var("AMQP_VHOST") {
            options.virtual_host = virtual_host;
        }
        options
    }

    /// The AMQP URI these options describe. The vhost is percent-encoded and
    /// the heartbeat travels as a query parameter.
    pub(crate) fn uri(&self) -> String {
        let scheme = if self.use_tls { "amqps" } else { "amqp" };
        let vhost = self.virtual_host.replace('/', "%2f");
        format!(
            "{scheme}://{}:{}@{}:{}/{vhost}?heartbeat={}",
            self.username, self.password, self.hostname, self.port, self.heartbeat
        )
    }
}

/// Bounded exponential backoff for AMQP connection attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the doubling delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}
