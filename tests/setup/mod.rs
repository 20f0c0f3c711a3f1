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

use std::sync::Once;

use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Uses `std::sync::Once` so the initialization runs a single time even when
/// called from every test in the binary.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::new("")
            .add_directive("ambit=warn".parse().unwrap())
            .add_directive(tracing_subscriber::filter::LevelFilter::ERROR.into());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// A minimal agent model that reports what happened to it over a channel,
/// so tests can observe handler and hook executions from the outside.
#[derive(Default, Debug)]
pub struct Probe {
    pub tap: Option<mpsc::UnboundedSender<String>>,
}

impl Probe {
    pub fn emit(&self, event: impl Into<String>) {
        if let Some(tap) = &self.tap {
            let _ = tap.send(event.into());
        }
    }
}

/// A fresh tap channel for a `Probe`.
pub fn tap_channel() -> (
    mpsc::UnboundedSender<String>,
    mpsc::UnboundedReceiver<String>,
) {
    mpsc::unbounded_channel()
}
