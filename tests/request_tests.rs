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

#![allow(dead_code)]

use std::time::Duration;

use ambit::prelude::*;
use serde_json::json;

use crate::setup::{initialize_tracing, tap_channel, Probe};

mod setup;

/// The calculator scenario: a `request` resolves to the handler's returned
/// value.
#[tokio::test]
async fn test_calculator_request() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();

    let mut calc = space.new_agent::<Probe>("Calc")?;
    calc.act_on(
        "add",
        ActionHelp::new("Adds two integers")
            .arg("a", "integer", "First addend")
            .arg("b", "integer", "Second addend")
            .returns("integer", "The sum"),
        |_agent, context| {
            Box::pin(async move {
                let a: i64 = context.args().required("a")?;
                let b: i64 = context.args().required("b")?;
                Ok(Some(json!(a + b)))
            })
        },
    )?;
    calc.start().await?;

    let user = space.new_agent::<Probe>("U")?.start().await?;
    let value = user
        .request(
            Message::addressed_to("Calc", Action::new("add").arg("a", 1).arg("b", 2)),
            Duration::from_secs(1),
        )
        .await?;
    assert_eq!(value, json!(3));
    Ok(())
}

/// A fire-and-forget `send` receives the auto-replied `[response]` through
/// `handle_action_value`, correlated by `meta.parent_id`.
#[tokio::test]
async fn test_send_receives_response_via_callback() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut calc = space.new_agent::<Probe>("Calc")?;
    calc.act_on(
        "add",
        ActionHelp::new("Adds two integers"),
        |_agent, context| {
            Box::pin(async move {
                let a: i64 = context.args().required("a")?;
                let b: i64 = context.args().required("b")?;
                Ok(Some(json!(a + b)))
            })
        },
    )?;
    calc.start().await?;

    let mut user = space.new_agent::<Probe>("U")?;
    user.model.tap = Some(tap);
    user.handle_action_value(|agent, value, message| {
        agent.model.emit(format!(
            "value:{value}|parent:{}",
            message.parent_id().unwrap_or_default()
        ));
        AgentReply::immediate()
    });
    let user = user.start().await?;

    let request_id = user
        .send(Message::addressed_to(
            "Calc",
            Action::new("add").arg("a", 1).arg("b", 2),
        ))
        .await?;
    assert_eq!(
        events.recv().await,
        Some(format!("value:3|parent:{request_id}"))
    );
    Ok(())
}

/// A handler failure surfaces to the requester as a raised action error.
#[tokio::test]
async fn test_request_raises_handler_error() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();

    let mut flaky = space.new_agent::<Probe>("Flaky")?;
    flaky.act_on(
        "explode",
        ActionHelp::new("Always fails"),
        |_agent, _context| Box::pin(async { Err(anyhow::anyhow!("boom")) }),
    )?;
    flaky.start().await?;

    let user = space.new_agent::<Probe>("U")?.start().await?;
    let error = user
        .request(
            Message::addressed_to("Flaky", Action::new("explode")),
            Duration::from_secs(1),
        )
        .await
        .expect_err("the handler failed");
    assert_eq!(error.kind, ErrorKind::Handler);
    assert!(error.message.contains("boom"), "got: {}", error.message);
    Ok(())
}

/// A request times out locally, its late reply is routed to the
/// fire-and-forget callback, and a subsequent request is unaffected.
#[tokio::test]
async fn test_request_timeout_and_recovery() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut slow = space.new_agent::<Probe>("Slow")?;
    slow.act_on(
        "sleep",
        ActionHelp::new("Sleeps, then reports how long")
            .arg("ms", "integer", "Milliseconds to sleep")
            .returns("integer", "The slept duration"),
        |_agent, context| {
            Box::pin(async move {
                let ms: u64 = context.args().required("ms")?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Some(json!(ms)))
            })
        },
    )?;
    slow.start().await?;

    let mut user = space.new_agent::<Probe>("U")?;
    user.model.tap = Some(tap);
    user.handle_action_value(|agent, value, _message| {
        agent.model.emit(format!("late:{value}"));
        AgentReply::immediate()
    });
    let user = user.start().await?;

    let error = user
        .request(
            Message::addressed_to("Slow", Action::new("sleep").arg("ms", 500)),
            Duration::from_millis(100),
        )
        .await
        .expect_err("the deadline is shorter than the sleep");
    assert_eq!(error.kind, ErrorKind::Timeout);

    // The second request must not be corrupted by the first one's late reply.
    let value = user
        .request(
            Message::addressed_to("Slow", Action::new("sleep").arg("ms", 10)),
            Duration::from_secs(1),
        )
        .await?;
    assert_eq!(value, json!(10));

    // The late reply had no waiter left and fell through to the callback.
    assert_eq!(events.recv().await.as_deref(), Some("late:500"));
    Ok(())
}

/// `request` addressed to the caller's own id fails fast instead of
/// deadlocking the worker.
#[tokio::test]
async fn test_recursive_request_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();

    let mut echo = space.new_agent::<Probe>("Echo")?;
    echo.act_on(
        "loopback",
        ActionHelp::new("Tries to request itself"),
        |_agent, context| {
            Box::pin(async move {
                let error = context
                    .request(
                        Message::addressed_to("Echo", Action::new("loopback")),
                        Duration::from_secs(1),
                    )
                    .await
                    .expect_err("self-request must be rejected");
                Ok(Some(json!(error.kind.as_str())))
            })
        },
    )?;
    let echo = echo.start().await?;

    // From outside a handler.
    let error = echo
        .request(
            Message::addressed_to("Echo", Action::new("loopback")),
            Duration::from_secs(1),
        )
        .await
        .expect_err("self-request must be rejected");
    assert_eq!(error.kind, ErrorKind::RecursiveRequest);

    // From within a handler.
    let user = space.new_agent::<Probe>("U")?.start().await?;
    let value = user
        .request(
            Message::addressed_to("Echo", Action::new("loopback")),
            Duration::from_secs(1),
        )
        .await?;
    assert_eq!(value, json!("recursive-request"));
    Ok(())
}

/// `request` is unavailable during `after_add`: the agent is not yet live on
/// the bus.
#[tokio::test]
async fn test_request_disallowed_in_after_add() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    space.new_agent::<Probe>("Other")?.start().await?;

    let mut eager = space.new_agent::<Probe>("Eager")?;
    eager.model.tap = Some(tap);
    eager.after_add(|agent| {
        let context = agent.context();
        let tap = agent.model.tap.clone();
        Box::pin(async move {
            let error = context
                .request(
                    Message::addressed_to("Other", Action::new("help")),
                    Duration::from_millis(50),
                )
                .await
                .expect_err("request must be unavailable during after_add");
            if let Some(tap) = tap {
                let _ = tap.send(format!("after_add:{}", error.kind));
            }
        })
    });
    eager.start().await?;

    assert_eq!(
        events.recv().await.as_deref(),
        Some("after_add:space-closed")
    );
    Ok(())
}

/// Removing an agent cancels its outstanding requests with `space-closed`.
#[tokio::test]
async fn test_removal_cancels_outstanding_request() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();

    let mut quiet = space.new_agent::<Probe>("Quiet")?;
    quiet.act_on(
        "void",
        ActionHelp::new("Accepts and never replies"),
        |_agent, _context| AgentReply::nothing(),
    )?;
    quiet.start().await?;

    let user = space.new_agent::<Probe>("U")?.start().await?;
    let requester = user.clone();
    let outstanding = tokio::spawn(async move {
        requester
            .request(
                Message::addressed_to("Quiet", Action::new("void")),
                Duration::from_secs(5),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    space.remove("U").await?;

    let error = outstanding
        .await?
        .expect_err("removal must cancel the waiter");
    assert_eq!(error.kind, ErrorKind::SpaceClosed);
    Ok(())
}
