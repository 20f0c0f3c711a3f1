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

use ambit::prelude::*;
use serde_json::json;

use crate::setup::{initialize_tracing, tap_channel, Probe};

mod setup;

/// `after_add` runs after the agent joins but before any message is
/// processed.
#[tokio::test]
async fn test_after_add_runs_before_processing() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut agent = space.new_agent::<Probe>("A")?;
    agent.model.tap = Some(tap);
    agent.after_add(|agent| {
        agent.model.emit("added");
        AgentReply::immediate()
    });
    agent.act_on(
        "ping",
        ActionHelp::new("Answers"),
        |agent, _context| {
            agent.model.emit("handled");
            AgentReply::value(json!("pong"))
        },
    )?;
    let handle = agent.start().await?;

    handle
        .send(Message::addressed_to("A", Action::new("ping")))
        .await?;
    assert_eq!(events.recv().await.as_deref(), Some("added"));
    assert_eq!(events.recv().await.as_deref(), Some("handled"));
    Ok(())
}

/// `before_remove` runs when the agent is removed, after processing stops.
#[tokio::test]
async fn test_before_remove_runs_on_removal() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut agent = space.new_agent::<Probe>("A")?;
    agent.model.tap = Some(tap);
    agent.before_remove(|agent| {
        agent.model.emit("removing");
        AgentReply::immediate()
    });
    agent.start().await?;

    assert_eq!(space.agent_count(), 1);
    space.remove("A").await?;
    assert_eq!(events.recv().await.as_deref(), Some("removing"));
    assert_eq!(space.agent_count(), 0);
    Ok(())
}

/// Two agents cannot share an id; the second join fails.
#[tokio::test]
async fn test_duplicate_id_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();

    let first = space.new_agent::<Probe>("Twin")?;
    // Built before the first starts, so only the transport can catch it.
    let second = space.new_agent::<Probe>("Twin")?;
    first.start().await?;
    let result = second.start().await;
    assert!(matches!(result, Err(SpaceError::DuplicateAgentId(id)) if id == "Twin"));

    // Once the first is live, the builder refuses the id immediately.
    assert!(matches!(
        space.new_agent::<Probe>("Twin"),
        Err(SpaceError::DuplicateAgentId(_))
    ));
    Ok(())
}

/// Removing an unknown id fails cleanly.
#[tokio::test]
async fn test_remove_unknown_agent_errors() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    assert!(matches!(
        space.remove("Ghost").await,
        Err(SpaceError::AgentNotFound(_))
    ));
    Ok(())
}

/// Action names must be unique per agent and may not use reserved names.
#[tokio::test]
async fn test_action_registration_rules() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let mut agent = space.new_agent::<Probe>("A")?;

    agent.act_on("work", ActionHelp::new("Works"), |_agent, _context| {
        AgentReply::nothing()
    })?;
    assert!(matches!(
        agent.act_on("work", ActionHelp::new("Again"), |_agent, _context| {
            AgentReply::nothing()
        }),
        Err(SpaceError::DuplicateAction(_))
    ));
    assert!(matches!(
        agent.act_on("help", ActionHelp::new("Mine"), |_agent, _context| {
            AgentReply::nothing()
        }),
        Err(SpaceError::DuplicateAction(_))
    ));
    assert!(matches!(
        agent.act_on(RESPONSE_ACTION, ActionHelp::new("Nope"), |_agent, _context| {
            AgentReply::nothing()
        }),
        Err(SpaceError::ReservedAction(_))
    ));
    assert!(matches!(
        agent.act_on(ERROR_ACTION, ActionHelp::new("Nope"), |_agent, _context| {
            AgentReply::nothing()
        }),
        Err(SpaceError::ReservedAction(_))
    ));
    Ok(())
}

/// Shutdown removes every agent, running `before_remove` for each.
#[tokio::test]
async fn test_shutdown_stops_all_agents() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap_a, mut events_a) = tap_channel();
    let (tap_b, mut events_b) = tap_channel();

    for (id, tap) in [("A", tap_a), ("B", tap_b)] {
        let mut agent = space.new_agent::<Probe>(id)?;
        agent.model.tap = Some(tap);
        agent.before_remove(|agent| {
            agent.model.emit("removing");
            AgentReply::immediate()
        });
        agent.start().await?;
    }

    assert_eq!(space.agent_count(), 2);
    space.shutdown().await?;
    assert_eq!(space.agent_count(), 0);
    assert_eq!(events_a.recv().await.as_deref(), Some("removing"));
    assert_eq!(events_b.recv().await.as_deref(), Some("removing"));
    Ok(())
}

/// `AgentHandle::stop` removes the agent; a second stop reports it gone.
#[tokio::test]
async fn test_handle_stop() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let handle = space.new_agent::<Probe>("A")?.start().await?;

    assert_eq!(space.agent_count(), 1);
    handle.stop().await?;
    assert_eq!(space.agent_count(), 0);
    assert!(handle.stop().await.is_err());
    Ok(())
}

/// An agent may send (but not request) from `before_remove`.
#[tokio::test]
async fn test_before_remove_may_send_final_messages() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut listener = space.new_agent::<Probe>("Listener")?;
    listener.model.tap = Some(tap);
    listener.act_on(
        "say",
        ActionHelp::new("Speaks").arg("content", "string", "What to say"),
        |agent, context| {
            let content: String = match context.args().required("content") {
                Ok(content) => content,
                Err(error) => return AgentReply::fail(error),
            };
            agent.model.emit(content);
            AgentReply::nothing()
        },
    )?;
    listener.start().await?;

    let mut leaver = space.new_agent::<Probe>("Leaver")?;
    leaver.before_remove(|agent| {
        let context = agent.context();
        AgentReply::from_async(async move {
            let _ = context
                .send(Message::addressed_to(
                    "Listener",
                    Action::new("say").arg("content", "goodbye"),
                ))
                .await;
        })
    });
    leaver.start().await?;

    space.remove("Leaver").await?;
    assert_eq!(events.recv().await.as_deref(), Some("goodbye"));
    Ok(())
}
