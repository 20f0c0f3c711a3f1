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

use crate::setup::{initialize_tracing, tap_channel, Probe};

mod setup;

/// Every delivered message carries the sender's id, a unique non-empty
/// `meta.id`, and the action exactly as sent.
#[tokio::test]
async fn test_identity_round_trip() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut observer = space.new_agent::<Probe>("Observer")?;
    observer.model.tap = Some(tap);
    observer.act_on(
        "observe",
        ActionHelp::new("Records the envelope of everything it sees"),
        |agent, context| {
            let message = context.message();
            agent.model.emit(format!(
                "{}|{}|{}|{}",
                message.from,
                message.id().unwrap_or_default(),
                message.action.name,
                message.action.args.get("content").cloned().unwrap_or_default()
            ));
            AgentReply::nothing()
        },
    )?;
    observer.start().await?;

    let sender = space.new_agent::<Probe>("Sender")?.start().await?;
    let first_id = sender
        .send(Message::addressed_to(
            "Observer",
            Action::new("observe").arg("content", "hi"),
        ))
        .await?;
    let second_id = sender
        .send(Message::addressed_to(
            "Observer",
            Action::new("observe").arg("content", "again"),
        ))
        .await?;

    let first = events.recv().await.expect("first delivery");
    assert_eq!(first, format!("Sender|{first_id}|observe|\"hi\""));
    let second = events.recv().await.expect("second delivery");
    assert_eq!(second, format!("Sender|{second_id}|observe|\"again\""));
    assert!(!first_id.is_empty());
    assert_ne!(first_id, second_id, "message ids must be unique");
    Ok(())
}

/// A point-to-point message reaches exactly one inbox.
#[tokio::test]
async fn test_point_to_point_uniqueness() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (b_tap, mut b_events) = tap_channel();
    let (c_tap, mut c_events) = tap_channel();

    for (id, tap) in [("B", b_tap), ("C", c_tap)] {
        let mut agent = space.new_agent::<Probe>(id)?;
        agent.model.tap = Some(tap);
        agent.act_on(
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
        agent.start().await?;
    }

    let sender = space.new_agent::<Probe>("Sender")?.start().await?;
    sender
        .send(Message::addressed_to(
            "B",
            Action::new("say").arg("content", "only for B"),
        ))
        .await?;

    assert_eq!(b_events.recv().await.as_deref(), Some("only for B"));
    assert!(
        tokio::time::timeout(Duration::from_millis(100), c_events.recv())
            .await
            .is_err(),
        "C must not receive a message addressed to B"
    );
    Ok(())
}

/// A broadcast reaches every other agent; the sender is excluded when its
/// own-broadcast flag is off.
#[tokio::test]
async fn test_broadcast_say_excludes_sender() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (a_tap, mut a_events) = tap_channel();
    let (b_tap, mut b_events) = tap_channel();
    let (c_tap, mut c_events) = tap_channel();

    let mut speaker = space.new_agent::<Probe>("A")?;
    speaker.model.tap = Some(a_tap);
    speaker.receive_own_broadcasts(false);
    register_say(&mut speaker)?;
    let speaker = speaker.start().await?;

    for (id, tap) in [("B", b_tap), ("C", c_tap)] {
        let mut listener = space.new_agent::<Probe>(id)?;
        listener.model.tap = Some(tap);
        register_say(&mut listener)?;
        listener.start().await?;
    }

    speaker
        .send(Message::broadcast(Action::new("say").arg("content", "hi")))
        .await?;

    assert_eq!(b_events.recv().await.as_deref(), Some("hi"));
    assert_eq!(c_events.recv().await.as_deref(), Some("hi"));
    assert!(
        tokio::time::timeout(Duration::from_millis(100), a_events.recv())
            .await
            .is_err(),
        "A opted out of its own broadcasts"
    );
    Ok(())
}

/// With the default flag, a broadcast is delivered back to its sender too.
#[tokio::test]
async fn test_broadcast_delivered_back_to_sender_by_default() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut speaker = space.new_agent::<Probe>("A")?;
    speaker.model.tap = Some(tap);
    register_say(&mut speaker)?;
    let speaker = speaker.start().await?;

    speaker
        .send(Message::broadcast(Action::new("say").arg("content", "echo")))
        .await?;
    assert_eq!(events.recv().await.as_deref(), Some("echo"));
    Ok(())
}

/// Messages from one sender to one recipient are handled in send order.
#[tokio::test]
async fn test_per_agent_fifo() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut listener = space.new_agent::<Probe>("B")?;
    listener.model.tap = Some(tap);
    register_say(&mut listener)?;
    listener.start().await?;

    let sender = space.new_agent::<Probe>("A")?.start().await?;
    for n in 0..20 {
        sender
            .send(Message::addressed_to(
                "B",
                Action::new("say").arg("content", format!("m{n}")),
            ))
            .await?;
    }
    for n in 0..20 {
        assert_eq!(events.recv().await, Some(format!("m{n}")));
    }
    Ok(())
}

/// A point-to-point message to an unknown id is silently dropped and does not
/// disturb later traffic.
#[tokio::test]
async fn test_unknown_recipient_silently_dropped() -> anyhow::Result<()> {
    initialize_tracing();
    let space = Space::local();
    let (tap, mut events) = tap_channel();

    let mut listener = space.new_agent::<Probe>("B")?;
    listener.model.tap = Some(tap);
    register_say(&mut listener)?;
    listener.start().await?;

    let sender = space.new_agent::<Probe>("A")?.start().await?;
    let dropped_id = sender
        .send(Message::addressed_to(
            "Nobody",
            Action::new("say").arg("content", "void"),
        ))
        .await?;
    assert!(!dropped_id.is_empty(), "send still stamps and succeeds");

    sender
        .send(Message::addressed_to(
            "B",
            Action::new("say").arg("content", "still works"),
        ))
        .await?;
    assert_eq!(events.recv().await.as_deref(), Some("still works"));
    Ok(())
}

fn register_say(agent: &mut ManagedAgent<Idle, Probe>) -> Result<(), SpaceError> {
    agent.act_on(
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
    Ok(())
}
