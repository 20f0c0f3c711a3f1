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

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{instrument, trace};

use crate::message::{Message, SpaceError};
use crate::transport::{AgentRegistration, Mailbox, Transport};

/// The in-process transport: a routing table from agent id to mailbox.
///
/// No network, no serialization; a delivered message object is logically
/// owned by the receiver once enqueued. A broadcast snapshots the current
/// membership at publish time and enqueues a copy per recipient, excluding
/// the sender unless its own-broadcast flag is set.
#[derive(Debug, Default)]
pub(crate) struct LocalTransport {
    routes: DashMap<String, AgentRegistration>,
}

#[async_trait]
impl Transport for LocalTransport {
    async fn attach(&self, registration: AgentRegistration) -> Result<(), SpaceError> {
        match self.routes.entry(registration.id.clone()) {
            Entry::Occupied(_) => Err(SpaceError::DuplicateAgentId(registration.id)),
            Entry::Vacant(slot) => {
                trace!(agent = %registration.id, "attached");
                slot.insert(registration);
                Ok(())
            }
        }
    }

    async fn detach(&self, id: &str) -> Result<(), SpaceError> {
        match self.routes.remove(id) {
            Some(_) => {
                trace!(agent = %id, "detached");
                Ok(())
            }
            None => Err(SpaceError::AgentNotFound(id.to_string())),
        }
    }

    #[instrument(skip(self, message), fields(to = %message.to, action = %message.action.name))]
    async fn publish(&self, message: Message) {
        if message.is_broadcast() {
            // Membership snapshot at publish time.
            let recipients: Vec<Mailbox> = self
                .routes
                .iter()
                .filter(|entry| entry.key() != &message.from || entry.receive_own_broadcasts)
                .map(|entry| entry.mailbox.clone())
                .collect();
            trace!(count = recipients.len(), from = %message.from, "broadcast fan-out");
            for mailbox in recipients {
                mailbox.deliver(message.clone()).await;
            }
        } else {
            let mailbox = self
                .routes
                .get(&message.to)
                .map(|entry| entry.mailbox.clone());
            match mailbox {
                Some(mailbox) => mailbox.deliver(message).await,
                None => trace!(to = %message.to, "message to unknown agent dropped"),
            }
        }
    }

    async fn close(&self) {
        self.routes.clear();
    }
}
