use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::role::Role;

/// The ordered, append-only history of one task.
///
/// A store belongs to exactly one agent run; messages can be added but never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation from seed messages (system, developer, user)
    pub fn seeded<I: IntoIterator<Item = Message>>(seed: I) -> Self {
        Self {
            messages: seed.into_iter().collect(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The full history, in order, as sent to the model
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages added after the first `seed_len`
    pub fn since(&self, seed_len: usize) -> &[Message] {
        &self.messages[seed_len.min(self.messages.len())..]
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
