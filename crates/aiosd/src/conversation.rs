//! Conversation store - the one piece of state shared across connections.
//!
//! A bounded, ordered log of role-tagged turns behind a single mutex. The
//! lock is held only to snapshot or mutate, never across a provider call.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Capacity-bounded turn log with FIFO eviction of non-system turns
#[derive(Debug)]
pub struct ConversationStore {
    capacity: usize,
    turns: Mutex<VecDeque<ConversationTurn>>,
}

impl ConversationStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            turns: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panicking holder cannot leave the deque half-mutated, so the data is
    // still consistent after poisoning.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ConversationTurn>> {
        self.turns.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, turn: ConversationTurn) {
        let mut turns = self.lock();
        push_bounded(&mut turns, self.capacity, turn);
    }

    /// Append a user turn and its reply as one atomic step
    pub fn append_exchange(&self, user: impl Into<String>, assistant: impl Into<String>) {
        let mut turns = self.lock();
        push_bounded(&mut turns, self.capacity, ConversationTurn::user(user));
        push_bounded(&mut turns, self.capacity, ConversationTurn::assistant(assistant));
    }

    /// Consistent copy of the current turns, oldest first
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn push_bounded(turns: &mut VecDeque<ConversationTurn>, capacity: usize, turn: ConversationTurn) {
    while turns.len() >= capacity {
        // Oldest non-system turn goes first; a log of only system turns
        // gives up its oldest entry.
        match turns.iter().position(|t| t.role != Role::System) {
            Some(idx) => {
                turns.remove(idx);
            }
            None => {
                turns.pop_front();
            }
        }
    }
    turns.push_back(turn);
}
