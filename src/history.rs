use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_MAX_HISTORY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation. Serializes as `{"role", "content"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sliding window over the most recent turns.
///
/// Eviction is purely by age: a user turn can be dropped while its
/// assistant reply is kept.
#[derive(Debug, Clone)]
pub struct History {
    turns: VecDeque<Turn>,
    max: usize,
}

impl History {
    /// `max` is clamped to at least one turn.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            turns: VecDeque::with_capacity(max),
            max,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}
