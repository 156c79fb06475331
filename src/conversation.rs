//! Bounded conversation history

use std::collections::VecDeque;

use crate::services::{HISTORY_LIMIT, Turn};

/// Trailing turns of one conversation, oldest first
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: VecDeque<Turn>,
    limit: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl Conversation {
    /// Keep at most `limit` turns
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit + 1),
            limit,
        }
    }

    /// Append a turn, evicting the oldest beyond the limit
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    /// Record a completed exchange
    pub fn record_exchange(&mut self, question: &str, reply: &str) {
        self.push(Turn::user(question));
        self.push(Turn::assistant(reply));
    }

    /// Turns as a contiguous slice
    pub fn turns(&mut self) -> &[Turn] {
        self.turns.make_contiguous()
    }

    /// Iterate turns oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Number of stored turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
