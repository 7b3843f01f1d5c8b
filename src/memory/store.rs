//! Conversation turns and the bounded ring they are kept in

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Most turns retained per user
pub const RING_CAPACITY: usize = 3;

/// Role of a turn's author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            role,
            content,
            timestamp,
        }
    }
}

/// Turns stored newest-first, never more than [`RING_CAPACITY`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnRing {
    turns: VecDeque<ConversationTurn>,
}

impl TurnRing {
    /// Insert at the front, evicting the oldest turn when full
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_front(turn);
        self.turns.truncate(RING_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Oldest first
    pub fn chronological(&self) -> Vec<ConversationTurn> {
        self.turns.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::new(TurnRole::User, text.to_string(), Utc::now())
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = TurnRing::default();
        for text in ["a", "b", "c", "d"] {
            ring.push(turn(text));
        }

        assert_eq!(ring.len(), RING_CAPACITY);
        let contents: Vec<_> = ring.chronological().into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_ring_serializes_newest_first() {
        let mut ring = TurnRing::default();
        ring.push(turn("first"));
        ring.push(turn("second"));

        let json = serde_json::to_value(&ring).unwrap();
        assert_eq!(json[0]["content"], "second");
        assert_eq!(json[1]["content"], "first");
    }
}
