//! Conversation memory
//!
//! Keeps the last few turns per user in the cache so the intent classifier
//! sees short-term context. The whole ring expires ten minutes after its
//! last write; reads do not extend it.

pub mod cache;
pub mod store;

pub use cache::{Cache, InMemoryCache};
pub use store::{ConversationTurn, TurnRing, TurnRole, RING_CAPACITY};

use crate::clock::Clock;
use crate::Result;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sliding expiry of a user's ring
pub const MEMORY_TTL_MINUTES: i64 = 10;

pub fn history_key(user_id: i64) -> String {
    format!("ai_chat_history:{}", user_id)
}

pub struct ConversationMemory {
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
}

impl ConversationMemory {
    pub fn new(cache: Arc<dyn Cache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    async fn load(&self, key: &str) -> Result<TurnRing> {
        match self.cache.get(key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(ring) => Ok(ring),
                Err(e) => {
                    // A corrupt ring is replaced on the next append
                    warn!(key = %key, "Discarding unreadable conversation history: {}", e);
                    Ok(TurnRing::default())
                }
            },
            None => Ok(TurnRing::default()),
        }
    }

    /// Append a turn, trim to capacity and renew the expiry
    pub async fn append(&self, user_id: i64, role: TurnRole, text: &str) -> Result<()> {
        let key = history_key(user_id);
        let mut ring = self.load(&key).await?;
        ring.push(ConversationTurn::new(role, text.to_string(), self.clock.now()));

        let raw = serde_json::to_string(&ring)?;
        self.cache
            .set(&key, raw, Duration::minutes(MEMORY_TTL_MINUTES))
            .await?;

        debug!(user_id, role = role.as_str(), turns = ring.len(), "Conversation turn stored");
        Ok(())
    }

    /// Turns oldest first
    pub async fn read(&self, user_id: i64) -> Result<Vec<ConversationTurn>> {
        let ring = self.load(&history_key(user_id)).await?;
        Ok(ring.chronological())
    }

    pub async fn clear(&self, user_id: i64) -> Result<()> {
        self.cache.delete(&history_key(user_id)).await
    }
}
