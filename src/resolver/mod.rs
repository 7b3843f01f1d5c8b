//! Intent resolution
//!
//! Turns raw message text into a typed [`Intent`]:
//! - `/help`, `/clear_history` and `/show_history` resolve locally
//! - everything else goes through the external classifier with the
//!   caller's recent turns as context
//! - classifier failure of any kind falls back to [`FallbackClassifier`]

pub mod prompt;

pub use prompt::{parse_reply, ClassifierPrompt, ClassifierReply, INSTRUCTION};

use crate::classifier::FallbackClassifier;
use crate::error::BotError;
use crate::intent::{Intent, IntentKind};
use crate::memory::{ConversationMemory, TurnRole};
use crate::models::User;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// External free-text classifier
#[async_trait]
pub trait IntentModel: Send + Sync {
    /// Raw reply text, expected to hold the JSON described in the instruction
    async fn classify(&self, prompt: &ClassifierPrompt) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Local,
    Classifier,
    Fallback,
}

/// Outcome of resolving one message. The kind is always known, even when
/// the parameters failed to parse, so the role gate can run first.
#[derive(Debug)]
pub struct Resolution {
    pub kind: IntentKind,
    pub intent: Result<Intent>,
    pub source: ResolutionSource,
    /// Classifier's own reply text, when it answered
    pub message: Option<String>,
}

impl Resolution {
    fn local(intent: Intent) -> Self {
        Self {
            kind: intent.kind(),
            intent: Ok(intent),
            source: ResolutionSource::Local,
            message: None,
        }
    }
}

pub struct IntentResolver {
    model: Arc<dyn IntentModel>,
    memory: Arc<ConversationMemory>,
    timeout: Duration,
}

impl IntentResolver {
    pub fn new(model: Arc<dyn IntentModel>, memory: Arc<ConversationMemory>, timeout: Duration) -> Self {
        Self {
            model,
            memory,
            timeout,
        }
    }

    pub async fn resolve(&self, raw: &str, caller: &User) -> Result<Resolution> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(BotError::invalid("empty input"));
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let command = tokens.first().copied().filter(|t| t.starts_with('/'));

        match command {
            Some("/help") => return Ok(Resolution::local(Intent::Help)),
            Some("/clear_history") => return Ok(Resolution::local(Intent::ClearHistory)),
            Some("/show_history") => return Ok(Resolution::local(Intent::ShowHistory)),
            _ => {}
        }

        match self.ask_classifier(text, caller).await {
            Ok(reply) => {
                let intent = match command {
                    Some(_) if reply.kind == IntentKind::General => Ok(Intent::General {
                        message: reply.message.clone(),
                    }),
                    Some(cmd) => Intent::from_args(reply.kind, cmd, &tokens[1..]),
                    None => Intent::from_data(reply.kind, &reply.data, &reply.message),
                };

                debug!(user_id = caller.id, kind = reply.kind.wire_name(), "Intent resolved by classifier");
                Ok(Resolution {
                    kind: reply.kind,
                    intent,
                    source: ResolutionSource::Classifier,
                    message: Some(reply.message),
                })
            }
            Err(e) => {
                info!(user_id = caller.id, "Classifier unavailable, using fallback: {}", e);
                let (kind, intent) = FallbackClassifier::classify(text);
                Ok(Resolution {
                    kind,
                    intent,
                    source: ResolutionSource::Fallback,
                    message: None,
                })
            }
        }
    }

    /// Memory protocol around one classifier call. Memory errors never
    /// fail the call.
    async fn ask_classifier(&self, text: &str, caller: &User) -> Result<ClassifierReply> {
        let history = self.memory.read(caller.id).await.unwrap_or_else(|e| {
            warn!(user_id = caller.id, "Failed to read conversation history: {}", e);
            Vec::new()
        });

        if let Err(e) = self.memory.append(caller.id, TurnRole::User, text).await {
            warn!(user_id = caller.id, "Failed to store user turn: {}", e);
        }

        let prompt = ClassifierPrompt::new(history, text);
        let raw = match tokio::time::timeout(self.timeout, self.model.classify(&prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BotError::UpstreamUnavailable(format!(
                    "classifier timed out after {}s",
                    self.timeout.as_secs_f32()
                )))
            }
        };

        if let Err(e) = self.memory.append(caller.id, TurnRole::Assistant, &raw).await {
            warn!(user_id = caller.id, "Failed to store assistant turn: {}", e);
        }

        parse_reply(&raw)
    }
}
