//! Message pipeline: sender lookup, intent resolution, dispatch, delivery

use crate::dispatcher::Dispatcher;
use crate::formatter;
use crate::messaging::Messenger;
use crate::resolver::IntentResolver;
use crate::services::Services;
use crate::webhook::InboundMessage;
use crate::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub const NOT_REGISTERED: &str = "❌ User not registered. Please contact admin.";
pub const INACTIVE: &str = "❌ Your account is inactive. Please contact admin.";

pub struct Bot {
    services: Arc<Services>,
    resolver: IntentResolver,
    dispatcher: Dispatcher,
    messenger: Arc<dyn Messenger>,
}

impl Bot {
    pub fn new(
        services: Arc<Services>,
        resolver: IntentResolver,
        dispatcher: Dispatcher,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            services,
            resolver,
            dispatcher,
            messenger,
        }
    }

    /// Reply text for one inbound message. Never fails; problems become ❌ lines.
    pub async fn reply_to(&self, message: &InboundMessage) -> String {
        let caller = match self.services.users.find_by_handle(&message.sender).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!(sender = %message.sender, "Message from unregistered sender");
                return NOT_REGISTERED.to_string();
            }
            Err(e) => {
                warn!(sender = %message.sender, "Sender lookup failed: {}", e);
                return formatter::error(&e);
            }
        };

        if !caller.is_active {
            return INACTIVE.to_string();
        }

        info!(user_id = caller.id, role = caller.role.as_str(), "📨 Message received");

        match self.resolver.resolve(&message.text, &caller).await {
            Ok(resolution) => self.dispatcher.dispatch(&caller, resolution).await,
            Err(e) => formatter::error(&e),
        }
    }

    /// Builds the reply and sends it back to the sender
    pub async fn handle(&self, message: InboundMessage) -> Result<String> {
        let reply = self.reply_to(&message).await;
        self.messenger.send(&message.sender, &reply).await?;
        Ok(reply)
    }

    /// Handles one JSON envelope per line, each on its own task. Returns once
    /// the input is closed and every accepted message has been answered.
    pub async fn serve<R>(self: Arc<Self>, input: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut in_flight = JoinSet::new();
        let mut accepted = 0;
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            // Reap finished handlers so the set does not grow with the input
            while in_flight.try_join_next().is_some() {}

            if line.trim().is_empty() {
                continue;
            }

            let message = match InboundMessage::parse(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring malformed envelope: {}", e);
                    continue;
                }
            };

            accepted += 1;
            let bot = self.clone();
            in_flight.spawn(async move {
                let sender = message.sender.clone();
                if let Err(e) = bot.handle(message).await {
                    error!(sender = %sender, "Failed to deliver reply: {}", e);
                }
            });
        }

        info!("👋 Input closed, waiting for {} pending replies", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Message handler failed: {}", e);
            }
        }

        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::error::BotError;
    use crate::memory::{ConversationMemory, InMemoryCache};
    use crate::models::Role;
    use crate::resolver::{ClassifierPrompt, IntentModel};
    use crate::state::{InMemoryStore, UserRepository};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Offline;

    #[async_trait]
    impl IntentModel for Offline {
        async fn classify(&self, _prompt: &ClassifierPrompt) -> Result<String> {
            Err(BotError::UpstreamUnavailable("no network".to_string()))
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Messenger for Outbox {
        async fn send(&self, handle: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((handle.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn bot() -> (Bot, Arc<Services>, Arc<InMemoryStore>, Arc<Outbox>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryStore::new());
        let outbox = Arc::new(Outbox::default());
        let services = Arc::new(Services::new(store.clone(), outbox.clone(), clock.clone()));
        let memory = Arc::new(ConversationMemory::new(
            Arc::new(InMemoryCache::new(clock.clone())),
            clock,
        ));
        let resolver = IntentResolver::new(Arc::new(Offline), memory.clone(), Duration::from_secs(1));
        let dispatcher = Dispatcher::new(services.clone(), memory);
        let bot = Bot::new(services.clone(), resolver, dispatcher, outbox.clone());
        (bot, services, store, outbox)
    }

    fn inbound(sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            sender: sender.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unregistered_sender() {
        let (bot, _, _, outbox) = bot().await;
        let reply = bot.handle(inbound("62899", "/help")).await.unwrap();
        assert_eq!(reply, NOT_REGISTERED);
        assert_eq!(outbox.sent.lock().unwrap()[0].0, "62899");
    }

    #[tokio::test]
    async fn test_registered_sender_gets_role_help() {
        let (bot, services, _, _) = bot().await;
        services.users.add_user("budi", "", "0811", Role::User).await.unwrap();

        let reply = bot.reply_to(&inbound("62811", "/help")).await;
        assert!(reply.starts_with("✅ Available Commands"));
        assert!(!reply.contains("/create_order"));
    }

    #[tokio::test]
    async fn test_offline_classifier_still_answers() {
        let (bot, services, _, _) = bot().await;
        services.users.add_user("budi", "", "0811", Role::User).await.unwrap();

        let reply = bot.reply_to(&inbound("62811", "order for Jane total 50")).await;
        assert_eq!(reply, "❌ Insufficient permissions for this command");

        let reply = bot.reply_to(&inbound("62811", "good morning")).await;
        assert!(reply.starts_with(formatter::FAIL));
    }

    /// Delivers after a delay, like a slow provider
    #[derive(Default)]
    struct SlowOutbox {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Messenger for SlowOutbox {
        async fn send(&self, handle: &str, _text: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.sent.lock().unwrap().push(handle.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serve_answers_everything_before_returning() {
        let (_, services, _, _) = bot().await;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let memory = Arc::new(ConversationMemory::new(
            Arc::new(InMemoryCache::new(clock.clone())),
            clock,
        ));
        let slow = Arc::new(SlowOutbox::default());
        let bot = Arc::new(Bot::new(
            services.clone(),
            IntentResolver::new(Arc::new(Offline), memory.clone(), Duration::from_secs(1)),
            Dispatcher::new(services, memory),
            slow.clone(),
        ));

        let input = concat!(
            "{\"from\": \"62801\", \"message\": \"/help\"}\n",
            "\n",
            "not json\n",
            "{\"from\": \"62802\", \"message\": \"/help\"}\n",
        );
        let accepted = bot.serve(input.as_bytes()).await.unwrap();

        assert_eq!(accepted, 2);
        let mut sent = slow.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["62801".to_string(), "62802".to_string()]);
    }

    #[tokio::test]
    async fn test_inactive_user_is_refused() {
        let (bot, services, store, _) = bot().await;
        let mut user = services.users.add_user("budi", "", "0811", Role::User).await.unwrap();
        user.is_active = false;
        store.update_user(&user).await.unwrap();

        assert_eq!(bot.reply_to(&inbound("62811", "/help")).await, INACTIVE);
    }
}
