use ops_bot::{
    bot::Bot,
    clock::{Clock, SystemClock},
    config::Config,
    dispatcher::Dispatcher,
    gemini::GeminiClient,
    memory::{ConversationMemory, InMemoryCache},
    messaging::{ConsoleMessenger, Messenger, WhatsAppClient},
    resolver::IntentResolver,
    scheduler::Scheduler,
    services::Services,
    state::{InMemoryStore, PgStore, Store},
};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn build_services<S>(store: Arc<S>, messenger: Arc<dyn Messenger>, clock: Arc<dyn Clock>) -> Arc<Services>
where
    S: Store + 'static,
{
    Arc::new(Services::new(store, messenger, clock))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    let config = Config::from_env();

    info!("🚀 Business Operations Bot");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let messenger: Arc<dyn Messenger> = match &config.whatsapp {
        Some(whatsapp) => {
            info!("📡 Delivering replies through {}", whatsapp.api_url);
            Arc::new(WhatsAppClient::new(whatsapp)?)
        }
        None => {
            info!("🖥️  No WhatsApp provider configured, replies go to stdout");
            Arc::new(ConsoleMessenger::new())
        }
    };

    let services = match &config.database_url {
        Some(url) => build_services(Arc::new(PgStore::connect_lazy(url)?), messenger.clone(), clock.clone()),
        None => {
            warn!("⚠️  DATABASE_URL not set, using the in-memory store");
            build_services(Arc::new(InMemoryStore::new()), messenger.clone(), clock.clone())
        }
    };

    if let Some(handle) = &config.bootstrap_admin_handle {
        if let Some(admin) = services.users.bootstrap_admin(handle).await? {
            info!("👤 Registered {} as SuperAdmin", admin.whatsapp_number);
        }
    }

    if config.gemini_api_key.is_empty() {
        warn!("⚠️  GEMINI_API_KEY not set, free text will use the keyword fallback");
    }
    let model = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        &config.gemini_model,
        config.classifier_timeout,
    )?);

    let memory = Arc::new(ConversationMemory::new(
        Arc::new(InMemoryCache::new(clock.clone())),
        clock.clone(),
    ));
    let resolver = IntentResolver::new(model, memory.clone(), config.classifier_timeout);
    let dispatcher = Dispatcher::new(services.clone(), memory);
    let bot = Arc::new(Bot::new(services.clone(), resolver, dispatcher, messenger));

    let scheduler = Scheduler::new(services, clock);
    tokio::spawn(scheduler.run(config.reminder_sweep_interval));

    info!("✅ Bot initialized, reading message envelopes from stdin");

    let handled = bot.serve(BufReader::new(tokio::io::stdin())).await?;

    info!("👋 Handled {} messages, shutting down", handled);
    Ok(())
}
