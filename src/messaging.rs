//! Outbound chat delivery
//!
//! `WhatsAppClient` posts to the provider's `send/message` endpoint with
//! basic auth. `ConsoleMessenger` prints replies to stdout for local runs.

use crate::config::WhatsAppConfig;
use crate::error::BotError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

const JID_SUFFIX: &str = "@s.whatsapp.net";

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `text` to a normalized chat handle
    async fn send(&self, handle: &str, text: &str) -> Result<()>;
}

/// Canonical handle form: digits only, local `08` prefix rewritten to the
/// `628` country form, any `@domain` suffix dropped.
pub fn normalize_handle(raw: &str) -> String {
    let local = raw.trim().split('@').next().unwrap_or_default();
    let digits: String = local.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.strip_prefix("08") {
        Some(rest) => format!("628{}", rest),
        None => digits,
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    phone: String,
    message: &'a str,
    is_forwarded: bool,
    duration: i32,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

pub struct WhatsAppClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}/send/message", config.api_url, config.path),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl Messenger for WhatsAppClient {
    async fn send(&self, handle: &str, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            phone: format!("{}{}", normalize_handle(handle), JID_SUFFIX),
            message: text,
            is_forwarded: false,
            duration: 0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(handle = %handle, "WhatsApp send failed: {}", e);
                BotError::UpstreamUnavailable(format!("WhatsApp send failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::UpstreamUnavailable(format!(
                "WhatsApp provider returned {}",
                status
            )));
        }

        let body: SendMessageResponse = response.json().await?;
        if !body.success {
            return Err(BotError::UpstreamUnavailable(format!(
                "WhatsApp provider rejected message: {}",
                body.message
            )));
        }

        debug!(handle = %handle, "Message delivered");
        Ok(())
    }
}

/// Writes each message to stdout as `[handle] text`
#[derive(Default)]
pub struct ConsoleMessenger {
    out: Mutex<()>,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send(&self, handle: &str, text: &str) -> Result<()> {
        // Keep multi-line replies from interleaving
        let _guard = self.out.lock().await;
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("[{}] {}\n", handle, text).as_bytes())
            .await?;
        stdout.flush().await?;
        Ok(())
    }
}
