//! Process configuration loaded from the environment (and `.env`)

use std::env;
use std::time::Duration;
use tracing::warn;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres backend when set, in-memory store otherwise
    pub database_url: Option<String>,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub classifier_timeout: Duration,
    /// Outbound provider; replies are printed to stdout when absent
    pub whatsapp: Option<WhatsAppConfig>,
    pub reminder_sweep_interval: Duration,
    /// Handle registered as SuperAdmin on an empty user table
    pub bootstrap_admin_handle: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let whatsapp = match (
            non_empty("WHATSAPP_API_URL"),
            non_empty("WHATSAPP_USERNAME"),
            non_empty("WHATSAPP_PASSWORD"),
            non_empty("WHATSAPP_PATH"),
        ) {
            (Some(api_url), Some(username), Some(password), Some(path)) => Some(WhatsAppConfig {
                api_url: api_url.trim_end_matches('/').to_string(),
                username,
                password,
                path: path.trim_matches('/').to_string(),
            }),
            (None, None, None, None) => None,
            _ => {
                warn!("Incomplete WHATSAPP_* configuration, falling back to console output");
                None
            }
        };

        Self {
            database_url: non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL")),
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            classifier_timeout: Duration::from_secs(secs(
                "CLASSIFIER_TIMEOUT_SECS",
                DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            )),
            whatsapp,
            reminder_sweep_interval: Duration::from_secs(secs(
                "REMINDER_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            bootstrap_admin_handle: non_empty("BOOTSTRAP_ADMIN_HANDLE"),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs(key: &str, default: u64) -> u64 {
    parse_secs(key, non_empty(key), default)
}

/// Zero is raised to one second; `tokio::time::interval` rejects a zero period
fn parse_secs(key: &str, raw: Option<String>, default: u64) -> u64 {
    let value = match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} is not a number ({}), using {}", key, raw, default);
            default
        }),
        None => default,
    };
    if value == 0 {
        warn!("{} must be at least 1 second, using 1", key);
        return 1;
    }
    value
}
