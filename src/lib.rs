//! Business Operations Bot
//!
//! A chat bot for a small business team that:
//! - Resolves free text and slash commands into typed intents
//! - Gates every intent by role before touching any data
//! - Manages users, orders, order items, tasks and reminders
//! - Derives tax, marketing, rental and net profit for every order write,
//!   with a checksummed calculation history
//! - Sweeps due reminders and resets recurring tasks on a timer
//!
//! PIPELINE:
//! ENVELOPE → SENDER → RESOLVE → GATE → DISPATCH → REPLY

pub mod audit;
pub mod bot;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod finance;
pub mod formatter;
pub mod gemini;
pub mod intent;
pub mod memory;
pub mod messaging;
pub mod models;
pub mod resolver;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod webhook;

pub use error::Result;

// Re-export common types
pub use bot::Bot;
pub use intent::{Intent, IntentKind};
pub use models::*;
