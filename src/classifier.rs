//! Fallback classifier
//!
//! Deterministic keyword and regex rules used whenever the external
//! classifier is unavailable or returns something unusable. Recognizes two
//! coarse intents:
//! - Order-like: the message mentions "order" or "total"
//! - Task-like: the message mentions "task" or "create"
//!
//! The order check runs first. Everything else is general conversation.
//! This path never fails; extraction problems are carried inside the
//! returned intent result.

use crate::error::BotError;
use crate::intent::{Intent, IntentKind, NewItem, UserRef};
use crate::models::TaskType;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOTAL_RE: Regex = Regex::new(r"(?i)total[:\s]*(\d+(?:\.\d+)?)").unwrap();
    static ref CUSTOMER_RE: Regex =
        Regex::new(r"(?i)customer[:\s]*([a-z]+(?:\s+[a-z]+)*?)\s*(?:\btotal\b|\bitems?\b|,|\d|$)")
            .unwrap();
    static ref ORDER_RE: Regex =
        Regex::new(r"(?i)order\s+([a-z]+(?:\s+[a-z]+)*?)\s+(\d+(?:\.\d+)?)\b").unwrap();
    static ref ITEM_RE: Regex =
        Regex::new(r"(?i)([a-z][a-z\s]*?),\s*qty\s*(\d+)\s*x\s*(\d+(?:\.\d+)?)").unwrap();
}

const ORDER_KEYWORDS: &[&str] = &["order", "total"];
const TASK_KEYWORDS: &[&str] = &["task", "create"];

/// Leading words dropped before the task title
const TASK_LEAD_WORDS: &[&str] = &[
    "create", "task", "buat", "buatkan", "new", "add", "tambah", "a", "/create_task",
];

/// Words that never start a customer or item name
const NAME_STOP_WORDS: &[&str] = &["order", "customer", "total", "item", "items"];

pub const GENERAL_REPLY: &str =
    "I don't understand that command. Please use /help to see available commands.";

pub struct FallbackClassifier;

impl FallbackClassifier {
    /// Classify without any external dependency
    pub fn classify(text: &str) -> (IntentKind, Result<Intent>) {
        let lowered = text.to_lowercase();

        if ORDER_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return (IntentKind::CreateOrder, extract_order(text));
        }

        if TASK_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            let kind = IntentKind::AssignTask(TaskType::Custom);
            return (kind, extract_task(text));
        }

        (
            IntentKind::General,
            Ok(Intent::General {
                message: GENERAL_REPLY.to_string(),
            }),
        )
    }
}

fn strip_stop_words(name: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let start = words
        .iter()
        .rposition(|w| NAME_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .map_or(0, |i| i + 1);

    let kept = words[start..].join(" ");
    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}

fn extract_items(text: &str) -> Vec<NewItem> {
    ITEM_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let name = strip_stop_words(caps.get(1)?.as_str())?;
            let quantity: i64 = caps.get(2)?.as_str().parse().ok()?;
            let unit_price: f64 = caps.get(3)?.as_str().parse().ok()?;
            if quantity <= 0 {
                return None;
            }
            Some(NewItem {
                name,
                description: String::new(),
                quantity,
                unit_price,
            })
        })
        .collect()
}

fn extract_order(text: &str) -> Result<Intent> {
    let items = extract_items(text);
    let order_pattern = ORDER_RE.captures(text).and_then(|caps| {
        let name = caps.get(1)?.as_str().trim();
        if NAME_STOP_WORDS.contains(&name.split_whitespace().next()?.to_lowercase().as_str()) {
            return None;
        }
        let total: f64 = caps.get(2)?.as_str().parse().ok()?;
        Some((name.to_string(), total))
    });

    let customer = CUSTOMER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| order_pattern.as_ref().map(|(name, _)| name.clone()));

    let total = TOTAL_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .or_else(|| order_pattern.as_ref().map(|(_, total)| *total))
        .or_else(|| {
            if items.is_empty() {
                None
            } else {
                Some(items.iter().map(|i| i.quantity as f64 * i.unit_price).sum())
            }
        });

    match (customer, total) {
        (Some(customer), Some(total)) => Ok(Intent::CreateOrder {
            customer,
            total,
            items,
        }),
        (None, _) => Err(BotError::invalid(format!(
            "Could not read the customer name. Usage: {}",
            IntentKind::CreateOrder.usage()
        ))),
        (_, None) => Err(BotError::invalid(format!(
            "Could not read the order total. Usage: {}",
            IntentKind::CreateOrder.usage()
        ))),
    }
}

fn extract_task(text: &str) -> Result<Intent> {
    let mut words = text
        .split_whitespace()
        .skip_while(|w| TASK_LEAD_WORDS.contains(&w.to_lowercase().as_str()));

    let title = words.next().ok_or_else(|| {
        BotError::invalid(format!(
            "Could not read the task title. Usage: {}",
            IntentKind::AssignTask(TaskType::Custom).usage()
        ))
    })?;

    Ok(Intent::AssignTask {
        assignee: UserRef::Caller,
        title: title.to_string(),
        description: words.collect::<Vec<_>>().join(" "),
        task_type: TaskType::Custom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_like_with_name_and_amount() {
        let (kind, intent) = FallbackClassifier::classify("buat order John Doe 1000000");
        assert_eq!(kind, IntentKind::CreateOrder);
        assert_eq!(
            intent.unwrap(),
            Intent::CreateOrder {
                customer: "John Doe".to_string(),
                total: 1_000_000.0,
                items: vec![]
            }
        );
    }

    #[test]
    fn test_order_like_with_labels_and_items() {
        let (_, intent) = FallbackClassifier::classify(
            "new order customer: Budi total: 250 laptop bag, qty 2 x 100",
        );
        match intent.unwrap() {
            Intent::CreateOrder {
                customer,
                total,
                items,
            } => {
                assert_eq!(customer, "Budi");
                assert_eq!(total, 250.0);
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].name, "laptop bag");
                assert_eq!(items[0].quantity, 2);
                assert_eq!(items[0].unit_price, 100.0);
            }
            other => panic!("unexpected intent {:?}", other),
        }
    }

    #[test]
    fn test_order_check_runs_before_task_check() {
        let (kind, _) = FallbackClassifier::classify("create task for order review");
        assert_eq!(kind, IntentKind::CreateOrder);
    }

    #[test]
    fn test_order_like_without_details_is_still_order() {
        let (kind, intent) = FallbackClassifier::classify("what is my order status?");
        assert_eq!(kind, IntentKind::CreateOrder);
        assert!(matches!(intent, Err(BotError::InvalidArgument(_))));
    }

    #[test]
    fn test_task_like_assigns_to_caller() {
        let (kind, intent) = FallbackClassifier::classify("create task Inventory count the warehouse");
        assert_eq!(kind, IntentKind::AssignTask(TaskType::Custom));
        assert_eq!(
            intent.unwrap(),
            Intent::AssignTask {
                assignee: UserRef::Caller,
                title: "Inventory".to_string(),
                description: "count the warehouse".to_string(),
                task_type: TaskType::Custom,
            }
        );
    }

    #[test]
    fn test_everything_else_is_general() {
        for text in ["halo", "good morning", "how are you?"] {
            let (kind, intent) = FallbackClassifier::classify(text);
            assert_eq!(kind, IntentKind::General, "{}", text);
            assert!(intent.is_ok());
        }
    }
}
