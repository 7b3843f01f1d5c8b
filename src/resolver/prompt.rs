//! Classifier prompt and reply parsing

use crate::error::BotError;
use crate::intent::IntentKind;
use crate::memory::ConversationTurn;
use crate::Result;
use serde_json::{Map, Value};

/// Everything the external classifier sees for one message
#[derive(Debug, Clone)]
pub struct ClassifierPrompt {
    pub instruction: &'static str,
    /// Prior turns, oldest first
    pub history: Vec<ConversationTurn>,
    pub message: String,
}

impl ClassifierPrompt {
    pub fn new(history: Vec<ConversationTurn>, message: &str) -> Self {
        Self {
            instruction: INSTRUCTION,
            history,
            message: message.to_string(),
        }
    }
}

/// Parsed `{type, data, message}` reply
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierReply {
    pub kind: IntentKind,
    pub data: Map<String, Value>,
    pub message: String,
}

/// Parse the classifier's raw text. Code fences are tolerated; an unknown
/// `type` is an error so the caller falls back.
pub fn parse_reply(raw: &str) -> Result<ClassifierReply> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if cleaned.is_empty() {
        return Err(BotError::UpstreamUnavailable(
            "empty classifier reply".to_string(),
        ));
    }

    let json: Value = serde_json::from_str(cleaned)?;
    let object = json.as_object().ok_or_else(|| {
        BotError::UpstreamUnavailable("classifier reply is not a JSON object".to_string())
    })?;

    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BotError::UpstreamUnavailable("classifier reply has no type".to_string()))?;

    let kind = IntentKind::from_wire(tag).ok_or_else(|| {
        BotError::UpstreamUnavailable(format!("unknown intent type '{}'", tag))
    })?;

    let data = match object.get("data") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ClassifierReply {
        kind,
        data,
        message,
    })
}

pub const INSTRUCTION: &str = r#"You are the assistant of a WhatsApp business operations bot that manages tasks, orders and financial settings. Analyze each message and return a structured JSON response.

MESSAGE TYPES TO DETECT:
1. add_user - "tambahkan user [username] [email] [phone] [role]", "/add_user"
2. update_user - "/update_user [user_id] [field]=[value]"
3. delete_user - "/delete_user [user_id]"
4. set_role - "/set_role [user_id] [role]"
5. list_users - "list user", "lihat users", "show users", "/list_users"
6. create_order - "buat order [customer_name] [total_amount]", "/create_order"
7. create_order_with_item - "buat order [customer] total [amount] item [item_name] [quantity] harga [price]"
8. update_order - "/update_order [order_id] [field]=[value]"
9. delete_order - "/delete_order [order_id]"
10. view_orders - "lihat orders", "show orders", "list order", "/view_orders"
11. add_order_item - "tambah item [order_id] [item_name] [quantity] [price] [description]", "/add_order_item"
12. view_order_items - "lihat items order [order_id]", "/view_order_items"
13. update_item_status - "/update_item_status [item_id] [status]"
14. assign_task - "assign task [title] [description] to [username]", "/assign_task"
15. create_daily_task - "/create_daily_task"
16. create_monthly_task - "/create_monthly_task"
17. view_tasks - "lihat tasks saya", "show my tasks", "/my_tasks", "/my_daily_tasks", "/my_monthly_tasks"
18. list_tasks - "/list_tasks"
19. update_progress - "/update_progress"
20. mark_complete - "/mark_complete"
21. create_reminder - "buat reminder [task_id] [reminder_type] [scheduled_time]", "/create_reminder"
22. view_reminders - "lihat reminders", "show reminders", "/view_reminders"
23. set_tax_rate, set_marketing_rate, set_rental_rate - "/set_tax_rate [percentage]"
24. my_report - "/my_report"
25. report_by_date - "/report_by_date"
26. generate_report, daily_report, monthly_report - "/generate_report", "/daily_report", "/monthly_report"
27. calculation_history - "/calculation_history [order_id]"
28. daily_progress_reminder, monthly_progress_reminder - "/daily_progress_reminder"
29. clear_history - "/clear_history"
30. show_history - "/show_history"
31. help - "/help"
32. general - greetings, questions, general chat

RESPONSE FORMAT (JSON only):
{
  "type": "<one of the types above>",
  "data": {
    "username": "string",
    "email": "string",
    "phone": "string",
    "role": "SuperAdmin|Admin|User",
    "user_id": "number",
    "customer_name": "string",
    "total_amount": "number",
    "status": "string",
    "title": "string",
    "description": "string",
    "assigned_to": "string",
    "scope": "daily|monthly",
    "order_id": "number",
    "item_id": "number",
    "item_name": "string",
    "quantity": "number",
    "price": "number",
    "task_id": "number",
    "percentage": "number",
    "notes": "string",
    "reminder_type": "string",
    "scheduled_time": "YYYY-MM-DD HH:MM",
    "start_date": "YYYY-MM-DD",
    "end_date": "YYYY-MM-DD"
  },
  "message": "Friendly response message"
}

EXAMPLES:
Input: "tambahkan user ega egatryagung@gmail.com 08123456789 SuperAdmin"
Output: {"type":"add_user","data":{"username":"ega","email":"egatryagung@gmail.com","phone":"08123456789","role":"SuperAdmin"},"message":"I'll add user ega with SuperAdmin role"}

Input: "buat order John Doe 1000000"
Output: {"type":"create_order","data":{"customer_name":"John Doe","total_amount":1000000},"message":"I'll create an order for John Doe with total 1000000"}

Input: "buatkan order jhon total 10000 item ayam goreng 1 harga 10000"
Output: {"type":"create_order_with_item","data":{"customer_name":"jhon","total_amount":10000,"item_name":"ayam goreng","quantity":1,"price":10000},"message":"I'll create an order for jhon with ayam goreng item"}

Input: "tambah item 1 Laptop 2 5000000 Gaming laptop"
Output: {"type":"add_order_item","data":{"order_id":1,"item_name":"Laptop","quantity":2,"price":5000000,"description":"Gaming laptop"},"message":"I'll add 2 Laptop items to order 1"}

Input: "buat reminder 1 deadline 2025-10-05 10:00"
Output: {"type":"create_reminder","data":{"task_id":1,"reminder_type":"deadline","scheduled_time":"2025-10-05 10:00"},"message":"I'll create a deadline reminder for task 1"}

Input: "/my_daily_tasks"
Output: {"type":"view_tasks","data":{"scope":"daily"},"message":"I'll show you today's tasks"}

Input: "halo"
Output: {"type":"general","data":{},"message":"Hello! How can I help you today?"}

IMPORTANT: Always return valid JSON format only. No additional text."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "```json\n{\"type\":\"view_orders\",\"data\":{},\"message\":\"ok\"}\n```";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.kind, IntentKind::ViewOrders);
        assert_eq!(reply.message, "ok");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"type":"order_pizza","data":{},"message":""}"#;
        assert!(parse_reply(raw).is_err());
    }

    #[test]
    fn test_non_json_is_rejected() {
        assert!(parse_reply("Sure! I'll create that order.").is_err());
        assert!(parse_reply("   ").is_err());
    }

    #[test]
    fn test_missing_data_defaults_to_empty() {
        let reply = parse_reply(r#"{"type":"help"}"#).unwrap();
        assert!(reply.data.is_empty());
        assert_eq!(reply.message, "");
    }
}
