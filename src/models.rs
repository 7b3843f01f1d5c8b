//! Core data models for the business operations bot
//!
//! Entities use `id == 0` until a repository has stored them; every
//! repository `create` returns the stored copy with its assigned id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

//
// ================= Roles =================
//

/// Authorization axis. Declaration order is the privilege order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" | "super_admin" => Ok(Role::SuperAdmin),
            other => Err(BotError::invalid(format!(
                "Invalid role '{}'. Use SuperAdmin, Admin or User",
                other
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "User",
            Role::Admin => "Admin",
            Role::SuperAdmin => "SuperAdmin",
        };
        write!(f, "{}", s)
    }
}

//
// ================= User =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    /// Normalized chat handle, see [`crate::messaging::normalize_handle`]
    pub whatsapp_number: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

//
// ================= Tasks =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
        }
    }

    /// Live status implied by a completion percentage
    pub fn for_percentage(percentage: u8) -> Self {
        match percentage {
            0 => TaskStatus::Pending,
            100 => TaskStatus::Completed,
            _ => TaskStatus::InProgress,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "overdue" => Ok(TaskStatus::Overdue),
            other => Err(BotError::invalid(format!("Invalid task status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(BotError::invalid(format!("Invalid task priority '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Daily,
    Monthly,
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Daily => "daily",
            TaskType::Monthly => "monthly",
            TaskType::Custom => "custom",
        }
    }
}

impl FromStr for TaskType {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TaskType::Daily),
            "monthly" => Ok(TaskType::Monthly),
            "custom" => Ok(TaskType::Custom),
            other => Err(BotError::invalid(format!("Invalid task type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub assigned_to: i64,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub completion_percentage: u8,
    pub is_implemented: bool,
    pub implementation_notes: String,
    pub task_type: TaskType,
    pub is_recurring: bool,
    pub recurring_pattern: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated_date: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Fresh pending task with default priority and custom type
    pub fn new(title: String, description: String, assigned_to: i64, created_by: i64) -> Self {
        Self {
            id: 0,
            title,
            description,
            assigned_to,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            completion_percentage: 0,
            is_implemented: false,
            implementation_notes: String::new(),
            task_type: TaskType::Custom,
            is_recurring: false,
            recurring_pattern: None,
            due_date: None,
            completed_at: None,
            last_updated_date: None,
            created_by,
            created_at: Utc::now(),
        }
    }

    /// Applies the live fields of a progress update. Status follows the
    /// percentage; `is_implemented` is taken as given.
    pub fn apply_progress(&mut self, update: &ProgressUpdate) {
        self.completion_percentage = update.percentage;
        self.is_implemented = update.is_implemented;
        self.implementation_notes = update.notes.clone();
        self.status = TaskStatus::for_percentage(update.percentage);
        self.last_updated_date = Some(update.at);
        self.completed_at = match (update.percentage, self.completed_at) {
            (100, Some(done)) => Some(done),
            (100, None) => Some(update.at),
            _ => None,
        };
    }
}

/// Append-only progress audit row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub id: i64,
    pub task_id: i64,
    pub completion_percentage: u8,
    pub is_implemented: bool,
    pub implementation_notes: String,
    pub updated_by: i64,
    pub updated_at: DateTime<Utc>,
}

/// Live-field change applied together with its audit row
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub task_id: i64,
    pub percentage: u8,
    pub is_implemented: bool,
    pub notes: String,
    pub updated_by: i64,
    pub at: DateTime<Utc>,
}

//
// ================= Orders =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(BotError::invalid(format!(
                "Invalid order status '{}'. Use pending, processing, completed or cancelled",
                other
            ))),
        }
    }
}

/// Figures owned by the financial derivation engine
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedFigures {
    pub tax_percentage: f64,
    pub tax_amount: f64,
    pub marketing_percentage: f64,
    pub marketing_cost: f64,
    pub rental_percentage: f64,
    pub rental_cost: f64,
    pub net_profit: f64,
    pub calculated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub total_amount: f64,
    /// Only [`crate::finance::FinancialEngine`] produces these values
    pub derived: DerivedFigures,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(order_number: String, customer_name: String, total_amount: f64, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            order_number,
            customer_name,
            customer_phone: None,
            order_date: now,
            delivery_date: None,
            status: OrderStatus::Pending,
            total_amount,
            derived: DerivedFigures::default(),
            created_by,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Completed => "completed",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "completed" => Ok(ItemStatus::Completed),
            "cancelled" => Ok(ItemStatus::Cancelled),
            other => Err(BotError::invalid(format!(
                "Invalid item status '{}'. Use pending, completed or cancelled",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub item_name: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Line total for the current quantity and unit price
    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

/// Aggregate view over the items of one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItemsSummary {
    pub order_id: i64,
    pub total_items: usize,
    pub total_quantity: i64,
    pub total_value: f64,
    pub pending_items: usize,
    pub completed_items: usize,
    /// Percentage of completed items; 0 when the order has no items
    pub completion_rate: f64,
}

//
// ================= Financial =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RateKind {
    #[serde(rename = "tax_rate")]
    Tax,
    #[serde(rename = "marketing_rate")]
    Marketing,
    #[serde(rename = "rental_rate")]
    Rental,
}

impl RateKind {
    pub const ALL: [RateKind; 3] = [RateKind::Tax, RateKind::Marketing, RateKind::Rental];

    pub fn setting_name(&self) -> &'static str {
        match self {
            RateKind::Tax => "tax_rate",
            RateKind::Marketing => "marketing_rate",
            RateKind::Rental => "rental_rate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RateKind::Tax => "Tax",
            RateKind::Marketing => "Marketing",
            RateKind::Rental => "Rental",
        }
    }
}

impl FromStr for RateKind {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tax_rate" => Ok(RateKind::Tax),
            "marketing_rate" => Ok(RateKind::Marketing),
            "rental_rate" => Ok(RateKind::Rental),
            other => Err(BotError::invalid(format!("Unknown rate setting '{}'", other))),
        }
    }
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.setting_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialSettings {
    pub id: i64,
    pub setting_name: RateKind,
    pub percentage_value: f64,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Write-once record of one derivation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationHistory {
    pub id: i64,
    pub order_id: i64,
    pub calculation_type: String,
    pub input_value: f64,
    pub percentage_used: f64,
    pub calculated_amount: f64,
    pub calculation_timestamp: DateTime<Utc>,
    /// Hex SHA-256 over the row content, see [`crate::audit`]
    pub checksum: String,
}

//
// ================= Reminders =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub id: i64,
    pub task_id: i64,
    pub reminder_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub whatsapp_sent: bool,
    pub created_at: DateTime<Utc>,
}
