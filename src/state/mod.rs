//! Repository layer
//!
//! Responsible for storing and loading all entities.
//! `InMemoryStore` serves development and tests; `PgStore` serves production.
//! Every implementation must be safe for concurrent use.

use crate::models::{
    CalculationHistory, FinancialSettings, Order, OrderItem, ProgressUpdate, RateKind, Reminder,
    Task, TaskProgress, TaskType, User,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: User) -> Result<User>;
    /// `NotFound` when absent
    async fn get_user(&self, id: i64) -> Result<User>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Lookup by normalized chat handle
    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn delete_user(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, task: Task) -> Result<Task>;
    async fn get_task(&self, id: i64) -> Result<Task>;
    async fn list_tasks(&self) -> Result<Vec<Task>>;
    async fn tasks_for_user(&self, user_id: i64) -> Result<Vec<Task>>;
    /// Tasks of one type, optionally restricted to an assignee
    async fn tasks_by_type(&self, task_type: TaskType, user_id: Option<i64>) -> Result<Vec<Task>>;
    async fn update_task(&self, task: &Task) -> Result<()>;
    async fn delete_task(&self, id: i64) -> Result<()>;
    /// Applies the live-field change and appends one audit row, both or neither.
    async fn apply_progress(&self, update: ProgressUpdate) -> Result<Task>;
    async fn progress_history(&self, task_id: i64) -> Result<Vec<TaskProgress>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order, its history row and its initial items in one unit.
    /// The row's and items' `order_id` are filled in from the new order; if
    /// any insert fails nothing is stored.
    async fn create_order_with_history(
        &self,
        order: Order,
        history: CalculationHistory,
        items: Vec<OrderItem>,
    ) -> Result<(Order, CalculationHistory, Vec<OrderItem>)>;
    async fn update_order_with_history(
        &self,
        order: &Order,
        history: CalculationHistory,
    ) -> Result<CalculationHistory>;
    async fn get_order(&self, id: i64) -> Result<Order>;
    async fn list_orders(&self) -> Result<Vec<Order>>;
    async fn orders_by_creator(&self, user_id: i64) -> Result<Vec<Order>>;
    /// Orders with `start <= order_date < end`
    async fn orders_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>>;
    /// Removes the order and its items; calculation history is kept.
    async fn delete_order(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait OrderItemRepository: Send + Sync {
    async fn create_item(&self, item: OrderItem) -> Result<OrderItem>;
    async fn get_item(&self, id: i64) -> Result<OrderItem>;
    async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>>;
    async fn update_item(&self, item: &OrderItem) -> Result<()>;
    async fn delete_item(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait FinancialRepository: Send + Sync {
    async fn create_setting(&self, setting: FinancialSettings) -> Result<FinancialSettings>;
    /// Most recent active row for the kind, `NotFound` when none
    async fn current_rate(&self, kind: RateKind) -> Result<FinancialSettings>;
    async fn calculation_history(&self, order_id: i64) -> Result<Vec<CalculationHistory>>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn create_reminder(&self, reminder: Reminder) -> Result<Reminder>;
    async fn list_reminders(&self) -> Result<Vec<Reminder>>;
    async fn reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>>;
    /// Unsent reminders scheduled at or before `now`
    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>>;
    async fn mark_sent(&self, id: i64) -> Result<()>;
}

/// Every repository capability behind one backend
pub trait Store:
    UserRepository
    + TaskRepository
    + OrderRepository
    + OrderItemRepository
    + FinancialRepository
    + ReminderRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + TaskRepository
        + OrderRepository
        + OrderItemRepository
        + FinancialRepository
        + ReminderRepository
{
}
