//! In-memory store for development and tests
//!
//! All tables sit behind one lock so multi-row writes are atomic.

use super::{
    FinancialRepository, OrderItemRepository, OrderRepository, ReminderRepository, TaskRepository,
    UserRepository,
};
use crate::audit;
use crate::error::BotError;
use crate::models::{
    CalculationHistory, FinancialSettings, Order, OrderItem, ProgressUpdate, RateKind, Reminder,
    Task, TaskProgress, TaskType, User,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tasks: BTreeMap<i64, Task>,
    progress: Vec<TaskProgress>,
    orders: BTreeMap<i64, Order>,
    items: BTreeMap<i64, OrderItem>,
    settings: Vec<FinancialSettings>,
    history: Vec<CalculationHistory>,
    reminders: BTreeMap<i64, Reminder>,
    sequences: Sequences,
}

#[derive(Default)]
struct Sequences {
    user: i64,
    task: i64,
    progress: i64,
    order: i64,
    item: i64,
    setting: i64,
    history: i64,
    reminder: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

/// Same rules as the `order_items` CHECK constraints
fn check_item(item: &OrderItem) -> Result<()> {
    if item.quantity <= 0 {
        return Err(BotError::invalid(format!("Invalid quantity for '{}'", item.item_name)));
    }
    if !item.unit_price.is_finite() || item.unit_price < 0.0 {
        return Err(BotError::invalid(format!("Invalid price for '{}'", item.item_name)));
    }
    Ok(())
}

/// Tables behind a single async lock
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, mut user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(BotError::invalid(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        user.id = next(&mut tables.sequences.user);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| BotError::not_found(format!("user not found: {}", id)))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.whatsapp_number == handle)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(BotError::invalid(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        match tables.users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(BotError::not_found(format!("user not found: {}", user.id))),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BotError::not_found(format!("user not found: {}", id)))
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn create_task(&self, mut task: Task) -> Result<Task> {
        let mut tables = self.tables.write().await;
        task.id = next(&mut tables.sequences.task);
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: i64) -> Result<Task> {
        let tables = self.tables.read().await;
        tables
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| BotError::not_found(format!("task not found: {}", id)))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables.tasks.values().cloned().collect())
    }

    async fn tasks_for_user(&self, user_id: i64) -> Result<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| t.assigned_to == user_id)
            .cloned()
            .collect())
    }

    async fn tasks_by_type(&self, task_type: TaskType, user_id: Option<i64>) -> Result<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| t.task_type == task_type)
            .filter(|t| user_id.map_or(true, |id| t.assigned_to == id))
            .cloned()
            .collect())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(BotError::not_found(format!("task not found: {}", task.id))),
        }
    }

    async fn delete_task(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BotError::not_found(format!("task not found: {}", id)))
    }

    async fn apply_progress(&self, update: ProgressUpdate) -> Result<Task> {
        let mut tables = self.tables.write().await;

        let task = tables
            .tasks
            .get_mut(&update.task_id)
            .ok_or_else(|| BotError::not_found(format!("task not found: {}", update.task_id)))?;
        task.apply_progress(&update);
        let task = task.clone();

        let id = next(&mut tables.sequences.progress);
        tables.progress.push(TaskProgress {
            id,
            task_id: update.task_id,
            completion_percentage: update.percentage,
            is_implemented: update.is_implemented,
            implementation_notes: update.notes,
            updated_by: update.updated_by,
            updated_at: update.at,
        });

        Ok(task)
    }

    async fn progress_history(&self, task_id: i64) -> Result<Vec<TaskProgress>> {
        let tables = self.tables.read().await;
        Ok(tables
            .progress
            .iter()
            .filter(|p| p.task_id == task_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_order_with_history(
        &self,
        mut order: Order,
        mut history: CalculationHistory,
        mut items: Vec<OrderItem>,
    ) -> Result<(Order, CalculationHistory, Vec<OrderItem>)> {
        let mut tables = self.tables.write().await;
        if tables
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(BotError::invalid(format!(
                "order number '{}' already exists",
                order.order_number
            )));
        }
        // Everything is checked before the first insert
        for item in &items {
            check_item(item)?;
        }

        order.id = next(&mut tables.sequences.order);
        history.id = next(&mut tables.sequences.history);
        history.order_id = order.id;
        audit::seal(&mut history);

        tables.orders.insert(order.id, order.clone());
        tables.history.push(history.clone());
        for item in &mut items {
            item.id = next(&mut tables.sequences.item);
            item.order_id = order.id;
            tables.items.insert(item.id, item.clone());
        }
        Ok((order, history, items))
    }

    async fn update_order_with_history(
        &self,
        order: &Order,
        mut history: CalculationHistory,
    ) -> Result<CalculationHistory> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&order.id) {
            return Err(BotError::not_found(format!("order not found: {}", order.id)));
        }

        history.id = next(&mut tables.sequences.history);
        history.order_id = order.id;
        audit::seal(&mut history);

        tables.orders.insert(order.id, order.clone());
        tables.history.push(history.clone());
        Ok(history)
    }

    async fn get_order(&self, id: i64) -> Result<Order> {
        let tables = self.tables.read().await;
        tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| BotError::not_found(format!("order not found: {}", id)))
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.values().cloned().collect())
    }

    async fn orders_by_creator(&self, user_id: i64) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.created_by == user_id)
            .cloned()
            .collect())
    }

    async fn orders_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.order_date >= start && o.order_date < end)
            .cloned()
            .collect())
    }

    async fn delete_order(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.remove(&id).is_none() {
            return Err(BotError::not_found(format!("order not found: {}", id)));
        }
        tables.items.retain(|_, item| item.order_id != id);
        Ok(())
    }
}

#[async_trait]
impl OrderItemRepository for InMemoryStore {
    async fn create_item(&self, mut item: OrderItem) -> Result<OrderItem> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&item.order_id) {
            return Err(BotError::not_found(format!("order not found: {}", item.order_id)));
        }
        check_item(&item)?;
        item.id = next(&mut tables.sequences.item);
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: i64) -> Result<OrderItem> {
        let tables = self.tables.read().await;
        tables
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| BotError::not_found(format!("order item not found: {}", id)))
    }

    async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_item(&self, item: &OrderItem) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.items.get_mut(&item.id) {
            Some(slot) => {
                *slot = item.clone();
                Ok(())
            }
            None => Err(BotError::not_found(format!("order item not found: {}", item.id))),
        }
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .items
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BotError::not_found(format!("order item not found: {}", id)))
    }
}

#[async_trait]
impl FinancialRepository for InMemoryStore {
    async fn create_setting(&self, mut setting: FinancialSettings) -> Result<FinancialSettings> {
        let mut tables = self.tables.write().await;
        setting.id = next(&mut tables.sequences.setting);
        tables.settings.push(setting.clone());
        Ok(setting)
    }

    async fn current_rate(&self, kind: RateKind) -> Result<FinancialSettings> {
        let tables = self.tables.read().await;
        tables
            .settings
            .iter()
            .filter(|s| s.setting_name == kind && s.is_active)
            .max_by_key(|s| (s.created_at, s.id))
            .cloned()
            .ok_or_else(|| BotError::not_found(format!("no active {} configured", kind)))
    }

    async fn calculation_history(&self, order_id: i64) -> Result<Vec<CalculationHistory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReminderRepository for InMemoryStore {
    async fn create_reminder(&self, mut reminder: Reminder) -> Result<Reminder> {
        let mut tables = self.tables.write().await;
        reminder.id = next(&mut tables.sequences.reminder);
        tables.reminders.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        let tables = self.tables.read().await;
        Ok(tables.reminders.values().cloned().collect())
    }

    async fn reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reminders
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reminders
            .values()
            .filter(|r| !r.whatsapp_sent && r.scheduled_time <= now)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.reminders.get_mut(&id) {
            Some(reminder) => {
                reminder.whatsapp_sent = true;
                Ok(())
            }
            None => Err(BotError::not_found(format!("reminder not found: {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn user(name: &str) -> User {
        User {
            id: 0,
            username: name.to_string(),
            email: format!("{}@example.com", name),
            phone_number: "08123".to_string(),
            whatsapp_number: format!("628{}", name.len()),
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryStore::new();
        store.create_user(user("ega")).await.unwrap();
        let err = store.create_user(user("ega")).await.unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_current_rate_prefers_latest_active_row() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        for (value, offset, active) in [(10.0, 0, true), (12.5, 1, true), (99.0, 2, false)] {
            store
                .create_setting(FinancialSettings {
                    id: 0,
                    setting_name: RateKind::Tax,
                    percentage_value: value,
                    is_active: active,
                    created_by: 1,
                    created_at: base + Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        let current = store.current_rate(RateKind::Tax).await.unwrap();
        assert_eq!(current.percentage_value, 12.5);
        assert!(store.current_rate(RateKind::Rental).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_item_for_missing_order_is_not_stored() {
        let store = InMemoryStore::new();
        let item = OrderItem {
            order_id: 999,
            ..item("Laptop", 1)
        };
        assert!(store.create_item(item).await.unwrap_err().is_not_found());
        assert!(store.items_for_order(999).await.unwrap().is_empty());
    }

    fn item(name: &str, quantity: i64) -> OrderItem {
        OrderItem {
            id: 0,
            order_id: 0,
            item_name: name.to_string(),
            description: String::new(),
            quantity,
            unit_price: 10.0,
            total_price: quantity as f64 * 10.0,
            status: crate::models::ItemStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn history_row() -> CalculationHistory {
        CalculationHistory {
            id: 0,
            order_id: 0,
            calculation_type: "net_profit".to_string(),
            input_value: 100.0,
            percentage_used: 20.0,
            calculated_amount: 80.0,
            calculation_timestamp: Utc::now(),
            checksum: String::new(),
        }
    }

    #[tokio::test]
    async fn test_order_history_and_items_are_written_together() {
        let store = InMemoryStore::new();
        let order = Order::new("ORD-1".to_string(), "John".to_string(), 100.0, 1);

        let (order, history, items) = store
            .create_order_with_history(order, history_row(), vec![item("Laptop", 2), item("Mouse", 1)])
            .await
            .unwrap();
        assert_eq!(history.order_id, order.id);
        assert!(audit::verify(&history));
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.order_id == order.id && i.id > 0));
        assert_eq!(store.items_for_order(order.id).await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_rejected_item_leaves_no_order_behind() {
        let store = InMemoryStore::new();
        let order = Order::new("ORD-1".to_string(), "John".to_string(), 100.0, 1);

        let err = store
            .create_order_with_history(order, history_row(), vec![item("Laptop", 2), item("Mouse", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));

        assert!(store.list_orders().await.unwrap().is_empty());
        assert!(store.calculation_history(1).await.unwrap().is_empty());
        assert!(store.items_for_order(1).await.unwrap().is_empty());
    }
}
