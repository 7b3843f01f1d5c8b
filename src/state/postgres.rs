//! Postgres store
//!
//! Runtime-checked queries over a lazily connected pool. The schema is
//! created on first use; writes that touch more than one table run inside
//! a transaction.

use super::{
    FinancialRepository, OrderItemRepository, OrderRepository, ReminderRepository, TaskRepository,
    UserRepository,
};
use crate::audit;
use crate::error::BotError;
use crate::models::{
    CalculationHistory, DerivedFigures, FinancialSettings, Order, OrderItem, ProgressUpdate,
    RateKind, Reminder, Task, TaskProgress, TaskType, User,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const USER_COLUMNS: &str =
    "id, username, email, phone_number, whatsapp_number, role, is_active, created_at";
const TASK_COLUMNS: &str = "id, title, description, assigned_to, status, priority, \
    completion_percentage, is_implemented, implementation_notes, task_type, is_recurring, \
    recurring_pattern, due_date, completed_at, last_updated_date, created_by, created_at";
const PROGRESS_COLUMNS: &str = "id, task_id, completion_percentage, is_implemented, \
    implementation_notes, updated_by, updated_at";
const ORDER_COLUMNS: &str = "id, order_number, customer_name, customer_phone, order_date, \
    delivery_date, status, total_amount, tax_percentage, tax_amount, marketing_percentage, \
    marketing_cost, rental_percentage, rental_cost, net_profit, calculated_at, created_by, created_at";
const ITEM_COLUMNS: &str =
    "id, order_id, item_name, description, quantity, unit_price, total_price, status, created_at";
const SETTING_COLUMNS: &str =
    "id, setting_name, percentage_value, is_active, created_by, created_at";
const HISTORY_COLUMNS: &str = "id, order_id, calculation_type, input_value, percentage_used, \
    calculated_amount, calculation_timestamp, checksum";
const REMINDER_COLUMNS: &str =
    "id, task_id, reminder_type, scheduled_time, whatsapp_sent, created_at";

pub struct PgStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgStore {
    /// Build a store over a lazily connected pool
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| BotError::persistence("Failed to configure postgres pool", e))?;

        info!("Store backend: postgres");
        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        let pool = &self.pool;
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                    sqlx::query(statement).execute(pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| BotError::persistence("Failed to initialize schema", e))?;

        Ok(())
    }
}

fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> BotError {
    move |e| BotError::persistence(context, e)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .map_or(false, |code| code == "23505")
}

//
// ================= Row mapping =================
//

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| BotError::persistence("Failed to decode row", e))
}

fn percentage(row: &PgRow, name: &str) -> Result<u8> {
    let raw: i16 = col(row, name)?;
    Ok(raw.clamp(0, 100) as u8)
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: col(row, "id")?,
        username: col(row, "username")?,
        email: col(row, "email")?,
        phone_number: col(row, "phone_number")?,
        whatsapp_number: col(row, "whatsapp_number")?,
        role: col::<String>(row, "role")?.parse()?,
        is_active: col(row, "is_active")?,
        created_at: col(row, "created_at")?,
    })
}

fn task_from_row(row: &PgRow) -> Result<Task> {
    Ok(Task {
        id: col(row, "id")?,
        title: col(row, "title")?,
        description: col(row, "description")?,
        assigned_to: col(row, "assigned_to")?,
        status: col::<String>(row, "status")?.parse()?,
        priority: col::<String>(row, "priority")?.parse()?,
        completion_percentage: percentage(row, "completion_percentage")?,
        is_implemented: col(row, "is_implemented")?,
        implementation_notes: col(row, "implementation_notes")?,
        task_type: col::<String>(row, "task_type")?.parse()?,
        is_recurring: col(row, "is_recurring")?,
        recurring_pattern: col(row, "recurring_pattern")?,
        due_date: col(row, "due_date")?,
        completed_at: col(row, "completed_at")?,
        last_updated_date: col(row, "last_updated_date")?,
        created_by: col(row, "created_by")?,
        created_at: col(row, "created_at")?,
    })
}

fn progress_from_row(row: &PgRow) -> Result<TaskProgress> {
    Ok(TaskProgress {
        id: col(row, "id")?,
        task_id: col(row, "task_id")?,
        completion_percentage: percentage(row, "completion_percentage")?,
        is_implemented: col(row, "is_implemented")?,
        implementation_notes: col(row, "implementation_notes")?,
        updated_by: col(row, "updated_by")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: col(row, "id")?,
        order_number: col(row, "order_number")?,
        customer_name: col(row, "customer_name")?,
        customer_phone: col(row, "customer_phone")?,
        order_date: col(row, "order_date")?,
        delivery_date: col(row, "delivery_date")?,
        status: col::<String>(row, "status")?.parse()?,
        total_amount: col(row, "total_amount")?,
        derived: DerivedFigures {
            tax_percentage: col(row, "tax_percentage")?,
            tax_amount: col(row, "tax_amount")?,
            marketing_percentage: col(row, "marketing_percentage")?,
            marketing_cost: col(row, "marketing_cost")?,
            rental_percentage: col(row, "rental_percentage")?,
            rental_cost: col(row, "rental_cost")?,
            net_profit: col(row, "net_profit")?,
            calculated_at: col(row, "calculated_at")?,
        },
        created_by: col(row, "created_by")?,
        created_at: col(row, "created_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: col(row, "id")?,
        order_id: col(row, "order_id")?,
        item_name: col(row, "item_name")?,
        description: col(row, "description")?,
        quantity: col(row, "quantity")?,
        unit_price: col(row, "unit_price")?,
        total_price: col(row, "total_price")?,
        status: col::<String>(row, "status")?.parse()?,
        created_at: col(row, "created_at")?,
    })
}

fn setting_from_row(row: &PgRow) -> Result<FinancialSettings> {
    Ok(FinancialSettings {
        id: col(row, "id")?,
        setting_name: col::<String>(row, "setting_name")?.parse()?,
        percentage_value: col(row, "percentage_value")?,
        is_active: col(row, "is_active")?,
        created_by: col(row, "created_by")?,
        created_at: col(row, "created_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<CalculationHistory> {
    Ok(CalculationHistory {
        id: col(row, "id")?,
        order_id: col(row, "order_id")?,
        calculation_type: col(row, "calculation_type")?,
        input_value: col(row, "input_value")?,
        percentage_used: col(row, "percentage_used")?,
        calculated_amount: col(row, "calculated_amount")?,
        calculation_timestamp: col(row, "calculation_timestamp")?,
        checksum: col(row, "checksum")?,
    })
}

fn reminder_from_row(row: &PgRow) -> Result<Reminder> {
    Ok(Reminder {
        id: col(row, "id")?,
        task_id: col(row, "task_id")?,
        reminder_type: col(row, "reminder_type")?,
        scheduled_time: col(row, "scheduled_time")?,
        whatsapp_sent: col(row, "whatsapp_sent")?,
        created_at: col(row, "created_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

/// Writes the live task fields inside an open transaction
async fn write_task(conn: &mut sqlx::PgConnection, task: &Task) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks SET
          title = $2, description = $3, assigned_to = $4, status = $5, priority = $6,
          completion_percentage = $7, is_implemented = $8, implementation_notes = $9,
          task_type = $10, is_recurring = $11, recurring_pattern = $12, due_date = $13,
          completed_at = $14, last_updated_date = $15
        WHERE id = $1
        "#,
    )
    .bind(task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.assigned_to)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(task.completion_percentage as i16)
    .bind(task.is_implemented)
    .bind(&task.implementation_notes)
    .bind(task.task_type.as_str())
    .bind(task.is_recurring)
    .bind(&task.recurring_pattern)
    .bind(task.due_date)
    .bind(task.completed_at)
    .bind(task.last_updated_date)
    .execute(conn)
    .await
    .map_err(db("Failed to update task"))?;

    Ok(result.rows_affected())
}

async fn write_order(conn: &mut sqlx::PgConnection, order: &Order) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
          customer_name = $2, customer_phone = $3, order_date = $4, delivery_date = $5,
          status = $6, total_amount = $7, tax_percentage = $8, tax_amount = $9,
          marketing_percentage = $10, marketing_cost = $11, rental_percentage = $12,
          rental_cost = $13, net_profit = $14, calculated_at = $15
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(order.order_date)
    .bind(order.delivery_date)
    .bind(order.status.as_str())
    .bind(order.total_amount)
    .bind(order.derived.tax_percentage)
    .bind(order.derived.tax_amount)
    .bind(order.derived.marketing_percentage)
    .bind(order.derived.marketing_cost)
    .bind(order.derived.rental_percentage)
    .bind(order.derived.rental_cost)
    .bind(order.derived.net_profit)
    .bind(order.derived.calculated_at)
    .execute(conn)
    .await
    .map_err(db("Failed to update order"))?;

    Ok(result.rows_affected())
}

async fn insert_history(
    conn: &mut sqlx::PgConnection,
    mut history: CalculationHistory,
) -> Result<CalculationHistory> {
    audit::seal(&mut history);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO calculation_history
          (order_id, calculation_type, input_value, percentage_used, calculated_amount,
           calculation_timestamp, checksum)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(history.order_id)
    .bind(&history.calculation_type)
    .bind(history.input_value)
    .bind(history.percentage_used)
    .bind(history.calculated_amount)
    .bind(history.calculation_timestamp)
    .bind(&history.checksum)
    .fetch_one(conn)
    .await
    .map_err(db("Failed to insert calculation history"))?;

    history.id = id;
    Ok(history)
}

async fn insert_item(conn: &mut sqlx::PgConnection, mut item: OrderItem) -> Result<OrderItem> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_items
          (order_id, item_name, description, quantity, unit_price, total_price, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(item.order_id)
    .bind(&item.item_name)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.total_price)
    .bind(item.status.as_str())
    .bind(item.created_at)
    .fetch_one(conn)
    .await
    .map_err(db("Failed to create order item"))?;

    item.id = id;
    Ok(item)
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, mut user: User) -> Result<User> {
        self.ensure_schema().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, phone_number, whatsapp_number, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.whatsapp_number)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BotError::invalid(format!("username '{}' already exists", user.username))
            } else {
                BotError::persistence("Failed to create user", e)
            }
        })?;

        user.id = id;
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("Failed to load user"))?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(BotError::not_found(format!("user not found: {}", id))),
        }
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("Failed to load user"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE whatsapp_number = $1 ORDER BY id LIMIT 1",
            USER_COLUMNS
        ))
        .bind(handle)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("Failed to load user"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db("Failed to list users"))?;

        collect(rows, user_from_row)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            r#"
            UPDATE users SET
              username = $2, email = $3, phone_number = $4, whatsapp_number = $5,
              role = $6, is_active = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.whatsapp_number)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BotError::invalid(format!("username '{}' already exists", user.username))
            } else {
                BotError::persistence("Failed to update user", e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("user not found: {}", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db("Failed to delete user"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("user not found: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    async fn create_task(&self, mut task: Task) -> Result<Task> {
        self.ensure_schema().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tasks
              (title, description, assigned_to, status, priority, completion_percentage,
               is_implemented, implementation_notes, task_type, is_recurring, recurring_pattern,
               due_date, completed_at, last_updated_date, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assigned_to)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.completion_percentage as i16)
        .bind(task.is_implemented)
        .bind(&task.implementation_notes)
        .bind(task.task_type.as_str())
        .bind(task.is_recurring)
        .bind(&task.recurring_pattern)
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(task.last_updated_date)
        .bind(task.created_by)
        .bind(task.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db("Failed to create task"))?;

        task.id = id;
        Ok(task)
    }

    async fn get_task(&self, id: i64) -> Result<Task> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("Failed to load task"))?;

        match row {
            Some(row) => task_from_row(&row),
            None => Err(BotError::not_found(format!("task not found: {}", id))),
        }
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!("SELECT {} FROM tasks ORDER BY id", TASK_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db("Failed to list tasks"))?;

        collect(rows, task_from_row)
    }

    async fn tasks_for_user(&self, user_id: i64) -> Result<Vec<Task>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE assigned_to = $1 ORDER BY id",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list tasks"))?;

        collect(rows, task_from_row)
    }

    async fn tasks_by_type(&self, task_type: TaskType, user_id: Option<i64>) -> Result<Vec<Task>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE task_type = $1 AND ($2::BIGINT IS NULL OR assigned_to = $2) ORDER BY id",
            TASK_COLUMNS
        ))
        .bind(task_type.as_str())
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list tasks"))?;

        collect(rows, task_from_row)
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        self.ensure_schema().await?;

        let mut conn = self.pool.acquire().await.map_err(db("Failed to acquire connection"))?;
        if write_task(&mut conn, task).await? == 0 {
            return Err(BotError::not_found(format!("task not found: {}", task.id)));
        }
        Ok(())
    }

    async fn delete_task(&self, id: i64) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db("Failed to delete task"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("task not found: {}", id)));
        }
        Ok(())
    }

    async fn apply_progress(&self, update: ProgressUpdate) -> Result<Task> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db("Failed to begin progress transaction"))?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE id = $1 FOR UPDATE",
            TASK_COLUMNS
        ))
        .bind(update.task_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db("Failed to load task"))?;

        let mut task = match row {
            Some(row) => task_from_row(&row)?,
            None => return Err(BotError::not_found(format!("task not found: {}", update.task_id))),
        };
        task.apply_progress(&update);
        write_task(&mut tx, &task).await?;

        sqlx::query(
            r#"
            INSERT INTO task_progress
              (task_id, completion_percentage, is_implemented, implementation_notes, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(update.task_id)
        .bind(update.percentage as i16)
        .bind(update.is_implemented)
        .bind(&update.notes)
        .bind(update.updated_by)
        .bind(update.at)
        .execute(&mut *tx)
        .await
        .map_err(db("Failed to insert task progress"))?;

        tx.commit()
            .await
            .map_err(db("Failed to commit progress transaction"))?;

        Ok(task)
    }

    async fn progress_history(&self, task_id: i64) -> Result<Vec<TaskProgress>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM task_progress WHERE task_id = $1 ORDER BY updated_at, id",
            PROGRESS_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to load task progress"))?;

        collect(rows, progress_from_row)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_order_with_history(
        &self,
        mut order: Order,
        mut history: CalculationHistory,
        items: Vec<OrderItem>,
    ) -> Result<(Order, CalculationHistory, Vec<OrderItem>)> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db("Failed to begin order transaction"))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders
              (order_number, customer_name, customer_phone, order_date, delivery_date, status,
               total_amount, tax_percentage, tax_amount, marketing_percentage, marketing_cost,
               rental_percentage, rental_cost, net_profit, calculated_at, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(order.derived.tax_percentage)
        .bind(order.derived.tax_amount)
        .bind(order.derived.marketing_percentage)
        .bind(order.derived.marketing_cost)
        .bind(order.derived.rental_percentage)
        .bind(order.derived.rental_cost)
        .bind(order.derived.net_profit)
        .bind(order.derived.calculated_at)
        .bind(order.created_by)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BotError::invalid(format!("order number '{}' already exists", order.order_number))
            } else {
                BotError::persistence("Failed to create order", e)
            }
        })?;

        order.id = id;
        history.order_id = id;
        let history = insert_history(&mut tx, history).await?;

        // Dropping the transaction on error rolls back the order as well
        let mut stored = Vec::with_capacity(items.len());
        for mut item in items {
            item.order_id = id;
            stored.push(insert_item(&mut tx, item).await?);
        }

        tx.commit()
            .await
            .map_err(db("Failed to commit order transaction"))?;

        Ok((order, history, stored))
    }

    async fn update_order_with_history(
        &self,
        order: &Order,
        mut history: CalculationHistory,
    ) -> Result<CalculationHistory> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db("Failed to begin order transaction"))?;

        if write_order(&mut tx, order).await? == 0 {
            return Err(BotError::not_found(format!("order not found: {}", order.id)));
        }

        history.order_id = order.id;
        let history = insert_history(&mut tx, history).await?;

        tx.commit()
            .await
            .map_err(db("Failed to commit order transaction"))?;

        Ok(history)
    }

    async fn get_order(&self, id: i64) -> Result<Order> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("Failed to load order"))?;

        match row {
            Some(row) => order_from_row(&row),
            None => Err(BotError::not_found(format!("order not found: {}", id))),
        }
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!("SELECT {} FROM orders ORDER BY id", ORDER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db("Failed to list orders"))?;

        collect(rows, order_from_row)
    }

    async fn orders_by_creator(&self, user_id: i64) -> Result<Vec<Order>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE created_by = $1 ORDER BY id",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list orders"))?;

        collect(rows, order_from_row)
    }

    async fn orders_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE order_date >= $1 AND order_date < $2 ORDER BY order_date, id",
            ORDER_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list orders"))?;

        collect(rows, order_from_row)
    }

    async fn delete_order(&self, id: i64) -> Result<()> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db("Failed to begin delete transaction"))?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db("Failed to delete order items"))?;

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db("Failed to delete order"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("order not found: {}", id)));
        }

        tx.commit()
            .await
            .map_err(db("Failed to commit delete transaction"))?;
        Ok(())
    }
}

#[async_trait]
impl OrderItemRepository for PgStore {
    async fn create_item(&self, mut item: OrderItem) -> Result<OrderItem> {
        self.ensure_schema().await?;

        // The parent check and the insert share one statement
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO order_items
              (order_id, item_name, description, quantity, unit_price, total_price, status, created_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE EXISTS (SELECT 1 FROM orders WHERE id = $1)
            RETURNING id
            "#,
        )
        .bind(item.order_id)
        .bind(&item.item_name)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("Failed to create order item"))?;

        match id {
            Some(id) => {
                item.id = id;
                Ok(item)
            }
            None => Err(BotError::not_found(format!("order not found: {}", item.order_id))),
        }
    }

    async fn get_item(&self, id: i64) -> Result<OrderItem> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM order_items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("Failed to load order item"))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(BotError::not_found(format!("order item not found: {}", id))),
        }
    }

    async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list order items"))?;

        collect(rows, item_from_row)
    }

    async fn update_item(&self, item: &OrderItem) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            r#"
            UPDATE order_items SET
              item_name = $2, description = $3, quantity = $4, unit_price = $5,
              total_price = $6, status = $7
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.item_name)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db("Failed to update order item"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("order item not found: {}", item.id)));
        }
        Ok(())
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db("Failed to delete order item"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("order item not found: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl FinancialRepository for PgStore {
    async fn create_setting(&self, mut setting: FinancialSettings) -> Result<FinancialSettings> {
        self.ensure_schema().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO financial_settings (setting_name, percentage_value, is_active, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(setting.setting_name.setting_name())
        .bind(setting.percentage_value)
        .bind(setting.is_active)
        .bind(setting.created_by)
        .bind(setting.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db("Failed to create financial setting"))?;

        setting.id = id;
        Ok(setting)
    }

    async fn current_rate(&self, kind: RateKind) -> Result<FinancialSettings> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM financial_settings WHERE setting_name = $1 AND is_active \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            SETTING_COLUMNS
        ))
        .bind(kind.setting_name())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("Failed to load financial setting"))?;

        match row {
            Some(row) => setting_from_row(&row),
            None => Err(BotError::not_found(format!("no active {} configured", kind))),
        }
    }

    async fn calculation_history(&self, order_id: i64) -> Result<Vec<CalculationHistory>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM calculation_history WHERE order_id = $1 ORDER BY calculation_timestamp, id",
            HISTORY_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to load calculation history"))?;

        collect(rows, history_from_row)
    }
}

#[async_trait]
impl ReminderRepository for PgStore {
    async fn create_reminder(&self, mut reminder: Reminder) -> Result<Reminder> {
        self.ensure_schema().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reminders (task_id, reminder_type, scheduled_time, whatsapp_sent, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(reminder.task_id)
        .bind(&reminder.reminder_type)
        .bind(reminder.scheduled_time)
        .bind(reminder.whatsapp_sent)
        .bind(reminder.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db("Failed to create reminder"))?;

        reminder.id = id;
        Ok(reminder)
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reminders ORDER BY scheduled_time, id",
            REMINDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list reminders"))?;

        collect(rows, reminder_from_row)
    }

    async fn reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reminders WHERE task_id = $1 ORDER BY scheduled_time, id",
            REMINDER_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to list reminders"))?;

        collect(rows, reminder_from_row)
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reminders WHERE NOT whatsapp_sent AND scheduled_time <= $1 \
             ORDER BY scheduled_time, id",
            REMINDER_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db("Failed to load due reminders"))?;

        collect(rows, reminder_from_row)
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("UPDATE reminders SET whatsapp_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db("Failed to mark reminder sent"))?;

        if result.rows_affected() == 0 {
            return Err(BotError::not_found(format!("reminder not found: {}", id)));
        }
        Ok(())
    }
}
