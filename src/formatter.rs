//! Chat text rendering
//!
//! Every reply starts with ✅ or ❌ so the outcome is visible at a glance.

use crate::error::BotError;
use crate::finance::HistoryCheck;
use crate::intent::TaskScope;
use crate::memory::{ConversationTurn, TurnRole};
use crate::models::{
    CalculationHistory, Order, OrderItem, OrderItemsSummary, Reminder, Role, Task, TaskStatus, User,
};
use crate::services::{CreatedOrder, FinancialReport, PersonalReport};
use std::fmt::Write;

pub const OK: &str = "✅";
pub const FAIL: &str = "❌";

pub fn success(text: impl AsRef<str>) -> String {
    format!("{} {}", OK, text.as_ref())
}

pub fn failure(text: impl AsRef<str>) -> String {
    format!("{} {}", FAIL, text.as_ref())
}

/// User-facing line for an error. Internal details stay in the logs.
pub fn error(err: &BotError) -> String {
    match err {
        BotError::InvalidArgument(msg) | BotError::NotFound(msg) => failure(msg),
        BotError::PermissionDenied => failure("Insufficient permissions for this command"),
        BotError::RateUnavailable { rate, .. } => failure(format!(
            "Failed to get {} settings. Ask an admin to set it first",
            rate
        )),
        BotError::UpstreamUnavailable(_) | BotError::HttpError(_) => {
            failure("Service temporarily unavailable, please try again later")
        }
        BotError::PersistenceFailure(_)
        | BotError::SerializationError(_)
        | BotError::IoError(_) => failure("Something went wrong while saving your request, please try again"),
    }
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn help(role: Role) -> String {
    let mut out = success("Available Commands:\n\n");
    out.push_str(
        "General Commands:\n\
         /my_tasks - View assigned tasks\n\
         /my_daily_tasks - View today's daily tasks\n\
         /my_monthly_tasks - View this month's tasks\n\
         /update_progress [task_id] [percentage] - Update task progress\n\
         /mark_complete [task_id] - Mark task as implemented\n\
         /view_orders - View related orders\n\
         /view_order_items [order_id] - View items of an order\n\
         /view_reminders - View reminders\n\
         /my_report - View personal report\n\
         /report_by_date [start_date] [end_date] - Report by date range\n\
         /daily_progress_reminder - Send today's progress to yourself\n\
         /monthly_progress_reminder - Send this month's progress to yourself\n\
         /show_history - Show recent conversation\n\
         /clear_history - Clear recent conversation\n\
         /help - Show this help message\n",
    );

    if role.is_admin() {
        out.push_str(
            "\nAdmin Commands:\n\
             /list_users - View all users\n\
             /create_order [customer_name] [total_amount] ([item_name] [quantity] [price]) - Create new order\n\
             /update_order [order_id] [field]=[value] ... - Update order\n\
             /delete_order [order_id] - Delete order\n\
             /add_order_item [order_id] [item_name] [quantity] [price] [description] - Add item\n\
             /update_item_status [item_id] [status] - Update item status\n\
             /assign_task [user] [title] [description] - Assign task to user\n\
             /create_daily_task [user] [title] [description] - Create daily recurring task\n\
             /create_monthly_task [user] [title] [description] - Create monthly recurring task\n\
             /list_tasks - View all tasks\n\
             /create_reminder [task_id] [reminder_type] [YYYY-MM-DD] [HH:MM] - Schedule reminder\n\
             /set_tax_rate [percentage] - Set tax percentage\n\
             /set_marketing_rate [percentage] - Set marketing cost percentage\n\
             /set_rental_rate [percentage] - Set rental cost percentage\n\
             /generate_report - Generate financial report\n\
             /daily_report - Generate daily report\n\
             /monthly_report - Generate monthly report\n\
             /calculation_history [order_id] - View derivation history\n",
        );
    }

    if role == Role::SuperAdmin {
        out.push_str(
            "\nSuper Admin Commands:\n\
             /add_user [username] [email] [phone] [role] - Add new user\n\
             /update_user [user] [field]=[value] ... - Update user\n\
             /delete_user [user] - Delete user\n\
             /set_role [user] [role] - Change user role\n",
        );
    }

    out
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "⏳ Pending",
        TaskStatus::InProgress => "🔄 In Progress",
        TaskStatus::Completed => "✔️ Completed",
        TaskStatus::Overdue => "⚠️ Overdue",
    }
}

fn task_block(out: &mut String, task: &Task) {
    let _ = writeln!(out, "#{} {}", task.id, task.title);
    if !task.description.is_empty() {
        let _ = writeln!(out, "{}", task.description);
    }
    let _ = writeln!(out, "Status: {}", status_label(task.status));
    let _ = writeln!(out, "Progress: {}%", task.completion_percentage);
    let _ = writeln!(out, "Implemented: {}", if task.is_implemented { "yes" } else { "no" });
    let _ = writeln!(out, "Priority: {}", task.priority.as_str());
    if let Some(due) = task.due_date {
        let _ = writeln!(out, "Due: {}", due.format("%Y-%m-%d"));
    }
    out.push('\n');
}

pub fn tasks(tasks: &[Task], scope: TaskScope) -> String {
    let (title, empty) = match scope {
        TaskScope::All => ("Your Tasks:", "No tasks assigned to you."),
        TaskScope::Daily => ("Today's Daily Tasks:", "No daily tasks for today."),
        TaskScope::Monthly => ("This Month's Tasks:", "No monthly tasks for this month."),
    };
    if tasks.is_empty() {
        return success(empty);
    }

    let mut out = success(format!("{}\n\n", title));
    for task in tasks {
        task_block(&mut out, task);
    }
    out.trim_end().to_string()
}

pub fn task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return success("No tasks found.");
    }

    let mut out = success(format!("Tasks ({}):\n\n", tasks.len()));
    for task in tasks {
        let _ = writeln!(
            out,
            "#{} {} [{}] {}% (user {})",
            task.id,
            task.title,
            task.task_type.as_str(),
            task.completion_percentage,
            task.assigned_to
        );
    }
    out.trim_end().to_string()
}

pub fn task_assigned(task: &Task, assignee: &User) -> String {
    let kind = match task.task_type {
        crate::models::TaskType::Daily => "Daily task",
        crate::models::TaskType::Monthly => "Monthly task",
        crate::models::TaskType::Custom => "Task",
    };
    success(format!(
        "{} #{} '{}' assigned to {}",
        kind, task.id, task.title, assignee.username
    ))
}

pub fn progress_updated(task: &Task) -> String {
    success(format!(
        "Task progress updated to {}%",
        task.completion_percentage
    ))
}

pub fn users(users: &[User]) -> String {
    if users.is_empty() {
        return success("No users found.");
    }

    let mut out = success("All Users:\n\n");
    for user in users {
        let _ = writeln!(out, "#{} {} ({})", user.id, user.username, user.email);
        let _ = writeln!(out, "Role: {}", user.role);
        let _ = writeln!(out, "Status: {}", if user.is_active { "Active" } else { "Inactive" });
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn order_block(out: &mut String, order: &Order) {
    let _ = writeln!(out, "Order #{} (id {})", order.order_number, order.id);
    let _ = writeln!(out, "Customer: {}", order.customer_name);
    let _ = writeln!(out, "Total: {}", money(order.total_amount));
    let _ = writeln!(out, "Net Profit: {}", money(order.derived.net_profit));
    let _ = writeln!(out, "Status: {}", order.status.as_str());
    let _ = writeln!(out, "Date: {}", order.order_date.format("%Y-%m-%d"));
    out.push('\n');
}

pub fn orders(orders: &[Order], all: bool) -> String {
    if orders.is_empty() {
        return success("No orders found.");
    }

    let mut out = success(if all { "All Orders:\n\n" } else { "Your Orders:\n\n" });
    for order in orders {
        order_block(&mut out, order);
    }
    out.trim_end().to_string()
}

pub fn order_created(created: &CreatedOrder) -> String {
    let order = &created.order;
    let d = &order.derived;
    let mut out = success("Order created successfully\n");
    let _ = writeln!(out, "Order #: {} (id {})", order.order_number, order.id);
    let _ = writeln!(out, "Customer: {}", order.customer_name);
    let _ = writeln!(out, "Total: {}", money(order.total_amount));
    let _ = writeln!(out, "Tax ({}%): {}", d.tax_percentage, money(d.tax_amount));
    let _ = writeln!(out, "Marketing ({}%): {}", d.marketing_percentage, money(d.marketing_cost));
    let _ = writeln!(out, "Rental ({}%): {}", d.rental_percentage, money(d.rental_cost));
    let _ = write!(out, "Net Profit: {}", money(d.net_profit));
    for item in &created.items {
        let _ = write!(
            out,
            "\nItem: {} x{} @ {} = {}",
            item.item_name,
            item.quantity,
            money(item.unit_price),
            money(item.total_price)
        );
    }
    out
}

pub fn order_updated(order: &Order) -> String {
    success(format!(
        "Order updated successfully\nTotal: {}\nNet Profit: {}",
        money(order.total_amount),
        money(order.derived.net_profit)
    ))
}

pub fn item_added(item: &OrderItem) -> String {
    success(format!(
        "Added {} x{} to order {} (item id {}, total {})",
        item.item_name,
        item.quantity,
        item.order_id,
        item.id,
        money(item.total_price)
    ))
}

pub fn order_items(items: &[OrderItem], summary: &OrderItemsSummary) -> String {
    if items.is_empty() {
        return success(format!("Order {} has no items.", summary.order_id));
    }

    let mut out = success(format!("Items for order {}:\n\n", summary.order_id));
    for item in items {
        let _ = writeln!(
            out,
            "#{} {} x{} @ {} = {} [{}]",
            item.id,
            item.item_name,
            item.quantity,
            money(item.unit_price),
            money(item.total_price),
            item.status.as_str()
        );
    }
    let _ = write!(
        out,
        "\nItems: {} | Quantity: {} | Value: {}\nPending: {} | Completed: {} | Completion: {:.1}%",
        summary.total_items,
        summary.total_quantity,
        money(summary.total_value),
        summary.pending_items,
        summary.completed_items,
        summary.completion_rate
    );
    out
}

pub fn reminders(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return success("No reminders found.");
    }

    let mut out = success("Reminders:\n\n");
    for reminder in reminders {
        let _ = writeln!(
            out,
            "#{} task {} - {} at {} ({})",
            reminder.id,
            reminder.task_id,
            reminder.reminder_type,
            reminder.scheduled_time.format("%Y-%m-%d %H:%M"),
            if reminder.whatsapp_sent { "sent" } else { "scheduled" }
        );
    }
    out.trim_end().to_string()
}

pub fn reminder_created(reminder: &Reminder) -> String {
    success(format!(
        "Reminder #{} '{}' scheduled for {} UTC",
        reminder.id,
        reminder.reminder_type,
        reminder.scheduled_time.format("%Y-%m-%d %H:%M")
    ))
}

pub fn financial_report(report: &FinancialReport) -> String {
    let t = &report.totals;
    if t.orders == 0 {
        return success(format!("{}: no orders found.", report.title));
    }

    let mut out = success(format!("{}:\n\n", report.title));
    let _ = writeln!(out, "Total Orders: {}", t.orders);
    let _ = writeln!(out, "Total Amount: {}", money(t.total_amount));
    let _ = writeln!(out, "Total Tax: {}", money(t.total_tax));
    let _ = writeln!(out, "Total Marketing: {}", money(t.total_marketing));
    let _ = writeln!(out, "Total Rental: {}", money(t.total_rental));
    let _ = write!(out, "Net Profit: {}", money(t.net_profit));
    out
}

pub fn personal_report(report: &PersonalReport) -> String {
    let mut out = success(format!("Personal Report for {}:\n\n", report.username));
    let _ = writeln!(out, "Orders Created: {}", report.orders.orders);
    let _ = writeln!(out, "Order Amount: {}", money(report.orders.total_amount));
    let _ = writeln!(out, "Net Profit: {}", money(report.orders.net_profit));
    let _ = writeln!(out, "Tasks: {} ({} completed, {} implemented)",
        report.tasks_total, report.tasks_completed, report.tasks_implemented);
    let _ = write!(out, "Average Progress: {:.0}%", report.average_progress);
    out
}

pub fn calculation_history(order_id: i64, rows: &[CalculationHistory], check: &HistoryCheck) -> String {
    if rows.is_empty() {
        return success(format!("No calculation history for order {}.", order_id));
    }

    let mut out = success(format!("Calculation history for order {}:\n\n", order_id));
    for row in rows {
        let _ = writeln!(
            out,
            "#{} {} | input {} | rates {}% | amount {} | {}",
            row.id,
            row.calculation_type,
            money(row.input_value),
            row.percentage_used,
            money(row.calculated_amount),
            row.calculation_timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if check.is_intact() {
        let _ = write!(out, "\nIntegrity: all {} rows verified", check.rows);
    } else {
        let _ = write!(out, "\nIntegrity: rows {:?} do not match their checksum", check.mismatched);
    }
    out
}

pub fn conversation(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return success("No conversation history.");
    }

    let mut out = success("Recent conversation:\n\n");
    for turn in turns {
        let who = match turn.role {
            TurnRole::User => "You",
            TurnRole::Assistant => "Bot",
        };
        let _ = writeln!(out, "[{}] {}: {}", turn.timestamp.format("%H:%M"), who, turn.content);
    }
    out.trim_end().to_string()
}
