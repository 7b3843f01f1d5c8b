//! Typed intents
//!
//! Every inbound message resolves to exactly one [`Intent`]. Parameters are
//! parsed and validated here, either from slash-command arguments or from
//! the loosely-typed `data` map returned by the classifier, so nothing
//! downstream handles untyped input.

use crate::error::BotError;
use crate::models::{ItemStatus, OrderStatus, RateKind, Role, TaskType};
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Daily or monthly cadence of recurring work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    Daily,
    Monthly,
}

impl Cadence {
    pub fn task_type(&self) -> TaskType {
        match self {
            Cadence::Daily => TaskType::Daily,
            Cadence::Monthly => TaskType::Monthly,
        }
    }
}

/// Which of the caller's tasks to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskScope {
    All,
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportPeriod {
    Overall,
    Daily,
    Monthly,
}

/// Intent tag, used for the role gate before parameters are looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Help,
    ClearHistory,
    ShowHistory,
    AddUser,
    UpdateUser,
    DeleteUser,
    SetRole,
    ListUsers,
    CreateOrder,
    UpdateOrder,
    DeleteOrder,
    ViewOrders,
    AddOrderItem,
    ViewOrderItems,
    UpdateItemStatus,
    /// `Custom` for plain assignment, `Daily`/`Monthly` for recurring tasks
    AssignTask(TaskType),
    ViewTasks,
    ListTasks,
    UpdateProgress,
    MarkComplete,
    CreateReminder,
    ViewReminders,
    SetRate(RateKind),
    MyReport,
    ReportByDate,
    Report(ReportPeriod),
    CalculationHistory,
    ProgressReminder(Cadence),
    General,
}

impl IntentKind {
    pub const ALL: [IntentKind; 35] = [
        IntentKind::Help,
        IntentKind::ClearHistory,
        IntentKind::ShowHistory,
        IntentKind::AddUser,
        IntentKind::UpdateUser,
        IntentKind::DeleteUser,
        IntentKind::SetRole,
        IntentKind::ListUsers,
        IntentKind::CreateOrder,
        IntentKind::UpdateOrder,
        IntentKind::DeleteOrder,
        IntentKind::ViewOrders,
        IntentKind::AddOrderItem,
        IntentKind::ViewOrderItems,
        IntentKind::UpdateItemStatus,
        IntentKind::AssignTask(TaskType::Custom),
        IntentKind::AssignTask(TaskType::Daily),
        IntentKind::AssignTask(TaskType::Monthly),
        IntentKind::ViewTasks,
        IntentKind::ListTasks,
        IntentKind::UpdateProgress,
        IntentKind::MarkComplete,
        IntentKind::CreateReminder,
        IntentKind::ViewReminders,
        IntentKind::SetRate(RateKind::Tax),
        IntentKind::SetRate(RateKind::Marketing),
        IntentKind::SetRate(RateKind::Rental),
        IntentKind::MyReport,
        IntentKind::ReportByDate,
        IntentKind::Report(ReportPeriod::Overall),
        IntentKind::Report(ReportPeriod::Daily),
        IntentKind::Report(ReportPeriod::Monthly),
        IntentKind::CalculationHistory,
        IntentKind::ProgressReminder(Cadence::Daily),
        IntentKind::ProgressReminder(Cadence::Monthly),
    ];

    /// Tag used in the classifier's `type` field
    pub fn wire_name(&self) -> &'static str {
        match self {
            IntentKind::Help => "help",
            IntentKind::ClearHistory => "clear_history",
            IntentKind::ShowHistory => "show_history",
            IntentKind::AddUser => "add_user",
            IntentKind::UpdateUser => "update_user",
            IntentKind::DeleteUser => "delete_user",
            IntentKind::SetRole => "set_role",
            IntentKind::ListUsers => "list_users",
            IntentKind::CreateOrder => "create_order",
            IntentKind::UpdateOrder => "update_order",
            IntentKind::DeleteOrder => "delete_order",
            IntentKind::ViewOrders => "view_orders",
            IntentKind::AddOrderItem => "add_order_item",
            IntentKind::ViewOrderItems => "view_order_items",
            IntentKind::UpdateItemStatus => "update_item_status",
            IntentKind::AssignTask(TaskType::Custom) => "assign_task",
            IntentKind::AssignTask(TaskType::Daily) => "create_daily_task",
            IntentKind::AssignTask(TaskType::Monthly) => "create_monthly_task",
            IntentKind::ViewTasks => "view_tasks",
            IntentKind::ListTasks => "list_tasks",
            IntentKind::UpdateProgress => "update_progress",
            IntentKind::MarkComplete => "mark_complete",
            IntentKind::CreateReminder => "create_reminder",
            IntentKind::ViewReminders => "view_reminders",
            IntentKind::SetRate(RateKind::Tax) => "set_tax_rate",
            IntentKind::SetRate(RateKind::Marketing) => "set_marketing_rate",
            IntentKind::SetRate(RateKind::Rental) => "set_rental_rate",
            IntentKind::MyReport => "my_report",
            IntentKind::ReportByDate => "report_by_date",
            IntentKind::Report(ReportPeriod::Overall) => "generate_report",
            IntentKind::Report(ReportPeriod::Daily) => "daily_report",
            IntentKind::Report(ReportPeriod::Monthly) => "monthly_report",
            IntentKind::CalculationHistory => "calculation_history",
            IntentKind::ProgressReminder(Cadence::Daily) => "daily_progress_reminder",
            IntentKind::ProgressReminder(Cadence::Monthly) => "monthly_progress_reminder",
            IntentKind::General => "general",
        }
    }

    pub fn from_wire(tag: &str) -> Option<IntentKind> {
        let tag = tag.trim();
        match tag {
            "general" => Some(IntentKind::General),
            "create_order_with_item" => Some(IntentKind::CreateOrder),
            _ => IntentKind::ALL.iter().copied().find(|k| k.wire_name() == tag),
        }
    }

    /// Argument synopsis shown on arity mismatch
    pub fn usage(&self) -> &'static str {
        match self {
            IntentKind::AddUser => "/add_user [username] [email] [phone] [role]",
            IntentKind::UpdateUser => "/update_user [user_id] [field]=[value] ...",
            IntentKind::DeleteUser => "/delete_user [user_id]",
            IntentKind::SetRole => "/set_role [user_id] [role]",
            IntentKind::CreateOrder => {
                "/create_order [customer_name] [total_amount] ([item_name] [quantity] [price])"
            }
            IntentKind::UpdateOrder => "/update_order [order_id] [field]=[value] ...",
            IntentKind::DeleteOrder => "/delete_order [order_id]",
            IntentKind::AddOrderItem => {
                "/add_order_item [order_id] [item_name] [quantity] [price] [description]"
            }
            IntentKind::ViewOrderItems => "/view_order_items [order_id]",
            IntentKind::UpdateItemStatus => "/update_item_status [item_id] [status]",
            IntentKind::AssignTask(TaskType::Custom) => "/assign_task [user_id] [title] [description]",
            IntentKind::AssignTask(TaskType::Daily) => {
                "/create_daily_task [user_id] [title] [description]"
            }
            IntentKind::AssignTask(TaskType::Monthly) => {
                "/create_monthly_task [user_id] [title] [description]"
            }
            IntentKind::UpdateProgress => "/update_progress [task_id] [percentage]",
            IntentKind::MarkComplete => "/mark_complete [task_id]",
            IntentKind::CreateReminder => {
                "/create_reminder [task_id] [reminder_type] [YYYY-MM-DD] [HH:MM]"
            }
            IntentKind::SetRate(RateKind::Tax) => "/set_tax_rate [percentage]",
            IntentKind::SetRate(RateKind::Marketing) => "/set_marketing_rate [percentage]",
            IntentKind::SetRate(RateKind::Rental) => "/set_rental_rate [percentage]",
            IntentKind::ReportByDate => {
                "/report_by_date [start_date] [end_date] (format: YYYY-MM-DD)"
            }
            IntentKind::CalculationHistory => "/calculation_history [order_id]",
            IntentKind::ViewTasks => "/my_tasks",
            IntentKind::ProgressReminder(Cadence::Daily) => "/daily_progress_reminder",
            IntentKind::ProgressReminder(Cadence::Monthly) => "/monthly_progress_reminder",
            IntentKind::Report(ReportPeriod::Overall) => "/generate_report",
            IntentKind::Report(ReportPeriod::Daily) => "/daily_report",
            IntentKind::Report(ReportPeriod::Monthly) => "/monthly_report",
            IntentKind::Help => "/help",
            IntentKind::ClearHistory => "/clear_history",
            IntentKind::ShowHistory => "/show_history",
            IntentKind::ListUsers => "/list_users",
            IntentKind::ViewOrders => "/view_orders",
            IntentKind::ListTasks => "/list_tasks",
            IntentKind::ViewReminders => "/view_reminders",
            IntentKind::MyReport => "/my_report",
            IntentKind::General => "/help",
        }
    }

    fn usage_error(&self) -> BotError {
        BotError::invalid(format!("Usage: {}", self.usage()))
    }
}

/// A user named in a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(i64),
    Username(String),
    /// The sender of the message
    Caller,
}

impl UserRef {
    /// Numeric tokens are ids, anything else is a username
    pub fn parse(token: &str) -> Self {
        let token = token.trim().trim_start_matches('@');
        match token.parse::<i64>() {
            Ok(id) => UserRef::Id(id),
            Err(_) => UserRef::Username(token.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserChange {
    Username(String),
    Email(String),
    /// Updates both the phone number and the chat handle
    Phone(String),
    Role(Role),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderChange {
    CustomerName(String),
    TotalAmount(f64),
    Status(OrderStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Help,
    ClearHistory,
    ShowHistory,
    AddUser {
        username: String,
        email: String,
        phone: String,
        role: Role,
    },
    UpdateUser {
        user: UserRef,
        changes: Vec<UserChange>,
    },
    DeleteUser {
        user: UserRef,
    },
    SetRole {
        user: UserRef,
        role: Role,
    },
    ListUsers,
    CreateOrder {
        customer: String,
        total: f64,
        items: Vec<NewItem>,
    },
    UpdateOrder {
        order_id: i64,
        changes: Vec<OrderChange>,
    },
    DeleteOrder {
        order_id: i64,
    },
    ViewOrders,
    AddOrderItem {
        order_id: i64,
        item: NewItem,
    },
    ViewOrderItems {
        order_id: i64,
    },
    UpdateItemStatus {
        item_id: i64,
        status: ItemStatus,
    },
    AssignTask {
        assignee: UserRef,
        title: String,
        description: String,
        task_type: TaskType,
    },
    ViewTasks {
        scope: TaskScope,
    },
    ListTasks,
    UpdateProgress {
        task_id: i64,
        percentage: u8,
        notes: String,
    },
    MarkComplete {
        task_id: i64,
    },
    CreateReminder {
        task_id: i64,
        reminder_type: String,
        scheduled_time: DateTime<Utc>,
    },
    ViewReminders,
    SetRate {
        kind: RateKind,
        percentage: f64,
    },
    MyReport,
    ReportByDate {
        start: NaiveDate,
        end: NaiveDate,
    },
    Report {
        period: ReportPeriod,
    },
    CalculationHistory {
        order_id: i64,
    },
    ProgressReminder {
        cadence: Cadence,
    },
    General {
        message: String,
    },
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Help => IntentKind::Help,
            Intent::ClearHistory => IntentKind::ClearHistory,
            Intent::ShowHistory => IntentKind::ShowHistory,
            Intent::AddUser { .. } => IntentKind::AddUser,
            Intent::UpdateUser { .. } => IntentKind::UpdateUser,
            Intent::DeleteUser { .. } => IntentKind::DeleteUser,
            Intent::SetRole { .. } => IntentKind::SetRole,
            Intent::ListUsers => IntentKind::ListUsers,
            Intent::CreateOrder { .. } => IntentKind::CreateOrder,
            Intent::UpdateOrder { .. } => IntentKind::UpdateOrder,
            Intent::DeleteOrder { .. } => IntentKind::DeleteOrder,
            Intent::ViewOrders => IntentKind::ViewOrders,
            Intent::AddOrderItem { .. } => IntentKind::AddOrderItem,
            Intent::ViewOrderItems { .. } => IntentKind::ViewOrderItems,
            Intent::UpdateItemStatus { .. } => IntentKind::UpdateItemStatus,
            Intent::AssignTask { task_type, .. } => IntentKind::AssignTask(*task_type),
            Intent::ViewTasks { .. } => IntentKind::ViewTasks,
            Intent::ListTasks => IntentKind::ListTasks,
            Intent::UpdateProgress { .. } => IntentKind::UpdateProgress,
            Intent::MarkComplete { .. } => IntentKind::MarkComplete,
            Intent::CreateReminder { .. } => IntentKind::CreateReminder,
            Intent::ViewReminders => IntentKind::ViewReminders,
            Intent::SetRate { kind, .. } => IntentKind::SetRate(*kind),
            Intent::MyReport => IntentKind::MyReport,
            Intent::ReportByDate { .. } => IntentKind::ReportByDate,
            Intent::Report { period } => IntentKind::Report(*period),
            Intent::CalculationHistory { .. } => IntentKind::CalculationHistory,
            Intent::ProgressReminder { cadence } => IntentKind::ProgressReminder(*cadence),
            Intent::General { .. } => IntentKind::General,
        }
    }

    /// Build from slash-command arguments. `command` is the command token
    /// itself, which only refines the task view scope.
    pub fn from_args(kind: IntentKind, command: &str, args: &[&str]) -> Result<Intent> {
        let need = |n: usize| {
            if args.len() < n {
                Err(kind.usage_error())
            } else {
                Ok(())
            }
        };

        let intent = match kind {
            IntentKind::Help => Intent::Help,
            IntentKind::ClearHistory => Intent::ClearHistory,
            IntentKind::ShowHistory => Intent::ShowHistory,
            IntentKind::ListUsers => Intent::ListUsers,
            IntentKind::ViewOrders => Intent::ViewOrders,
            IntentKind::ListTasks => Intent::ListTasks,
            IntentKind::ViewReminders => Intent::ViewReminders,
            IntentKind::MyReport => Intent::MyReport,
            IntentKind::Report(period) => Intent::Report { period },
            IntentKind::ProgressReminder(cadence) => Intent::ProgressReminder { cadence },
            IntentKind::General => Intent::General {
                message: String::new(),
            },

            IntentKind::ViewTasks => Intent::ViewTasks {
                scope: scope_for_command(command),
            },

            IntentKind::AddUser => {
                need(4)?;
                Intent::AddUser {
                    username: args[0].to_string(),
                    email: args[1].to_string(),
                    phone: args[2].to_string(),
                    role: args[3].parse()?,
                }
            }
            IntentKind::UpdateUser => {
                need(2)?;
                Intent::UpdateUser {
                    user: UserRef::parse(args[0]),
                    changes: parse_user_changes(args[1..].iter().copied())?,
                }
            }
            IntentKind::DeleteUser => {
                need(1)?;
                Intent::DeleteUser {
                    user: UserRef::parse(args[0]),
                }
            }
            IntentKind::SetRole => {
                need(2)?;
                Intent::SetRole {
                    user: UserRef::parse(args[0]),
                    role: args[1].parse()?,
                }
            }

            IntentKind::CreateOrder => {
                need(2)?;
                let total = parse_amount(args[1], "total amount")?;
                let items = match args.len() {
                    2 => Vec::new(),
                    5 => vec![NewItem {
                        name: args[2].to_string(),
                        description: String::new(),
                        quantity: parse_quantity(args[3])?,
                        unit_price: parse_amount(args[4], "price")?,
                    }],
                    _ => return Err(kind.usage_error()),
                };
                Intent::CreateOrder {
                    customer: args[0].to_string(),
                    total,
                    items,
                }
            }
            IntentKind::UpdateOrder => {
                need(2)?;
                Intent::UpdateOrder {
                    order_id: parse_id(args[0], "order ID")?,
                    changes: parse_order_changes(args[1..].iter().copied())?,
                }
            }
            IntentKind::DeleteOrder => {
                need(1)?;
                Intent::DeleteOrder {
                    order_id: parse_id(args[0], "order ID")?,
                }
            }
            IntentKind::AddOrderItem => {
                need(4)?;
                Intent::AddOrderItem {
                    order_id: parse_id(args[0], "order ID")?,
                    item: NewItem {
                        name: args[1].to_string(),
                        description: args[4..].join(" "),
                        quantity: parse_quantity(args[2])?,
                        unit_price: parse_amount(args[3], "price")?,
                    },
                }
            }
            IntentKind::ViewOrderItems => {
                need(1)?;
                Intent::ViewOrderItems {
                    order_id: parse_id(args[0], "order ID")?,
                }
            }
            IntentKind::UpdateItemStatus => {
                need(2)?;
                Intent::UpdateItemStatus {
                    item_id: parse_id(args[0], "item ID")?,
                    status: args[1].parse()?,
                }
            }

            IntentKind::AssignTask(task_type) => {
                need(3)?;
                Intent::AssignTask {
                    assignee: UserRef::parse(args[0]),
                    title: args[1].to_string(),
                    description: args[2..].join(" "),
                    task_type,
                }
            }
            IntentKind::UpdateProgress => {
                need(2)?;
                Intent::UpdateProgress {
                    task_id: parse_id(args[0], "task ID")?,
                    percentage: parse_percentage(args[1])?,
                    notes: args[2..].join(" "),
                }
            }
            IntentKind::MarkComplete => {
                need(1)?;
                Intent::MarkComplete {
                    task_id: parse_id(args[0], "task ID")?,
                }
            }
            IntentKind::CreateReminder => {
                need(3)?;
                Intent::CreateReminder {
                    task_id: parse_id(args[0], "task ID")?,
                    reminder_type: args[1].to_string(),
                    scheduled_time: parse_schedule(&args[2..].join(" "))?,
                }
            }

            IntentKind::SetRate(rate) => {
                need(1)?;
                Intent::SetRate {
                    kind: rate,
                    percentage: parse_rate(args[0])?,
                }
            }
            IntentKind::ReportByDate => {
                need(2)?;
                Intent::ReportByDate {
                    start: parse_date(args[0], "start")?,
                    end: parse_date(args[1], "end")?,
                }
            }
            IntentKind::CalculationHistory => {
                need(1)?;
                Intent::CalculationHistory {
                    order_id: parse_id(args[0], "order ID")?,
                }
            }
        };

        Ok(intent)
    }

    /// Build from the classifier's `data` map. `message` is the classifier's
    /// own reply text, kept for general conversation.
    pub fn from_data(kind: IntentKind, data: &Map<String, Value>, message: &str) -> Result<Intent> {
        let fields = Fields { kind, data };

        let intent = match kind {
            IntentKind::Help => Intent::Help,
            IntentKind::ClearHistory => Intent::ClearHistory,
            IntentKind::ShowHistory => Intent::ShowHistory,
            IntentKind::ListUsers => Intent::ListUsers,
            IntentKind::ViewOrders => Intent::ViewOrders,
            IntentKind::ListTasks => Intent::ListTasks,
            IntentKind::ViewReminders => Intent::ViewReminders,
            IntentKind::MyReport => Intent::MyReport,
            IntentKind::Report(period) => Intent::Report { period },
            IntentKind::ProgressReminder(cadence) => Intent::ProgressReminder { cadence },
            IntentKind::General => Intent::General {
                message: message.to_string(),
            },

            IntentKind::ViewTasks => Intent::ViewTasks {
                scope: match fields.opt_text("scope").as_deref() {
                    Some("daily") => TaskScope::Daily,
                    Some("monthly") => TaskScope::Monthly,
                    _ => TaskScope::All,
                },
            },

            IntentKind::AddUser => Intent::AddUser {
                username: fields.text("username")?,
                email: fields.text("email")?,
                phone: fields.text("phone")?,
                role: match fields.opt_text("role") {
                    Some(role) => role.parse()?,
                    None => Role::User,
                },
            },
            IntentKind::UpdateUser => {
                let mut changes = Vec::new();
                if let Some(v) = fields.opt_text("username") {
                    changes.push(UserChange::Username(v));
                }
                if let Some(v) = fields.opt_text("email") {
                    changes.push(UserChange::Email(v));
                }
                if let Some(v) = fields.opt_text("phone") {
                    changes.push(UserChange::Phone(v));
                }
                if let Some(v) = fields.opt_text("role") {
                    changes.push(UserChange::Role(v.parse()?));
                }
                if changes.is_empty() {
                    return Err(kind.usage_error());
                }
                Intent::UpdateUser {
                    user: fields.user("user_id")?,
                    changes,
                }
            }
            IntentKind::DeleteUser => Intent::DeleteUser {
                user: fields.user("user_id")?,
            },
            IntentKind::SetRole => Intent::SetRole {
                user: fields.user("user_id")?,
                role: fields.text("role")?.parse()?,
            },

            IntentKind::CreateOrder => {
                let items = match fields.opt_text("item_name") {
                    Some(name) => vec![NewItem {
                        name,
                        description: fields.opt_text("description").unwrap_or_default(),
                        quantity: fields.opt_integer("quantity")?.unwrap_or(1),
                        unit_price: fields.number("price")?,
                    }],
                    None => Vec::new(),
                };
                Intent::CreateOrder {
                    customer: fields.text("customer_name")?,
                    total: fields.number("total_amount")?,
                    items,
                }
            }
            IntentKind::UpdateOrder => {
                let mut changes = Vec::new();
                if let Some(v) = fields.opt_text("customer_name") {
                    changes.push(OrderChange::CustomerName(v));
                }
                if fields.data.contains_key("total_amount") {
                    changes.push(OrderChange::TotalAmount(fields.number("total_amount")?));
                }
                if let Some(v) = fields.opt_text("status") {
                    changes.push(OrderChange::Status(v.parse()?));
                }
                if changes.is_empty() {
                    return Err(kind.usage_error());
                }
                Intent::UpdateOrder {
                    order_id: fields.integer("order_id")?,
                    changes,
                }
            }
            IntentKind::DeleteOrder => Intent::DeleteOrder {
                order_id: fields.integer("order_id")?,
            },
            IntentKind::AddOrderItem => Intent::AddOrderItem {
                order_id: fields.integer("order_id")?,
                item: NewItem {
                    name: fields.text("item_name")?,
                    description: fields.opt_text("description").unwrap_or_default(),
                    quantity: fields.integer("quantity")?,
                    unit_price: fields.number("price")?,
                },
            },
            IntentKind::ViewOrderItems => Intent::ViewOrderItems {
                order_id: fields.integer("order_id")?,
            },
            IntentKind::UpdateItemStatus => Intent::UpdateItemStatus {
                item_id: fields.integer("item_id")?,
                status: fields.text("status")?.parse()?,
            },

            IntentKind::AssignTask(task_type) => Intent::AssignTask {
                assignee: fields.user("assigned_to")?,
                title: fields.text("title")?,
                description: fields.opt_text("description").unwrap_or_default(),
                task_type,
            },
            IntentKind::UpdateProgress => {
                let percentage = fields.integer("percentage")?;
                if !(0..=100).contains(&percentage) {
                    return Err(invalid_percentage());
                }
                Intent::UpdateProgress {
                    task_id: fields.integer("task_id")?,
                    percentage: percentage as u8,
                    notes: fields.opt_text("notes").unwrap_or_default(),
                }
            }
            IntentKind::MarkComplete => Intent::MarkComplete {
                task_id: fields.integer("task_id")?,
            },
            IntentKind::CreateReminder => Intent::CreateReminder {
                task_id: fields.integer("task_id")?,
                reminder_type: fields.text("reminder_type")?,
                scheduled_time: parse_schedule(&fields.text("scheduled_time")?)?,
            },

            IntentKind::SetRate(rate) => Intent::SetRate {
                kind: rate,
                percentage: fields.rate("percentage")?,
            },
            IntentKind::ReportByDate => Intent::ReportByDate {
                start: parse_date(&fields.text("start_date")?, "start")?,
                end: parse_date(&fields.text("end_date")?, "end")?,
            },
            IntentKind::CalculationHistory => Intent::CalculationHistory {
                order_id: fields.integer("order_id")?,
            },
        };

        Ok(intent)
    }
}

fn scope_for_command(command: &str) -> TaskScope {
    match command {
        "/my_daily_tasks" => TaskScope::Daily,
        "/my_monthly_tasks" => TaskScope::Monthly,
        _ => TaskScope::All,
    }
}

/// Typed access to the classifier's loosely-typed `data` map
struct Fields<'a> {
    kind: IntentKind,
    data: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn missing(&self, key: &str) -> BotError {
        BotError::invalid(format!("Missing {}. Usage: {}", key, self.kind.usage()))
    }

    fn opt_text(&self, key: &str) -> Option<String> {
        match self.data.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn text(&self, key: &str) -> Result<String> {
        self.opt_text(key).ok_or_else(|| self.missing(key))
    }

    /// Accepts JSON numbers and numeric strings
    fn number(&self, key: &str) -> Result<f64> {
        match self.data.get(key) {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| BotError::invalid(format!("Invalid {}", key))),
            Some(Value::String(s)) if !s.trim().is_empty() => parse_amount(s.trim(), key),
            _ => Err(self.missing(key)),
        }
    }

    fn rate(&self, key: &str) -> Result<f64> {
        match self.data.get(key) {
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| BotError::invalid("Invalid percentage")),
            Some(Value::String(s)) if !s.trim().is_empty() => parse_rate(s),
            _ => Err(self.missing(key)),
        }
    }

    fn opt_integer(&self, key: &str) -> Result<Option<i64>> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(_) => self.integer(key).map(Some),
        }
    }

    fn integer(&self, key: &str) -> Result<i64> {
        match self.data.get(key) {
            Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(i),
                (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(BotError::invalid(format!("Invalid {}", key))),
            },
            Some(Value::String(s)) if !s.trim().is_empty() => s
                .trim()
                .parse()
                .map_err(|_| BotError::invalid(format!("Invalid {}", key))),
            _ => Err(self.missing(key)),
        }
    }

    fn user(&self, key: &str) -> Result<UserRef> {
        match self.data.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .map(UserRef::Id)
                .ok_or_else(|| BotError::invalid("Invalid user ID")),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(UserRef::parse(s)),
            // Free-text requests may name the user by username instead
            _ if key == "user_id" => self
                .opt_text("username")
                .map(|u| UserRef::parse(&u))
                .ok_or_else(|| self.missing(key)),
            _ => Err(self.missing(key)),
        }
    }
}

fn invalid_percentage() -> BotError {
    BotError::invalid("Invalid progress percentage (0-100)")
}

pub fn parse_id(token: &str, what: &str) -> Result<i64> {
    match token.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(BotError::invalid(format!("Invalid {}", what))),
    }
}

fn parse_amount(token: &str, what: &str) -> Result<f64> {
    match token.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(BotError::invalid(format!("Invalid {}", what))),
    }
}

fn parse_quantity(token: &str) -> Result<i64> {
    match token.trim().parse::<i64>() {
        Ok(q) if q > 0 => Ok(q),
        _ => Err(BotError::invalid("Invalid quantity")),
    }
}

/// Progress percentage, bounded to [0, 100]
pub fn parse_percentage(token: &str) -> Result<u8> {
    match token.trim().parse::<i64>() {
        Ok(p) if (0..=100).contains(&p) => Ok(p as u8),
        _ => Err(invalid_percentage()),
    }
}

/// Configured rates have no range bound but must be finite
pub fn parse_rate(token: &str) -> Result<f64> {
    match token.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(BotError::invalid("Invalid percentage")),
    }
}

fn parse_date(token: &str, which: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(token.trim(), "%Y-%m-%d")
        .map_err(|_| BotError::invalid(format!("Invalid {} date format. Use YYYY-MM-DD", which)))
}

/// `YYYY-MM-DD HH:MM`, `YYYY-MM-DD` (midnight) or RFC 3339; naive times are UTC
pub fn parse_schedule(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&at));
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    Err(BotError::invalid(
        "Invalid scheduled time. Use YYYY-MM-DD HH:MM",
    ))
}

fn parse_user_changes<'a>(pairs: impl Iterator<Item = &'a str>) -> Result<Vec<UserChange>> {
    let mut changes = Vec::new();
    for pair in pairs {
        let (field, value) = split_pair(pair)?;
        let change = match field {
            "username" => UserChange::Username(value.to_string()),
            "email" => UserChange::Email(value.to_string()),
            "phone" => UserChange::Phone(value.to_string()),
            "role" => UserChange::Role(value.parse()?),
            other => {
                return Err(BotError::invalid(format!(
                    "Unknown field '{}'. Use username, email, phone or role",
                    other
                )))
            }
        };
        changes.push(change);
    }
    Ok(changes)
}

fn parse_order_changes<'a>(pairs: impl Iterator<Item = &'a str>) -> Result<Vec<OrderChange>> {
    let mut changes = Vec::new();
    for pair in pairs {
        let (field, value) = split_pair(pair)?;
        let change = match field {
            "customer_name" => OrderChange::CustomerName(value.to_string()),
            "total_amount" => OrderChange::TotalAmount(parse_amount(value, "total amount")?),
            "status" => OrderChange::Status(value.parse()?),
            other => {
                return Err(BotError::invalid(format!(
                    "Unknown field '{}'. Use customer_name, total_amount or status",
                    other
                )))
            }
        };
        changes.push(change);
    }
    Ok(changes)
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((field, value)) if !field.is_empty() && !value.is_empty() => Ok((field, value)),
        _ => Err(BotError::invalid(format!(
            "Invalid change '{}'. Use [field]=[value]",
            pair
        ))),
    }
}
