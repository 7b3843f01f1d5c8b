//! Command dispatcher
//!
//! Routes a resolved intent to the domain services and renders the reply.
//! The role gate runs on the intent kind first, so a denied caller never
//! reaches parameter validation or any repository. `dispatch` never fails;
//! every outcome becomes a ✅ or ❌ line.

pub mod gate;

use crate::classifier::GENERAL_REPLY;
use crate::formatter;
use crate::intent::{Cadence, Intent};
use crate::memory::ConversationMemory;
use crate::models::User;
use crate::resolver::Resolution;
use crate::services::{orders::summarize, Services};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    services: Arc<Services>,
    memory: Arc<ConversationMemory>,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>, memory: Arc<ConversationMemory>) -> Self {
        Self { services, memory }
    }

    pub async fn dispatch(&self, caller: &User, resolution: Resolution) -> String {
        let kind = resolution.kind;

        if let Err(e) = gate::check(caller.role, kind) {
            info!(
                user_id = caller.id,
                role = caller.role.as_str(),
                intent = kind.wire_name(),
                "Permission denied"
            );
            return formatter::error(&e);
        }

        let intent = match resolution.intent {
            Ok(intent) => intent,
            Err(e) => {
                debug!(user_id = caller.id, intent = kind.wire_name(), "Invalid parameters: {}", e);
                return formatter::error(&e);
            }
        };

        match self.run(caller, intent).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user_id = caller.id, intent = kind.wire_name(), "Command failed: {}", e);
                formatter::error(&e)
            }
        }
    }

    async fn run(&self, caller: &User, intent: Intent) -> Result<String> {
        let s = &self.services;

        let reply = match intent {
            Intent::Help => formatter::help(caller.role),
            Intent::ShowHistory => formatter::conversation(&self.memory.read(caller.id).await?),
            Intent::ClearHistory => {
                self.memory.clear(caller.id).await?;
                formatter::success("Conversation history cleared")
            }
            Intent::General { message } => {
                if message.trim().is_empty() || message == GENERAL_REPLY {
                    formatter::failure(GENERAL_REPLY)
                } else {
                    formatter::success(message.trim())
                }
            }

            // Users
            Intent::AddUser {
                username,
                email,
                phone,
                role,
            } => {
                let user = s.users.add_user(&username, &email, &phone, role).await?;
                formatter::success(format!(
                    "User created successfully\nID: {}\nUsername: {}\nRole: {}",
                    user.id, user.username, user.role
                ))
            }
            Intent::UpdateUser { user, changes } => {
                let user = s.users.update_user(&user, &changes, caller).await?;
                formatter::success(format!("User {} updated successfully", user.username))
            }
            Intent::DeleteUser { user } => {
                let user = s.users.delete_user(&user, caller).await?;
                formatter::success(format!("User {} deleted successfully", user.username))
            }
            Intent::SetRole { user, role } => {
                let user = s.users.set_role(&user, role, caller).await?;
                formatter::success(format!("User role updated: {} is now {}", user.username, user.role))
            }
            Intent::ListUsers => formatter::users(&s.users.list_users().await?),

            // Orders
            Intent::CreateOrder {
                customer,
                total,
                items,
            } => {
                let created = s.orders.create_order(&customer, total, &items, caller.id).await?;
                formatter::order_created(&created)
            }
            Intent::UpdateOrder { order_id, changes } => {
                formatter::order_updated(&s.orders.update_order(order_id, &changes).await?)
            }
            Intent::DeleteOrder { order_id } => {
                s.orders.delete_order(order_id).await?;
                formatter::success("Order deleted successfully")
            }
            Intent::ViewOrders => {
                let orders = s.orders.visible_orders(caller).await?;
                formatter::orders(&orders, caller.role.is_admin())
            }
            Intent::AddOrderItem { order_id, item } => {
                formatter::item_added(&s.orders.add_item(order_id, &item).await?)
            }
            Intent::ViewOrderItems { order_id } => {
                let items = s.orders.items_for_order(order_id).await?;
                formatter::order_items(&items, &summarize(order_id, &items))
            }
            Intent::UpdateItemStatus { item_id, status } => {
                let item = s.orders.update_item_status(item_id, status).await?;
                formatter::success(format!("Item {} marked {}", item.id, item.status.as_str()))
            }

            // Tasks
            Intent::AssignTask {
                assignee,
                title,
                description,
                task_type,
            } => {
                let assignee = s.users.resolve(&assignee, caller).await?;
                let task = s
                    .tasks
                    .create_task(&assignee, &title, &description, task_type, caller.id)
                    .await?;
                formatter::task_assigned(&task, &assignee)
            }
            Intent::ViewTasks { scope } => formatter::tasks(&s.tasks.tasks_for(caller.id, scope).await?, scope),
            Intent::ListTasks => formatter::task_list(&s.tasks.visible_tasks(caller).await?),
            Intent::UpdateProgress {
                task_id,
                percentage,
                notes,
            } => {
                let task = s
                    .tasks
                    .update_progress(task_id, percentage, false, &notes, caller.id)
                    .await?;
                formatter::progress_updated(&task)
            }
            Intent::MarkComplete { task_id } => {
                s.tasks.mark_complete(task_id, caller.id).await?;
                formatter::success("Task marked as implemented")
            }

            // Reminders
            Intent::CreateReminder {
                task_id,
                reminder_type,
                scheduled_time,
            } => formatter::reminder_created(
                &s.reminders
                    .create_reminder(task_id, &reminder_type, scheduled_time)
                    .await?,
            ),
            Intent::ViewReminders => formatter::reminders(&s.reminders.visible_reminders(caller).await?),
            Intent::ProgressReminder { cadence } => {
                let progress = s.tasks.average_progress(caller.id, cadence).await?;
                s.reminders.send_progress_reminder(caller, cadence, progress).await?;
                let label = match cadence {
                    Cadence::Daily => "Daily",
                    Cadence::Monthly => "Monthly",
                };
                formatter::success(format!("{} progress reminder sent ({}%)", label, progress))
            }

            // Financial
            Intent::SetRate { kind, percentage } => {
                let setting = s.finance.set_rate(kind, percentage, caller.id).await?;
                formatter::success(format!(
                    "{} rate set to {:.2}%",
                    kind.label(),
                    setting.percentage_value
                ))
            }
            Intent::Report { period } => formatter::financial_report(&s.reports.financial(period).await?),
            Intent::ReportByDate { start, end } => {
                formatter::financial_report(&s.reports.by_date(start, end, caller).await?)
            }
            Intent::MyReport => formatter::personal_report(&s.reports.personal(caller).await?),
            Intent::CalculationHistory { order_id } => {
                let rows = s.finance.history(order_id).await?;
                let check = s.finance.verify_history(order_id).await?;
                formatter::calculation_history(order_id, &rows, &check)
            }
        };

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::error::BotError;
    use crate::intent::{IntentKind, NewItem, ReportPeriod, TaskScope, UserRef};
    use crate::memory::InMemoryCache;
    use crate::messaging::Messenger;
    use crate::models::{
        CalculationHistory, FinancialSettings, Order, OrderItem, ProgressUpdate, RateKind, Reminder,
        Role, Task, TaskProgress, TaskType,
    };
    use crate::resolver::{ClassifierPrompt, IntentModel, IntentResolver, ResolutionSource};
    use crate::state::{
        FinancialRepository, InMemoryStore, OrderItemRepository, OrderRepository, ReminderRepository,
        TaskRepository, UserRepository,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Counts every repository call before delegating. With `fail_items`
    /// set, any write carrying order items fails.
    #[derive(Default)]
    struct SpyStore {
        inner: InMemoryStore,
        calls: AtomicUsize,
        fail_items: AtomicBool,
    }

    impl SpyStore {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserRepository for SpyStore {
        async fn create_user(&self, user: User) -> Result<User> {
            self.hit();
            self.inner.create_user(user).await
        }
        async fn get_user(&self, id: i64) -> Result<User> {
            self.hit();
            self.inner.get_user(id).await
        }
        async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
            self.hit();
            self.inner.find_user_by_username(username).await
        }
        async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
            self.hit();
            self.inner.find_user_by_handle(handle).await
        }
        async fn list_users(&self) -> Result<Vec<User>> {
            self.hit();
            self.inner.list_users().await
        }
        async fn update_user(&self, user: &User) -> Result<()> {
            self.hit();
            self.inner.update_user(user).await
        }
        async fn delete_user(&self, id: i64) -> Result<()> {
            self.hit();
            self.inner.delete_user(id).await
        }
    }

    #[async_trait]
    impl TaskRepository for SpyStore {
        async fn create_task(&self, task: Task) -> Result<Task> {
            self.hit();
            self.inner.create_task(task).await
        }
        async fn get_task(&self, id: i64) -> Result<Task> {
            self.hit();
            self.inner.get_task(id).await
        }
        async fn list_tasks(&self) -> Result<Vec<Task>> {
            self.hit();
            self.inner.list_tasks().await
        }
        async fn tasks_for_user(&self, user_id: i64) -> Result<Vec<Task>> {
            self.hit();
            self.inner.tasks_for_user(user_id).await
        }
        async fn tasks_by_type(&self, task_type: TaskType, user_id: Option<i64>) -> Result<Vec<Task>> {
            self.hit();
            self.inner.tasks_by_type(task_type, user_id).await
        }
        async fn update_task(&self, task: &Task) -> Result<()> {
            self.hit();
            self.inner.update_task(task).await
        }
        async fn delete_task(&self, id: i64) -> Result<()> {
            self.hit();
            self.inner.delete_task(id).await
        }
        async fn apply_progress(&self, update: ProgressUpdate) -> Result<Task> {
            self.hit();
            self.inner.apply_progress(update).await
        }
        async fn progress_history(&self, task_id: i64) -> Result<Vec<TaskProgress>> {
            self.hit();
            self.inner.progress_history(task_id).await
        }
    }

    #[async_trait]
    impl OrderRepository for SpyStore {
        async fn create_order_with_history(
            &self,
            order: Order,
            history: CalculationHistory,
            items: Vec<OrderItem>,
        ) -> Result<(Order, CalculationHistory, Vec<OrderItem>)> {
            self.hit();
            if !items.is_empty() && self.fail_items.load(Ordering::SeqCst) {
                return Err(BotError::persistence("Failed to create order item", "connection reset"));
            }
            self.inner.create_order_with_history(order, history, items).await
        }
        async fn update_order_with_history(
            &self,
            order: &Order,
            history: CalculationHistory,
        ) -> Result<CalculationHistory> {
            self.hit();
            self.inner.update_order_with_history(order, history).await
        }
        async fn get_order(&self, id: i64) -> Result<Order> {
            self.hit();
            self.inner.get_order(id).await
        }
        async fn list_orders(&self) -> Result<Vec<Order>> {
            self.hit();
            self.inner.list_orders().await
        }
        async fn orders_by_creator(&self, user_id: i64) -> Result<Vec<Order>> {
            self.hit();
            self.inner.orders_by_creator(user_id).await
        }
        async fn orders_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>> {
            self.hit();
            self.inner.orders_in_range(start, end).await
        }
        async fn delete_order(&self, id: i64) -> Result<()> {
            self.hit();
            self.inner.delete_order(id).await
        }
    }

    #[async_trait]
    impl OrderItemRepository for SpyStore {
        async fn create_item(&self, item: OrderItem) -> Result<OrderItem> {
            self.hit();
            if self.fail_items.load(Ordering::SeqCst) {
                return Err(BotError::persistence("Failed to create order item", "connection reset"));
            }
            self.inner.create_item(item).await
        }
        async fn get_item(&self, id: i64) -> Result<OrderItem> {
            self.hit();
            self.inner.get_item(id).await
        }
        async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
            self.hit();
            self.inner.items_for_order(order_id).await
        }
        async fn update_item(&self, item: &OrderItem) -> Result<()> {
            self.hit();
            self.inner.update_item(item).await
        }
        async fn delete_item(&self, id: i64) -> Result<()> {
            self.hit();
            self.inner.delete_item(id).await
        }
    }

    #[async_trait]
    impl FinancialRepository for SpyStore {
        async fn create_setting(&self, setting: FinancialSettings) -> Result<FinancialSettings> {
            self.hit();
            self.inner.create_setting(setting).await
        }
        async fn current_rate(&self, kind: RateKind) -> Result<FinancialSettings> {
            self.hit();
            self.inner.current_rate(kind).await
        }
        async fn calculation_history(&self, order_id: i64) -> Result<Vec<CalculationHistory>> {
            self.hit();
            self.inner.calculation_history(order_id).await
        }
    }

    #[async_trait]
    impl ReminderRepository for SpyStore {
        async fn create_reminder(&self, reminder: Reminder) -> Result<Reminder> {
            self.hit();
            self.inner.create_reminder(reminder).await
        }
        async fn list_reminders(&self) -> Result<Vec<Reminder>> {
            self.hit();
            self.inner.list_reminders().await
        }
        async fn reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
            self.hit();
            self.inner.reminders_for_task(task_id).await
        }
        async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
            self.hit();
            self.inner.due_reminders(now).await
        }
        async fn mark_sent(&self, id: i64) -> Result<()> {
            self.hit();
            self.inner.mark_sent(id).await
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Messenger for Outbox {
        async fn send(&self, handle: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((handle.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<SpyStore>,
        outbox: Arc<Outbox>,
        memory: Arc<ConversationMemory>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(SpyStore::default());
        let outbox = Arc::new(Outbox::default());
        let services = Arc::new(Services::new(store.clone(), outbox.clone(), clock.clone()));
        let memory = Arc::new(ConversationMemory::new(
            Arc::new(InMemoryCache::new(clock.clone())),
            clock,
        ));
        Fixture {
            store,
            outbox,
            memory: memory.clone(),
            dispatcher: Dispatcher::new(services, memory),
        }
    }

    fn person(id: i64, name: &str, role: Role) -> User {
        User {
            id,
            username: name.to_string(),
            email: format!("{}@example.com", name),
            phone_number: format!("0811{}", id),
            whatsapp_number: format!("62811{}", id),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn register(f: &Fixture, name: &str, role: Role) -> User {
        let user = person(0, name, role);
        let mut stored = f.store.inner.create_user(user).await.unwrap();
        stored.whatsapp_number = format!("62811{}", stored.id);
        f.store.inner.update_user(&stored).await.unwrap();
        stored
    }

    fn local(intent: Intent) -> Resolution {
        Resolution {
            kind: intent.kind(),
            intent: Ok(intent),
            source: ResolutionSource::Local,
            message: None,
        }
    }

    async fn set_rates(f: &Fixture, admin: &User) {
        for (kind, pct) in [(RateKind::Tax, 10.0), (RateKind::Marketing, 5.0), (RateKind::Rental, 5.0)] {
            let reply = f
                .dispatcher
                .dispatch(admin, local(Intent::SetRate { kind, percentage: pct }))
                .await;
            assert!(reply.starts_with(formatter::OK), "{}", reply);
        }
    }

    /// Well-formed parameters for every kind
    fn sample(kind: IntentKind) -> Intent {
        let item = NewItem {
            name: "widget".to_string(),
            description: String::new(),
            quantity: 2,
            unit_price: 50.0,
        };
        match kind {
            IntentKind::Help => Intent::Help,
            IntentKind::ClearHistory => Intent::ClearHistory,
            IntentKind::ShowHistory => Intent::ShowHistory,
            IntentKind::AddUser => Intent::AddUser {
                username: "new".to_string(),
                email: "new@example.com".to_string(),
                phone: "0812".to_string(),
                role: Role::Admin,
            },
            IntentKind::UpdateUser => Intent::UpdateUser {
                user: UserRef::Id(1),
                changes: vec![crate::intent::UserChange::Email("x@example.com".to_string())],
            },
            IntentKind::DeleteUser => Intent::DeleteUser { user: UserRef::Id(1) },
            IntentKind::SetRole => Intent::SetRole {
                user: UserRef::Id(1),
                role: Role::SuperAdmin,
            },
            IntentKind::ListUsers => Intent::ListUsers,
            IntentKind::CreateOrder => Intent::CreateOrder {
                customer: "John Doe".to_string(),
                total: 1_000_000.0,
                items: vec![item],
            },
            IntentKind::UpdateOrder => Intent::UpdateOrder {
                order_id: 1,
                changes: vec![crate::intent::OrderChange::TotalAmount(10.0)],
            },
            IntentKind::DeleteOrder => Intent::DeleteOrder { order_id: 1 },
            IntentKind::ViewOrders => Intent::ViewOrders,
            IntentKind::AddOrderItem => Intent::AddOrderItem { order_id: 1, item },
            IntentKind::ViewOrderItems => Intent::ViewOrderItems { order_id: 1 },
            IntentKind::UpdateItemStatus => Intent::UpdateItemStatus {
                item_id: 1,
                status: crate::models::ItemStatus::Completed,
            },
            IntentKind::AssignTask(task_type) => Intent::AssignTask {
                assignee: UserRef::Id(1),
                title: "stock count".to_string(),
                description: String::new(),
                task_type,
            },
            IntentKind::ViewTasks => Intent::ViewTasks { scope: TaskScope::All },
            IntentKind::ListTasks => Intent::ListTasks,
            IntentKind::UpdateProgress => Intent::UpdateProgress {
                task_id: 1,
                percentage: 50,
                notes: String::new(),
            },
            IntentKind::MarkComplete => Intent::MarkComplete { task_id: 1 },
            IntentKind::CreateReminder => Intent::CreateReminder {
                task_id: 1,
                reminder_type: "deadline".to_string(),
                scheduled_time: Utc::now(),
            },
            IntentKind::ViewReminders => Intent::ViewReminders,
            IntentKind::SetRate(kind) => Intent::SetRate { kind, percentage: 11.0 },
            IntentKind::MyReport => Intent::MyReport,
            IntentKind::ReportByDate => Intent::ReportByDate {
                start: Utc::now().date_naive(),
                end: Utc::now().date_naive(),
            },
            IntentKind::Report(period) => Intent::Report { period },
            IntentKind::CalculationHistory => Intent::CalculationHistory { order_id: 1 },
            IntentKind::ProgressReminder(cadence) => Intent::ProgressReminder { cadence },
            IntentKind::General => Intent::General {
                message: "hi".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_user_never_reaches_admin_operations() {
        let f = fixture();
        let user = person(5, "budi", Role::User);

        for kind in IntentKind::ALL {
            if gate::allowed(Role::User, kind) {
                continue;
            }
            let before = f.store.calls();

            let reply = f.dispatcher.dispatch(&user, local(sample(kind))).await;
            assert_eq!(reply, "❌ Insufficient permissions for this command", "{:?}", kind);

            // Unparseable parameters are still denied, not reported as usage errors
            let broken = Resolution {
                kind,
                intent: Err(BotError::invalid(format!("Usage: {}", kind.usage()))),
                source: ResolutionSource::Classifier,
                message: None,
            };
            let reply = f.dispatcher.dispatch(&user, broken).await;
            assert_eq!(reply, "❌ Insufficient permissions for this command", "{:?}", kind);

            assert_eq!(f.store.calls(), before, "{:?} touched the store", kind);
        }
        assert_eq!(f.store.calls(), 0);
    }

    #[tokio::test]
    async fn test_admin_cannot_manage_users() {
        let f = fixture();
        let admin = person(2, "ana", Role::Admin);
        let reply = f.dispatcher.dispatch(&admin, local(sample(IntentKind::AddUser))).await;
        assert!(reply.starts_with(formatter::FAIL));
        assert_eq!(f.store.calls(), 0);
    }

    /// Order-like text with a hanging classifier still needs an admin
    struct HangingModel;

    #[async_trait]
    impl IntentModel for HangingModel {
        async fn classify(&self, _prompt: &ClassifierPrompt) -> Result<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_classifier_timeout_fallback_is_still_gated() {
        let f = fixture();
        let resolver = IntentResolver::new(Arc::new(HangingModel), f.memory.clone(), Duration::from_millis(20));

        let user = register(&f, "budi", Role::User).await;
        let calls = f.store.calls();
        let resolution = resolver.resolve("buat order John Doe 1000000", &user).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback);
        assert_eq!(resolution.kind, IntentKind::CreateOrder);

        let reply = f.dispatcher.dispatch(&user, resolution).await;
        assert_eq!(reply, "❌ Insufficient permissions for this command");
        assert_eq!(f.store.calls(), calls);

        let admin = register(&f, "ana", Role::Admin).await;
        set_rates(&f, &admin).await;
        let resolution = resolver.resolve("buat order John Doe 1000000", &admin).await.unwrap();
        let reply = f.dispatcher.dispatch(&admin, resolution).await;
        assert!(reply.starts_with("✅ Order created successfully"), "{}", reply);
        assert!(reply.contains("Net Profit: 800000.00"), "{}", reply);
    }

    #[tokio::test]
    async fn test_parameter_errors_are_reported_after_gate() {
        let f = fixture();
        let admin = person(2, "ana", Role::Admin);
        let broken = Resolution {
            kind: IntentKind::DeleteOrder,
            intent: Err(BotError::invalid("Usage: /delete_order [order_id]")),
            source: ResolutionSource::Classifier,
            message: None,
        };
        let reply = f.dispatcher.dispatch(&admin, broken).await;
        assert_eq!(reply, "❌ Usage: /delete_order [order_id]");
    }

    #[tokio::test]
    async fn test_order_without_rates_names_the_rate() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::CreateOrder)))
            .await;
        assert!(reply.starts_with(formatter::FAIL));
        assert!(reply.contains("tax_rate"), "{}", reply);
        assert!(f.store.inner.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_flow_and_views() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let user = register(&f, "budi", Role::User).await;
        set_rates(&f, &admin).await;

        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::CreateOrder)))
            .await;
        assert!(reply.contains("Item: widget x2"), "{}", reply);
        let order = f.store.inner.list_orders().await.unwrap().remove(0);

        let reply = f
            .dispatcher
            .dispatch(&user, local(Intent::ViewOrderItems { order_id: order.id }))
            .await;
        assert!(reply.contains("Completion: 0.0%"), "{}", reply);

        // Users see only their own orders
        let reply = f.dispatcher.dispatch(&user, local(Intent::ViewOrders)).await;
        assert_eq!(reply, "✅ No orders found.");
        let reply = f.dispatcher.dispatch(&admin, local(Intent::ViewOrders)).await;
        assert!(reply.contains(&order.order_number));

        let reply = f
            .dispatcher
            .dispatch(
                &admin,
                local(Intent::UpdateOrder {
                    order_id: order.id,
                    changes: vec![crate::intent::OrderChange::TotalAmount(2000.0)],
                }),
            )
            .await;
        assert!(reply.contains("Net Profit: 1600.00"), "{}", reply);

        let reply = f
            .dispatcher
            .dispatch(&admin, local(Intent::CalculationHistory { order_id: order.id }))
            .await;
        assert!(reply.contains("all 2 rows verified"), "{}", reply);

        let reply = f
            .dispatcher
            .dispatch(&admin, local(Intent::Report { period: ReportPeriod::Overall }))
            .await;
        assert!(reply.contains("Total Orders: 1"), "{}", reply);
    }

    #[tokio::test]
    async fn test_order_and_items_are_one_write() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        set_rates(&f, &admin).await;

        // Three rate lookups, then a single write for order, history and items
        let before = f.store.calls();
        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::CreateOrder)))
            .await;
        assert!(reply.starts_with("✅ Order created successfully"), "{}", reply);
        assert_eq!(f.store.calls() - before, 4);

        f.store.fail_items.store(true, Ordering::SeqCst);
        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::CreateOrder)))
            .await;
        assert!(reply.starts_with(formatter::FAIL), "{}", reply);
        assert!(reply.contains("Something went wrong"), "{}", reply);

        let orders = f.store.inner.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(f.store.inner.items_for_order(orders[0].id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_item_to_missing_order() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::AddOrderItem)))
            .await;
        assert!(reply.starts_with(formatter::FAIL), "{}", reply);
        assert!(f.store.inner.items_for_order(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_assignment_and_progress() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let user = register(&f, "budi", Role::User).await;

        let reply = f
            .dispatcher
            .dispatch(
                &admin,
                local(Intent::AssignTask {
                    assignee: UserRef::Username("budi".to_string()),
                    title: "stock count".to_string(),
                    description: "weekly".to_string(),
                    task_type: TaskType::Daily,
                }),
            )
            .await;
        assert!(reply.starts_with("✅ Daily task"), "{}", reply);
        let task = f.store.inner.tasks_for_user(user.id).await.unwrap().remove(0);
        assert!(task.is_recurring);

        let reply = f
            .dispatcher
            .dispatch(
                &user,
                local(Intent::UpdateProgress {
                    task_id: task.id,
                    percentage: 40,
                    notes: "halfway".to_string(),
                }),
            )
            .await;
        assert_eq!(reply, "✅ Task progress updated to 40%");

        let reply = f
            .dispatcher
            .dispatch(&user, local(Intent::ProgressReminder { cadence: Cadence::Daily }))
            .await;
        assert!(reply.contains("40%"), "{}", reply);
        let sent = f.outbox.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(user.whatsapp_number.clone(), "📅 Daily Progress Reminder: 40% completed".to_string())]);

        let reply = f
            .dispatcher
            .dispatch(&user, local(Intent::MarkComplete { task_id: task.id }))
            .await;
        assert_eq!(reply, "✅ Task marked as implemented");
        assert_eq!(f.store.inner.progress_history(task.id).await.unwrap().len(), 2);

        let reply = f
            .dispatcher
            .dispatch(
                &admin,
                local(Intent::AssignTask {
                    assignee: UserRef::Username("ghost".to_string()),
                    title: "x".to_string(),
                    description: String::new(),
                    task_type: TaskType::Custom,
                }),
            )
            .await;
        assert_eq!(reply, "❌ user not found: ghost");
    }

    #[tokio::test]
    async fn test_full_progress_via_command_is_not_implemented() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let user = register(&f, "budi", Role::User).await;
        let task = f
            .store
            .inner
            .create_task(Task::new("invoice".to_string(), String::new(), user.id, admin.id))
            .await
            .unwrap();

        let reply = f
            .dispatcher
            .dispatch(
                &user,
                local(Intent::UpdateProgress {
                    task_id: task.id,
                    percentage: 100,
                    notes: "done".to_string(),
                }),
            )
            .await;
        assert_eq!(reply, "✅ Task progress updated to 100%");
        let stored = f.store.inner.get_task(task.id).await.unwrap();
        assert_eq!(stored.completion_percentage, 100);
        assert!(!stored.is_implemented);

        f.dispatcher
            .dispatch(&user, local(Intent::MarkComplete { task_id: task.id }))
            .await;
        assert!(f.store.inner.get_task(task.id).await.unwrap().is_implemented);
    }

    #[tokio::test]
    async fn test_report_by_date_is_scoped_for_users() {
        let f = fixture();
        let admin = register(&f, "ana", Role::Admin).await;
        let user = register(&f, "budi", Role::User).await;
        set_rates(&f, &admin).await;

        let reply = f
            .dispatcher
            .dispatch(&admin, local(sample(IntentKind::CreateOrder)))
            .await;
        assert!(reply.starts_with(formatter::OK), "{}", reply);

        let today = Utc::now().date_naive();
        let by_date = || local(Intent::ReportByDate { start: today, end: today });

        let reply = f.dispatcher.dispatch(&user, by_date()).await;
        assert!(reply.starts_with(formatter::OK), "{}", reply);
        assert!(reply.contains("no orders found"), "{}", reply);
        assert!(!reply.contains("Net Profit"), "{}", reply);

        let reply = f.dispatcher.dispatch(&admin, by_date()).await;
        assert!(reply.contains("Total Orders: 1"), "{}", reply);
        assert!(reply.contains("Net Profit: 800000.00"), "{}", reply);
    }

    #[tokio::test]
    async fn test_general_and_history() {
        let f = fixture();
        let user = register(&f, "budi", Role::User).await;

        let reply = f
            .dispatcher
            .dispatch(&user, local(Intent::General { message: String::new() }))
            .await;
        assert_eq!(reply, formatter::failure(GENERAL_REPLY));

        f.memory
            .append(user.id, crate::memory::TurnRole::User, "hello")
            .await
            .unwrap();
        let reply = f.dispatcher.dispatch(&user, local(Intent::ShowHistory)).await;
        assert!(reply.contains("You: hello"));

        f.dispatcher.dispatch(&user, local(Intent::ClearHistory)).await;
        tokio_test::assert_ok!(f.memory.read(user.id).await);
        assert!(f.memory.read(user.id).await.unwrap().is_empty());
    }
}
