//! Reminder scheduling and the delivery sweep

use crate::clock::Clock;
use crate::error::BotError;
use crate::intent::Cadence;
use crate::messaging::Messenger;
use crate::models::{Reminder, User};
use crate::state::Store;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one sweep over due reminders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    /// No deliverable handle; left unsent
    pub skipped: usize,
    /// Send or lookup failed; left unsent for the next sweep
    pub failed: usize,
}

pub struct ReminderService {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn Store>, messenger: Arc<dyn Messenger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            messenger,
            clock,
        }
    }

    pub async fn create_reminder(
        &self,
        task_id: i64,
        reminder_type: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Reminder> {
        if reminder_type.trim().is_empty() {
            return Err(BotError::invalid("Reminder type must not be empty"));
        }
        self.store.get_task(task_id).await?;

        let reminder = self
            .store
            .create_reminder(Reminder {
                id: 0,
                task_id,
                reminder_type: reminder_type.trim().to_string(),
                scheduled_time,
                whatsapp_sent: false,
                created_at: self.clock.now(),
            })
            .await?;

        info!(reminder_id = reminder.id, task_id, scheduled = %scheduled_time, "Reminder created");
        Ok(reminder)
    }

    /// Everything for admins, reminders on the caller's tasks otherwise
    pub async fn visible_reminders(&self, caller: &User) -> Result<Vec<Reminder>> {
        if caller.role.is_admin() {
            return self.store.list_reminders().await;
        }

        let mut reminders = Vec::new();
        for task in self.store.tasks_for_user(caller.id).await? {
            reminders.extend(self.store.reminders_for_task(task.id).await?);
        }
        reminders.sort_by_key(|r| (r.scheduled_time, r.id));
        Ok(reminders)
    }

    /// Assignee handle for a reminder's task, `None` when nobody can receive it
    async fn recipient(&self, reminder: &Reminder) -> Result<Option<(String, String)>> {
        let task = match self.store.get_task(reminder.task_id).await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let user = match self.store.get_user(task.assigned_to).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if !user.is_active || user.whatsapp_number.is_empty() {
            return Ok(None);
        }
        Ok(Some((user.whatsapp_number, task.title)))
    }

    /// Sends every due reminder once. Per-item failures are logged and the
    /// sweep continues; only delivered reminders are marked sent.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let due = self.store.due_reminders(self.clock.now()).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for reminder in due {
            let (handle, title) = match self.recipient(&reminder).await {
                Ok(Some(target)) => target,
                Ok(None) => {
                    debug!(reminder_id = reminder.id, "No deliverable contact, skipping reminder");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(reminder_id = reminder.id, "Failed to resolve reminder recipient: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let text = format!("🔔 Reminder: {}\nTask: {}", reminder.reminder_type, title);
            if let Err(e) = self.messenger.send(&handle, &text).await {
                warn!(reminder_id = reminder.id, handle = %handle, "Failed to send reminder: {}", e);
                report.failed += 1;
                continue;
            }

            match self.store.mark_sent(reminder.id).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(reminder_id = reminder.id, "Reminder sent but not marked: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                sent = report.sent,
                skipped = report.skipped,
                failed = report.failed,
                "Reminder sweep finished"
            );
        }
        Ok(report)
    }

    /// Pushes the caller's average progress for a cadence to their handle
    pub async fn send_progress_reminder(&self, user: &User, cadence: Cadence, progress: u8) -> Result<()> {
        let text = match cadence {
            Cadence::Daily => format!("📅 Daily Progress Reminder: {}% completed", progress),
            Cadence::Monthly => format!("📆 Monthly Progress Reminder: {}% completed", progress),
        };
        self.messenger.send(&user.whatsapp_number, &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Role, Task};
    use crate::state::{InMemoryStore, ReminderRepository, TaskRepository, UserRepository};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Records deliveries; fails for handles listed in `reject`
    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String)>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, handle: &str, text: &str) -> Result<()> {
            if self.reject.iter().any(|h| h == handle) {
                return Err(BotError::UpstreamUnavailable("provider down".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((handle.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn user(name: &str, handle: &str) -> User {
        User {
            id: 0,
            username: name.to_string(),
            email: String::new(),
            phone_number: handle.to_string(),
            whatsapp_number: handle.to_string(),
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        messenger: Arc<RecordingMessenger>,
        clock: Arc<ManualClock>,
        reminders: ReminderService,
    }

    fn fixture(reject: Vec<String>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let messenger = Arc::new(RecordingMessenger {
            sent: Mutex::new(Vec::new()),
            reject,
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reminders = ReminderService::new(store.clone(), messenger.clone(), clock.clone());
        Fixture {
            store,
            messenger,
            clock,
            reminders,
        }
    }

    async fn task_for(store: &InMemoryStore, name: &str, handle: &str) -> Task {
        let user = store.create_user(user(name, handle)).await.unwrap();
        store
            .create_task(Task::new(format!("{} task", name), String::new(), user.id, 1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reminder_requires_task() {
        let f = fixture(vec![]);
        let err = f
            .reminders
            .create_reminder(42, "deadline", Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_sweep_sends_due_reminders_once() {
        let f = fixture(vec![]);
        let task = task_for(&f.store, "budi", "62811").await;
        let now = f.clock.now();
        f.reminders.create_reminder(task.id, "deadline", now - Duration::minutes(1)).await.unwrap();
        f.reminders.create_reminder(task.id, "later", now + Duration::hours(1)).await.unwrap();

        let report = f.reminders.sweep().await.unwrap();
        assert_eq!(report, SweepReport { due: 1, sent: 1, skipped: 0, failed: 0 });

        let again = f.reminders.sweep().await.unwrap();
        assert_eq!(again.due, 0);

        f.clock.advance(Duration::hours(2));
        let later = f.reminders.sweep().await.unwrap();
        assert_eq!(later.sent, 1);

        let sent = f.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.contains("deadline"));
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        let f = fixture(vec!["62800".to_string()]);
        let failing = task_for(&f.store, "ana", "62800").await;
        let silent = task_for(&f.store, "cici", "").await;
        let working = task_for(&f.store, "budi", "62811").await;
        let past = f.clock.now() - Duration::minutes(5);
        for task in [&failing, &silent, &working] {
            f.reminders.create_reminder(task.id, "deadline", past).await.unwrap();
        }

        let report = f.reminders.sweep().await.unwrap();
        assert_eq!(report, SweepReport { due: 3, sent: 1, skipped: 1, failed: 1 });

        // Unsent reminders stay due
        let still_due = f.store.due_reminders(f.clock.now()).await.unwrap();
        assert_eq!(still_due.len(), 2);
    }
}
