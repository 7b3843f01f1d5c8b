//! Task operations: creation, progress tracking and recurring resets

use crate::clock::Clock;
use crate::error::BotError;
use crate::intent::{Cadence, TaskScope};
use crate::models::{ProgressUpdate, Task, TaskProgress, TaskType, User};
use crate::state::Store;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const COMPLETION_NOTE: &str = "Task completed";

/// `updated_by` recorded on progress rows written by the scheduler
pub const SYSTEM_ACTOR: i64 = 0;

pub struct TaskService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Daily and monthly tasks are always recurring, with the type as pattern
    pub async fn create_task(
        &self,
        assignee: &User,
        title: &str,
        description: &str,
        task_type: TaskType,
        created_by: i64,
    ) -> Result<Task> {
        if title.trim().is_empty() {
            return Err(BotError::invalid("Task title must not be empty"));
        }

        let mut task = Task::new(
            title.trim().to_string(),
            description.trim().to_string(),
            assignee.id,
            created_by,
        );
        task.task_type = task_type;
        task.created_at = self.clock.now();
        if matches!(task_type, TaskType::Daily | TaskType::Monthly) {
            task.is_recurring = true;
            task.recurring_pattern = Some(task_type.as_str().to_string());
        }

        let task = self.store.create_task(task).await?;
        info!(
            task_id = task.id,
            assigned_to = task.assigned_to,
            task_type = task.task_type.as_str(),
            "Task created"
        );
        Ok(task)
    }

    /// Live fields and one audit row, atomically
    pub async fn update_progress(
        &self,
        task_id: i64,
        percentage: u8,
        is_implemented: bool,
        notes: &str,
        updated_by: i64,
    ) -> Result<Task> {
        if percentage > 100 {
            return Err(BotError::invalid("Invalid progress percentage (0-100)"));
        }

        let task = self
            .store
            .apply_progress(ProgressUpdate {
                task_id,
                percentage,
                is_implemented,
                notes: notes.to_string(),
                updated_by,
                at: self.clock.now(),
            })
            .await?;

        info!(task_id, percentage, is_implemented, updated_by, "Task progress updated");
        Ok(task)
    }

    pub async fn mark_complete(&self, task_id: i64, updated_by: i64) -> Result<Task> {
        self.update_progress(task_id, 100, true, COMPLETION_NOTE, updated_by)
            .await
    }

    pub async fn tasks_for(&self, user_id: i64, scope: TaskScope) -> Result<Vec<Task>> {
        match scope {
            TaskScope::All => self.store.tasks_for_user(user_id).await,
            TaskScope::Daily => self.store.tasks_by_type(TaskType::Daily, Some(user_id)).await,
            TaskScope::Monthly => self.store.tasks_by_type(TaskType::Monthly, Some(user_id)).await,
        }
    }

    /// Everything for admins, own tasks otherwise
    pub async fn visible_tasks(&self, caller: &User) -> Result<Vec<Task>> {
        if caller.role.is_admin() {
            self.store.list_tasks().await
        } else {
            self.store.tasks_for_user(caller.id).await
        }
    }

    pub async fn progress_history(&self, task_id: i64) -> Result<Vec<TaskProgress>> {
        self.store.progress_history(task_id).await
    }

    /// Mean completion of the user's tasks for a cadence, 0 when none
    pub async fn average_progress(&self, user_id: i64, cadence: Cadence) -> Result<u8> {
        let tasks = self
            .store
            .tasks_by_type(cadence.task_type(), Some(user_id))
            .await?;
        if tasks.is_empty() {
            return Ok(0);
        }

        let sum: u32 = tasks.iter().map(|t| t.completion_percentage as u32).sum();
        Ok((sum as f64 / tasks.len() as f64).round() as u8)
    }

    /// Returns every recurring task of the cadence to 0%, not implemented.
    /// Each reset goes through the progress path so it is audited.
    pub async fn reset_recurring(&self, cadence: Cadence) -> Result<usize> {
        let tasks = self.store.tasks_by_type(cadence.task_type(), None).await?;
        let note = match cadence {
            Cadence::Daily => "Reset for new day",
            Cadence::Monthly => "Reset for new month",
        };

        let mut reset = 0;
        for task in tasks.iter().filter(|t| t.is_recurring) {
            match self
                .update_progress(task.id, 0, false, note, SYSTEM_ACTOR)
                .await
            {
                Ok(_) => reset += 1,
                Err(e) => warn!(task_id = task.id, "Failed to reset recurring task: {}", e),
            }
        }

        info!(cadence = ?cadence, reset, "Recurring tasks reset");
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Role, TaskStatus};
    use crate::state::InMemoryStore;
    use chrono::Utc;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: String::new(),
            phone_number: String::new(),
            whatsapp_number: format!("62800{}", id),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn service() -> TaskService {
        TaskService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    #[tokio::test]
    async fn test_recurring_variants_stamp_type() {
        let tasks = service();
        let budi = user(2, Role::User);

        let daily = tasks.create_task(&budi, "Open shop", "", TaskType::Daily, 1).await.unwrap();
        assert!(daily.is_recurring);
        assert_eq!(daily.recurring_pattern.as_deref(), Some("daily"));

        let monthly = tasks.create_task(&budi, "Inventory", "", TaskType::Monthly, 1).await.unwrap();
        assert_eq!(monthly.task_type, TaskType::Monthly);
        assert_eq!(monthly.recurring_pattern.as_deref(), Some("monthly"));

        let custom = tasks.create_task(&budi, "Fix door", "", TaskType::Custom, 1).await.unwrap();
        assert!(!custom.is_recurring);
        assert!(custom.recurring_pattern.is_none());
    }

    #[tokio::test]
    async fn test_each_progress_update_appends_one_row() {
        let tasks = service();
        let task = tasks
            .create_task(&user(2, Role::User), "Count", "", TaskType::Custom, 1)
            .await
            .unwrap();

        for _ in 0..4 {
            tasks.update_progress(task.id, 50, false, "same", 2).await.unwrap();
        }

        let history = tasks.progress_history(task.id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.iter().all(|p| p.completion_percentage == 50));
    }

    #[tokio::test]
    async fn test_full_progress_does_not_imply_implemented() {
        let tasks = service();
        let task = tasks
            .create_task(&user(2, Role::User), "Count", "", TaskType::Custom, 1)
            .await
            .unwrap();

        let updated = tasks.update_progress(task.id, 100, false, "", 2).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert!(updated.completed_at.is_some());
        assert!(!updated.is_implemented);

        let done = tasks.mark_complete(task.id, 2).await.unwrap();
        assert!(done.is_implemented);
        assert_eq!(done.implementation_notes, COMPLETION_NOTE);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let tasks = service();
        let err = tasks.update_progress(404, 10, false, "", 2).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(tasks.progress_history(404).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_recurring_is_audited() {
        let tasks = service();
        let budi = user(2, Role::User);
        let daily = tasks.create_task(&budi, "Open shop", "", TaskType::Daily, 1).await.unwrap();
        let monthly = tasks.create_task(&budi, "Inventory", "", TaskType::Monthly, 1).await.unwrap();
        tasks.mark_complete(daily.id, 2).await.unwrap();
        tasks.update_progress(monthly.id, 60, false, "", 2).await.unwrap();

        assert_eq!(tasks.reset_recurring(Cadence::Daily).await.unwrap(), 1);

        let daily_now = tasks.tasks_for(2, TaskScope::Daily).await.unwrap();
        assert_eq!(daily_now[0].completion_percentage, 0);
        assert!(!daily_now[0].is_implemented);
        assert_eq!(daily_now[0].status, TaskStatus::Pending);
        assert_eq!(tasks.progress_history(daily.id).await.unwrap().len(), 2);

        // Monthly task untouched
        assert_eq!(tasks.average_progress(2, Cadence::Monthly).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_visible_tasks_by_role() {
        let tasks = service();
        tasks.create_task(&user(2, Role::User), "A", "", TaskType::Custom, 1).await.unwrap();
        tasks.create_task(&user(3, Role::User), "B", "", TaskType::Custom, 1).await.unwrap();

        assert_eq!(tasks.visible_tasks(&user(2, Role::User)).await.unwrap().len(), 1);
        assert_eq!(tasks.visible_tasks(&user(1, Role::Admin)).await.unwrap().len(), 2);
    }
}
