//! Periodic work: recurring task resets and the reminder sweep

use crate::clock::Clock;
use crate::intent::Cadence;
use crate::services::{Services, SweepReport};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub daily_reset: Option<usize>,
    pub monthly_reset: Option<usize>,
    pub sweep: Option<SweepReport>,
}

pub struct Scheduler {
    services: Arc<Services>,
    clock: Arc<dyn Clock>,
    day: NaiveDate,
    month: (i32, u32),
}

fn month_of(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

impl Scheduler {
    /// Periods start at construction time; no reset runs for the current day
    pub fn new(services: Arc<Services>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            services,
            clock,
            day: now.date_naive(),
            month: month_of(now),
        }
    }

    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if now.date_naive() != self.day {
            match self.services.tasks.reset_recurring(Cadence::Daily).await {
                Ok(n) => {
                    self.day = now.date_naive();
                    report.daily_reset = Some(n);
                }
                Err(e) => error!("Daily task reset failed: {}", e),
            }
        }

        if month_of(now) != self.month {
            match self.services.tasks.reset_recurring(Cadence::Monthly).await {
                Ok(n) => {
                    self.month = month_of(now);
                    report.monthly_reset = Some(n);
                }
                Err(e) => error!("Monthly task reset failed: {}", e),
            }
        }

        match self.services.reminders.sweep().await {
            Ok(sweep) => report.sweep = Some(sweep),
            Err(e) => error!("Reminder sweep failed: {}", e),
        }

        report
    }

    /// Ticks forever on a fixed interval
    pub async fn run(mut self, every: Duration) {
        info!("⏰ Scheduler started, interval {}s", every.as_secs());
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::messaging::ConsoleMessenger;
    use crate::models::{Role, TaskStatus, TaskType};
    use crate::state::{InMemoryStore, TaskRepository};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_resets_follow_period_boundaries() {
        let start = Utc.with_ymd_and_hms(2025, 10, 31, 22, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryStore::new());
        let services = Arc::new(Services::new(store.clone(), Arc::new(ConsoleMessenger::new()), clock.clone()));

        let user = services.users.add_user("budi", "", "0811", Role::User).await.unwrap();
        let daily = services
            .tasks
            .create_task(&user, "open shop", "", TaskType::Daily, user.id)
            .await
            .unwrap();
        let monthly = services
            .tasks
            .create_task(&user, "stock take", "", TaskType::Monthly, user.id)
            .await
            .unwrap();
        for task in [&daily, &monthly] {
            services.tasks.update_progress(task.id, 80, false, "", user.id).await.unwrap();
        }

        let mut scheduler = Scheduler::new(services.clone(), clock.clone());
        let report = scheduler.tick().await;
        assert_eq!(report.daily_reset, None);
        assert_eq!(report.monthly_reset, None);
        assert_eq!(report.sweep, Some(SweepReport::default()));

        clock.advance(chrono::Duration::hours(3));
        let report = scheduler.tick().await;
        assert_eq!(report.daily_reset, Some(1));
        assert_eq!(report.monthly_reset, Some(1));

        let task = store.get_task(daily.id).await.unwrap();
        assert_eq!(task.completion_percentage, 0);
        assert_eq!(task.status, TaskStatus::Pending);
        // update, then reset
        assert_eq!(store.progress_history(daily.id).await.unwrap().len(), 2);

        // Same day, nothing to reset
        clock.advance(chrono::Duration::hours(1));
        let report = scheduler.tick().await;
        assert_eq!(report.daily_reset, None);
    }
}
