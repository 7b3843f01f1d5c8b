//! Financial and personal reports

use crate::clock::Clock;
use crate::error::BotError;
use crate::intent::ReportPeriod;
use crate::models::{Order, TaskStatus, User};
use crate::state::Store;
use crate::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

/// Totals over a set of orders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialTotals {
    pub orders: usize,
    pub total_amount: f64,
    pub total_tax: f64,
    pub total_marketing: f64,
    pub total_rental: f64,
    pub net_profit: f64,
}

impl FinancialTotals {
    pub fn from_orders(orders: &[Order]) -> Self {
        orders.iter().fold(
            FinancialTotals::default(),
            |mut acc, order| {
                acc.orders += 1;
                acc.total_amount += order.total_amount;
                acc.total_tax += order.derived.tax_amount;
                acc.total_marketing += order.derived.marketing_cost;
                acc.total_rental += order.derived.rental_cost;
                acc.net_profit += order.derived.net_profit;
                acc
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinancialReport {
    pub title: String,
    pub totals: FinancialTotals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonalReport {
    pub username: String,
    pub orders: FinancialTotals,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_implemented: usize,
    /// Mean completion percentage across all assigned tasks
    pub average_progress: f64,
}

pub struct ReportService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn financial(&self, period: ReportPeriod) -> Result<FinancialReport> {
        let today = self.clock.now().date_naive();

        let (title, orders) = match period {
            ReportPeriod::Overall => ("Financial Report".to_string(), self.store.list_orders().await?),
            ReportPeriod::Daily => {
                let start = start_of(today);
                let orders = self.store.orders_in_range(start, start + Duration::days(1)).await?;
                (format!("Daily Report ({})", today), orders)
            }
            ReportPeriod::Monthly => {
                let first = today.with_day(1).unwrap_or(today);
                let next = first
                    .checked_add_months(chrono::Months::new(1))
                    .unwrap_or(first + Duration::days(31));
                let orders = self
                    .store
                    .orders_in_range(start_of(first), start_of(next))
                    .await?;
                (format!("Monthly Report ({})", first.format("%Y-%m")), orders)
            }
        };

        Ok(FinancialReport {
            title,
            totals: FinancialTotals::from_orders(&orders),
        })
    }

    /// Both bounds are inclusive days. Callers below Admin only see
    /// orders they created.
    pub async fn by_date(&self, start: NaiveDate, end: NaiveDate, caller: &User) -> Result<FinancialReport> {
        if start > end {
            return Err(BotError::invalid("Start date must not be after end date"));
        }

        let mut orders = self
            .store
            .orders_in_range(start_of(start), start_of(end) + Duration::days(1))
            .await?;
        if !caller.role.is_admin() {
            orders.retain(|o| o.created_by == caller.id);
        }

        Ok(FinancialReport {
            title: format!("Report for {} to {}", start, end),
            totals: FinancialTotals::from_orders(&orders),
        })
    }

    pub async fn personal(&self, user: &User) -> Result<PersonalReport> {
        let orders = self.store.orders_by_creator(user.id).await?;
        let tasks = self.store.tasks_for_user(user.id).await?;

        let average_progress = if tasks.is_empty() {
            0.0
        } else {
            tasks
                .iter()
                .map(|t| t.completion_percentage as f64)
                .sum::<f64>()
                / tasks.len() as f64
        };

        Ok(PersonalReport {
            username: user.username.clone(),
            orders: FinancialTotals::from_orders(&orders),
            tasks_total: tasks.len(),
            tasks_completed: tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count(),
            tasks_implemented: tasks.iter().filter(|t| t.is_implemented).count(),
            average_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::finance::{compute, RateSnapshot};
    use crate::models::{CalculationHistory, Role, Task};
    use crate::state::{InMemoryStore, OrderRepository, TaskRepository};

    fn at(day: &str, hour: u32) -> DateTime<Utc> {
        let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
    }

    async fn order_on(store: &InMemoryStore, number: &str, when: DateTime<Utc>, gross: f64, creator: i64) {
        let mut order = Order::new(number.to_string(), "C".to_string(), gross, creator);
        order.order_date = when;
        order.derived = compute(
            gross,
            &RateSnapshot { tax: 10.0, marketing: 5.0, rental: 5.0 },
            when,
        );
        let history = CalculationHistory {
            id: 0,
            order_id: 0,
            calculation_type: "net_profit".to_string(),
            input_value: gross,
            percentage_used: 20.0,
            calculated_amount: order.derived.net_profit,
            calculation_timestamp: when,
            checksum: String::new(),
        };
        store.create_order_with_history(order, history, Vec::new()).await.unwrap();
    }

    fn member(id: i64, role: Role) -> User {
        User {
            id,
            username: "budi".to_string(),
            email: String::new(),
            phone_number: String::new(),
            whatsapp_number: format!("62811{}", id),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    async fn fixture() -> (ReportService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        order_on(&store, "A", at("2025-10-01", 9), 1000.0, 1).await;
        order_on(&store, "B", at("2025-10-05", 23), 500.0, 2).await;
        order_on(&store, "C", at("2025-10-06", 0), 200.0, 2).await;
        order_on(&store, "D", at("2025-09-30", 12), 300.0, 2).await;

        let clock = Arc::new(ManualClock::new(at("2025-10-05", 15)));
        (ReportService::new(store.clone(), clock), store)
    }

    #[tokio::test]
    async fn test_overall_totals() {
        let (reports, _) = fixture().await;
        let report = reports.financial(ReportPeriod::Overall).await.unwrap();
        assert_eq!(report.totals.orders, 4);
        assert_eq!(report.totals.total_amount, 2000.0);
        assert_eq!(report.totals.total_tax, 200.0);
        assert_eq!(report.totals.net_profit, 1600.0);
    }

    #[tokio::test]
    async fn test_daily_and_monthly_windows() {
        let (reports, _) = fixture().await;
        let daily = reports.financial(ReportPeriod::Daily).await.unwrap();
        assert_eq!(daily.totals.orders, 1);
        assert_eq!(daily.totals.total_amount, 500.0);

        let monthly = reports.financial(ReportPeriod::Monthly).await.unwrap();
        assert_eq!(monthly.totals.orders, 3);
        assert_eq!(monthly.title, "Monthly Report (2025-10)");
    }

    #[tokio::test]
    async fn test_by_date_bounds_are_inclusive() {
        let (reports, _) = fixture().await;
        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 5).unwrap();

        let admin = member(1, Role::Admin);
        let report = reports.by_date(start, end, &admin).await.unwrap();
        assert_eq!(report.totals.orders, 2);
        assert!(reports.by_date(end, start, &admin).await.is_err());
    }

    #[tokio::test]
    async fn test_by_date_only_counts_own_orders_for_users() {
        let (reports, _) = fixture().await;
        let start = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 31).unwrap();

        let report = reports.by_date(start, end, &member(1, Role::User)).await.unwrap();
        assert_eq!(report.totals.orders, 1);
        assert_eq!(report.totals.total_amount, 1000.0);

        let report = reports.by_date(start, end, &member(3, Role::User)).await.unwrap();
        assert_eq!(report.totals, FinancialTotals::default());

        let report = reports.by_date(start, end, &member(3, Role::SuperAdmin)).await.unwrap();
        assert_eq!(report.totals.orders, 4);
    }

    #[tokio::test]
    async fn test_personal_report() {
        let (reports, store) = fixture().await;
        let mut done = Task::new("a".to_string(), String::new(), 2, 1);
        done.completion_percentage = 100;
        done.status = TaskStatus::Completed;
        store.create_task(done).await.unwrap();
        store
            .create_task(Task::new("b".to_string(), String::new(), 2, 1))
            .await
            .unwrap();

        let report = reports.personal(&member(2, Role::User)).await.unwrap();
        assert_eq!(report.orders.orders, 3);
        assert_eq!(report.tasks_total, 2);
        assert_eq!(report.tasks_completed, 1);
        assert_eq!(report.average_progress, 50.0);
    }
}
