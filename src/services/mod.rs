//! Domain operations invoked by the dispatcher

pub mod orders;
pub mod reminders;
pub mod reports;
pub mod tasks;
pub mod users;

pub use orders::{CreatedOrder, OrderService};
pub use reminders::{ReminderService, SweepReport};
pub use reports::{FinancialReport, FinancialTotals, PersonalReport, ReportService};
pub use tasks::TaskService;
pub use users::UserService;

use crate::clock::Clock;
use crate::finance::FinancialEngine;
use crate::messaging::Messenger;
use crate::state::{FinancialRepository, Store};
use std::sync::Arc;

/// Every domain service over one backend
pub struct Services {
    pub users: UserService,
    pub tasks: TaskService,
    pub orders: OrderService,
    pub reminders: ReminderService,
    pub reports: ReportService,
    pub finance: Arc<FinancialEngine>,
}

impl Services {
    pub fn new<S>(store: Arc<S>, messenger: Arc<dyn Messenger>, clock: Arc<dyn Clock>) -> Self
    where
        S: Store + 'static,
    {
        let rates: Arc<dyn FinancialRepository> = store.clone();
        let store: Arc<dyn Store> = store;
        Self::with_rates(store, rates, messenger, clock)
    }

    /// Separate rate repository, e.g. to observe or intercept rate lookups
    pub fn with_rates(
        store: Arc<dyn Store>,
        rates: Arc<dyn FinancialRepository>,
        messenger: Arc<dyn Messenger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let finance = Arc::new(FinancialEngine::new(rates, clock.clone()));

        Self {
            users: UserService::new(store.clone(), clock.clone()),
            tasks: TaskService::new(store.clone(), clock.clone()),
            orders: OrderService::new(store.clone(), finance.clone(), clock.clone()),
            reminders: ReminderService::new(store.clone(), messenger, clock.clone()),
            reports: ReportService::new(store, clock),
            finance,
        }
    }
}
