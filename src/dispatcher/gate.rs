//! Role gate
//!
//! Decided from the intent kind alone, before parameters are validated and
//! before any repository is touched.

use crate::error::BotError;
use crate::intent::IntentKind;
use crate::models::Role;
use crate::Result;

/// Lowest role allowed to run an intent
pub fn required_role(kind: IntentKind) -> Role {
    match kind {
        IntentKind::Help
        | IntentKind::ClearHistory
        | IntentKind::ShowHistory
        | IntentKind::ViewTasks
        | IntentKind::UpdateProgress
        | IntentKind::MarkComplete
        | IntentKind::ViewOrders
        | IntentKind::ViewOrderItems
        | IntentKind::ViewReminders
        | IntentKind::MyReport
        | IntentKind::ReportByDate
        | IntentKind::ProgressReminder(_)
        | IntentKind::General => Role::User,

        IntentKind::ListUsers
        | IntentKind::CreateOrder
        | IntentKind::UpdateOrder
        | IntentKind::DeleteOrder
        | IntentKind::AddOrderItem
        | IntentKind::UpdateItemStatus
        | IntentKind::AssignTask(_)
        | IntentKind::ListTasks
        | IntentKind::CreateReminder
        | IntentKind::SetRate(_)
        | IntentKind::Report(_)
        | IntentKind::CalculationHistory => Role::Admin,

        IntentKind::AddUser | IntentKind::UpdateUser | IntentKind::DeleteUser | IntentKind::SetRole => {
            Role::SuperAdmin
        }
    }
}

pub fn allowed(role: Role, kind: IntentKind) -> bool {
    role >= required_role(kind)
}

pub fn check(role: Role, kind: IntentKind) -> Result<()> {
    if allowed(role, kind) {
        Ok(())
    } else {
        Err(BotError::PermissionDenied)
    }
}
