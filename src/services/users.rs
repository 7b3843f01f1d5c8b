//! User management

use crate::clock::Clock;
use crate::error::BotError;
use crate::intent::{UserChange, UserRef};
use crate::messaging::normalize_handle;
use crate::models::{Role, User};
use crate::state::Store;
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub const BOOTSTRAP_USERNAME: &str = "admin";

pub struct UserService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn add_user(&self, username: &str, email: &str, phone: &str, role: Role) -> Result<User> {
        let username = username.trim().trim_start_matches('@');
        if username.is_empty() {
            return Err(BotError::invalid("Username must not be empty"));
        }
        if username.parse::<i64>().is_ok() {
            // Numeric tokens always resolve as ids
            return Err(BotError::invalid("Username must not be a number"));
        }
        let handle = normalize_handle(phone);
        if handle.is_empty() {
            return Err(BotError::invalid(format!("Invalid phone number '{}'", phone)));
        }

        let user = self
            .store
            .create_user(User {
                id: 0,
                username: username.to_string(),
                email: email.trim().to_string(),
                phone_number: phone.trim().to_string(),
                whatsapp_number: handle,
                role,
                is_active: true,
                created_at: self.clock.now(),
            })
            .await?;

        info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Numeric references are ids, anything else a username
    pub async fn resolve(&self, user: &UserRef, caller: &User) -> Result<User> {
        match user {
            UserRef::Caller => Ok(caller.clone()),
            UserRef::Id(id) => match self.store.get_user(*id).await {
                Err(e) if e.is_not_found() => Err(BotError::not_found(format!("user not found: {}", id))),
                other => other,
            },
            UserRef::Username(name) => self
                .store
                .find_user_by_username(name)
                .await?
                .ok_or_else(|| BotError::not_found(format!("user not found: {}", name))),
        }
    }

    pub async fn find_by_handle(&self, handle: &str) -> Result<Option<User>> {
        self.store.find_user_by_handle(&normalize_handle(handle)).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn update_user(&self, user: &UserRef, changes: &[UserChange], caller: &User) -> Result<User> {
        let mut target = self.resolve(user, caller).await?;

        for change in changes {
            match change {
                UserChange::Username(name) => target.username = name.clone(),
                UserChange::Email(email) => target.email = email.clone(),
                UserChange::Phone(phone) => {
                    let handle = normalize_handle(phone);
                    if handle.is_empty() {
                        return Err(BotError::invalid(format!("Invalid phone number '{}'", phone)));
                    }
                    target.phone_number = phone.clone();
                    target.whatsapp_number = handle;
                }
                UserChange::Role(role) => target.role = *role,
            }
        }

        self.store.update_user(&target).await?;
        info!(user_id = target.id, updated_by = caller.id, "User updated");
        Ok(target)
    }

    pub async fn set_role(&self, user: &UserRef, role: Role, caller: &User) -> Result<User> {
        self.update_user(user, &[UserChange::Role(role)], caller).await
    }

    pub async fn delete_user(&self, user: &UserRef, caller: &User) -> Result<User> {
        let target = self.resolve(user, caller).await?;
        if target.id == caller.id {
            return Err(BotError::invalid("You cannot delete your own account"));
        }

        self.store.delete_user(target.id).await?;
        info!(user_id = target.id, deleted_by = caller.id, "User deleted");
        Ok(target)
    }

    /// Registers `handle` as SuperAdmin when no users exist yet
    pub async fn bootstrap_admin(&self, handle: &str) -> Result<Option<User>> {
        if !self.store.list_users().await?.is_empty() {
            return Ok(None);
        }

        let admin = self
            .add_user(BOOTSTRAP_USERNAME, "", handle, Role::SuperAdmin)
            .await?;
        info!(handle = %admin.whatsapp_number, "Bootstrap SuperAdmin registered");
        Ok(Some(admin))
    }
}
