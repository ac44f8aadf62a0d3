//! User table: accounts, roles and the admin invariants.
//!
//! All users live in one JSON object under `todosApp.users`, keyed by username.
//! The store owns two invariants:
//! - usernames are unique (exact, case-sensitive match)
//! - once any user exists at least one of them is an admin; the first account
//!   ever created is the bootstrap admin, and the last admin cannot be deleted
//!
//! Passwords are stored and compared as plain text.

use crate::announcements::AnnouncementStore;
use crate::error::AppError;
use crate::storage::{self, Committed, KeyValueStore};
use crate::tasks::TaskStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const USERS_KEY: &str = "todosApp.users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teacher" | "t" => Some(Self::Teacher),
            "student" | "s" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "Teacher",
            Self::Student => "Student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Records written before roles existed have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// username -> record, ordered so the serialized table is stable.
pub type UserTable = BTreeMap<String, User>;

pub fn admin_count(table: &UserTable) -> usize {
    table.values().filter(|u| u.is_admin).count()
}

#[derive(Clone)]
pub struct UserStore {
    storage: Rc<dyn KeyValueStore>,
    tasks: TaskStore,
    announcements: AnnouncementStore,
}

impl UserStore {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self {
            tasks: TaskStore::new(storage.clone()),
            announcements: AnnouncementStore::new(storage.clone()),
            storage,
        }
    }

    /// Load the table; absent or corrupt data yields an empty table.
    pub fn load_all(&self) -> UserTable {
        storage::read_json_or_default(self.storage.as_ref(), USERS_KEY)
    }

    pub fn save_all(&self, table: &UserTable) -> Result<(), AppError> {
        storage::write_json(self.storage.as_ref(), USERS_KEY, table)
    }

    pub fn get(&self, username: &str) -> Option<User> {
        self.load_all().remove(username)
    }

    /// Create an account. The first account in an empty table becomes admin.
    ///
    /// A failed write still returns the new record in `Committed::value`.
    pub fn signup(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Committed<User>, AppError> {
        if username.is_empty() {
            return Err(AppError::MissingCredentials);
        }

        let mut table = self.load_all();
        if table.contains_key(username) {
            return Err(AppError::DuplicateUsername(username.to_string()));
        }

        let user = User {
            username: username.to_string(),
            password: password.to_string(),
            is_admin: table.is_empty(),
            role: Some(role),
        };
        table.insert(username.to_string(), user.clone());
        let write = self.save_all(&table);

        tracing::info!(
            "signed up {} as {}{}",
            username,
            role,
            if user.is_admin { " (bootstrap admin)" } else { "" }
        );
        Ok(Committed::new(user, write))
    }

    pub fn login(&self, username: &str, password: &str) -> Result<User, AppError> {
        let user = self
            .get(username)
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))?;
        if user.password != password {
            tracing::debug!("password mismatch for {}", username);
            return Err(AppError::InvalidPassword(username.to_string()));
        }
        Ok(user)
    }

    /// Delete `username` on behalf of the admin `requested_by`, removing the
    /// user's task list and announcements with it.
    ///
    /// Returns the removed record. The delete is rejected whole when the target
    /// is the only admin.
    pub fn delete_user(
        &self,
        username: &str,
        requested_by: &str,
    ) -> Result<Committed<User>, AppError> {
        let mut table = self.load_all();

        match table.get(requested_by) {
            Some(requester) if requester.is_admin => {}
            _ => {
                return Err(AppError::Forbidden(format!(
                    "{} may not delete users",
                    requested_by
                )))
            }
        }

        let target = table
            .get(username)
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))?;
        if target.is_admin && admin_count(&table) <= 1 {
            return Err(AppError::LastAdminProtected(username.to_string()));
        }

        let removed = table
            .remove(username)
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))?;
        let mut write = self.save_all(&table);
        for cascade in [
            self.tasks.remove(username),
            self.announcements.remove_all(username),
        ] {
            if write.is_ok() {
                write = cascade;
            }
        }

        tracing::info!("{} deleted user {}", requested_by, username);
        Ok(Committed::new(removed, write))
    }
}
