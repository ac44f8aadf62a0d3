//! Session manager: who is logged in, with which role, and whose task list is
//! active.
//!
//! States: `Booting -> Unauthenticated -> Authenticated`. An authenticated
//! admin may additionally point the session at another user's task list
//! ("view as"); that target is cleared on login, signup, logout, and when the
//! viewed user is deleted.
//!
//! The only persisted piece of session state is the remembered username under
//! `todosApp.currentUser`, used to resume on the next boot.

use crate::announcements::{Announcement, AnnouncementStore};
use crate::error::AppError;
use crate::storage::{Committed, KeyValueStore};
use crate::tasks::{self, Filter, Task, TaskList, TaskStore};
use crate::users::{admin_count, Role, User, UserStore};
use std::rc::Rc;

pub const CURRENT_USER_KEY: &str = "todosApp.currentUser";

/// The authenticated user as seen by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub role: Option<Role>,
    pub is_admin: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Booting,
    Unauthenticated,
    Authenticated(Principal),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Undo the in-memory change and return the error when a write fails,
    /// instead of keeping the optimistic update.
    pub rollback_on_write_failure: bool,
}

/// One row of the admin user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user: User,
    pub is_current: bool,
    pub is_viewed: bool,
    /// The current user is the only admin; deleting them would be rejected.
    pub delete_disabled: bool,
}

pub struct Session {
    storage: Rc<dyn KeyValueStore>,
    users: UserStore,
    tasks_store: TaskStore,
    announcements: AnnouncementStore,
    options: SessionOptions,
    state: SessionState,
    viewing: Option<String>,
    tasks: TaskList,
    banner: Option<String>,
}

impl Session {
    pub fn new(storage: Rc<dyn KeyValueStore>, options: SessionOptions) -> Self {
        Self {
            users: UserStore::new(storage.clone()),
            tasks_store: TaskStore::new(storage.clone()),
            announcements: AnnouncementStore::new(storage.clone()),
            storage,
            options,
            state: SessionState::Booting,
            viewing: None,
            tasks: TaskList::new(),
            banner: None,
        }
    }

    /// Resume the remembered session, if its user still exists.
    ///
    /// Returns true when a session was resumed.
    pub fn boot(&mut self) -> bool {
        let remembered = match self.storage.get(CURRENT_USER_KEY) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("could not read remembered session: {}", e);
                None
            }
        };

        if let Some(username) = remembered {
            if let Some(user) = self.users.get(&username) {
                tracing::info!("resumed session for {}", username);
                self.enter(&user, false);
                return true;
            }
            tracing::info!("remembered user {} no longer exists", username);
            if let Err(e) = self.storage.remove(CURRENT_USER_KEY) {
                tracing::warn!("could not clear remembered session: {}", e);
            }
        }

        self.state = SessionState::Unauthenticated;
        false
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn principal(&self) -> Option<&Principal> {
        match &self.state {
            SessionState::Authenticated(p) => Some(p),
            _ => None,
        }
    }

    pub fn current_username(&self) -> Option<&str> {
        self.principal().map(|p| p.username.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.principal().is_some_and(|p| p.is_admin)
    }

    pub fn viewing(&self) -> Option<&str> {
        self.viewing.as_deref()
    }

    /// True when an admin is looking at someone else's list.
    pub fn is_impersonating(&self) -> bool {
        self.is_admin() && self.viewing.is_some() && self.viewing() != self.current_username()
    }

    /// Username whose task list reads and writes go to.
    pub fn active_username(&self) -> Option<&str> {
        match self.viewing.as_deref() {
            Some(target) if self.is_admin() => Some(target),
            _ => self.current_username(),
        }
    }

    /// Last user-visible storage problem, if any.
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    pub fn signup(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Principal, AppError> {
        let committed = self.users.signup(username, password, role)?;
        let user = self.settle(committed)?;
        self.enter(&user, true);
        Ok(Principal::from(&user))
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<Principal, AppError> {
        let user = self.users.login(username, password)?;
        self.enter(&user, true);
        Ok(Principal::from(&user))
    }

    pub fn logout(&mut self) {
        if let Some(username) = self.current_username() {
            tracing::info!("{} logged out", username);
        }
        self.state = SessionState::Unauthenticated;
        self.viewing = None;
        self.tasks = TaskList::new();
        self.banner = None;
        if let Err(e) = self.storage.remove(CURRENT_USER_KEY) {
            tracing::warn!("could not clear remembered session: {}", e);
        }
    }

    fn enter(&mut self, user: &User, remember: bool) {
        self.state = SessionState::Authenticated(Principal::from(user));
        self.viewing = None;
        if remember {
            if let Err(e) = self.storage.set(CURRENT_USER_KEY, &user.username) {
                tracing::warn!("could not remember session for {}: {}", user.username, e);
                self.banner =
                    Some(AppError::write_failed(CURRENT_USER_KEY, e).user_message());
            }
        }
        self.reload_tasks();
    }

    // ------------------------------------------------------------------
    // Admin: view-as and user management
    // ------------------------------------------------------------------

    /// Point an admin session at `username`'s task list. No-op for non-admins.
    ///
    /// Existence is not checked here; an unknown user simply has no tasks.
    pub fn select_user_to_view(&mut self, username: &str) -> bool {
        if !self.is_admin() {
            tracing::debug!("ignoring view-as request from non-admin session");
            return false;
        }
        self.viewing = Some(username.to_string());
        self.reload_tasks();
        true
    }

    pub fn view_own_todos(&mut self) {
        self.viewing = None;
        self.reload_tasks();
    }

    /// All users ordered by username. Admin only.
    pub fn list_users(&self) -> Result<Vec<UserRow>, AppError> {
        let me = self.require_admin()?;
        let table = self.users.load_all();
        let admins = admin_count(&table);
        Ok(table
            .into_values()
            .map(|user| {
                let is_current = user.username == me;
                UserRow {
                    is_viewed: self.viewing.as_deref() == Some(user.username.as_str()),
                    delete_disabled: is_current && user.is_admin && admins <= 1,
                    is_current,
                    user,
                }
            })
            .collect())
    }

    /// Delete a user. Deleting yourself ends the session.
    pub fn delete_user(&mut self, username: &str) -> Result<(), AppError> {
        let me = self.require_admin()?.to_string();
        let committed = self.users.delete_user(username, &me)?;
        // A failed cascade still leaves the user gone from the table
        let gone = self.users.get(username).is_none();
        let result = self.settle(committed).map(|_| ());
        if result.is_err() && !gone {
            return result;
        }

        if self.viewing.as_deref() == Some(username) {
            self.viewing = None;
            self.reload_tasks();
        }
        if me == username {
            self.logout();
        }
        result
    }

    fn require_admin(&self) -> Result<&str, AppError> {
        let principal = self.principal().ok_or(AppError::NotAuthenticated)?;
        if !principal.is_admin {
            return Err(AppError::Forbidden("admin only".to_string()));
        }
        Ok(&principal.username)
    }

    // ------------------------------------------------------------------
    // Tasks of the active user
    // ------------------------------------------------------------------

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn filtered_tasks(&self, filter: Filter) -> Vec<Task> {
        self.tasks.filtered(filter)
    }

    fn reload_tasks(&mut self) {
        self.tasks = match self.active_username() {
            Some(username) => self.tasks_store.load(username),
            None => TaskList::new(),
        };
    }

    fn mutate_tasks<F>(&mut self, op: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut TaskList) -> bool,
    {
        let active = self
            .active_username()
            .ok_or(AppError::NotAuthenticated)?
            .to_string();
        match self.tasks_store.update_from(&active, &self.tasks, op) {
            Some(committed) => {
                self.tasks = self.settle(committed)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn add_task(&mut self, text: &str) -> Result<bool, AppError> {
        let now = tasks::now_ms();
        self.mutate_tasks(|list| list.add(text, now).is_some())
    }

    pub fn toggle_task(&mut self, id: &str) -> Result<bool, AppError> {
        self.mutate_tasks(|list| list.toggle(id))
    }

    pub fn edit_task(&mut self, id: &str, new_text: &str) -> Result<bool, AppError> {
        self.mutate_tasks(|list| list.edit(id, new_text))
    }

    pub fn delete_task(&mut self, id: &str) -> Result<bool, AppError> {
        self.mutate_tasks(|list| list.delete(id))
    }

    pub fn clear_completed(&mut self) -> Result<bool, AppError> {
        self.mutate_tasks(|list| list.clear_completed() > 0)
    }

    // ------------------------------------------------------------------
    // Announcements (teachers only, always the teacher's own list)
    // ------------------------------------------------------------------

    fn require_teacher(&self) -> Result<&str, AppError> {
        let principal = self.principal().ok_or(AppError::NotAuthenticated)?;
        if principal.role != Some(Role::Teacher) {
            return Err(AppError::Forbidden("announcements are for teachers".to_string()));
        }
        Ok(&principal.username)
    }

    pub fn announcements(&self) -> Result<Vec<Announcement>, AppError> {
        let me = self.require_teacher()?;
        Ok(self.announcements.list(me))
    }

    pub fn post_announcement(
        &mut self,
        title: &str,
        content: &str,
    ) -> Result<Option<Announcement>, AppError> {
        let me = self.require_teacher()?.to_string();
        self.announcements
            .post(&me, title, content, tasks::now_ms())
            .inspect_err(|e| self.banner = Some(e.user_message()))
    }

    pub fn delete_announcement(&mut self, id: &str) -> Result<bool, AppError> {
        let me = self.require_teacher()?.to_string();
        self.announcements
            .delete(&me, id)
            .inspect_err(|e| self.banner = Some(e.user_message()))
    }

    /// Resolve a write-through result: on failure raise the banner, then either
    /// keep the optimistic value or give it up, per the options.
    fn settle<T>(&mut self, committed: Committed<T>) -> Result<T, AppError> {
        match committed.write {
            Ok(()) => Ok(committed.value),
            Err(e) => {
                self.banner = Some(e.user_message());
                if self.options.rollback_on_write_failure {
                    tracing::warn!("{}; discarding in-memory change", e);
                    Err(e)
                } else {
                    tracing::warn!("{}; keeping in-memory change", e);
                    Ok(committed.value)
                }
            }
        }
    }
}
