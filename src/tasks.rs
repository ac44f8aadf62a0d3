//! Per-user task lists.
//!
//! [`TaskList`] holds the list operations (add, toggle, edit, delete, clear
//! completed, filter). [`TaskStore`] persists one list per username under
//! `todosApp.todos.<username>` and writes every mutation through immediately.

use crate::error::AppError;
use crate::storage::{self, Committed, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub const TODOS_KEY_PREFIX: &str = "todosApp.todos.";

pub fn todos_key(username: &str) -> String {
    format!("{}{}", TODOS_KEY_PREFIX, username)
}

/// Millisecond wall-clock timestamp.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next creation timestamp: `now`, or one past the newest existing entry if
/// the clock has not moved beyond it.
pub(crate) fn next_created_at(latest: Option<i64>, now: i64) -> i64 {
    match latest {
        Some(latest) if latest >= now => latest.saturating_add(1),
        _ => now,
    }
}

/// Id for an entry created at `created_at`, moving the timestamp forward while
/// the id is already `taken`. Returns the final timestamp and id.
pub(crate) fn unique_stamp<F>(mut created_at: i64, taken: F) -> (i64, String)
where
    F: Fn(&str) -> bool,
{
    let mut id = created_at.to_string();
    let mut suffix = 0u32;
    while taken(&id) {
        match created_at.checked_add(1) {
            Some(next) => {
                created_at = next;
                id = created_at.to_string();
            }
            None => {
                suffix += 1;
                id = format!("{}-{}", created_at, suffix);
            }
        }
    }
    (created_at, id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: i64,
}

/// Which tasks a view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub const ALL: [Filter; 3] = [Filter::All, Filter::Active, Filter::Completed];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "active" | "open" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Active => "Active",
            Self::Completed => "Completed",
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

/// Tasks passing `status`, ascending by `created_at`.
pub fn filter(tasks: &[Task], status: Filter) -> Vec<Task> {
    let mut out: Vec<Task> = tasks.iter().filter(|t| status.matches(t)).cloned().collect();
    out.sort_by_key(|t| t.created_at);
    out
}

/// One user's tasks, in stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskList(Vec<Task>);

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.0.iter().find(|t| t.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.0.iter().filter(|t| t.completed).count()
    }

    pub fn active_count(&self) -> usize {
        self.len() - self.completed_count()
    }

    /// Append a task. Whitespace-only text is ignored.
    pub fn add(&mut self, text: &str, now: i64) -> Option<&Task> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let latest = self.0.iter().map(|t| t.created_at).max();
        let (created_at, id) =
            unique_stamp(next_created_at(latest, now), |id| self.get(id).is_some());
        self.0.push(Task {
            id,
            text: text.to_string(),
            completed: false,
            created_at,
        });
        self.0.last()
    }

    pub fn toggle(&mut self, id: &str) -> bool {
        match self.0.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.completed = !task.completed;
                true
            }
            None => false,
        }
    }

    /// Replace a task's text with the trimmed `new_text`. An empty edit keeps
    /// the original text and reports no change.
    pub fn edit(&mut self, id: &str, new_text: &str) -> bool {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return false;
        }
        match self.0.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.text = new_text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t.id != id);
        self.0.len() != before
    }

    /// Drop completed tasks, returning how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|t| !t.completed);
        before - self.0.len()
    }

    pub fn filtered(&self, status: Filter) -> Vec<Task> {
        filter(&self.0, status)
    }
}

/// Persisted task lists keyed by username.
#[derive(Clone)]
pub struct TaskStore {
    storage: Rc<dyn KeyValueStore>,
}

impl TaskStore {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Load a user's list; absent or corrupt data yields an empty list.
    pub fn load(&self, username: &str) -> TaskList {
        storage::read_json_or_default(self.storage.as_ref(), &todos_key(username))
    }

    pub fn save(&self, username: &str, tasks: &TaskList) -> Result<(), AppError> {
        storage::write_json(self.storage.as_ref(), &todos_key(username), tasks)
    }

    pub fn remove(&self, username: &str) -> Result<(), AppError> {
        storage::remove_key(self.storage.as_ref(), &todos_key(username))
    }

    /// Apply `op` to a copy of `current` and write the result through.
    ///
    /// Returns `None` when `op` reports no change; nothing is written then.
    pub fn update_from<F>(
        &self,
        username: &str,
        current: &TaskList,
        op: F,
    ) -> Option<Committed<TaskList>>
    where
        F: FnOnce(&mut TaskList) -> bool,
    {
        let mut next = current.clone();
        if !op(&mut next) {
            return None;
        }
        let write = self.save(username, &next);
        Some(Committed::new(next, write))
    }

    fn update<F>(&self, username: &str, op: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut TaskList) -> bool,
    {
        match self.update_from(username, &self.load(username), op) {
            Some(committed) => committed.write.map(|()| true),
            None => Ok(false),
        }
    }

    pub fn add(&self, username: &str, text: &str) -> Result<bool, AppError> {
        let now = now_ms();
        self.update(username, |list| list.add(text, now).is_some())
    }

    pub fn toggle(&self, username: &str, id: &str) -> Result<bool, AppError> {
        self.update(username, |list| list.toggle(id))
    }

    pub fn edit(&self, username: &str, id: &str, new_text: &str) -> Result<bool, AppError> {
        self.update(username, |list| list.edit(id, new_text))
    }

    pub fn delete(&self, username: &str, id: &str) -> Result<bool, AppError> {
        self.update(username, |list| list.delete(id))
    }

    pub fn clear_completed(&self, username: &str) -> Result<bool, AppError> {
        self.update(username, |list| list.clear_completed() > 0)
    }
}
