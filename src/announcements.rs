//! Teacher-authored announcements, one list per teacher.

use crate::error::AppError;
use crate::storage::{self, KeyValueStore};
use crate::tasks::{next_created_at, unique_stamp};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub const ANNOUNCEMENTS_KEY_PREFIX: &str = "announcementsApp.teacher.";

pub fn announcements_key(author: &str) -> String {
    format!("{}{}", ANNOUNCEMENTS_KEY_PREFIX, author)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Clone)]
pub struct AnnouncementStore {
    storage: Rc<dyn KeyValueStore>,
}

impl AnnouncementStore {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Newest first.
    pub fn list(&self, author: &str) -> Vec<Announcement> {
        storage::read_json_or_default(self.storage.as_ref(), &announcements_key(author))
    }

    fn save(&self, author: &str, items: &[Announcement]) -> Result<(), AppError> {
        storage::write_json(self.storage.as_ref(), &announcements_key(author), items)
    }

    /// Post a new announcement at the top of the author's list.
    ///
    /// Returns `Ok(None)` without writing when the trimmed title or content is empty.
    pub fn post(
        &self,
        author: &str,
        title: &str,
        content: &str,
        now: i64,
    ) -> Result<Option<Announcement>, AppError> {
        let (title, content) = (title.trim(), content.trim());
        if title.is_empty() || content.is_empty() {
            return Ok(None);
        }

        let mut items = self.list(author);
        let (created_at, id) = unique_stamp(
            next_created_at(items.iter().map(|a| a.created_at).max(), now),
            |id| items.iter().any(|a| a.id == id),
        );
        let announcement = Announcement {
            id,
            title: title.to_string(),
            content: content.to_string(),
            author: author.to_string(),
            created_at,
        };
        items.insert(0, announcement.clone());
        self.save(author, &items)?;
        tracing::debug!("{} posted announcement {}", author, announcement.id);
        Ok(Some(announcement))
    }

    pub fn delete(&self, author: &str, id: &str) -> Result<bool, AppError> {
        let mut items = self.list(author);
        let before = items.len();
        items.retain(|a| a.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(author, &items)?;
        Ok(true)
    }

    pub fn remove_all(&self, author: &str) -> Result<(), AppError> {
        storage::remove_key(self.storage.as_ref(), &announcements_key(author))
    }
}
