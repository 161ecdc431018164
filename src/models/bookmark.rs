use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A saved bookmark. The backend assigns `id`, `user_id` and `created_at`
/// at insertion; records are never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBookmark {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub url: String,
    pub user_id: String,
}

/// Pending values of the create-bookmark form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BookmarkForm {
    pub title: String,
    pub url: String,
}

impl BookmarkForm {
    /// Trimmed form values, or `None` if either field is empty after
    /// trimming. An empty form must never reach the storage backend.
    pub fn trimmed(&self) -> Option<(String, String)> {
        let title = self.title.trim();
        let url = self.url.trim();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some((title.to_string(), url.to_string()))
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }
}
