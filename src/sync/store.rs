use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::task::{NewTask, Task, TaskId, TaskPatch, UserId};
use crate::error::StoreError;

/// Remote persistence for tasks, scoped per user.
///
/// Every call is a single round trip. Implementations do not retry.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All of the user's tasks, ordered by due date ascending.
    async fn list(&self, user: &UserId) -> Result<Vec<Task>, StoreError>;

    /// Insert a task and return the stored record with its assigned id.
    async fn create(&self, user: &UserId, task: &NewTask) -> Result<Task, StoreError>;

    /// Apply a partial update and return the refreshed record.
    ///
    /// When `expected_updated_at` is set, the update only applies if the
    /// stored `updated_at` still matches; otherwise [`StoreError::Conflict`].
    async fn update(
        &self,
        user: &UserId,
        id: TaskId,
        patch: &TaskPatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<Task, StoreError>;

    /// Remove a task. A missing id is [`StoreError::NotFound`].
    async fn delete(&self, user: &UserId, id: TaskId) -> Result<(), StoreError>;
}

/// A stored file reference ready to be attached to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
}

/// Out-of-band object storage for task attachments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(
        &self,
        user: &UserId,
        task: TaskId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, StoreError>;
}

/// Keep a file name safe for use as an object path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
