use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::store::{Attachment, AttachmentStore, TaskStore, sanitize_file_name};
use crate::core::task::{NewTask, Priority, Progress, Task, TaskId, TaskPatch, UserId};
use crate::error::StoreError;

#[derive(Default)]
struct State {
    tasks: Vec<Task>,
    next_id: i64,
    last_write: Option<DateTime<Utc>>,
    offline: bool,
    calls: usize,
}

impl State {
    /// Strictly increasing write timestamps, so two writes in the same
    /// clock tick still differ.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_write {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_write = Some(next);
        next
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.calls += 1;
        if self.offline {
            return Err(StoreError::Network("store is offline".into()));
        }
        Ok(())
    }
}

/// Task store held in process memory. Backs tests and the `--demo` mode.
#[derive(Default)]
pub struct MemoryTaskStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to make in-flight windows observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed the four starter tasks a new dashboard shows.
    pub async fn with_sample_tasks(self, user: &UserId) -> Self {
        let samples = [
            ("Complete React Project", 75, (2025, 1, 15), Priority::High, "work",
             vec!["Setup project", "Build components", "Testing"], 180),
            ("Study for Finals", 45, (2025, 1, 20), Priority::High, "education",
             vec!["Review notes", "Practice problems"], 240),
            ("Write Blog Post", 20, (2025, 1, 18), Priority::Medium, "personal",
             vec!["Outline", "Draft", "Edit"], 120),
            ("Plan Weekend Trip", 90, (2025, 1, 12), Priority::Low, "personal",
             vec!["Book hotel", "Plan itinerary"], 60),
        ];

        {
            let mut state = self.state.lock().await;
            for (title, progress, (y, m, d), priority, category, subtasks, minutes) in samples {
                let Some(due) = NaiveDate::from_ymd_opt(y, m, d) else {
                    continue;
                };
                let Ok(new) = NewTask::new(title, due) else {
                    continue;
                };
                let new = new
                    .progress(Progress::clamped(progress))
                    .priority(priority)
                    .category(category)
                    .subtasks(subtasks)
                    .time_estimate(minutes);
                state.next_id += 1;
                let id = TaskId(state.next_id);
                let now = state.tick();
                state.tasks.push(new.into_task(id, user.clone(), now));
            }
        }
        self
    }

    /// Simulate losing connectivity: every call fails with a network error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Simulate a write by another client, advancing `updated_at`.
    pub async fn touch(&self, id: TaskId) -> bool {
        let mut state = self.state.lock().await;
        let now = state.tick();
        match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Number of store calls received so far, successful or not.
    pub async fn calls(&self) -> usize {
        self.state.lock().await.calls
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.begin()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| &t.user_id == user)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.due_date);
        Ok(tasks)
    }

    async fn create(&self, user: &UserId, task: &NewTask) -> Result<Task, StoreError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.begin()?;
        state.next_id += 1;
        let id = TaskId(state.next_id);
        let now = state.tick();
        let stored = task.clone().into_task(id, user.clone(), now);
        state.tasks.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        user: &UserId,
        id: TaskId,
        patch: &TaskPatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<Task, StoreError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.begin()?;
        let now = state.tick();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && &t.user_id == user)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(expected) = expected_updated_at {
            if task.updated_at != expected {
                return Err(StoreError::Conflict(id));
            }
        }
        task.apply(patch);
        task.updated_at = now;
        Ok(task.clone())
    }

    async fn delete(&self, user: &UserId, id: TaskId) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.begin()?;
        let pos = state
            .tasks
            .iter()
            .position(|t| t.id == id && &t.user_id == user)
            .ok_or(StoreError::NotFound(id))?;
        state.tasks.remove(pos);
        Ok(())
    }
}

/// Attachment store that keeps uploads in memory under `memory://` URLs.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .await
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn upload(
        &self,
        user: &UserId,
        task: TaskId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, StoreError> {
        let url = format!(
            "memory://{}/{}/{}",
            sanitize_file_name(user.as_str()),
            task,
            sanitize_file_name(file_name)
        );
        self.objects.lock().await.push((url.clone(), bytes));
        Ok(Attachment {
            file_name: file_name.to_string(),
            file_url: url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("demo-user@example.com")
    }

    #[tokio::test]
    async fn samples_are_listed_by_due_date() {
        let store = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let titles: Vec<String> = store
            .list(&user())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(
            titles,
            vec![
                "Plan Weekend Trip",
                "Complete React Project",
                "Write Blog Post",
                "Study for Finals"
            ]
        );
        assert!(store.list(&UserId::new("someone-else")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_is_scoped_to_owner() {
        let store = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let err = store
            .update(&UserId::new("intruder"), TaskId(1), &TaskPatch::new().completed(true), None)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(TaskId(1)));
    }

    #[tokio::test]
    async fn touch_advances_updated_at() {
        let store = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let before = store.list(&user()).await.unwrap()[0].clone();
        assert!(store.touch(before.id).await);
        let after = store.list(&user()).await.unwrap()[0].clone();
        assert!(after.updated_at > before.updated_at);
        assert!(!store.touch(TaskId(99)).await);
    }

    #[tokio::test]
    async fn offline_fails_with_retryable_error() {
        let store = MemoryTaskStore::new();
        store.set_offline(true).await;
        let err = store.list(&user()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.calls().await, 1);
    }

    #[tokio::test]
    async fn attachment_roundtrip() {
        let store = MemoryAttachmentStore::new();
        let att = store
            .upload(&user(), TaskId(2), "plan.txt", b"draft".to_vec())
            .await
            .unwrap();
        assert_eq!(att.file_name, "plan.txt");
        assert_eq!(store.object(&att.file_url).await, Some(b"draft".to_vec()));
    }
}
