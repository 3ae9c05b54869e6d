pub mod cache;
pub mod coach;
pub mod keyring;
pub mod memory;
pub mod rest;
pub mod storage;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::core::task::{NewTask, Progress, Task, TaskId, TaskPatch, UserId};
use crate::error::{SyncError, ValidationError};
use cache::TaskCache;
use store::{AttachmentStore, TaskStore};

/// The single mutation surface for one user's tasks.
///
/// Every mutation goes to the remote store first. The local cache only
/// changes once the store has accepted the write, so a failed call leaves
/// it exactly as it was. Mutations on the same task id are serialized;
/// mutations on different ids run concurrently.
pub struct TaskSync<S, A> {
    user: UserId,
    store: S,
    attachments: A,
    cache: RwLock<TaskCache>,
    in_flight: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
    refreshing: Mutex<()>,
    reject_stale: bool,
}

impl<S: TaskStore, A: AttachmentStore> TaskSync<S, A> {
    pub fn new(user: UserId, store: S, attachments: A) -> Self {
        Self {
            user,
            store,
            attachments,
            cache: RwLock::new(TaskCache::new()),
            in_flight: Mutex::new(HashMap::new()),
            refreshing: Mutex::new(()),
            reject_stale: true,
        }
    }

    /// When enabled (the default), updates carry the cached `updated_at` and
    /// the store refuses them if another client wrote in between.
    pub fn reject_stale_writes(mut self, enabled: bool) -> Self {
        self.reject_stale = enabled;
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the cached tasks in cache order.
    pub async fn tasks(&self) -> Vec<Task> {
        self.cache.read().await.as_slice().to_vec()
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.cache.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Reload everything from the store.
    ///
    /// Writes this facade committed while the listing was in flight are not
    /// rolled back by it. Returns the number of cached tasks afterwards.
    pub async fn refresh_tasks(&self) -> Result<usize, SyncError> {
        let _refreshing = self.refreshing.lock().await;
        let since = self.cache.read().await.generation();
        let tasks = self.store.list(&self.user).await?;
        let listed = tasks.len();

        let mut cache = self.cache.write().await;
        if cache.generation() != since {
            log::debug!("Writes committed during refresh, reconciling listing");
        }
        cache.apply_listing(tasks, since);
        let count = cache.len();
        drop(cache);

        log::info!("Refreshed {} tasks for {} ({} listed)", count, self.user, listed);
        Ok(count)
    }

    pub async fn add_task(&self, task: NewTask) -> Result<Task, SyncError> {
        let created = self.store.create(&self.user, &task).await.inspect_err(|e| {
            log::warn!("Create '{}' failed: {}", task.title(), e);
        })?;
        self.cache.write().await.upsert(created.clone());
        log::info!("Created task {}: {}", created.id, created.title);
        Ok(created)
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, SyncError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        let _guard = self.lock_task(id).await;
        self.commit_patch(id, &patch).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), SyncError> {
        let guard = self.lock_task(id).await;
        let result = self.store.delete(&self.user, id).await;
        if let Err(ref e) = result {
            log::warn!("Delete {} failed: {}", id, e);
        }
        result?;
        self.cache.write().await.remove(id);
        drop(guard);
        log::info!("Deleted task {}", id);
        Ok(())
    }

    /// Flip `completed`. Progress is left alone.
    pub async fn toggle_complete(&self, id: TaskId) -> Result<Task, SyncError> {
        let _guard = self.lock_task(id).await;
        // Read under the lock so a toggle queued behind another mutation
        // sees the settled value.
        let current = self
            .cache
            .read()
            .await
            .get(id)
            .map(|t| t.completed)
            .ok_or(SyncError::NotCached(id))?;
        self.commit_patch(id, &TaskPatch::new().completed(!current)).await
    }

    /// Set progress. Values outside 0..=100 are rejected before any request.
    pub async fn update_progress(&self, id: TaskId, progress: i64) -> Result<Task, SyncError> {
        let progress = Progress::new(progress)?;
        let _guard = self.lock_task(id).await;
        self.commit_patch(id, &TaskPatch::new().progress(progress)).await
    }

    /// Upload a file to attachment storage, then record it on the task.
    ///
    /// The task must be cached; nothing is uploaded otherwise.
    pub async fn upload_file(
        &self,
        id: TaskId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Task, SyncError> {
        let _guard = self.lock_task(id).await;
        if !self.cache.read().await.contains(id) {
            return Err(SyncError::NotCached(id));
        }
        let attachment = self
            .attachments
            .upload(&self.user, id, file_name, bytes)
            .await
            .inspect_err(|e| log::warn!("Upload of {} for task {} failed: {}", file_name, id, e))?;
        let patch =
            TaskPatch::new().attachment(attachment.file_name, attachment.file_url.clone());
        self.commit_patch(id, &patch).await.inspect_err(|_| {
            log::warn!("Object {} is no longer referenced by task {}", attachment.file_url, id)
        })
    }

    /// Send a patch and fold the store's answer into the cache. Callers hold
    /// the per-id lock.
    async fn commit_patch(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        let expected = if self.reject_stale {
            self.cache.read().await.get(id).map(|t| t.updated_at)
        } else {
            None
        };
        let updated = self
            .store
            .update(&self.user, id, patch, expected)
            .await
            .inspect_err(|e| log::warn!("Update of task {} failed: {}", id, e))?;
        self.cache.write().await.upsert(updated.clone());
        log::debug!("Committed update to task {}", id);
        Ok(updated)
    }

    async fn lock_task(&self, id: TaskId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            // Slots are only cloned under this lock, so a count of one means
            // nobody holds or waits on it.
            in_flight.retain(|_, slot| Arc::strong_count(slot) > 1);
            in_flight.entry(id).or_default().clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Priority;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use super::memory::{MemoryAttachmentStore, MemoryTaskStore};
    use std::time::Duration;

    type MemorySync = TaskSync<MemoryTaskStore, MemoryAttachmentStore>;

    fn user() -> UserId {
        UserId::new("demo-user@example.com")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn empty() -> MemorySync {
        TaskSync::new(user(), MemoryTaskStore::new(), MemoryAttachmentStore::new())
    }

    async fn seeded() -> MemorySync {
        let store = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let sync = TaskSync::new(user(), store, MemoryAttachmentStore::new());
        sync.refresh_tasks().await.unwrap();
        sync
    }

    /// Takes its listing snapshot immediately but answers late.
    struct SlowListing {
        inner: MemoryTaskStore,
        delay: Duration,
    }

    #[async_trait]
    impl TaskStore for SlowListing {
        async fn list(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
            let tasks = self.inner.list(user).await?;
            tokio::time::sleep(self.delay).await;
            Ok(tasks)
        }

        async fn create(&self, user: &UserId, task: &NewTask) -> Result<Task, StoreError> {
            self.inner.create(user, task).await
        }

        async fn update(
            &self,
            user: &UserId,
            id: TaskId,
            patch: &TaskPatch,
            expected_updated_at: Option<DateTime<Utc>>,
        ) -> Result<Task, StoreError> {
            self.inner.update(user, id, patch, expected_updated_at).await
        }

        async fn delete(&self, user: &UserId, id: TaskId) -> Result<(), StoreError> {
            self.inner.delete(user, id).await
        }
    }

    async fn slow_listing() -> TaskSync<SlowListing, MemoryAttachmentStore> {
        let inner = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let store = SlowListing {
            inner,
            delay: Duration::from_millis(50),
        };
        let sync = TaskSync::new(user(), store, MemoryAttachmentStore::new());
        sync.refresh_tasks().await.unwrap();
        sync
    }

    fn task_a() -> NewTask {
        NewTask::new("A", date(2025, 1, 10))
            .unwrap()
            .progress(Progress::new(0).unwrap())
            .priority(Priority::High)
            .category("work")
            .completed(false)
            .time_estimate(30)
    }

    #[tokio::test]
    async fn add_task_appends_store_record() {
        let sync = empty();
        let created = sync.add_task(task_a()).await.unwrap();
        assert_eq!(created.id, TaskId(1));
        let tasks = sync.tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "A");
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[0].time_estimate, 30);
    }

    #[tokio::test]
    async fn each_add_grows_cache_by_one_with_unique_ids() {
        let sync = empty();
        for i in 0..5 {
            sync.add_task(task_a()).await.unwrap();
            assert_eq!(sync.len().await, i + 1);
        }
        let mut ids: Vec<TaskId> = sync.tasks().await.iter().map(|t| t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn toggle_twice_restores_state() {
        let sync = empty();
        let id = sync.add_task(task_a()).await.unwrap().id;
        assert!(sync.toggle_complete(id).await.unwrap().completed);
        assert!(sync.task(id).await.unwrap().completed);
        assert!(!sync.toggle_complete(id).await.unwrap().completed);
        assert!(!sync.task(id).await.unwrap().completed);
        assert_eq!(sync.task(id).await.unwrap().progress.value(), 0);
    }

    #[tokio::test]
    async fn concurrent_toggles_on_same_id_are_serialized() {
        let store = MemoryTaskStore::new()
            .with_latency(Duration::from_millis(20))
            .with_sample_tasks(&user())
            .await;
        let sync = TaskSync::new(user(), store, MemoryAttachmentStore::new());
        sync.refresh_tasks().await.unwrap();
        let id = TaskId(1);
        let original = sync.task(id).await.unwrap().completed;

        let (a, b) = tokio::join!(sync.toggle_complete(id), sync.toggle_complete(id));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(sync.task(id).await.unwrap().completed, original);
    }

    #[tokio::test]
    async fn distinct_ids_proceed_concurrently() {
        let sync = seeded().await;
        let results = futures::future::join_all(
            (1..=4).map(|i| sync.update_progress(TaskId(i), 100)),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(sync.tasks().await.iter().all(|t| t.progress == Progress::DONE));
    }

    #[tokio::test]
    async fn delete_missing_id_leaves_cache_unchanged() {
        let sync = seeded().await;
        let before = sync.tasks().await;
        let err = sync.delete_task(TaskId(42)).await.unwrap_err();
        assert_eq!(err, SyncError::Store(StoreError::NotFound(TaskId(42))));
        assert_eq!(sync.tasks().await, before);
    }

    #[tokio::test]
    async fn delete_removes_after_store_accepts() {
        let sync = seeded().await;
        sync.delete_task(TaskId(2)).await.unwrap();
        assert!(sync.task(TaskId(2)).await.is_none());
        assert_eq!(sync.len().await, 3);
        assert_eq!(sync.refresh_tasks().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn out_of_range_progress_is_rejected_locally() {
        let sync = seeded().await;
        let calls = sync.store().calls().await;
        let before = sync.tasks().await;
        let err = sync.update_progress(TaskId(1), 150).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Validation(ValidationError::ProgressOutOfRange(150))
        );
        assert_eq!(sync.store().calls().await, calls);
        assert_eq!(sync.tasks().await, before);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_unchanged() {
        let sync = seeded().await;
        let before = sync.tasks().await;
        sync.store().set_offline(true).await;

        let err = sync.toggle_complete(TaskId(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(ref e) if e.is_retryable()));
        assert!(sync.add_task(task_a()).await.is_err());
        assert!(sync.refresh_tasks().await.is_err());
        assert_eq!(sync.tasks().await, before);
    }

    #[tokio::test]
    async fn stale_write_is_rejected() {
        let sync = seeded().await;
        let before = sync.task(TaskId(3)).await.unwrap();
        sync.store().touch(TaskId(3)).await;

        let err = sync
            .update_task(TaskId(3), TaskPatch::new().category("blog"))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Store(StoreError::Conflict(TaskId(3))));
        assert_eq!(sync.task(TaskId(3)).await.unwrap(), before);

        sync.refresh_tasks().await.unwrap();
        let updated = sync
            .update_task(TaskId(3), TaskPatch::new().category("blog"))
            .await
            .unwrap();
        assert_eq!(updated.category, "blog");
        assert!(updated.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn stale_check_can_be_disabled() {
        let store = MemoryTaskStore::new().with_sample_tasks(&user()).await;
        let sync =
            TaskSync::new(user(), store, MemoryAttachmentStore::new()).reject_stale_writes(false);
        sync.refresh_tasks().await.unwrap();
        sync.store().touch(TaskId(3)).await;
        assert!(sync.update_progress(TaskId(3), 50).await.is_ok());
    }

    #[tokio::test]
    async fn toggle_requires_cached_task() {
        let sync = empty();
        assert_eq!(
            sync.toggle_complete(TaskId(7)).await.unwrap_err(),
            SyncError::NotCached(TaskId(7))
        );
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let sync = seeded().await;
        assert_eq!(
            sync.update_task(TaskId(1), TaskPatch::new()).await.unwrap_err(),
            SyncError::Validation(ValidationError::EmptyPatch)
        );
    }

    #[tokio::test]
    async fn refresh_keeps_equal_due_dates_in_store_order() {
        let sync = empty();
        let due = date(2025, 3, 1);
        for title in ["first", "second", "third"] {
            sync.add_task(NewTask::new(title, due).unwrap()).await.unwrap();
        }
        sync.add_task(NewTask::new("earlier", date(2025, 2, 1)).unwrap())
            .await
            .unwrap();
        sync.refresh_tasks().await.unwrap();
        let titles: Vec<String> = sync.tasks().await.into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["earlier", "first", "second", "third"]);
    }

    #[tokio::test]
    async fn upload_records_attachment() {
        let sync = seeded().await;
        let task = sync
            .upload_file(TaskId(1), "spec.pdf", b"%PDF".to_vec())
            .await
            .unwrap();
        assert_eq!(task.file_name.as_deref(), Some("spec.pdf"));
        let url = task.file_url.clone().unwrap();
        assert!(url.starts_with("memory://"));
        assert_eq!(sync.task(TaskId(1)).await.unwrap(), task);
    }

    #[tokio::test]
    async fn refresh_does_not_roll_back_own_write() {
        let sync = slow_listing().await;
        let (refreshed, written) = tokio::join!(sync.refresh_tasks(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sync.update_progress(TaskId(1), 10).await
        });
        refreshed.unwrap();
        written.unwrap();

        assert_eq!(sync.task(TaskId(1)).await.unwrap().progress.value(), 10);
        let next = sync.update_progress(TaskId(1), 20).await.unwrap();
        assert_eq!(next.progress.value(), 20);
    }

    #[tokio::test]
    async fn refresh_keeps_own_delete_and_create() {
        let sync = slow_listing().await;
        let (refreshed, created) = tokio::join!(sync.refresh_tasks(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sync.delete_task(TaskId(2)).await.unwrap();
            sync.add_task(task_a()).await
        });
        assert_eq!(refreshed.unwrap(), 4);
        let created = created.unwrap();
        assert!(sync.task(TaskId(2)).await.is_none());
        assert_eq!(sync.task(created.id).await, Some(created));
    }

    #[tokio::test]
    async fn upload_for_uncached_task_uploads_nothing() {
        let sync = seeded().await;
        let err = sync
            .upload_file(TaskId(42), "notes.txt", b"hi".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::NotCached(TaskId(42)));
        assert_eq!(sync.attachments.object_count().await, 0);
    }

    #[tokio::test]
    async fn idle_lock_slots_are_released() {
        let sync = seeded().await;
        for i in 1..=4 {
            sync.update_progress(TaskId(i), 50).await.unwrap();
        }
        assert_eq!(sync.in_flight.lock().await.len(), 1);

        sync.toggle_complete(TaskId(2)).await.unwrap();
        let in_flight = sync.in_flight.lock().await;
        assert!(in_flight.contains_key(&TaskId(2)));
        assert_eq!(in_flight.len(), 1);
    }
}
