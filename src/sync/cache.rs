use std::collections::HashMap;

use crate::core::task::{Task, TaskId};

/// Session-local mirror of the user's remote tasks.
///
/// Order is the order of the last full listing, with newly created tasks
/// appended. Only [`TaskSync`](super::TaskSync) writes to it.
///
/// Every committed write bumps a generation counter, so a listing fetched
/// before the write can be told apart from one fetched after it.
#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    tasks: Vec<Task>,
    generation: u64,
    /// Generation of the last local write to each id.
    written: HashMap<TaskId, u64>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    /// Replace the entry with the same id in place, or append.
    pub fn upsert(&mut self, task: Task) {
        self.mark(task.id);
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id == id)?;
        self.mark(id);
        Some(self.tasks.remove(pos))
    }

    /// Install a full listing that was requested at generation `since`.
    ///
    /// Rows for ids written locally after `since` are reconciled instead of
    /// taken blindly: the newer `updated_at` wins, a local delete stays
    /// deleted and a local create stays present.
    pub fn apply_listing(&mut self, listed: Vec<Task>, since: u64) {
        if self.generation == since {
            self.tasks = listed;
            self.written.clear();
            return;
        }

        let mut merged = Vec::with_capacity(listed.len());
        for row in listed {
            if !self.written_after(row.id, since) {
                merged.push(row);
                continue;
            }
            match self.get(row.id) {
                Some(local) if local.updated_at > row.updated_at => merged.push(local.clone()),
                Some(_) => merged.push(row),
                // deleted here after the listing was taken
                None => {}
            }
        }
        for local in &self.tasks {
            if self.written_after(local.id, since) && !merged.iter().any(|t| t.id == local.id) {
                merged.push(local.clone());
            }
        }

        self.tasks = merged;
        self.written.retain(|_, generation| *generation > since);
    }

    fn mark(&mut self, id: TaskId) {
        self.generation += 1;
        self.written.insert(id, self.generation);
    }

    fn written_after(&self, id: TaskId, since: u64) -> bool {
        self.written.get(&id).is_some_and(|generation| *generation > since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{NewTask, UserId};
    use chrono::{Duration, NaiveDate, Utc};

    fn task(id: i64, title: &str) -> Task {
        NewTask::new(title, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap())
            .unwrap()
            .into_task(TaskId(id), UserId::new("u"), Utc::now())
    }

    fn titles(cache: &TaskCache) -> Vec<&str> {
        cache.as_slice().iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut cache = TaskCache::new();
        cache.upsert(task(1, "a"));
        cache.upsert(task(2, "b"));
        cache.upsert(task(1, "a2"));
        let titles: Vec<&str> = cache.as_slice().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a2", "b"]);
    }

    #[test]
    fn remove_missing_is_none() {
        let mut cache = TaskCache::new();
        cache.upsert(task(1, "a"));
        assert!(cache.remove(TaskId(5)).is_none());
        assert_eq!(cache.remove(TaskId(1)).map(|t| t.id), Some(TaskId(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn listing_replaces_when_nothing_was_written() {
        let mut cache = TaskCache::new();
        cache.upsert(task(1, "a"));
        let since = cache.generation();
        cache.apply_listing(vec![task(2, "b"), task(3, "c")], since);
        assert_eq!(titles(&cache), vec!["b", "c"]);
        assert!(!cache.contains(TaskId(1)));
    }

    #[test]
    fn listing_keeps_newer_local_write() {
        let mut cache = TaskCache::new();
        let old = task(1, "old");
        cache.upsert(old.clone());
        let since = cache.generation();

        let mut newer = old.clone();
        newer.title = "new".into();
        newer.updated_at = old.updated_at + Duration::seconds(1);
        cache.upsert(newer);

        cache.apply_listing(vec![old, task(2, "b")], since);
        assert_eq!(titles(&cache), vec!["new", "b"]);
    }

    #[test]
    fn listing_respects_local_create_and_delete() {
        let mut cache = TaskCache::new();
        cache.upsert(task(1, "a"));
        cache.upsert(task(2, "b"));
        let since = cache.generation();

        cache.remove(TaskId(1));
        cache.upsert(task(9, "fresh"));
        cache.apply_listing(vec![task(1, "a"), task(2, "b")], since);
        assert_eq!(titles(&cache), vec!["b", "fresh"]);

        // a later listing that already reflects both writes replaces outright
        let since = cache.generation();
        cache.apply_listing(vec![task(2, "b")], since);
        assert_eq!(titles(&cache), vec!["b"]);
    }
}
