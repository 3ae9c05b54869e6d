use chrono::NaiveDate;

use super::task::{Priority, Task};
use super::urgency::{Urgency, days_until};

/// Length of one focus sprint.
pub const SPRINT_MINUTES: u32 = 25;

/// Completed vs. total counts over a task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionStats {
    pub completed: usize,
    pub total: usize,
}

impl CompletionStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self {
            completed: tasks.iter().filter(|t| t.completed).count(),
            total: tasks.len(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.total - self.completed
    }

    /// Rounded percentage of completed tasks; an empty set is 0%.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Focus time, which only grows in whole sprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusTime {
    sprints: u32,
}

impl FocusTime {
    pub fn from_sprints(sprints: u32) -> Self {
        Self { sprints }
    }

    pub fn sprints(&self) -> u32 {
        self.sprints
    }

    pub fn minutes(&self) -> u32 {
        self.sprints * SPRINT_MINUTES
    }
}

/// Points earned from finished tasks and focus sprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub points: u32,
    pub level: u32,
}

impl Score {
    pub const POINTS_PER_TASK: u32 = 10;
    pub const POINTS_PER_SPRINT: u32 = 5;
    pub const POINTS_PER_LEVEL: u32 = 100;

    pub fn new(stats: &CompletionStats, focus: FocusTime) -> Self {
        let points = stats.completed as u32 * Self::POINTS_PER_TASK
            + focus.sprints() * Self::POINTS_PER_SPRINT;
        Self {
            points,
            level: points / Self::POINTS_PER_LEVEL,
        }
    }
}

/// Headline counts for the deadlines view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeadlineCounts {
    /// Incomplete and due within the next three days, today included.
    pub urgent: usize,
    /// Incomplete and due within the next seven days, today included.
    pub this_week: usize,
    pub completed: usize,
}

impl DeadlineCounts {
    pub fn from_tasks(tasks: &[Task], today: NaiveDate) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            if task.completed {
                counts.completed += 1;
                continue;
            }
            match days_until(task.due_date, today) {
                0..=3 => {
                    counts.urgent += 1;
                    counts.this_week += 1;
                }
                4..=7 => counts.this_week += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Incomplete tasks ordered by due date. Ties keep their input order.
pub fn upcoming(tasks: &[Task]) -> Vec<Task> {
    let mut pending: Vec<Task> = tasks.iter().filter(|t| !t.completed).cloned().collect();
    // sort_by_key is stable
    pending.sort_by_key(|t| t.due_date);
    pending
}

/// Dashboard data derived from the cached task list.
#[derive(Debug, Clone, Default)]
pub struct TaskOverview {
    pub stats: CompletionStats,
    pub deadlines: DeadlineCounts,
    pub overdue: Vec<Task>,
    pub due_today: Vec<Task>,
    pub due_soon: Vec<Task>,
    pub scheduled: Vec<Task>,
}

impl TaskOverview {
    pub fn build(tasks: &[Task], today: NaiveDate) -> Self {
        let mut overview = Self {
            stats: CompletionStats::from_tasks(tasks),
            deadlines: DeadlineCounts::from_tasks(tasks, today),
            ..Self::default()
        };

        for task in upcoming(tasks) {
            match Urgency::classify(task.due_date, today) {
                Urgency::Overdue => overview.overdue.push(task),
                Urgency::DueToday => overview.due_today.push(task),
                Urgency::DueSoon => overview.due_soon.push(task),
                Urgency::Scheduled => overview.scheduled.push(task),
            }
        }

        overview
    }

    pub fn bucket(&self, urgency: Urgency) -> &[Task] {
        match urgency {
            Urgency::Overdue => &self.overdue,
            Urgency::DueToday => &self.due_today,
            Urgency::DueSoon => &self.due_soon,
            Urgency::Scheduled => &self.scheduled,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.overdue.len() + self.due_today.len() + self.due_soon.len() + self.scheduled.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityFilter {
    #[default]
    All,
    Only(Priority),
}

impl PriorityFilter {
    pub fn matches(&self, priority: Priority) -> bool {
        match self {
            Self::All => true,
            Self::Only(p) => *p == priority,
        }
    }
}

/// Tasks, done or not, matching the priority filter whose title contains
/// `query`, ignoring case. An empty query matches everything.
pub fn matching(tasks: &[Task], filter: PriorityFilter, query: &str) -> Vec<Task> {
    let needle = query.trim().to_lowercase();
    tasks
        .iter()
        .filter(|t| filter.matches(t.priority))
        .filter(|t| needle.is_empty() || t.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Like [`matching`], restricted to incomplete tasks.
pub fn filter_active(tasks: &[Task], filter: PriorityFilter, query: &str) -> Vec<Task> {
    let mut active = matching(tasks, filter, query);
    active.retain(|t| !t.completed);
    active
}

/// Every task, incomplete ones first, each group in due-date order.
pub fn agenda(tasks: &[Task]) -> Vec<Task> {
    let mut all = upcoming(tasks);
    let mut done: Vec<Task> = tasks.iter().filter(|t| t.completed).cloned().collect();
    done.sort_by_key(|t| t.due_date);
    all.extend(done);
    all
}

/// Split into high, medium and low columns, preserving order within each.
pub fn group_by_priority(tasks: &[Task]) -> [(Priority, Vec<Task>); 3] {
    Priority::ALL.map(|p| {
        let column: Vec<Task> = tasks.iter().filter(|t| t.priority == p).cloned().collect();
        (p, column)
    })
}
