use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Store-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the signed-in user owning a set of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ValidationError::UnknownPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion percentage, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    pub const DONE: Progress = Progress(100);

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::ProgressOutOfRange(value))
        }
    }

    /// Clamp an arbitrary value into range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

// Rows written by other clients are not validated server-side, so decoding
// clamps instead of failing the whole listing.
impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(Self::clamped(raw.unwrap_or(0)))
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A task record as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub progress: Progress,
    pub due_date: NaiveDate,
    pub priority: Priority,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub subtasks: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub time_estimate: u32,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn subtasks(&self) -> &[String] {
        self.subtasks.as_deref().unwrap_or_default()
    }

    pub fn has_attachment(&self) -> bool {
        self.file_name.is_some()
    }

    /// Apply a patch locally, the way the store applies it remotely.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(ref category) = patch.category {
            self.category = category.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(ref subtasks) = patch.subtasks {
            self.subtasks = Some(subtasks.clone());
        }
        if let Some(minutes) = patch.time_estimate {
            self.time_estimate = minutes;
        }
        if let Some(ref name) = patch.file_name {
            self.file_name = Some(name.clone());
        }
        if let Some(ref url) = patch.file_url {
            self.file_url = Some(url.clone());
        }
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

/// Fields for a task that does not exist yet. The store assigns the id,
/// owner and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    title: String,
    progress: Progress,
    due_date: NaiveDate,
    priority: Priority,
    category: String,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtasks: Option<Vec<String>>,
    time_estimate: u32,
}

impl NewTask {
    /// Defaults match the dashboard's "add task" form: medium priority,
    /// `work` category, one hour estimate.
    pub fn new(title: impl Into<String>, due_date: NaiveDate) -> Result<Self, ValidationError> {
        let title = validate_title(title.into())?;
        Ok(Self {
            title,
            progress: Progress::default(),
            due_date,
            priority: Priority::Medium,
            category: "work".into(),
            completed: false,
            subtasks: None,
            time_estimate: 60,
        })
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Blank labels are dropped.
    pub fn subtasks<I, S>(mut self, subtasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = subtasks
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.trim().is_empty())
            .collect();
        self.subtasks = if labels.is_empty() { None } else { Some(labels) };
        self
    }

    pub fn time_estimate(mut self, minutes: u32) -> Self {
        self.time_estimate = minutes;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    /// Materialize as a stored record. Used by stores that assign ids locally.
    pub fn into_task(self, id: TaskId, user_id: UserId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            user_id,
            title: self.title,
            progress: self.progress,
            due_date: self.due_date,
            priority: self.priority,
            category: self.category,
            completed: self.completed,
            subtasks: self.subtasks,
            time_estimate: self.time_estimate,
            file_name: None,
            file_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial update. Only set fields are sent to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtasks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_estimate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Result<Self, ValidationError> {
        self.title = Some(validate_title(title.into())?);
        Ok(self)
    }

    pub fn progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn subtasks(mut self, subtasks: Vec<String>) -> Self {
        self.subtasks = Some(subtasks);
        self
    }

    pub fn time_estimate(mut self, minutes: u32) -> Self {
        self.time_estimate = Some(minutes);
        self
    }

    /// Attachment fields are only set through the upload path.
    pub(crate) fn attachment(mut self, file_name: String, file_url: String) -> Self {
        self.file_name = Some(file_name);
        self.file_url = Some(file_url);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_title(title: String) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_task_rejects_blank_title() {
        assert_eq!(
            NewTask::new("   ", date(2025, 1, 10)),
            Err(ValidationError::EmptyTitle)
        );
    }

    #[test]
    fn new_task_serializes_wire_shape() {
        let task = NewTask::new(" A ", date(2025, 1, 10))
            .unwrap()
            .priority(Priority::High)
            .time_estimate(30);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["title"], "A");
        assert_eq!(json["due_date"], "2025-01-10");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["time_estimate"], 30);
        assert!(json.get("subtasks").is_none());
    }

    #[test]
    fn blank_subtasks_are_dropped() {
        let task = NewTask::new("A", date(2025, 1, 10))
            .unwrap()
            .subtasks(["Outline", " ", "Draft"]);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["subtasks"], serde_json::json!(["Outline", "Draft"]));
    }

    #[test]
    fn progress_bounds() {
        assert_eq!(Progress::new(0).unwrap().value(), 0);
        assert_eq!(Progress::new(100).unwrap(), Progress::DONE);
        assert_eq!(Progress::new(150), Err(ValidationError::ProgressOutOfRange(150)));
        assert_eq!(Progress::new(-1), Err(ValidationError::ProgressOutOfRange(-1)));
    }

    #[test]
    fn priority_parse() {
        assert_eq!(Priority::parse("High").unwrap(), Priority::High);
        assert!(matches!(
            Priority::parse("urgent"),
            Err(ValidationError::UnknownPriority(_))
        ));
    }

    #[test]
    fn decode_store_row_with_nulls_and_bad_progress() {
        let row = serde_json::json!({
            "id": 7,
            "user_id": "demo-user@example.com",
            "title": "Write Blog Post",
            "progress": 150,
            "due_date": "2025-01-18",
            "priority": "medium",
            "category": "personal",
            "completed": false,
            "subtasks": null,
            "time_estimate": null,
            "file_name": null,
            "file_url": null,
            "created_at": "2025-01-01T10:00:00.123456+00:00",
            "updated_at": "2025-01-02T10:00:00+00:00"
        });
        let task: Task = serde_json::from_value(row).unwrap();
        assert_eq!(task.id, TaskId(7));
        assert_eq!(task.progress, Progress::DONE);
        assert_eq!(task.time_estimate, 0);
        assert!(task.subtasks().is_empty());
        assert!(!task.has_attachment());
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = TaskPatch::new().completed(true);
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({ "completed": true })
        );
        assert!(TaskPatch::new().is_empty());
        assert!(TaskPatch::new().title("").is_err());
    }

    #[test]
    fn apply_patch() {
        let mut task = NewTask::new("A", date(2025, 1, 10))
            .unwrap()
            .into_task(TaskId(1), UserId::new("u"), Utc::now());
        let patch = TaskPatch::new()
            .progress(Progress::new(40).unwrap())
            .priority(Priority::Low)
            .attachment("notes.pdf".into(), "https://x/notes.pdf".into());
        task.apply(&patch);
        assert_eq!(task.progress.value(), 40);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.file_name.as_deref(), Some("notes.pdf"));
        assert!(!task.completed);
    }
}
