//! Task domain model.
//!
//! A [`Task`] is the only persisted entity. The collection of tasks is
//! always persisted as a whole; the functions in this module decide how a
//! collection changes (id assignment, creation, partial updates) before it
//! is handed back to the repository.

use serde::{Deserialize, Serialize};

// =============================================================================
// Value Objects
// =============================================================================

/// Identifier of a task.
///
/// Stored task files may carry integer or string ids. Newly created tasks
/// always receive an integer id (see [`next_task_id`]).
///
/// Ordering puts integer ids before string ids; integers compare numerically
/// and strings lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    /// Integer id, assigned by this service.
    Number(i64),
    /// String id, accepted from externally written files.
    Text(String),
}

impl TaskId {
    /// Returns `true` if this id is addressed by the given path segment.
    ///
    /// Integer ids match their decimal representation (`"007"` matches `7`),
    /// string ids match exactly.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Number(number) => raw.parse::<i64>().is_ok_and(|parsed| parsed == *number),
            Self::Text(text) => text == raw,
        }
    }

    /// Returns the integer value of the id, if it has one.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(formatter, "{number}"),
            Self::Text(text) => write!(formatter, "{text}"),
        }
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// =============================================================================
// Task
// =============================================================================

/// A task record as it is persisted in the task file.
///
/// Field names are serialized in camelCase (`createdAt`, `updatedAt`).
/// Timestamps are kept as the ISO-8601 strings found in the file so that
/// externally written records round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier within the collection.
    pub id: TaskId,
    /// Title of the task.
    pub title: String,
    /// Free-form description, empty when not provided.
    #[serde(default)]
    pub description: String,
    /// Whether the task is done.
    pub completed: bool,
    /// Creation timestamp, immutable after creation.
    pub created_at: String,
    /// Timestamp of the last mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Id of the user who created the task. Absent for tasks created while
    /// authentication is disabled and for externally written records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Validated input for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Validated partial update of a task. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl TaskChanges {
    /// Returns `true` if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }
}

impl Task {
    /// Creates a task from validated input.
    ///
    /// This is a pure function; the id and timestamp are supplied by the caller.
    #[must_use]
    pub fn create(id: TaskId, new_task: NewTask, created_at: impl Into<String>) -> Self {
        Self {
            id,
            title: new_task.title,
            description: new_task.description,
            completed: new_task.completed,
            created_at: created_at.into(),
            updated_at: None,
            user_id: None,
        }
    }

    /// Records `owner` as the creator of the task.
    #[must_use]
    pub fn owned_by(self, owner: Option<String>) -> Self {
        Self {
            user_id: owner,
            ..self
        }
    }

    /// Returns `true` if the task was created by `user_id`.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Applies a partial update and stamps `updated_at`.
    ///
    /// `id` and `created_at` never change.
    pub fn apply(&mut self, changes: TaskChanges, updated_at: impl Into<String>) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(completed) = changes.completed {
            self.completed = completed;
        }
        self.updated_at = Some(updated_at.into());
    }
}

// =============================================================================
// Collection Operations
// =============================================================================

/// Returns the id for the next task inserted into `tasks`.
///
/// The id is one greater than the largest integer id in the collection, or
/// `1` when there is none. String ids are ignored. Returns `None` when the
/// largest id is `i64::MAX` and no greater id exists.
#[must_use]
pub fn next_task_id(tasks: &[Task]) -> Option<TaskId> {
    tasks
        .iter()
        .filter_map(|task| task.id.as_number())
        .max()
        .map_or(Some(1), |max| max.checked_add(1))
        .map(TaskId::Number)
}

/// Issues task ids without reusing any id handed out earlier in the process.
///
/// [`next_task_id`] alone would hand out the id of a deleted maximum again.
/// The sequence remembers the highest id it has issued and never goes below
/// it. The task file holds no counter, so after a restart numbering resumes
/// from the largest stored id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdSequence {
    highest_issued: Option<i64>,
}

impl IdSequence {
    /// Returns the next id for `tasks` and records it as issued.
    ///
    /// Returns `None` when no integer id above both the collection and the
    /// issued ids exists.
    pub fn next(&mut self, tasks: &[Task]) -> Option<TaskId> {
        let from_collection = next_task_id(tasks)?.as_number()?;
        let id = match self.highest_issued {
            Some(highest) => from_collection.max(highest.checked_add(1)?),
            None => from_collection,
        };
        self.highest_issued = Some(id);
        Some(TaskId::Number(id))
    }

    /// Highest id issued so far.
    #[must_use]
    pub const fn highest_issued(&self) -> Option<i64> {
        self.highest_issued
    }
}

/// Returns the position of the task addressed by `raw_id`.
#[must_use]
pub fn find_task_index(tasks: &[Task], raw_id: &str) -> Option<usize> {
    tasks.iter().position(|task| task.id.matches(raw_id))
}

// =============================================================================
// Tests
// =============================================================================
