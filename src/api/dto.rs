//! Data Transfer Objects for API requests and responses.
//!
//! Request bodies are deserialized leniently (every field optional) and then
//! validated here, so a missing title is reported as a field error alongside
//! any other problem instead of as an unreadable body.

use serde::{Deserialize, Serialize};

use super::error::{FieldError, ValidationError};
use crate::domain::{NewTask, TaskChanges};

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 255;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

// =============================================================================
// Task DTOs
// =============================================================================

/// Request DTO for creating a new task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    /// Title of the task (required).
    #[serde(default)]
    pub title: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Initial completion state (defaults to `false`).
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Request DTO for updating a task. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Response DTO for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status, always `OK`.
    pub status: &'static str,
    /// Current server time (ISO-8601).
    pub timestamp: String,
}

/// Response DTO for `GET /admin/storage`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfoResponse {
    /// Address of the backing store.
    pub location: String,
    /// Number of tasks currently stored.
    pub task_count: usize,
}

// =============================================================================
// Validation
// =============================================================================

/// Validates a task title.
///
/// # Validation Rules
///
/// - Title must not be empty after trimming
/// - Title must not exceed 255 characters
///
/// # Errors
///
/// Returns a [`FieldError`] for `title` if a rule is violated.
pub fn validate_title(title: &str) -> Result<String, FieldError> {
    let title = title.trim();

    if title.is_empty() {
        return Err(FieldError::new("title", "Title is required"));
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(FieldError::new(
            "title",
            format!("Title must not exceed {MAX_TITLE_LENGTH} characters"),
        ));
    }

    Ok(title.to_string())
}

/// Validates a task description. Surrounding whitespace is trimmed.
///
/// # Errors
///
/// Returns a [`FieldError`] for `description` if it exceeds 5000 characters.
pub fn validate_description(description: &str) -> Result<String, FieldError> {
    let description = description.trim();

    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(FieldError::new(
            "description",
            format!("Description must not exceed {MAX_DESCRIPTION_LENGTH} characters"),
        ));
    }

    Ok(description.to_string())
}

/// Validates a create request, collecting every field error.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing each invalid field.
pub fn validate_create_request(request: CreateTaskRequest) -> Result<NewTask, ValidationError> {
    let title = validate_title(request.title.as_deref().unwrap_or_default());
    let description = validate_description(request.description.as_deref().unwrap_or_default());

    match (title, description) {
        (Ok(title), Ok(description)) => Ok(NewTask {
            title,
            description,
            completed: request.completed.unwrap_or(false),
        }),
        (title, description) => Err(ValidationError::new(
            [title.err(), description.err()].into_iter().flatten().collect(),
        )),
    }
}

/// Validates an update request, collecting every field error.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing each invalid field, or a single
/// error when the request would change nothing.
pub fn validate_update_request(request: UpdateTaskRequest) -> Result<TaskChanges, ValidationError> {
    let title = request.title.as_deref().map(validate_title).transpose();
    let description = request.description.as_deref().map(validate_description).transpose();

    let changes = match (title, description) {
        (Ok(title), Ok(description)) => TaskChanges {
            title,
            description,
            completed: request.completed,
        },
        (title, description) => {
            return Err(ValidationError::new(
                [title.err(), description.err()].into_iter().flatten().collect(),
            ));
        }
    };

    if changes.is_empty() {
        return Err(ValidationError::single(
            "body",
            "At least one of title, description or completed must be provided",
        ));
    }

    Ok(changes)
}

// =============================================================================
// Tests
// =============================================================================
