//! Task listing with filtering, sorting and pagination.
//!
//! The whole collection is read once per request; filtering, ordering and
//! slicing happen in memory in that order.

use std::cmp::Ordering;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};

use super::auth::CurrentUser;
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::Task;

// =============================================================================
// Pagination Constants
// =============================================================================

/// Maximum page size for list operations.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

// =============================================================================
// Query Parameters
// =============================================================================

/// Field the listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
}

/// Direction of the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Query parameters for `GET /tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListTasksQuery {
    /// Only tasks with this completion state.
    pub completed: Option<bool>,
    /// Case-insensitive substring matched against title and description.
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    /// Page number (default: 1, minimum: 1).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (default: 20, range: 1-100).
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for ListTasksQuery {
    fn default() -> Self {
        Self {
            completed: None,
            q: None,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: default_page(),
            limit: default_limit(),
        }
    }
}

const fn default_page() -> u32 {
    1
}

const fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Paginated response wrapper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    /// The data items for the current page.
    pub data: Vec<T>,
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub limit: u32,
    /// Total number of items matching the filters.
    pub total: usize,
    /// Total number of pages (0 if no items).
    pub total_pages: usize,
}

// =============================================================================
// GET /tasks Handler
// =============================================================================

/// Lists the tasks visible to the caller: all of them for admins and when
/// authentication is disabled, otherwise only the caller's own.
///
/// # Query Parameters
///
/// - `completed`: `true` | `false`
/// - `q`: search text
/// - `sort`: `id` (default) | `title` | `createdAt` | `updatedAt`
/// - `order`: `asc` (default) | `desc`
/// - `page`: 1-based page number (default: 1)
/// - `limit`: page size, clamped to 1..=100 (default: 20)
///
/// # Errors
///
/// - 400 if a query parameter cannot be parsed
/// - 500 if the task file cannot be read
pub async fn list_tasks(
    State(state): State<AppState>,
    current_user: CurrentUser,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<PaginatedResponse<Task>>, ApiErrorResponse> {
    let Query(query) = query?;
    let mut tasks = state.task_repository.read_all().await?;
    tasks.retain(|task| current_user.can_access(task));
    Ok(Json(list_page(tasks, &query)))
}

/// Filters, orders and slices `tasks` according to `query` (pure function).
#[must_use]
pub fn list_page(tasks: Vec<Task>, query: &ListTasksQuery) -> PaginatedResponse<Task> {
    let needle = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|needle| !needle.is_empty())
        .map(str::to_lowercase);

    let mut matching: Vec<Task> = tasks
        .into_iter()
        .filter(|task| query.completed.is_none_or(|completed| task.completed == completed))
        .filter(|task| needle.as_deref().is_none_or(|needle| matches_text(task, needle)))
        .collect();

    matching.sort_by(|left, right| {
        let ordering = compare_by(query.sort, left, right);
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let page = query.page.max(1);
    let total = matching.len();
    let page_size = limit as usize;
    let offset = (page as usize - 1).saturating_mul(page_size);

    PaginatedResponse {
        data: matching.into_iter().skip(offset).take(page_size).collect(),
        page,
        limit,
        total,
        total_pages: total.div_ceil(page_size),
    }
}

fn matches_text(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle) || task.description.to_lowercase().contains(needle)
}

fn compare_by(field: SortField, left: &Task, right: &Task) -> Ordering {
    match field {
        SortField::Id => left.id.cmp(&right.id),
        SortField::Title => left
            .title
            .to_lowercase()
            .cmp(&right.title.to_lowercase())
            .then_with(|| left.id.cmp(&right.id)),
        SortField::CreatedAt => left
            .created_at
            .cmp(&right.created_at)
            .then_with(|| left.id.cmp(&right.id)),
        SortField::UpdatedAt => left
            .updated_at
            .cmp(&right.updated_at)
            .then_with(|| left.id.cmp(&right.id)),
    }
}

// =============================================================================
// Tests
// =============================================================================
