//! HTTP handlers for single tasks and service health.
//!
//! Every mutating handler runs one read-modify-write cycle over the whole
//! collection: read it from the repository, change it in memory with the
//! domain functions, and persist it back. The cycle holds
//! [`AppState::write_lock`], so two requests in this process never
//! interleave their cycles.
//!
//! Task lookups are scoped by [`CurrentUser`]: a task the caller may not
//! access answers exactly like a task that does not exist.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tokio::sync::Mutex;

use super::auth::CurrentUser;
use super::dto::{
    CreateTaskRequest, HealthResponse, UpdateTaskRequest, validate_create_request,
    validate_update_request,
};
use super::error::ApiErrorResponse;
use super::rate_limit::RateLimits;
use crate::domain::{Clock, IdSequence, SystemClock, Task, find_task_index};
use crate::infrastructure::{IdentityProvider, Repositories, TaskRepository};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Uses trait objects so the backing store, clock, and identity provider can
/// be chosen at startup.
#[derive(Clone)]
pub struct AppState {
    /// Task repository for persistence.
    pub task_repository: Arc<dyn TaskRepository>,
    /// Source of `createdAt` and `updatedAt` timestamps.
    pub clock: Arc<dyn Clock>,
    /// Token verifier; `None` disables authentication.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    /// Serializes read-modify-write cycles within this process and guards
    /// the id sequence used by `create_task`.
    pub write_lock: Arc<Mutex<IdSequence>>,
    /// Request limiters shared by every clone of the router.
    pub rate_limits: RateLimits,
}

impl AppState {
    /// Creates a new `AppState` from initialized repositories, with the
    /// system clock and authentication disabled.
    #[must_use]
    pub fn from_repositories(repositories: Repositories) -> Self {
        Self::new(repositories.task_repository)
    }

    #[must_use]
    pub fn new(task_repository: Arc<dyn TaskRepository>) -> Self {
        Self {
            task_repository,
            clock: Arc::new(SystemClock),
            identity_provider: None,
            write_lock: Arc::new(Mutex::new(IdSequence::default())),
            rate_limits: RateLimits::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_identity_provider(mut self, identity_provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        self.identity_provider = identity_provider;
        self
    }

    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("task_repository", &self.task_repository.locate())
            .field("authentication", &self.identity_provider.is_some())
            .finish_non_exhaustive()
    }
}

fn task_not_found(id: &str) -> ApiErrorResponse {
    ApiErrorResponse::not_found(format!("Task {id} not found"))
}

/// Position of the task addressed by `id`, if `current_user` may access it.
fn find_accessible_task(tasks: &[Task], id: &str, current_user: &CurrentUser) -> Result<usize, ApiErrorResponse> {
    find_task_index(tasks, id)
        .filter(|&index| current_user.can_access(&tasks[index]))
        .ok_or_else(|| task_not_found(id))
}

// =============================================================================
// GET /tasks/{id} Handler
// =============================================================================

/// Returns one task.
///
/// # Errors
///
/// - 404 if no task has the given id or it belongs to another user
/// - 500 if the task file cannot be read
pub async fn get_task(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiErrorResponse> {
    let mut tasks = state.task_repository.read_all().await?;

    let index = find_accessible_task(&tasks, &id, &current_user)?;
    Ok(Json(tasks.swap_remove(index)))
}

// =============================================================================
// POST /tasks Handler
// =============================================================================

/// Creates a new task.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Task title",
///   "description": "Optional description",
///   "completed": false
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the stored task, with its assigned id, `createdAt`,
///   and the caller's id as `userId` when authentication is enabled
/// - **400 Bad Request**: invalid body, or the collection is full
/// - **500 Internal Server Error**: the task file cannot be read or written
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the cases listed above.
pub async fn create_task(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiErrorResponse> {
    let Json(request) = payload?;
    let new_task = validate_create_request(request)?;

    let mut sequence = state.write_lock.lock().await;
    let mut tasks = state.task_repository.read_all().await?;

    // A failed persist leaves the id issued; it is skipped, never reused.
    let id = sequence.next(&tasks).ok_or_else(|| {
        tracing::error!("Task id space exhausted");
        ApiErrorResponse::internal_error("No task id available")
    })?;
    let task = Task::create(id, new_task, state.clock.now()).owned_by(current_user.owner_id());
    tasks.push(task.clone());

    state.task_repository.persist(tasks).await?;

    tracing::info!(task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

// =============================================================================
// PUT/PATCH /tasks/{id} Handler
// =============================================================================

/// Applies a partial update to a task and stamps `updatedAt`.
///
/// `PUT` and `PATCH` behave identically: absent fields are left unchanged.
///
/// # Errors
///
/// - 400 if the body is invalid or changes nothing
/// - 404 if no task has the given id or it belongs to another user
/// - 500 if the task file cannot be read or written
pub async fn update_task(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiErrorResponse> {
    let Json(request) = payload?;
    let changes = validate_update_request(request)?;

    let _guard = state.write_lock.lock().await;
    let mut tasks = state.task_repository.read_all().await?;

    let index = find_accessible_task(&tasks, &id, &current_user)?;
    tasks[index].apply(changes, state.clock.now());
    let updated = tasks[index].clone();

    state.task_repository.persist(tasks).await?;

    tracing::info!(task_id = %updated.id, "Task updated");
    Ok(Json(updated))
}

// =============================================================================
// DELETE /tasks/{id} Handler
// =============================================================================

/// Removes a task from the collection.
///
/// # Errors
///
/// - 404 if no task has the given id or it belongs to another user
/// - 500 if the task file cannot be read or written
pub async fn delete_task(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let _guard = state.write_lock.lock().await;
    let mut tasks = state.task_repository.read_all().await?;

    let index = find_accessible_task(&tasks, &id, &current_user)?;
    let removed = tasks.remove(index);

    state.task_repository.persist(tasks).await?;

    tracing::info!(task_id = %removed.id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check endpoint.
///
/// Never touches the task store and is never authenticated.
///
/// ```json
/// { "status": "OK", "timestamp": "2024-05-01T12:00:00.000Z" }
/// ```
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: state.clock.now(),
    })
}

// =============================================================================
// Fallback
// =============================================================================

/// Answers every unknown route.
pub async fn route_not_found() -> ApiErrorResponse {
    ApiErrorResponse::not_found("Route not found")
}

// =============================================================================
// Tests
// =============================================================================
