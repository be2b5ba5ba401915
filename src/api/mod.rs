//! API module for HTTP handlers.
//!
//! This module contains route definitions, request/response handlers, and
//! the authentication and rate limiting middleware.

pub mod admin;
pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod query;
pub mod rate_limit;
pub mod routes;

pub use admin::storage_info;
pub use auth::{CurrentUser, bearer_token, require_admin, require_auth};
pub use dto::{CreateTaskRequest, HealthResponse, StorageInfoResponse, UpdateTaskRequest};
pub use error::{ApiError, ApiErrorResponse, ErrorDetails, FieldError, ValidationError};
pub use handlers::{AppState, create_task, delete_task, get_task, health_check, update_task};
pub use query::{ListTasksQuery, PaginatedResponse, SortField, SortOrder, list_tasks};
pub use rate_limit::{RateLimit, RateLimitConfig, RateLimitLayer, RateLimits, RequestLimiter};
pub use routes::build_router;
