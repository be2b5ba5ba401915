//! In-memory task repository.
//!
//! Keeps the collection in process memory behind an async `RwLock`. It
//! enforces the same count limit and record schema as the file-backed
//! repository, so handlers behave identically against either backing.
//! Suitable for tests and development; nothing survives a restart.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::repository::TaskRepository;
use super::store::{DEFAULT_MAX_TASKS, StoreError, StoreOperation};
use super::validator::validate_task_records;
use crate::domain::Task;

/// Address reported by [`InMemoryTaskRepository::locate`].
pub const IN_MEMORY_LOCATION: &str = "memory://tasks";

/// In-memory implementation of [`TaskRepository`].
#[derive(Debug, Clone)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<Vec<Task>>>,
    max_tasks: usize,
}

impl InMemoryTaskRepository {
    /// Creates an empty repository with the default task limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Creates a repository pre-populated with `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }

    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    fn check(&self, tasks: &[Task]) -> Result<(), StoreError> {
        if tasks.len() > self.max_tasks {
            return Err(StoreError::TooManyRecords {
                count: tasks.len(),
                max: self.max_tasks,
                operation: StoreOperation::Write,
            });
        }

        let records = tasks
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| StoreError::InvalidInput(error.to_string()))?;
        validate_task_records(&records)?;
        Ok(())
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn read_all(&self) -> BoxFuture<'_, Result<Vec<Task>, StoreError>> {
        async move { Ok(self.tasks.read().await.clone()) }.boxed()
    }

    fn persist(&self, tasks: Vec<Task>) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.check(&tasks)?;
            *self.tasks.write().await = tasks;
            Ok(())
        }
        .boxed()
    }

    fn locate(&self) -> String {
        IN_MEMORY_LOCATION.to_string()
    }
}
