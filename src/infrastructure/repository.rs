//! Repository facade for the task collection.
//!
//! Handlers reach storage only through [`TaskRepository`]. The trait is
//! object-safe so the backing can be chosen at startup (see
//! [`RepositoryFactory`](super::RepositoryFactory)) without touching handler
//! code.

use futures::FutureExt;
use futures::future::BoxFuture;

use super::filesystem::{FileSystem, TokioFileSystem};
use super::store::{DurableStore, StoreConfig, StoreError};
use crate::domain::Task;

// =============================================================================
// Task Repository
// =============================================================================

/// Read and replace the whole task collection.
///
/// Implementations never apply business logic; they hand back exactly what
/// was persisted and persist exactly what they are given, or fail.
pub trait TaskRepository: Send + Sync {
    /// Returns the current collection.
    fn read_all(&self) -> BoxFuture<'_, Result<Vec<Task>, StoreError>>;

    /// Replaces the collection with `tasks`, all or nothing.
    fn persist(&self, tasks: Vec<Task>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Returns the address of the backing resource, for diagnostics.
    fn locate(&self) -> String;
}

// =============================================================================
// File Task Repository
// =============================================================================

/// [`TaskRepository`] backed by a [`DurableStore`].
#[derive(Debug)]
pub struct FileTaskRepository<F = TokioFileSystem> {
    store: DurableStore<F>,
}

impl FileTaskRepository<TokioFileSystem> {
    /// Creates a repository on the real file system.
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self::from_store(DurableStore::new(config))
    }
}

impl<F: FileSystem> FileTaskRepository<F> {
    #[must_use]
    pub const fn from_store(store: DurableStore<F>) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &DurableStore<F> {
        &self.store
    }
}

impl<F: FileSystem> TaskRepository for FileTaskRepository<F> {
    fn read_all(&self) -> BoxFuture<'_, Result<Vec<Task>, StoreError>> {
        self.store.load().boxed()
    }

    fn persist(&self, tasks: Vec<Task>) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { self.store.save(&tasks).await }.boxed()
    }

    fn locate(&self) -> String {
        self.store.locate().display().to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
