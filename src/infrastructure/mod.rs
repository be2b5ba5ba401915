//! Infrastructure module for persistence and external services.
//!
//! This module contains the durable task file, the repositories built on it,
//! runtime backend selection, and token verification.

pub mod factory;
pub mod filesystem;
pub mod identity;
pub mod in_memory;
pub mod repository;
pub mod store;
pub mod validator;

pub use factory::{
    ConfigurationError, FactoryError, Repositories, RepositoryConfig, RepositoryConfigBuilder,
    RepositoryFactory, StorageMode,
};
pub use filesystem::{FaultInjectingFileSystem, FaultPoint, FileSystem, TokioFileSystem};
pub use identity::{
    AuthConfig, AuthError, AuthMode, AuthenticatedUser, IdentityProvider, RemoteIdentityConfig,
    RemoteIdentityProvider, Role, StaticTokenIdentityProvider,
};
pub use in_memory::InMemoryTaskRepository;
pub use repository::{FileTaskRepository, TaskRepository};
pub use store::{
    DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TASKS, DurableStore, StoreConfig, StoreError,
    StoreErrorKind, StoreFormat, StoreOperation,
};
pub use validator::{SchemaError, SchemaErrorKind, validate_task_record, validate_task_records};
