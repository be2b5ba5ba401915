//! Repository factory for runtime backend selection.
//!
//! This module builds the task repository from environment configuration. It
//! supports switching between the file-backed store and an in-memory
//! collection at startup.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `file` (default) | `in_memory`
//! - `TASKS_FILE`: path of the task file (default: `tasks.json`)
//! - `MAX_TASKS`: maximum number of tasks (default: `1000`)
//! - `MAX_FILE_SIZE`: maximum task file size in bytes (default: `10485760`)
//! - `TASKS_FILE_FORMAT`: `pretty` (default) | `compact`
//!
//! # Example
//!
//! ```ignore
//! use infrastructure::factory::{RepositoryConfig, RepositoryFactory};
//!
//! let config = RepositoryConfig::from_env()?;
//! let repositories = RepositoryFactory::new(config).create().await?;
//! let tasks = repositories.task_repository.read_all().await?;
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use super::{
    DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TASKS, FileTaskRepository, InMemoryTaskRepository,
    StoreConfig, StoreError, StoreFormat, TaskRepository,
};

/// Default path of the task file.
pub const DEFAULT_TASKS_FILE: &str = "tasks.json";

// =============================================================================
// Environment Lookup
// =============================================================================

/// Reads a variable, treating empty and whitespace-only values as unset.
pub(crate) fn read_variable<L>(lookup: &L, name: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads and parses a numeric variable, falling back to `default` when unset.
pub(crate) fn read_number<L, N>(lookup: &L, name: &'static str, default: N) -> Result<N, ConfigurationError>
where
    L: Fn(&str) -> Option<String>,
    N: FromStr,
{
    read_variable(lookup, name).map_or(Ok(default), |value| {
        value
            .parse()
            .map_err(|_| ConfigurationError::InvalidNumber { variable: name, value })
    })
}

/// Looks a variable up in the process environment.
pub(crate) fn process_environment(name: &str) -> Option<String> {
    env::var(name).ok()
}

// =============================================================================
// Configuration Types
// =============================================================================

/// Backing used for the task collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// JSON file rewritten atomically on every change.
    #[default]
    File,
    /// In-memory collection; nothing survives a restart.
    /// Suitable for testing and development.
    InMemory,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    /// Parses a storage mode from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidStorageMode` if the string is not recognized.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Configuration for the repository factory.
///
/// Use [`RepositoryConfigBuilder`] for a fluent API to construct this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Backing used for the task collection.
    pub storage_mode: StorageMode,
    /// Location and limits of the task file.
    pub store: StoreConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            store: StoreConfig::new(DEFAULT_TASKS_FILE),
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(process_environment)
    }

    /// Creates a configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if:
    /// - `STORAGE_MODE` or `TASKS_FILE_FORMAT` contains an invalid value
    /// - `MAX_TASKS` or `MAX_FILE_SIZE` is not a number, or is zero
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigurationError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let storage_mode = read_variable(&lookup, "STORAGE_MODE")
            .map_or(Ok(StorageMode::default()), |value| value.parse::<StorageMode>())?;

        let format = read_variable(&lookup, "TASKS_FILE_FORMAT").map_or(
            Ok(StoreFormat::default()),
            |value| value.parse::<StoreFormat>().map_err(ConfigurationError::InvalidFileFormat),
        )?;

        let path = read_variable(&lookup, "TASKS_FILE").unwrap_or_else(|| DEFAULT_TASKS_FILE.to_string());

        let store = StoreConfig::new(path)
            .with_max_tasks(read_number(&lookup, "MAX_TASKS", DEFAULT_MAX_TASKS)?)
            .with_max_file_size(read_number(&lookup, "MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?)
            .with_format(format);

        let config = Self {
            storage_mode,
            store,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::ZeroLimit` if a limit is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.store.max_tasks == 0 {
            return Err(ConfigurationError::ZeroLimit("MAX_TASKS"));
        }

        if self.store.max_file_size == 0 {
            return Err(ConfigurationError::ZeroLimit("MAX_FILE_SIZE"));
        }

        Ok(())
    }
}

/// Builder for `RepositoryConfig`.
///
/// # Example
///
/// ```ignore
/// let config = RepositoryConfig::builder()
///     .storage_mode(StorageMode::File)
///     .tasks_file("/var/lib/tasks/tasks.json")
///     .max_tasks(500)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryConfigBuilder {
    storage_mode: StorageMode,
    store: StoreConfig,
}

impl Default for RepositoryConfigBuilder {
    fn default() -> Self {
        let RepositoryConfig {
            storage_mode,
            store,
        } = RepositoryConfig::default();
        Self {
            storage_mode,
            store,
        }
    }
}

impl RepositoryConfigBuilder {
    /// Sets the storage mode.
    #[must_use]
    pub const fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Sets the path of the task file.
    #[must_use]
    pub fn tasks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.path = path.into();
        self
    }

    #[must_use]
    pub const fn max_tasks(mut self, max_tasks: usize) -> Self {
        self.store.max_tasks = max_tasks;
        self
    }

    #[must_use]
    pub const fn max_file_size(mut self, max_file_size: u64) -> Self {
        self.store.max_file_size = max_file_size;
        self
    }

    #[must_use]
    pub const fn format(mut self, format: StoreFormat) -> Self {
        self.store.format = format;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<RepositoryConfig, ConfigurationError> {
        let config = RepositoryConfig {
            storage_mode: self.storage_mode,
            store: self.store,
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors in environment configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Invalid storage mode value.
    #[error("Invalid storage mode: '{0}'. Expected 'file' or 'in_memory'")]
    InvalidStorageMode(String),

    /// Invalid task file format value.
    #[error("Invalid task file format: '{0}'. Expected 'pretty' or 'compact'")]
    InvalidFileFormat(String),

    /// A numeric variable does not parse.
    #[error("{variable} must be a non-negative integer, got '{value}'")]
    InvalidNumber { variable: &'static str, value: String },

    /// A limit was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// Invalid authentication mode value.
    #[error("Invalid auth mode: '{0}'. Expected 'disabled', 'static' or 'remote'")]
    InvalidAuthMode(String),

    /// A static token entry is not of the form `token:user-id:role`.
    #[error("Invalid static token entry: '{0}'. Expected 'token:user-id:role'")]
    InvalidStaticToken(String),

    /// A variable required by the selected mode is missing.
    #[error("{variable} environment variable is required when {mode}")]
    MissingVariable {
        variable: &'static str,
        mode: &'static str,
    },
}

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The task file could not be prepared.
    #[error("Task store initialization error: {0}")]
    Store(#[from] StoreError),

    /// The identity service client could not be built.
    #[error("Identity client error: {0}")]
    IdentityClient(String),
}

// =============================================================================
// Repository Factory
// =============================================================================

/// Collection of initialized repositories.
#[derive(Clone)]
pub struct Repositories {
    /// Task repository for the task collection.
    pub task_repository: Arc<dyn TaskRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repositories")
            .field("task_repository", &self.task_repository.locate())
            .finish()
    }
}

/// Factory for creating repository instances based on configuration.
///
/// # Example
///
/// ```ignore
/// let config = RepositoryConfig::from_env()?;
/// let factory = RepositoryFactory::new(config);
/// let repositories = factory.create().await?;
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    config: RepositoryConfig,
}

impl RepositoryFactory {
    /// Creates a new repository factory with the given configuration.
    #[must_use]
    pub const fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    /// Creates a new repository factory from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Configuration` if environment configuration is invalid.
    pub fn from_env() -> Result<Self, FactoryError> {
        let config = RepositoryConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Returns the configuration used by this factory.
    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Creates the repositories selected by the configuration.
    ///
    /// In file mode the task file is created (holding `[]`) if it is absent,
    /// so a misconfigured path fails at startup instead of on first request.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Store` if the task file cannot be prepared.
    pub async fn create(&self) -> Result<Repositories, FactoryError> {
        let task_repository: Arc<dyn TaskRepository> = match self.config.storage_mode {
            StorageMode::File => {
                let repository = FileTaskRepository::new(self.config.store.clone());
                repository.store().ensure_exists().await?;
                Arc::new(repository)
            }
            StorageMode::InMemory => {
                Arc::new(InMemoryTaskRepository::new().with_max_tasks(self.config.store.max_tasks))
            }
        };

        tracing::debug!(location = %task_repository.locate(), "Task repository created");
        Ok(Repositories { task_repository })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| variables.get(name).cloned()
    }

    // -------------------------------------------------------------------------
    // StorageMode Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case("file", StorageMode::File)]
    #[case("FILE", StorageMode::File)]
    #[case("json", StorageMode::File)]
    #[case("in_memory", StorageMode::InMemory)]
    #[case("inmemory", StorageMode::InMemory)]
    #[case("memory", StorageMode::InMemory)]
    fn test_storage_mode_from_str_valid(#[case] input: &str, #[case] expected: StorageMode) {
        assert_eq!(input.parse::<StorageMode>(), Ok(expected));
    }

    #[rstest]
    #[case("postgres")]
    #[case("")]
    fn test_storage_mode_from_str_invalid(#[case] input: &str) {
        assert_eq!(
            input.parse::<StorageMode>(),
            Err(ConfigurationError::InvalidStorageMode(input.to_string()))
        );
    }

    // -------------------------------------------------------------------------
    // RepositoryConfig Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_from_lookup_defaults() {
        let config = RepositoryConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.store.path, PathBuf::from("tasks.json"));
        assert_eq!(config.store.max_tasks, 1000);
        assert_eq!(config.store.max_file_size, 10_485_760);
        assert_eq!(config.store.format, StoreFormat::Pretty);
    }

    #[rstest]
    fn test_from_lookup_reads_every_variable() {
        let config = RepositoryConfig::from_lookup(lookup_from(&[
            ("STORAGE_MODE", "in_memory"),
            ("TASKS_FILE", " /data/tasks.json "),
            ("MAX_TASKS", "25"),
            ("MAX_FILE_SIZE", "4096"),
            ("TASKS_FILE_FORMAT", "compact"),
        ]))
        .unwrap();

        assert_eq!(config.storage_mode, StorageMode::InMemory);
        assert_eq!(config.store.path, PathBuf::from("/data/tasks.json"));
        assert_eq!(config.store.max_tasks, 25);
        assert_eq!(config.store.max_file_size, 4096);
        assert_eq!(config.store.format, StoreFormat::Compact);
    }

    #[rstest]
    fn test_from_lookup_treats_blank_as_unset() {
        let config =
            RepositoryConfig::from_lookup(lookup_from(&[("TASKS_FILE", "  "), ("MAX_TASKS", "")])).unwrap();
        assert_eq!(config, RepositoryConfig::default());
    }

    #[rstest]
    #[case(
        ("MAX_TASKS", "many"),
        ConfigurationError::InvalidNumber { variable: "MAX_TASKS", value: "many".to_string() }
    )]
    #[case(
        ("MAX_FILE_SIZE", "-1"),
        ConfigurationError::InvalidNumber { variable: "MAX_FILE_SIZE", value: "-1".to_string() }
    )]
    #[case(("MAX_TASKS", "0"), ConfigurationError::ZeroLimit("MAX_TASKS"))]
    #[case(("TASKS_FILE_FORMAT", "yaml"), ConfigurationError::InvalidFileFormat("yaml".to_string()))]
    #[case(("STORAGE_MODE", "redis"), ConfigurationError::InvalidStorageMode("redis".to_string()))]
    fn test_from_lookup_rejects_invalid_values(
        #[case] variable: (&str, &str),
        #[case] expected: ConfigurationError,
    ) {
        assert_eq!(
            RepositoryConfig::from_lookup(lookup_from(&[variable])),
            Err(expected)
        );
    }

    #[rstest]
    fn test_builder() {
        let config = RepositoryConfig::builder()
            .storage_mode(StorageMode::InMemory)
            .tasks_file("other.json")
            .max_tasks(3)
            .max_file_size(100)
            .format(StoreFormat::Compact)
            .build()
            .unwrap();

        assert_eq!(config.storage_mode, StorageMode::InMemory);
        assert_eq!(config.store.path, PathBuf::from("other.json"));
        assert_eq!(config.store.max_tasks, 3);
    }

    #[rstest]
    fn test_builder_rejects_zero_file_size() {
        let result = RepositoryConfig::builder().max_file_size(0).build();
        assert_eq!(result, Err(ConfigurationError::ZeroLimit("MAX_FILE_SIZE")));
    }

    // -------------------------------------------------------------------------
    // RepositoryFactory Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_create_file_repository_bootstraps_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("data").join("tasks.json");
        let config = RepositoryConfig::builder().tasks_file(&path).build().unwrap();

        let repositories = RepositoryFactory::new(config).create().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert_eq!(repositories.task_repository.locate(), path.display().to_string());
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_in_memory_repository() {
        let config = RepositoryConfig::builder()
            .storage_mode(StorageMode::InMemory)
            .build()
            .unwrap();

        let repositories = RepositoryFactory::new(config).create().await.unwrap();

        assert_eq!(repositories.task_repository.locate(), "memory://tasks");
        assert!(repositories.task_repository.read_all().await.unwrap().is_empty());
    }
}
