//! Durable, atomically rewritten task file.
//!
//! [`DurableStore`] owns a single JSON file holding the whole task collection.
//! Every read is bounded in bytes and records and is schema-checked before it
//! is returned. Every write is validated and bounded before the disk is
//! touched, then written to a temporary sibling file and renamed over the
//! canonical file, so readers only ever see the old or the new collection.
//!
//! The store is configured explicitly through [`StoreConfig`]; it reads no
//! environment variables itself.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use super::filesystem::{FileSystem, TokioFileSystem};
use super::validator::{SchemaError, validate_task_records};
use crate::domain::Task;

/// Default maximum number of tasks in the collection.
pub const DEFAULT_MAX_TASKS: usize = 1000;

/// Default maximum size of the task file (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Suffix appended to the canonical file name for the temporary file.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

const EMPTY_COLLECTION: &[u8] = b"[]";

// =============================================================================
// Configuration
// =============================================================================

/// Serialization style of the task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    /// Pretty-printed with 2-space indentation.
    #[default]
    Pretty,
    /// Single line, no whitespace.
    Compact,
}

impl FromStr for StoreFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(value.to_string()),
        }
    }
}

/// Location and limits of the task file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Canonical path of the task file.
    pub path: PathBuf,
    /// Maximum number of records accepted on read and write.
    pub max_tasks: usize,
    /// Maximum file size in bytes accepted on read and write.
    pub max_file_size: u64,
    /// Output format used when writing.
    pub format: StoreFormat,
}

impl StoreConfig {
    /// Creates a configuration for `path` with default limits.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_tasks: DEFAULT_MAX_TASKS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            format: StoreFormat::default(),
        }
    }

    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    #[must_use]
    pub const fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: StoreFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the temporary path: the canonical path with
    /// [`TEMP_FILE_SUFFIX`] appended to its file name.
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(TEMP_FILE_SUFFIX);
        PathBuf::from(path)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("tasks.json")
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Direction of the store operation that hit a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Read,
    Write,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(formatter, "read"),
            Self::Write => write!(formatter, "write"),
        }
    }
}

/// Machine-readable classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    IoFailure,
    MalformedData,
    TooLarge,
    TooManyRecords,
    InvalidInput,
    Schema,
}

impl StoreErrorKind {
    /// Stable error code used in API responses and logs.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::IoFailure => "IO_FAILURE",
            Self::MalformedData => "MALFORMED_DATA",
            Self::TooLarge => "TOO_LARGE",
            Self::TooManyRecords => "TOO_MANY_RECORDS",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Schema => "SCHEMA_ERROR",
        }
    }
}

/// Errors raised while reading or writing the task collection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file could not be accessed for a reason other than absence.
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored content does not parse or does not match the task shape.
    #[error("Invalid task file format: {details}")]
    MalformedData { details: String },

    /// The file, or the serialized collection, exceeds the size limit.
    #[error("Data size exceeds maximum file size on {operation}: {size} bytes, max: {max} bytes")]
    TooLarge {
        size: u64,
        max: u64,
        operation: StoreOperation,
    },

    /// The collection holds more records than allowed.
    #[error("Number of tasks exceeds maximum allowed on {operation}: {count} tasks, max: {max}")]
    TooManyRecords {
        count: usize,
        max: usize,
        operation: StoreOperation,
    },

    /// The caller passed something that is not a collection.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A record to be written failed schema validation; nothing was written.
    #[error("Refusing to write invalid task collection: {0}")]
    Schema(#[from] SchemaError),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedData {
            details: details.into(),
        }
    }

    /// Returns the machine-readable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> StoreErrorKind {
        match self {
            Self::Io { .. } => StoreErrorKind::IoFailure,
            Self::MalformedData { .. } => StoreErrorKind::MalformedData,
            Self::TooLarge { .. } => StoreErrorKind::TooLarge,
            Self::TooManyRecords { .. } => StoreErrorKind::TooManyRecords,
            Self::InvalidInput(_) => StoreErrorKind::InvalidInput,
            Self::Schema(_) => StoreErrorKind::Schema,
        }
    }

    /// Returns `true` if the caller caused the error by supplying an
    /// oversized collection on write.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TooLarge {
                operation: StoreOperation::Write,
                ..
            } | Self::TooManyRecords {
                operation: StoreOperation::Write,
                ..
            }
        )
    }
}

// =============================================================================
// Durable Store
// =============================================================================

/// The persisted task collection at one canonical path.
#[derive(Debug)]
pub struct DurableStore<F = TokioFileSystem> {
    config: StoreConfig,
    filesystem: F,
}

impl DurableStore<TokioFileSystem> {
    /// Creates a store on the real file system.
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self::with_filesystem(config, TokioFileSystem)
    }
}

impl<F: FileSystem> DurableStore<F> {
    /// Creates a store on the given file system.
    #[must_use]
    pub const fn with_filesystem(config: StoreConfig, filesystem: F) -> Self {
        Self { config, filesystem }
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn filesystem(&self) -> &F {
        &self.filesystem
    }

    /// Returns the canonical path of the task file.
    #[must_use]
    pub fn locate(&self) -> &Path {
        &self.config.path
    }

    /// Creates the task file holding an empty collection if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if existence cannot be determined or the
    /// file cannot be created.
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        let path = self.locate();
        let exists = self
            .filesystem
            .exists(path)
            .await
            .map_err(|source| StoreError::io(path, source))?;
        if exists {
            return Ok(());
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            self.filesystem
                .create_dir_all(parent)
                .await
                .map_err(|source| StoreError::io(parent, source))?;
        }
        self.filesystem
            .write(path, EMPTY_COLLECTION)
            .await
            .map_err(|source| StoreError::io(path, source))?;

        tracing::info!(path = %path.display(), "Initialized empty task file");
        Ok(())
    }

    /// Reads and validates the raw records of the collection.
    ///
    /// Whitespace-only content is an empty collection.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the file cannot be accessed
    /// - [`StoreError::TooLarge`] if the file exceeds `max_file_size`
    /// - [`StoreError::MalformedData`] if the content is not UTF-8, not a JSON
    ///   array, or holds a record that fails schema validation
    /// - [`StoreError::TooManyRecords`] if the array exceeds `max_tasks`
    pub async fn load_records(&self) -> Result<Vec<Value>, StoreError> {
        self.ensure_exists().await?;
        let path = self.locate();

        let size = self
            .filesystem
            .size(path)
            .await
            .map_err(|source| StoreError::io(path, source))?;
        if size > self.config.max_file_size {
            return Err(StoreError::TooLarge {
                size,
                max: self.config.max_file_size,
                operation: StoreOperation::Read,
            });
        }

        let bytes = self
            .filesystem
            .read(path)
            .await
            .map_err(|source| StoreError::io(path, source))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| StoreError::malformed("task file is not valid UTF-8"))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = parse_records(&raw)?;
        validate_task_records(&records).map_err(|error| StoreError::malformed(error.to_string()))?;

        if records.len() > self.config.max_tasks {
            return Err(StoreError::TooManyRecords {
                count: records.len(),
                max: self.config.max_tasks,
                operation: StoreOperation::Read,
            });
        }

        Ok(records)
    }

    /// Reads the collection as typed tasks.
    ///
    /// # Errors
    ///
    /// See [`DurableStore::load_records`].
    pub async fn load(&self) -> Result<Vec<Task>, StoreError> {
        self.load_records()
            .await?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Task>, _>>()
            .map_err(|error| StoreError::malformed(error.to_string()))
    }

    /// Validates and atomically writes a raw collection.
    ///
    /// Nothing is written unless every check passes.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidInput`] if `records` is not an array
    /// - [`StoreError::TooManyRecords`] if the array exceeds `max_tasks`
    /// - [`StoreError::Schema`] if any record fails schema validation
    /// - [`StoreError::TooLarge`] if the serialized form exceeds `max_file_size`
    /// - [`StoreError::Io`] if writing or replacing the file fails
    pub async fn save_records(&self, records: &Value) -> Result<(), StoreError> {
        let Value::Array(records) = records else {
            return Err(StoreError::InvalidInput("tasks must be an array".to_string()));
        };

        if records.len() > self.config.max_tasks {
            return Err(StoreError::TooManyRecords {
                count: records.len(),
                max: self.config.max_tasks,
                operation: StoreOperation::Write,
            });
        }

        validate_task_records(records)?;

        let contents = self.serialize(records)?;
        let size = contents.len() as u64;
        if size > self.config.max_file_size {
            return Err(StoreError::TooLarge {
                size,
                max: self.config.max_file_size,
                operation: StoreOperation::Write,
            });
        }

        self.replace_atomically(&contents).await?;

        tracing::debug!(
            path = %self.locate().display(),
            tasks = records.len(),
            bytes = size,
            "Task file written"
        );
        Ok(())
    }

    /// Validates and atomically writes typed tasks.
    ///
    /// # Errors
    ///
    /// See [`DurableStore::save_records`].
    pub async fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let records =
            serde_json::to_value(tasks).map_err(|error| StoreError::InvalidInput(error.to_string()))?;
        self.save_records(&records).await
    }

    fn serialize(&self, records: &[Value]) -> Result<Vec<u8>, StoreError> {
        match self.config.format {
            StoreFormat::Pretty => serde_json::to_vec_pretty(records),
            StoreFormat::Compact => serde_json::to_vec(records),
        }
        .map_err(|error| StoreError::InvalidInput(error.to_string()))
    }

    /// Writes `contents` to the temporary path and renames it over the
    /// canonical path. On failure the temporary file is removed and the
    /// original error returned.
    async fn replace_atomically(&self, contents: &[u8]) -> Result<(), StoreError> {
        let path = self.locate();
        let temp_path = self.config.temp_path();

        let result = async {
            self.filesystem
                .write(&temp_path, contents)
                .await
                .map_err(|source| StoreError::io(&temp_path, source))?;
            self.filesystem
                .rename(&temp_path, path)
                .await
                .map_err(|source| StoreError::io(path, source))
        }
        .await;

        if result.is_err() {
            self.discard_temp_file(&temp_path).await;
        }
        result
    }

    /// Best-effort removal of the temporary file; the outcome is discarded.
    async fn discard_temp_file(&self, temp_path: &Path) {
        if let Err(error) = self.filesystem.remove(temp_path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %temp_path.display(),
                    %error,
                    "Failed to remove temporary task file"
                );
            }
        }
    }
}

fn parse_records(raw: &str) -> Result<Vec<Value>, StoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(_) => Err(StoreError::malformed("task file does not contain a JSON array")),
        Err(_) => Err(StoreError::malformed("task file contains malformed JSON")),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId};
    use crate::infrastructure::filesystem::{FaultInjectingFileSystem, FaultPoint};
    use crate::infrastructure::validator::SchemaErrorKind;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        directory: TempDir,
        config: StoreConfig,
    }

    impl Fixture {
        fn store(&self) -> DurableStore {
            DurableStore::new(self.config.clone())
        }

        fn write_raw(&self, contents: &str) {
            std::fs::write(&self.config.path, contents).unwrap();
        }

        fn read_raw(&self) -> String {
            std::fs::read_to_string(&self.config.path).unwrap()
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        let directory = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(directory.path().join("tasks.json"));
        Fixture { directory, config }
    }

    fn task(id: i64, title: &str) -> Task {
        Task::create(
            TaskId::Number(id),
            NewTask {
                title: title.to_string(),
                description: format!("about {title}"),
                completed: id % 2 == 0,
            },
            "2024-01-01T00:00:00.000Z",
        )
    }

    // -------------------------------------------------------------------------
    // Configuration Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_temp_path_appends_suffix() {
        let config = StoreConfig::new("/data/tasks.json");
        assert_eq!(config.temp_path(), PathBuf::from("/data/tasks.json.tmp"));
    }

    #[rstest]
    #[case("pretty", Ok(StoreFormat::Pretty))]
    #[case("COMPACT", Ok(StoreFormat::Compact))]
    #[case("yaml", Err("yaml".to_string()))]
    fn test_store_format_from_str(#[case] input: &str, #[case] expected: Result<StoreFormat, String>) {
        assert_eq!(input.parse::<StoreFormat>(), expected);
    }

    // -------------------------------------------------------------------------
    // Bootstrap Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_ensure_exists_creates_empty_collection(fixture: Fixture) {
        fixture.store().ensure_exists().await.unwrap();
        assert_eq!(fixture.read_raw(), "[]");
    }

    #[rstest]
    #[tokio::test]
    async fn test_ensure_exists_creates_parent_directories(fixture: Fixture) {
        let config = StoreConfig::new(fixture.directory.path().join("nested/data/tasks.json"));
        let store = DurableStore::new(config.clone());

        assert!(store.load().await.unwrap().is_empty());
        assert!(config.path.exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_ensure_exists_leaves_existing_file_alone(fixture: Fixture) {
        let store = fixture.store();
        store.save(&[task(1, "keep")]).await.unwrap();
        let before = fixture.read_raw();

        store.ensure_exists().await.unwrap();
        store.ensure_exists().await.unwrap();

        assert_eq!(fixture.read_raw(), before);
    }

    // -------------------------------------------------------------------------
    // Load Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_repeated_loads_are_equal(fixture: Fixture) {
        let store = fixture.store();
        store.save(&[task(1, "a"), task(2, "b")]).await.unwrap();

        let first = store.load().await.unwrap();
        let second = store.load().await.unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t  ")]
    #[tokio::test]
    async fn test_whitespace_only_file_is_empty(fixture: Fixture, #[case] contents: &str) {
        fixture.write_raw(contents);
        assert!(fixture.store().load().await.unwrap().is_empty());
    }

    #[rstest]
    #[case("not json", "task file contains malformed JSON")]
    #[case("{\"id\": 1}", "task file does not contain a JSON array")]
    #[case("[{\"title\": \"x\"}]", "Task at index 0 is missing required fields")]
    #[case(
        r#"[{"id": 2, "title": "a", "completed": false, "createdAt": "t"},
            {"id": "2", "title": "b", "completed": false, "createdAt": "t"}]"#,
        "Task at index 1 has duplicate id 2"
    )]
    #[tokio::test]
    async fn test_malformed_content_detected(
        fixture: Fixture,
        #[case] contents: &str,
        #[case] expected_details: &str,
    ) {
        fixture.write_raw(contents);

        let error = fixture.store().load().await.unwrap_err();
        assert_eq!(error.kind(), StoreErrorKind::MalformedData);
        let StoreError::MalformedData { details } = error else {
            unreachable!()
        };
        assert!(details.starts_with(expected_details), "unexpected details: {details}");
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_utf8_is_malformed(fixture: Fixture) {
        std::fs::write(&fixture.config.path, [0xff, 0xfe, 0x5b]).unwrap();
        let error = fixture.store().load().await.unwrap_err();
        assert_eq!(error.kind(), StoreErrorKind::MalformedData);
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_rejects_oversized_file(fixture: Fixture) {
        let store = DurableStore::new(fixture.config.clone().with_max_file_size(8));
        fixture.write_raw("[          ]");

        let error = store.load().await.unwrap_err();
        assert!(matches!(
            error,
            StoreError::TooLarge {
                size: 12,
                max: 8,
                operation: StoreOperation::Read
            }
        ));
        assert!(!error.is_client_error());
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_rejects_too_many_records(fixture: Fixture) {
        fixture.store().save(&[task(1, "a"), task(2, "b"), task(3, "c")]).await.unwrap();
        let store = DurableStore::new(fixture.config.clone().with_max_tasks(2));

        let error = store.load().await.unwrap_err();
        assert!(matches!(
            error,
            StoreError::TooManyRecords {
                count: 3,
                max: 2,
                operation: StoreOperation::Read
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_accepts_externally_written_records(fixture: Fixture) {
        fixture.write_raw(
            r#"[{"id": "ext-1", "title": "Imported", "completed": true, "createdAt": "2023-12-31T23:59:59Z"}]"#,
        );

        let tasks = fixture.store().load().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, TaskId::from("ext-1"));
        assert_eq!(tasks[0].description, "");
    }

    // -------------------------------------------------------------------------
    // Save Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_save_writes_pretty_json(fixture: Fixture) {
        fixture.store().save(&[task(1, "a")]).await.unwrap();

        let raw = fixture.read_raw();
        assert!(raw.starts_with("[\n  {\n    \"id\": 1,"), "unexpected layout: {raw}");
        assert!(!fixture.config.temp_path().exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_writes_compact_json(fixture: Fixture) {
        let store = DurableStore::new(fixture.config.clone().with_format(StoreFormat::Compact));
        store.save(&[task(1, "a")]).await.unwrap();

        assert!(!fixture.read_raw().contains('\n'));
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_rejects_non_array(fixture: Fixture) {
        let error = fixture.store().save_records(&json!({"id": 1})).await.unwrap_err();
        assert_eq!(error.kind(), StoreErrorKind::InvalidInput);
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_rejects_invalid_record_and_keeps_file(fixture: Fixture) {
        let store = fixture.store();
        store.save(&[task(1, "original")]).await.unwrap();
        let before = fixture.read_raw();

        let error = store.save_records(&json!([{"title": "x"}])).await.unwrap_err();

        assert_eq!(error.kind(), StoreErrorKind::Schema);
        assert_eq!(fixture.read_raw(), before);
        assert!(!fixture.config.temp_path().exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_rejects_duplicate_ids_and_keeps_file(fixture: Fixture) {
        let store = fixture.store();
        store.save(&[task(1, "original")]).await.unwrap();
        let before = fixture.read_raw();

        let error = store.save(&[task(1, "a"), task(2, "b"), task(1, "c")]).await.unwrap_err();

        assert_eq!(error.kind(), StoreErrorKind::Schema);
        let StoreError::Schema(schema) = error else {
            unreachable!()
        };
        assert_eq!(schema.index, 2);
        assert_eq!(schema.kind, SchemaErrorKind::DuplicateId("1".to_string()));
        assert_eq!(fixture.read_raw(), before);
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_rejects_one_past_max_tasks(fixture: Fixture) {
        let store = DurableStore::new(fixture.config.clone().with_max_tasks(2));
        let tasks = vec![task(1, "a"), task(2, "b"), task(3, "c")];

        let error = store.save(&tasks).await.unwrap_err();

        assert!(matches!(
            error,
            StoreError::TooManyRecords {
                count: 3,
                max: 2,
                operation: StoreOperation::Write
            }
        ));
        assert!(error.is_client_error());
        assert!(!fixture.config.path.exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_rejects_oversized_collection_before_writing(fixture: Fixture) {
        let store = DurableStore::new(fixture.config.clone().with_max_file_size(64));
        let tasks = vec![task(1, &"x".repeat(100))];

        let error = store.save(&tasks).await.unwrap_err();

        assert_eq!(error.kind(), StoreErrorKind::TooLarge);
        assert!(error.is_client_error());
        assert!(!fixture.config.path.exists());
        assert!(!fixture.config.temp_path().exists());
    }

    // -------------------------------------------------------------------------
    // Atomicity Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_failed_rename_keeps_previous_collection(fixture: Fixture) {
        let store = DurableStore::with_filesystem(fixture.config.clone(), FaultInjectingFileSystem::new());
        store.save(&[task(1, "before")]).await.unwrap();
        let before = fixture.read_raw();

        store.filesystem().set_failing(FaultPoint::Rename, true);
        let error = store.save(&[task(1, "before"), task(2, "after")]).await.unwrap_err();

        assert_eq!(error.kind(), StoreErrorKind::IoFailure);
        assert_eq!(fixture.read_raw(), before);
        assert!(!fixture.config.temp_path().exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_rename_error(fixture: Fixture) {
        let filesystem = FaultInjectingFileSystem::new()
            .failing(FaultPoint::Rename)
            .failing(FaultPoint::Remove);
        let store = DurableStore::with_filesystem(fixture.config.clone(), filesystem);

        let error = store.save(&[task(1, "a")]).await.unwrap_err();

        let StoreError::Io { path, source } = error else {
            panic!("expected an I/O error");
        };
        assert_eq!(path, fixture.config.path);
        assert!(source.to_string().contains("Rename"));
        assert!(fixture.config.temp_path().exists());
        assert!(!fixture.config.path.exists());
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_temp_write_leaves_canonical_file(fixture: Fixture) {
        let store = DurableStore::with_filesystem(fixture.config.clone(), FaultInjectingFileSystem::new());
        store.save(&[task(1, "before")]).await.unwrap();
        let before = fixture.read_raw();

        store.filesystem().set_failing(FaultPoint::Write, true);
        let error = store.save(&[]).await.unwrap_err();

        let StoreError::Io { path, .. } = error else {
            panic!("expected an I/O error");
        };
        assert_eq!(path, fixture.config.temp_path());
        assert_eq!(fixture.read_raw(), before);
    }

    // -------------------------------------------------------------------------
    // Round-trip Property
    // -------------------------------------------------------------------------

    fn arbitrary_task() -> impl Strategy<Value = Task> {
        (
            prop_oneof![
                any::<i64>().prop_map(TaskId::Number),
                "[a-z0-9-]{1,12}".prop_map(TaskId::Text),
            ],
            "\\PC{1,40}",
            "\\PC{0,80}",
            any::<bool>(),
            proptest::option::of(Just("2024-03-01T10:00:00.000Z".to_string())),
            proptest::option::of("user-[0-9]{1,3}"),
        )
            .prop_map(|(id, title, description, completed, updated_at, user_id)| Task {
                id,
                title,
                description,
                completed,
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
                updated_at,
                user_id,
            })
    }

    /// Collections with unique ids, keeping the first task per id.
    fn arbitrary_collection() -> impl Strategy<Value = Vec<Task>> {
        proptest::collection::vec(arbitrary_task(), 0..20).prop_map(|tasks| {
            let mut seen = std::collections::HashSet::new();
            tasks
                .into_iter()
                .filter(|task| seen.insert(task.id.to_string()))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_save_then_load_round_trips(tasks in arbitrary_collection()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let directory = tempfile::tempdir().unwrap();
            let store = DurableStore::new(StoreConfig::new(directory.path().join("tasks.json")));

            let loaded = runtime.block_on(async {
                store.save(&tasks).await.unwrap();
                store.load().await.unwrap()
            });

            prop_assert_eq!(loaded, tasks);
        }
    }
}
