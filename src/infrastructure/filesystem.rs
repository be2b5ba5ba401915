//! File system seam used by the durable store.
//!
//! The store never touches `tokio::fs` directly. Production code uses
//! [`TokioFileSystem`]; [`FaultInjectingFileSystem`] wraps it to make
//! individual operations fail on demand, which is how interrupted writes are
//! exercised in tests.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;

/// Asynchronous file operations needed by the durable store.
///
/// `rename` must replace its destination atomically when both paths are on
/// the same volume.
pub trait FileSystem: Send + Sync {
    /// Returns whether `path` exists. Errors other than absence propagate.
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>>;

    /// Returns the size of the file in bytes.
    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>>;

    /// Reads the whole file.
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>>;

    /// Creates or truncates the file and writes `contents` durably.
    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Moves `from` over `to`.
    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>>;

    /// Removes the file.
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;

    /// Creates a directory and all missing parents.
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;
}

// =============================================================================
// Tokio File System
// =============================================================================

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        tokio::fs::try_exists(path).boxed()
    }

    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        async move { Ok(tokio::fs::metadata(path).await?.len()) }.boxed()
    }

    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        tokio::fs::read(path).boxed()
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        async move {
            let mut file = tokio::fs::File::create(path).await?;
            file.write_all(contents).await?;
            file.sync_all().await
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        tokio::fs::rename(from, to).boxed()
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        tokio::fs::remove_file(path).boxed()
    }

    fn create_dir_all<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        tokio::fs::create_dir_all(path).boxed()
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Operations of [`FaultInjectingFileSystem`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Write,
    Rename,
    Remove,
}

/// [`TokioFileSystem`] wrapper whose write, rename, and remove operations can
/// be switched to fail with an injected I/O error.
///
/// Faults are checked before the real operation runs, so a failed rename
/// leaves both the temporary and the canonical file untouched.
#[derive(Debug, Default)]
pub struct FaultInjectingFileSystem {
    inner: TokioFileSystem,
    fail_write: AtomicBool,
    fail_rename: AtomicBool,
    fail_remove: AtomicBool,
}

impl FaultInjectingFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the file system with `point` failing.
    #[must_use]
    pub fn failing(self, point: FaultPoint) -> Self {
        self.set_failing(point, true);
        self
    }

    /// Turns the fault at `point` on or off.
    pub fn set_failing(&self, point: FaultPoint, failing: bool) {
        self.flag(point).store(failing, Ordering::SeqCst);
    }

    const fn flag(&self, point: FaultPoint) -> &AtomicBool {
        match point {
            FaultPoint::Write => &self.fail_write,
            FaultPoint::Rename => &self.fail_rename,
            FaultPoint::Remove => &self.fail_remove,
        }
    }

    fn check(&self, point: FaultPoint) -> io::Result<()> {
        if self.flag(point).load(Ordering::SeqCst) {
            Err(io::Error::other(format!("injected {point:?} failure")))
        } else {
            Ok(())
        }
    }
}

impl FileSystem for FaultInjectingFileSystem {
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<bool>> {
        self.inner.exists(path)
    }

    fn size<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        self.inner.size(path)
    }

    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        self.inner.read(path)
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        async move {
            self.check(FaultPoint::Write)?;
            self.inner.write(path, contents).await
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        async move {
            self.check(FaultPoint::Rename)?;
            self.inner.rename(from, to).await
        }
        .boxed()
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        async move {
            self.check(FaultPoint::Remove)?;
            self.inner.remove(path).await
        }
        .boxed()
    }

    fn create_dir_all<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        self.inner.create_dir_all(path)
    }
}
