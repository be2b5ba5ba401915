//! Time source for task timestamps.

use chrono::{SecondsFormat, Utc};

/// Supplies ISO-8601 timestamps for `createdAt` and `updatedAt`.
pub trait Clock: Send + Sync {
    /// Returns the current time as an ISO-8601 UTC string.
    fn now(&self) -> String;
}

/// Wall clock, millisecond precision (`2024-05-01T12:00:00.000Z`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Clock that always returns the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(String);

impl FixedClock {
    #[must_use]
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self(timestamp.into())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}
