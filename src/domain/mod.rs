//! Domain module for task management.
//!
//! This module contains the task model and the pure rules for changing a
//! task collection.

pub mod clock;
pub mod task;

pub use clock::{Clock, FixedClock, SystemClock};
pub use task::{IdSequence, NewTask, Task, TaskChanges, TaskId, find_task_index, next_task_id};
