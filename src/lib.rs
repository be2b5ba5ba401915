//! Task Store API Library
//!
//! A task-management HTTP service whose task collection is kept in a single
//! JSON file that is validated on every read and replaced atomically on
//! every write.

pub mod api;
pub mod domain;
pub mod infrastructure;
