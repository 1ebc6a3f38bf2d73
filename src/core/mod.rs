//! Core domain models for taskweave orchestration.
//!
//! This module contains the fundamental data structures used throughout
//! the orchestration system: task records and the execution DAG.

pub mod dag;
pub mod task;

pub use dag::TaskDAG;
pub use task::{Capability, TaskId, TaskRecord, TaskStatus};
