//! Replicated collaborative state.
//!
//! This module provides the field-level last-writer-wins CRDT used to
//! synchronize project state between replicas through opaque snapshots.

mod crdt;

pub use crdt::{FieldEntry, ProjectState, ReplicaId, ReplicatedStateStore, StateSnapshot};
