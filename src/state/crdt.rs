//! Field-level last-writer-wins replicated state.
//!
//! Every `(project, field)` pair is an LWW register holding
//! `{value, timestamp, replica_id}`. Merging keeps, per pair, the entry that
//! is greatest under the order `(timestamp, replica_id, value)`, so replicas
//! that have seen the same updates converge regardless of arrival order or
//! replay count.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::twlog_trace;

/// Identity of one replica of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random replica identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One LWW register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub replica_id: ReplicaId,
}

impl FieldEntry {
    /// Total order deciding which of two concurrent writes survives.
    ///
    /// Timestamp first, then replica id. Identical `(timestamp, replica)`
    /// pairs only differ if a replica reused a timestamp; the canonical JSON
    /// text of the value settles those.
    pub fn precedence(&self, other: &FieldEntry) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.replica_id.cmp(&other.replica_id))
            .then_with(|| self.value.to_string().cmp(&other.value.to_string()))
    }
}

/// All fields of one project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectState {
    pub fields: BTreeMap<String, FieldEntry>,
}

impl ProjectState {
    /// Plain `{field: value}` view.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }
}

/// Serializable `{project → {field → entry}}` map exchanged between replicas.
pub type StateSnapshot = BTreeMap<String, ProjectState>;

/// A replica of the collaborative project state.
#[derive(Debug, Clone)]
pub struct ReplicatedStateStore {
    replica_id: ReplicaId,
    projects: StateSnapshot,
}

impl ReplicatedStateStore {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            projects: StateSnapshot::new(),
        }
    }

    /// Rebuild a replica from a persisted snapshot.
    pub fn from_snapshot(replica_id: ReplicaId, snapshot: StateSnapshot) -> Self {
        Self {
            replica_id,
            projects: snapshot,
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// Write a field locally, stamped with the current time.
    pub fn update(&mut self, project_id: &str, field: &str, value: Value) {
        self.update_at(project_id, field, value, Utc::now());
    }

    /// Write a field locally with an explicit timestamp.
    ///
    /// The stored timestamp is at least one nanosecond past the entry this
    /// replica already holds, so a local write always out-ranks everything the
    /// replica has seen for that field, even under clock skew.
    pub fn update_at(&mut self, project_id: &str, field: &str, value: Value, timestamp: DateTime<Utc>) {
        let fields = &mut self
            .projects
            .entry(project_id.to_string())
            .or_default()
            .fields;

        let timestamp = match fields.get(field) {
            Some(existing) if existing.timestamp >= timestamp => {
                let bumped = existing.timestamp + Duration::nanoseconds(1);
                twlog_trace!(
                    "update {}.{}: clock behind {}, stamping {}",
                    project_id,
                    field,
                    existing.timestamp,
                    bumped
                );
                bumped
            }
            _ => timestamp,
        };

        let entry = FieldEntry {
            value,
            timestamp,
            replica_id: self.replica_id.clone(),
        };
        fields.insert(field.to_string(), entry);
    }

    /// Merge a remote snapshot into this replica.
    ///
    /// Returns the number of fields whose entry was adopted from the remote.
    pub fn merge(&mut self, remote: &StateSnapshot) -> usize {
        let mut adopted = 0;
        for (project_id, remote_project) in remote {
            let local_project = self.projects.entry(project_id.clone()).or_default();
            for (field, remote_entry) in &remote_project.fields {
                let replace = match local_project.fields.get(field) {
                    Some(local_entry) => remote_entry.precedence(local_entry) == Ordering::Greater,
                    None => true,
                };
                if replace {
                    twlog_trace!(
                        "merge {}.{} <- replica {}",
                        project_id,
                        field,
                        remote_entry.replica_id
                    );
                    local_project
                        .fields
                        .insert(field.clone(), remote_entry.clone());
                    adopted += 1;
                }
            }
        }
        adopted
    }

    /// `{field: value}` projection of a project; empty if unknown.
    pub fn get_project(&self, project_id: &str) -> BTreeMap<String, Value> {
        self.projects
            .get(project_id)
            .map(ProjectState::values)
            .unwrap_or_default()
    }

    pub fn get(&self, project_id: &str, field: &str) -> Option<&Value> {
        self.entry(project_id, field).map(|entry| &entry.value)
    }

    pub fn entry(&self, project_id: &str, field: &str) -> Option<&FieldEntry> {
        self.projects.get(project_id)?.fields.get(field)
    }

    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn state(&self) -> &StateSnapshot {
        &self.projects
    }

    /// Copy of the full state, ready to ship to another replica.
    pub fn snapshot(&self) -> StateSnapshot {
        self.projects.clone()
    }
}
