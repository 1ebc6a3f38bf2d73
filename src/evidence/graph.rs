//! Evidence graph recording provenance between artifacts and claims.
//!
//! Nodes are artifact or claim identifiers; edges carry a typed relation,
//! free-form metadata and the time of the write. There is at most one edge
//! per ordered `(source, target)` pair: a later write replaces the relation
//! and metadata of an earlier one.

use chrono::{DateTime, Utc};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::calibration::CalibratedPrediction;
use crate::error::Error;
use crate::{twlog_debug, twlog_trace};

/// Evidence node id for a worker. Workers and tasks live in separate
/// namespaces so an `EXECUTES` edge never loops back on itself.
pub fn worker_node_id(worker_id: &str) -> String {
    format!("worker:{}", worker_id)
}

/// Evidence node id for a task.
pub fn task_node_id(task_id: &str) -> String {
    format!("task:{}", task_id)
}

/// Kind of evidential relation between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    Supports,
    Contradicts,
    DerivesFrom,
    Verifies,
    CausallyInfluences,
    /// A worker executed a task.
    Executes,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Supports => "SUPPORTS",
            Relation::Contradicts => "CONTRADICTS",
            Relation::DerivesFrom => "DERIVES_FROM",
            Relation::Verifies => "VERIFIES",
            Relation::CausallyInfluences => "CAUSALLY_INFLUENCES",
            Relation::Executes => "EXECUTES",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUPPORTS" => Ok(Relation::Supports),
            "CONTRADICTS" => Ok(Relation::Contradicts),
            "DERIVES_FROM" => Ok(Relation::DerivesFrom),
            "VERIFIES" => Ok(Relation::Verifies),
            "CAUSALLY_INFLUENCES" => Ok(Relation::CausallyInfluences),
            "EXECUTES" => Ok(Relation::Executes),
            other => Err(Error::Validation(format!("unknown relation: {}", other))),
        }
    }
}

/// Outcome of a formal verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofReceipt {
    pub proved: bool,
    pub prover: String,
    #[serde(default)]
    pub details: Value,
}

/// Bayesian uncertainty attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyStats {
    pub aleatoric: f64,
    pub epistemic: f64,
}

/// An artifact or claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNode {
    pub id: String,
    pub proof_status: Option<ProofReceipt>,
    pub bayesian_stats: Option<UncertaintyStats>,
    pub conformal_confidence: Option<CalibratedPrediction<f64>>,
}

impl EvidenceNode {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            proof_status: None,
            bayesian_stats: None,
            conformal_confidence: None,
        }
    }
}

/// Weight of a directed evidence edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEdge {
    pub relation: Relation,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Flat, replayable form of one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub source: String,
    pub target: String,
    pub relation: Relation,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Lossless serializable form of a whole graph: every node with its
/// attributes, including nodes without edges, plus every edge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    #[serde(default)]
    pub nodes: Vec<EvidenceNode>,
    #[serde(default)]
    pub edges: Vec<EvidenceRecord>,
}

/// Directed multi-relation graph of artifacts and claims.
///
/// Not synchronized; share it behind a lock when several tasks write.
#[derive(Default)]
pub struct EvidenceGraph {
    graph: DiGraph<EvidenceNode, EvidenceEdge>,
    node_index: HashMap<String, NodeIndex>,
}

impl EvidenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&index) = self.node_index.get(id) {
            return index;
        }
        let index = self.graph.add_node(EvidenceNode::new(id));
        self.node_index.insert(id.to_string(), index);
        index
    }

    fn upsert_edge(&mut self, source: &str, target: &str, edge: EvidenceEdge) {
        let from = self.ensure_node(source);
        let to = self.ensure_node(target);
        twlog_trace!("evidence {} -[{}]-> {}", source, edge.relation, target);
        self.graph.update_edge(from, to, edge);
    }

    /// Record `source -[relation]-> target`, creating nodes as needed.
    ///
    /// Overwrites any existing edge between the same ordered pair.
    pub fn add_evidence(
        &mut self,
        source: &str,
        target: &str,
        relation: Relation,
        metadata: Map<String, Value>,
    ) {
        self.upsert_edge(
            source,
            target,
            EvidenceEdge {
                relation,
                metadata,
                timestamp: Utc::now(),
            },
        );
    }

    /// Record that `treatment` causally influences `outcome`.
    pub fn add_causal_link(&mut self, treatment: &str, outcome: &str, mechanism: &str, confidence: f64) {
        let mut metadata = Map::new();
        metadata.insert("mechanism".to_string(), json!(mechanism));
        metadata.insert("confidence".to_string(), json!(confidence));
        self.add_evidence(treatment, outcome, Relation::CausallyInfluences, metadata);
    }

    /// Attach a proof receipt, creating the claim node if needed.
    pub fn mark_claim_verified(&mut self, claim_id: &str, receipt: ProofReceipt) {
        let index = self.ensure_node(claim_id);
        self.graph[index].proof_status = Some(receipt);
    }

    /// Attach uncertainty statistics to an existing node.
    ///
    /// Returns `false` and changes nothing if the node does not exist.
    pub fn set_uncertainty(&mut self, node_id: &str, stats: UncertaintyStats) -> bool {
        match self.node_index.get(node_id) {
            Some(&index) => {
                self.graph[index].bayesian_stats = Some(stats);
                true
            }
            None => false,
        }
    }

    /// Attach a calibrated confidence, creating the node if needed.
    pub fn set_conformal_confidence(&mut self, node_id: &str, confidence: CalibratedPrediction<f64>) {
        let index = self.ensure_node(node_id);
        self.graph[index].conformal_confidence = Some(confidence);
    }

    /// Topological ordering of every node, or nothing if the graph has a cycle.
    ///
    /// Callers must treat an empty result as "no path", not as an error.
    pub fn highest_confidence_path(&self, goal: &str) -> Vec<String> {
        match toposort(&self.graph, None) {
            Ok(order) => order
                .into_iter()
                .map(|index| self.graph[index].id.clone())
                .collect(),
            Err(_) => {
                twlog_debug!("highest_confidence_path({}): graph is cyclic", goal);
                Vec::new()
            }
        }
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    pub fn node(&self, id: &str) -> Option<&EvidenceNode> {
        self.node_index.get(id).map(|&index| &self.graph[index])
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&EvidenceEdge> {
        let from = *self.node_index.get(source)?;
        let to = *self.node_index.get(target)?;
        let edge = self.graph.find_edge(from, to)?;
        self.graph.edge_weight(edge)
    }

    /// Edges pointing at `target`, with their source ids.
    pub fn incoming(&self, target: &str) -> Vec<(&str, &EvidenceEdge)> {
        match self.node_index.get(target) {
            Some(&index) => self
                .graph
                .edges_directed(index, Direction::Incoming)
                .map(|edge| (self.graph[edge.source()].id.as_str(), edge.weight()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Export every edge for persistence.
    pub fn records(&self) -> Vec<EvidenceRecord> {
        self.graph
            .edge_references()
            .map(|edge| EvidenceRecord {
                source: self.graph[edge.source()].id.clone(),
                target: self.graph[edge.target()].id.clone(),
                relation: edge.weight().relation,
                metadata: edge.weight().metadata.clone(),
                timestamp: edge.weight().timestamp,
            })
            .collect()
    }

    /// Re-insert exported edges, keeping their original timestamps.
    pub fn replay(&mut self, records: impl IntoIterator<Item = EvidenceRecord>) {
        for record in records {
            self.upsert_edge(
                &record.source,
                &record.target,
                EvidenceEdge {
                    relation: record.relation,
                    metadata: record.metadata,
                    timestamp: record.timestamp,
                },
            );
        }
    }

    /// Export nodes with their attributes and every edge.
    pub fn snapshot(&self) -> EvidenceSnapshot {
        EvidenceSnapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self.records(),
        }
    }

    /// Load a snapshot into this graph.
    ///
    /// Node attributes from the snapshot replace those of existing nodes with
    /// the same id; edges are replayed as by [`EvidenceGraph::replay`].
    pub fn restore(&mut self, snapshot: EvidenceSnapshot) {
        for node in snapshot.nodes {
            let index = self.ensure_node(&node.id);
            self.graph[index] = node;
        }
        self.replay(snapshot.edges);
    }

    /// Build a graph from a snapshot.
    pub fn from_snapshot(snapshot: EvidenceSnapshot) -> Self {
        let mut graph = Self::new();
        graph.restore(snapshot);
        graph
    }
}

impl std::fmt::Debug for EvidenceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
