//! Provenance, causal and confidence relations between artifacts and claims.

mod graph;

pub use graph::{
    task_node_id, worker_node_id, EvidenceEdge, EvidenceGraph, EvidenceNode, EvidenceRecord,
    EvidenceSnapshot, ProofReceipt, Relation, UncertaintyStats,
};
