//! Coverage export.
//!
//! A read-only snapshot of what the execution graph learned: the
//! accumulated call-site transition relation, the per-operation call-site
//! frequencies of the final iteration graph, and a fingerprint of that
//! graph. Hosts consume this at iteration end; the snapshot owns its data
//! and stays valid after the graph is cleared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::execution_graph::ExecutionGraph;
use crate::operation::OperationId;

// ---------------------------------------------------------------------------
// CoverageReport — snapshot of coverage state
// ---------------------------------------------------------------------------

/// Read-only coverage snapshot taken at iteration end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Call-site transition relation accumulated across all iterations.
    pub coverage: BTreeMap<String, BTreeSet<String>>,
    /// Per-operation call-site frequencies of the snapshotted iteration.
    pub call_site_frequencies: BTreeMap<OperationId, BTreeMap<String, u64>>,
    /// Node count of the snapshotted iteration graph.
    pub node_count: usize,
    /// Edge count of the snapshotted iteration graph.
    pub edge_count: usize,
    /// Stable fingerprint of the snapshotted iteration graph.
    pub graph_fingerprint: String,
}

impl CoverageReport {
    /// Snapshot the given graph.
    pub fn from_graph(graph: &ExecutionGraph) -> Self {
        Self {
            coverage: graph.coverage_map().clone(),
            call_site_frequencies: graph.call_site_frequencies().clone(),
            node_count: graph.len(),
            edge_count: graph.edge_count(),
            graph_fingerprint: graph.fingerprint(),
        }
    }

    /// Total number of distinct covered transitions.
    pub fn transition_count(&self) -> usize {
        self.coverage.values().map(BTreeSet::len).sum()
    }

    /// Whether the transition `source -> target` has been exercised.
    pub fn is_covered(&self, source: &str, target: &str) -> bool {
        self.coverage
            .get(source)
            .is_some_and(|targets| targets.contains(target))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ControlledOperation, OperationStatus};

    fn graph_with_visits(call_sites: &[&str]) -> ExecutionGraph {
        let mut graph = ExecutionGraph::new();
        let mut root = ControlledOperation::new(0, None, 0);
        root.set_status(OperationStatus::Enabled).expect("enable");
        for call_site in call_sites {
            root.record_visited_call_site((*call_site).to_string())
                .expect("visit");
        }
        graph.add(&root).expect("add");
        graph
    }

    // -- Snapshot contents --

    #[test]
    fn snapshot_captures_graph_state() {
        let graph = graph_with_visits(&["A", "B", "A"]);
        let report = CoverageReport::from_graph(&graph);

        assert_eq!(report.node_count, 3);
        assert_eq!(report.edge_count, 2);
        assert_eq!(report.graph_fingerprint, graph.fingerprint());
        assert_eq!(report.call_site_frequencies[&0]["A"], 2);
        assert!(report.is_covered("A", "B"));
        assert!(report.is_covered("B", "A"));
        assert_eq!(report.transition_count(), 2);
    }

    #[test]
    fn snapshot_survives_graph_clear() {
        let mut graph = graph_with_visits(&["A", "B"]);
        let report = CoverageReport::from_graph(&graph);
        graph.clear();

        assert_eq!(report.node_count, 2);
        assert!(report.is_covered("A", "B"));
        assert!(!report.is_covered("B", "A"));
    }

    #[test]
    fn empty_graph_snapshots_empty() {
        let report = CoverageReport::from_graph(&ExecutionGraph::new());
        assert_eq!(report.node_count, 0);
        assert_eq!(report.transition_count(), 0);
        assert_eq!(report.graph_fingerprint.len(), 64);
    }

    // -- Serialization --

    #[test]
    fn serde_round_trip() {
        let report = CoverageReport::from_graph(&graph_with_visits(&["A", "B"]));
        let json = serde_json::to_string(&report).expect("serialize");
        let restored: CoverageReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(report, restored);
    }
}
