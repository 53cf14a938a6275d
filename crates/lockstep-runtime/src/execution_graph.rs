//! Execution graph recorder.
//!
//! An append-only causal DAG over operations and call sites, rebuilt every
//! iteration. Each `add` call appends a burst of nodes for the call sites
//! an operation visited since its previous scheduling point, wires the
//! burst into the prior graph with creation/step edges, and feeds the
//! run-wide coverage map of call-site transitions. Nodes live in a flat
//! arena and refer to each other by index, so the whole graph serializes
//! without back-pointer cycles.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::operation::{ControlledOperation, OperationId};

/// Index of a node in the graph arena. Also its total-order position.
pub type NodeIndex = u32;

/// Call site recorded for the root operation before it visits anything.
pub const ROOT_CALL_SITE: &str = "Test";

// ---------------------------------------------------------------------------
// EdgeCategory — causal meaning of an edge
// ---------------------------------------------------------------------------

/// Causal category of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeCategory {
    /// From the spawner's last node to the first node of a new operation.
    Creation,
    /// Between consecutive nodes of one operation within a single burst.
    Invocation,
    /// From an operation's previous last node to its next burst.
    Step,
}

impl fmt::Display for EdgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creation => write!(f, "creation"),
            Self::Invocation => write!(f, "invocation"),
            Self::Step => write!(f, "step"),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge and Node — arena entries
// ---------------------------------------------------------------------------

/// Directed edge between two nodes, stored by arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub category: EdgeCategory,
}

/// One recorded call-site visit of one operation.
///
/// `in_edge` is advisory: it keeps the most recent attachment and may be
/// overwritten by later adds. Causal reconstruction uses `out_edges`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub index: NodeIndex,
    pub operation: OperationId,
    pub sequence_id: u64,
    pub call_site: String,
    pub hashed_program_state: i32,
    pub in_edge: Option<Edge>,
    pub out_edges: Vec<Edge>,
}

// ---------------------------------------------------------------------------
// AddedBurst — what one add call appended
// ---------------------------------------------------------------------------

/// Summary of one `add` call: the appended node indices in visitation
/// order and every edge wired in, for the caller to log or inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedBurst {
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<Edge>,
}

impl AddedBurst {
    /// First node of the burst.
    pub fn first_node(&self) -> Option<NodeIndex> {
        self.nodes.first().copied()
    }

    /// Last node of the burst.
    pub fn last_node(&self) -> Option<NodeIndex> {
        self.nodes.last().copied()
    }
}

// ---------------------------------------------------------------------------
// ExecutionGraph — arena, per-operation maps, coverage
// ---------------------------------------------------------------------------

/// Causal execution graph for one iteration, plus the coverage map that
/// survives across iterations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    nodes: Vec<Node>,
    first_node_for_op: BTreeMap<OperationId, NodeIndex>,
    last_node_for_op: BTreeMap<OperationId, NodeIndex>,
    last_visited_call_site_index: BTreeMap<OperationId, usize>,
    call_site_frequencies: BTreeMap<OperationId, BTreeMap<String, u64>>,
    /// Call-site transition relation, accumulated across all iterations.
    coverage_map: BTreeMap<String, BTreeSet<String>>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scheduling point `op` just reached.
    ///
    /// Appends one node per call site visited since the previous `add` for
    /// this operation, connected by invocation edges. When nothing new was
    /// visited, a single node is synthesized from the operation's most
    /// recent call site, the root sentinel, or the parent's last node.
    /// The burst is attached to the prior graph with a creation edge on
    /// first sighting and a step edge afterwards.
    pub fn add(&mut self, op: &ControlledOperation) -> Result<AddedBurst, RuntimeError> {
        self.call_site_frequencies.entry(op.id()).or_default();

        let graph_was_empty = self.nodes.is_empty();
        let prior_last = self.last_node_for_op.get(&op.id()).copied();

        let visited = op.visited_call_sites();
        let consumed = self
            .last_visited_call_site_index
            .get(&op.id())
            .copied()
            .unwrap_or(0)
            .min(visited.len());
        let mut burst_sites: Vec<String> = visited[consumed..].to_vec();
        let consumed_new_sites = !burst_sites.is_empty();

        if !consumed_new_sites {
            burst_sites.push(self.fallback_call_site(op)?);
        }

        // Append the burst, wiring invocation edges in visitation order.
        let first_new = self.nodes.len() as NodeIndex;
        let mut burst = AddedBurst::default();
        for (offset, call_site) in burst_sites.iter().enumerate() {
            let index = first_new + offset as NodeIndex;
            self.nodes.push(Node {
                index,
                operation: op.id(),
                sequence_id: op.sequence_id(),
                call_site: call_site.clone(),
                hashed_program_state: op.last_hashed_program_state(),
                in_edge: None,
                out_edges: Vec::new(),
            });
            burst.nodes.push(index);
            if offset > 0 {
                let edge = self.attach(index - 1, index, EdgeCategory::Invocation);
                burst.edges.push(edge);
            }
        }

        // Attach the burst to the prior graph.
        if !graph_was_empty {
            let edge = match prior_last {
                Some(previous) => self.attach(previous, first_new, EdgeCategory::Step),
                None => {
                    let parent_last = self.parent_last_node(op)?;
                    self.attach(parent_last, first_new, EdgeCategory::Creation)
                }
            };
            burst.edges.push(edge);
        }

        let last_new = first_new + (burst_sites.len() - 1) as NodeIndex;
        self.first_node_for_op.entry(op.id()).or_insert(first_new);
        self.last_node_for_op.insert(op.id(), last_new);
        if consumed_new_sites {
            self.last_visited_call_site_index
                .insert(op.id(), visited.len());
        }

        let frequencies = self.call_site_frequencies.entry(op.id()).or_default();
        for call_site in &burst_sites {
            *frequencies.entry(call_site.clone()).or_insert(0) += 1;
        }

        Ok(burst)
    }

    /// Reset all per-iteration state. The coverage map persists.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.first_node_for_op.clear();
        self.last_node_for_op.clear();
        self.last_visited_call_site_index.clear();
        self.call_site_frequencies.clear();
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    /// Nodes in total (append) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of edges wired into the current iteration's graph.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.out_edges.len()).sum()
    }

    /// First recorded node of an operation this iteration.
    pub fn first_node_for_op(&self, id: OperationId) -> Option<&Node> {
        self.first_node_for_op
            .get(&id)
            .and_then(|&index| self.node(index))
    }

    /// Most recent node of an operation this iteration.
    pub fn last_node_for_op(&self, id: OperationId) -> Option<&Node> {
        self.last_node_for_op
            .get(&id)
            .and_then(|&index| self.node(index))
    }

    /// How often an operation has visited a call site this iteration.
    pub fn call_site_frequency(&self, id: OperationId, call_site: &str) -> u64 {
        self.call_site_frequencies
            .get(&id)
            .and_then(|frequencies| frequencies.get(call_site))
            .copied()
            .unwrap_or(0)
    }

    /// Least-visited call site of an operation. Ties resolve to the
    /// lexicographically smallest call site.
    pub fn lowest_call_site_frequency_for_operation(&self, id: OperationId) -> Option<&str> {
        self.extreme_call_site(id, |candidate, best| candidate < best)
    }

    /// Most-visited call site of an operation. Ties resolve to the
    /// lexicographically smallest call site.
    pub fn highest_call_site_frequency_for_operation(&self, id: OperationId) -> Option<&str> {
        self.extreme_call_site(id, |candidate, best| candidate > best)
    }

    /// Per-operation call-site frequencies for this iteration.
    pub fn call_site_frequencies(&self) -> &BTreeMap<OperationId, BTreeMap<String, u64>> {
        &self.call_site_frequencies
    }

    /// The accumulated call-site transition relation.
    pub fn coverage_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.coverage_map
    }

    /// Whether the transition `source -> target` has been exercised.
    pub fn is_transition_covered(&self, source: &str, target: &str) -> bool {
        self.coverage_map
            .get(source)
            .is_some_and(|targets| targets.contains(target))
    }

    /// Stable hex fingerprint of this iteration's nodes and edges.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.index.to_be_bytes());
            hasher.update(node.operation.to_be_bytes());
            hasher.update(node.sequence_id.to_be_bytes());
            hasher.update(node.call_site.as_bytes());
            hasher.update(node.hashed_program_state.to_be_bytes());
            for edge in &node.out_edges {
                hasher.update(edge.source.to_be_bytes());
                hasher.update(edge.target.to_be_bytes());
                hasher.update(edge.category.to_string().as_bytes());
            }
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Wire `source -> target`, keep `target.in_edge` advisory
    /// (last writer wins), and feed the coverage map.
    fn attach(&mut self, source: NodeIndex, target: NodeIndex, category: EdgeCategory) -> Edge {
        let edge = Edge {
            source,
            target,
            category,
        };
        self.nodes[source as usize].out_edges.push(edge);
        self.nodes[target as usize].in_edge = Some(edge);

        let source_site = self.nodes[source as usize].call_site.clone();
        let target_site = self.nodes[target as usize].call_site.clone();
        let covered = matches!(category, EdgeCategory::Creation | EdgeCategory::Invocation)
            || source_site != target_site;
        if covered {
            self.coverage_map
                .entry(source_site)
                .or_default()
                .insert(target_site);
        }
        edge
    }

    fn fallback_call_site(&self, op: &ControlledOperation) -> Result<String, RuntimeError> {
        if let Some(call_site) = op.visited_call_sites().last() {
            return Ok(call_site.clone());
        }
        if op.is_root() {
            return Ok(ROOT_CALL_SITE.to_string());
        }
        let parent_last = self.parent_last_node(op)?;
        Ok(self.nodes[parent_last as usize].call_site.clone())
    }

    fn parent_last_node(&self, op: &ControlledOperation) -> Result<NodeIndex, RuntimeError> {
        let parent = op.parent_id().ok_or(RuntimeError::MissingParentNode {
            operation: op.id(),
        })?;
        self.last_node_for_op
            .get(&parent)
            .copied()
            .ok_or(RuntimeError::MissingParentNode {
                operation: op.id(),
            })
    }

    fn extreme_call_site(
        &self,
        id: OperationId,
        better: impl Fn(u64, u64) -> bool,
    ) -> Option<&str> {
        let frequencies = self.call_site_frequencies.get(&id)?;
        let mut best: Option<(&str, u64)> = None;
        for (call_site, &count) in frequencies {
            // Map order is lexicographic, so the first extremum seen is
            // already the smallest call site among ties.
            let replace = match best {
                None => true,
                Some((_, best_count)) => better(count, best_count),
            };
            if replace {
                best = Some((call_site.as_str(), count));
            }
        }
        best.map(|(call_site, _)| call_site)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationStatus;
    use crate::scheduling_point::SchedulingPoint;

    fn root_op() -> ControlledOperation {
        let mut root = ControlledOperation::new(0, None, 0);
        root.set_status(OperationStatus::Enabled).expect("enable");
        root
    }

    fn child_op(id: OperationId, parent: OperationId) -> ControlledOperation {
        let mut child = ControlledOperation::new(id, Some(parent), id);
        child.set_status(OperationStatus::Enabled).expect("enable");
        child
    }

    fn visit(op: &mut ControlledOperation, call_sites: &[&str]) {
        for call_site in call_sites {
            op.record_visited_call_site((*call_site).to_string())
                .expect("visit");
        }
    }

    // -- Empty bursts and fallbacks --

    #[test]
    fn root_with_no_visits_synthesizes_test_node() {
        let mut graph = ExecutionGraph::new();
        let root = root_op();

        let burst = graph.add(&root).expect("add");
        assert_eq!(burst.nodes, vec![0]);
        assert!(burst.edges.is_empty());
        assert_eq!(graph.node(0).expect("node").call_site, ROOT_CALL_SITE);
        assert_eq!(graph.call_site_frequency(0, ROOT_CALL_SITE), 1);
    }

    #[test]
    fn child_with_no_visits_inherits_parent_call_site() {
        let mut graph = ExecutionGraph::new();
        let root = root_op();
        graph.add(&root).expect("add root");

        let child = child_op(1, 0);
        let burst = graph.add(&child).expect("add child");

        assert_eq!(burst.nodes, vec![1]);
        let node = graph.node(1).expect("node");
        assert_eq!(node.call_site, ROOT_CALL_SITE);
        let in_edge = node.in_edge.expect("in edge");
        assert_eq!(in_edge.category, EdgeCategory::Creation);
        assert_eq!(in_edge.source, 0);
        assert!(graph.is_transition_covered(ROOT_CALL_SITE, ROOT_CALL_SITE));
    }

    #[test]
    fn empty_burst_repeats_most_recent_call_site() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A"]);
        graph.add(&root).expect("first add");

        let burst = graph.add(&root).expect("second add");
        let node = graph.node(burst.nodes[0]).expect("node");
        assert_eq!(node.call_site, "A");
        let in_edge = node.in_edge.expect("in edge");
        assert_eq!(in_edge.category, EdgeCategory::Step);
        // A step edge between identical call sites is not coverage.
        assert!(!graph.is_transition_covered("A", "A"));
        assert_eq!(graph.call_site_frequency(0, "A"), 2);
    }

    #[test]
    fn orphan_child_is_a_graph_invariant_violation() {
        let mut graph = ExecutionGraph::new();
        let root = root_op();
        graph.add(&root).expect("add root");

        let orphan = child_op(5, 4);
        assert_eq!(
            graph.add(&orphan).unwrap_err(),
            RuntimeError::MissingParentNode { operation: 5 }
        );
    }

    // -- Bursts, invocation edges, frequencies --

    #[test]
    fn burst_wires_invocation_edges_in_visitation_order() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B", "A", "C"]);

        let burst = graph.add(&root).expect("add");
        assert_eq!(burst.nodes, vec![0, 1, 2, 3]);
        assert_eq!(graph.len(), 4);

        let categories: Vec<EdgeCategory> =
            burst.edges.iter().map(|edge| edge.category).collect();
        assert_eq!(
            categories,
            vec![
                EdgeCategory::Invocation,
                EdgeCategory::Invocation,
                EdgeCategory::Invocation
            ]
        );

        assert!(graph.is_transition_covered("A", "B"));
        assert!(graph.is_transition_covered("B", "A"));
        assert!(graph.is_transition_covered("A", "C"));
        assert!(!graph.is_transition_covered("C", "A"));

        assert_eq!(graph.call_site_frequency(0, "A"), 2);
        assert_eq!(graph.call_site_frequency(0, "B"), 1);
        assert_eq!(graph.call_site_frequency(0, "C"), 1);
    }

    #[test]
    fn frequency_extremes_pin_lexicographic_tie_break() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B", "A", "C"]);
        graph.add(&root).expect("add");

        // B and C tie at 1; B is lexicographically smaller.
        assert_eq!(graph.lowest_call_site_frequency_for_operation(0), Some("B"));
        assert_eq!(graph.highest_call_site_frequency_for_operation(0), Some("A"));
        assert_eq!(graph.lowest_call_site_frequency_for_operation(9), None);
    }

    #[test]
    fn step_edge_connects_consecutive_bursts() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B"]);
        graph.add(&root).expect("first add");

        visit(&mut root, &["C"]);
        let burst = graph.add(&root).expect("second add");

        assert_eq!(burst.nodes, vec![2]);
        assert_eq!(burst.first_node(), Some(2));
        assert_eq!(burst.last_node(), Some(2));
        let step = burst.edges[0];
        assert_eq!(step.category, EdgeCategory::Step);
        assert_eq!(step.source, 1);
        assert_eq!(step.target, 2);
        assert!(graph.is_transition_covered("B", "C"));
        assert_eq!(graph.last_node_for_op(0).expect("last").call_site, "C");
    }

    #[test]
    fn first_sighting_of_child_gets_creation_edge_from_parent() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["Test"]);
        graph.add(&root).expect("add root");

        let mut child = child_op(1, 0);
        visit(&mut child, &["Worker::run"]);
        let burst = graph.add(&child).expect("add child");

        let creation = burst.edges[0];
        assert_eq!(creation.category, EdgeCategory::Creation);
        assert_eq!(creation.source, graph.last_node_for_op(0).expect("root").index);
        assert_eq!(
            graph.first_node_for_op(1).expect("first").in_edge,
            Some(creation)
        );
        assert!(graph.is_transition_covered("Test", "Worker::run"));
    }

    #[test]
    fn node_count_matches_recorded_events() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A"]);
        graph.add(&root).expect("add");
        graph.add(&root).expect("add");

        let mut child = child_op(1, 0);
        visit(&mut child, &["B", "C"]);
        graph.add(&child).expect("add");

        // Two adds for the root (1 + 1 synthesized) and one burst of two.
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.first_node_for_op(0).expect("first").index, 0);
        assert_eq!(graph.last_node_for_op(1).expect("last").call_site, "C");
    }

    #[test]
    fn in_edge_keeps_last_attachment() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A"]);
        graph.add(&root).expect("add root");

        // Two children sighted back to back; the root node's out edges
        // accumulate while each child keeps its own in edge.
        let child_one = child_op(1, 0);
        let child_two = child_op(2, 0);
        graph.add(&child_one).expect("add first child");
        graph.add(&child_two).expect("add second child");

        let root_node = graph.node(0).expect("root node");
        assert_eq!(root_node.out_edges.len(), 2);
        assert!(
            root_node
                .out_edges
                .iter()
                .all(|edge| edge.category == EdgeCategory::Creation)
        );
        assert_eq!(graph.node(1).expect("node").in_edge.map(|e| e.source), Some(0));
        assert_eq!(graph.node(2).expect("node").in_edge.map(|e| e.source), Some(0));
    }

    // -- Clear and persistence --

    #[test]
    fn clear_keeps_coverage_only() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B"]);
        graph.add(&root).expect("add");
        assert!(graph.is_transition_covered("A", "B"));

        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.first_node_for_op(0), None);
        assert_eq!(graph.call_site_frequency(0, "A"), 0);
        assert!(graph.is_transition_covered("A", "B"));
    }

    #[test]
    fn cleared_graph_restarts_burst_tracking() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B"]);
        graph.add(&root).expect("add");
        graph.clear();

        // A fresh iteration's root revisits its call sites from scratch.
        let mut next_root = root_op();
        visit(&mut next_root, &["A"]);
        let burst = graph.add(&next_root).expect("add");
        assert_eq!(burst.nodes, vec![0]);
        assert_eq!(graph.call_site_frequency(0, "A"), 1);
    }

    // -- Fingerprint --

    #[test]
    fn fingerprint_is_stable_and_shape_sensitive() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B"]);
        graph.add(&root).expect("add");
        let first = graph.fingerprint();
        assert_eq!(first.len(), 64);
        assert_eq!(first, graph.fingerprint());

        let mut other = ExecutionGraph::new();
        let mut other_root = root_op();
        visit(&mut other_root, &["B", "A"]);
        other.add(&other_root).expect("add");
        assert_ne!(first, other.fingerprint());
    }

    // -- Serialization --

    #[test]
    fn serde_round_trip() {
        let mut graph = ExecutionGraph::new();
        let mut root = root_op();
        visit(&mut root, &["A", "B"]);
        graph.add(&root).expect("add");

        let json = serde_json::to_string(&graph).expect("serialize");
        let restored: ExecutionGraph = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(graph, restored);
    }
}
