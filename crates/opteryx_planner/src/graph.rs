//! Generic directed graph over string-identified nodes.
//!
//! The logical plan is a DAG, not a tree: CTEs and subqueries are inlined as
//! independent sub-DAGs, and a join node has two distinctly-labelled incoming
//! edges rather than a fixed left/right pair of child pointers. This module
//! is deliberately payload-agnostic -- `opteryx_planner::logical` is the only
//! caller, and it supplies `PlanNode` as the payload.

use std::collections::{HashMap, HashSet};

use opteryx_error::{OpteryxError, Result};

/// An edge's role, used by join nodes to distinguish their two inputs.
pub type EdgeRole = Option<String>;

#[derive(Debug, Clone)]
struct Edge {
    source: String,
    target: String,
    role: EdgeRole,
}

/// A directed graph keyed by string node identifiers.
///
/// Node identities are caller-assigned; `opteryx_planner::logical::planner`
/// mints them from a monotonic counter (see the redesign notes in the spec --
/// random identity strings are a source-language quirk we don't carry over).
#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: HashMap<String, T>,
    edges: Vec<Edge>,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Graph {
            nodes: HashMap::new(),
            edges: Vec::new(),
        }
    }
}

impl<T> Graph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>, payload: T) {
        self.nodes.insert(id.into(), payload);
    }

    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>, role: EdgeRole) {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
            role,
        });
    }

    pub fn node(&self, id: &str) -> Option<&T> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut T> {
        self.nodes.get_mut(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges pointing out of `id`, as `(source, target, role)` triples.
    pub fn outgoing_edges(&self, id: &str) -> Vec<(&str, &str, &EdgeRole)> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| (e.source.as_str(), e.target.as_str(), &e.role))
            .collect()
    }

    /// Edges pointing into `id`, as `(source, target, role)` triples.
    pub fn ingoing_edges(&self, id: &str) -> Vec<(&str, &str, &EdgeRole)> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| (e.source.as_str(), e.target.as_str(), &e.role))
            .collect()
    }

    /// Nodes with no incoming edges.
    pub fn get_entry_points(&self) -> Vec<&str> {
        let has_incoming: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .keys()
            .map(|s| s.as_str())
            .filter(|id| !has_incoming.contains(id))
            .collect()
    }

    /// Nodes with no outgoing edges.
    pub fn get_exit_points(&self) -> Vec<&str> {
        let has_outgoing: HashSet<&str> = self.edges.iter().map(|e| e.source.as_str()).collect();
        self.nodes
            .keys()
            .map(|s| s.as_str())
            .filter(|id| !has_outgoing.contains(id))
            .collect()
    }

    /// The graph's single exit node, enforcing the one-exit-point invariant.
    pub fn exit_point(&self) -> Result<&str> {
        let mut exits = self.get_exit_points();
        match exits.len() {
            1 => Ok(exits.pop().unwrap()),
            0 => Err(OpteryxError::internal("plan graph has no exit point")),
            n => Err(OpteryxError::internal(format!(
                "plan graph has {n} exit points, expected exactly 1"
            ))),
        }
    }

    /// Remove a node. If `heal`, reconnect every in-edge to every out-edge
    /// (Cartesian-style) so the graph stays connected around the hole.
    pub fn remove_node(&mut self, id: &str, heal: bool) -> Option<T> {
        let removed = self.nodes.remove(id);
        if removed.is_none() {
            return None;
        }

        let incoming: Vec<(String, EdgeRole)> = self
            .edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| (e.source.clone(), e.role.clone()))
            .collect();
        let outgoing: Vec<(String, EdgeRole)> = self
            .edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| (e.target.clone(), e.role.clone()))
            .collect();

        self.edges.retain(|e| e.source != id && e.target != id);

        if heal {
            for (source, _) in &incoming {
                for (target, role) in &outgoing {
                    self.edges.push(Edge {
                        source: source.clone(),
                        target: target.clone(),
                        role: role.clone(),
                    });
                }
            }
        }

        removed
    }

    /// Insert `new_id` as the sole predecessor of `existing_id`, taking over
    /// all of `existing_id`'s previous incoming edges.
    pub fn insert_node_before(&mut self, new_id: impl Into<String>, new_node: T, existing_id: &str) {
        let new_id = new_id.into();
        let incoming: Vec<(String, EdgeRole)> = self
            .edges
            .iter()
            .filter(|e| e.target == existing_id)
            .map(|e| (e.source.clone(), e.role.clone()))
            .collect();

        self.edges.retain(|e| e.target != existing_id);
        self.add_node(new_id.clone(), new_node);
        for (source, role) in incoming {
            self.add_edge(source, new_id.clone(), role);
        }
        self.add_edge(new_id, existing_id.to_string(), None);
    }

    /// Insert `new_id` as the sole successor of `existing_id`, taking over
    /// all of `existing_id`'s previous outgoing edges.
    pub fn insert_node_after(&mut self, new_id: impl Into<String>, new_node: T, existing_id: &str) {
        let new_id = new_id.into();
        let outgoing: Vec<(String, EdgeRole)> = self
            .edges
            .iter()
            .filter(|e| e.source == existing_id)
            .map(|e| (e.target.clone(), e.role.clone()))
            .collect();

        self.edges.retain(|e| e.source != existing_id);
        self.add_node(new_id.clone(), new_node);
        self.add_edge(existing_id.to_string(), new_id.clone(), None);
        for (target, role) in outgoing {
            self.add_edge(new_id.clone(), target, role);
        }
    }

    /// Iteratively strip exit (sink) nodes; the graph is cyclic iff any nodes
    /// remain once no more sinks can be removed.
    pub fn is_acyclic(&self) -> bool {
        let mut remaining: HashSet<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        let mut remaining_edges: Vec<(&str, &str)> =
            self.edges.iter().map(|e| (e.source.as_str(), e.target.as_str())).collect();

        loop {
            let sinks: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|id| !remaining_edges.iter().any(|(s, _)| s == id))
                .collect();

            if sinks.is_empty() {
                break;
            }

            for sink in &sinks {
                remaining.remove(sink);
            }
            remaining_edges.retain(|(s, t)| !sinks.contains(s) && !sinks.contains(t));
        }

        remaining.is_empty()
    }

    /// Post-order traversal starting from `start` (typically the exit node):
    /// every node reachable from `start` is visited once, children strictly
    /// before parents.
    pub fn post_order_from(&self, start: &str) -> Vec<&str> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.post_order_visit(start, &mut visited, &mut order);
        order
    }

    fn post_order_visit<'a>(&'a self, id: &'a str, visited: &mut HashSet<&'a str>, order: &mut Vec<&'a str>) {
        if !visited.insert(id) {
            return;
        }
        for (source, _, _) in self.ingoing_edges(id) {
            self.post_order_visit(source, visited, order);
        }
        order.push(id);
    }
}

impl<T> std::ops::AddAssign for Graph<T> {
    /// Disjoint-union: merge node and edge dictionaries. Overlapping node ids
    /// from `other` win, matching the behaviour of a dict update.
    fn add_assign(&mut self, mut other: Self) {
        for (id, node) in other.nodes.drain() {
            self.nodes.insert(id, node);
        }
        self.edges.append(&mut other.edges);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> Graph<&'static str> {
        let mut g = Graph::new();
        g.add_node("scan", "Scan");
        g.add_node("filter", "Filter");
        g.add_node("exit", "Exit");
        g.add_edge("scan", "filter", None);
        g.add_edge("filter", "exit", None);
        g
    }

    #[test]
    fn entry_and_exit_points() {
        let g = linear_graph();
        assert_eq!(g.get_entry_points(), vec!["scan"]);
        assert_eq!(g.get_exit_points(), vec!["exit"]);
        assert_eq!(g.exit_point().unwrap(), "exit");
    }

    #[test]
    fn acyclic_linear_graph() {
        assert!(linear_graph().is_acyclic());
    }

    #[test]
    fn self_loop_is_cyclic() {
        let mut g: Graph<&'static str> = Graph::new();
        g.add_node("a", "A");
        g.add_edge("a", "a", None);
        assert!(!g.is_acyclic());
    }

    #[test]
    fn two_node_cycle_is_cyclic() {
        let mut g: Graph<&'static str> = Graph::new();
        g.add_node("a", "A");
        g.add_node("b", "B");
        g.add_edge("a", "b", None);
        g.add_edge("b", "a", None);
        assert!(!g.is_acyclic());
    }

    #[test]
    fn remove_node_with_heal_reconnects_cartesian() {
        let mut g = linear_graph();
        g.remove_node("filter", true);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.outgoing_edges("scan"), vec![("scan", "exit", &None)]);
    }

    #[test]
    fn insert_node_before_rewires_incoming_edges() {
        let mut g = linear_graph();
        g.insert_node_before("pushed_filter", "PushedFilter", "filter");
        assert_eq!(g.node_count(), 4);
        let incoming = g.ingoing_edges("filter");
        assert_eq!(incoming, vec![("pushed_filter", "filter", &None)]);
    }

    #[test]
    fn post_order_visits_children_before_parents() {
        let g = linear_graph();
        assert_eq!(g.post_order_from("exit"), vec!["scan", "filter", "exit"]);
    }

    #[test]
    fn disjoint_union_merges_nodes_and_edges() {
        let mut a: Graph<&'static str> = Graph::new();
        a.add_node("x", "X");
        let mut b: Graph<&'static str> = Graph::new();
        b.add_node("y", "Y");
        b.add_edge("x", "y", None);

        a += b;
        assert_eq!(a.node_count(), 2);
        assert_eq!(a.outgoing_edges("x"), vec![("x", "y", &None)]);
    }
}
