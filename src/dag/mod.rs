//! The dependency DAG (§4.4): a typed directed acyclic graph of
//! request, cookie, and not-found nodes.
//!
//! Node-to-node relationships are always opaque id lookups, never
//! direct references (§9 design note) — this makes snapshotting,
//! rollback, and cache round-trips trivial, and is the same shape this
//! crate uses for its other id-addressed graph-like structures.

mod cycle;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::RequestRecord;
use crate::params::{BootstrapSource, ClassifiedParameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged-variant discriminator (§9 design note): callers switch on
/// this and never inspect fields that don't belong to the active case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Request(RequestRecord),
    /// A request marked as the target action. At most one per workflow
    /// group (enforced by [`Dag::add_node`]).
    MasterRequest(RequestRecord),
    Cookie { name: String, value: String },
    NotFound,
}

impl NodeKind {
    pub fn is_master(&self) -> bool {
        matches!(self, NodeKind::MasterRequest(_))
    }

    pub fn request(&self) -> Option<&RequestRecord> {
        match self {
            NodeKind::Request(r) | NodeKind::MasterRequest(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub dynamic_parts: Vec<String>,
    pub extracted_parts: Vec<String>,
    pub input_variables: HashMap<String, String>,
    pub classified_parameters: Option<Vec<ClassifiedParameter>>,
    pub bootstrap_source: Option<BootstrapSource>,
    pub group_id: Option<crate::ids::GroupId>,
}

impl DagNode {
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, NodeKind::NotFound)
    }

    pub fn is_resolved(&self) -> bool {
        self.dynamic_parts.is_empty()
    }

    /// Merge freshly classified parameters in by (name, value) key,
    /// preserving prior entries rather than replacing the list (§9 open
    /// question: reclassification is additive for audit history).
    pub fn merge_classified_parameters(&mut self, fresh: Vec<ClassifiedParameter>) {
        let existing = self.classified_parameters.get_or_insert_with(Vec::new);
        for param in fresh {
            if !existing.iter().any(|p| p.key() == param.key()) {
                existing.push(param);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dag {
    nodes: HashMap<NodeId, DagNode>,
    /// Insertion order, for deterministic iteration independent of the
    /// hash map's.
    order: Vec<NodeId>,
    edges: Vec<DagEdge>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        kind: NodeKind,
        group_id: Option<crate::ids::GroupId>,
    ) -> Result<NodeId> {
        if kind.is_master() {
            if let Some(group_id) = group_id {
                if self.nodes_by_group(group_id).iter().any(|n| n.kind.is_master()) {
                    return Err(Error::Internal(
                        "workflow group already has a master node".to_string(),
                    ));
                }
            }
        }
        let id = NodeId::new();
        let node = DagNode {
            id,
            kind,
            dynamic_parts: Vec::new(),
            extracted_parts: Vec::new(),
            input_variables: HashMap::new(),
            classified_parameters: None,
            bootstrap_source: None,
            group_id,
        };
        self.nodes.insert(id, node);
        self.order.push(id);
        Ok(id)
    }

    pub fn update_node(&mut self, id: NodeId, f: impl FnOnce(&mut DagNode)) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        f(node);
        Ok(())
    }

    pub fn get_node(&self, id: NodeId) -> Result<&DagNode> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound(id))
    }

    /// Add an edge consumer -> producer, provisionally applying it then
    /// checking for cycles; on a cycle the edge is rolled back and a
    /// `circular-dependencies` failure is returned (§4.4).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&from) {
            return Err(Error::NodeNotFound(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(Error::NodeNotFound(to));
        }
        self.edges.push(DagEdge { from, to });
        if let Some(cycle) = cycle::detect(&self.order, &self.edges) {
            self.edges.pop();
            return Err(Error::circular_dependencies(cycle));
        }
        Ok(())
    }

    pub fn detect_cycles(&self) -> Option<Vec<NodeId>> {
        cycle::detect(&self.order, &self.edges)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn all_nodes(&self) -> Vec<&DagNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    pub fn edges(&self) -> &[DagEdge] {
        &self.edges
    }

    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        cycle::topological_sort(&self.order, &self.edges)
    }

    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges.iter().filter(|e| e.to == id).map(|e| e.from).collect()
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges.iter().filter(|e| e.from == id).map(|e| e.to).collect()
    }

    /// True iff every node has empty dynamic parts and there are no
    /// `not-found` nodes (§4.4, testable property 3).
    pub fn is_complete(&self) -> bool {
        self.all_nodes()
            .iter()
            .all(|n| n.dynamic_parts.is_empty() && !n.is_not_found())
    }

    pub fn unresolved_nodes(&self) -> Vec<(NodeId, Vec<String>)> {
        self.all_nodes()
            .iter()
            .filter(|n| !n.dynamic_parts.is_empty() || n.is_not_found())
            .map(|n| (n.id, n.dynamic_parts.clone()))
            .collect()
    }

    /// Match on (method, scheme, host, path, sorted query-key set); ties
    /// broken by overlap of query-key values, then header overlap
    /// (§4.4).
    pub fn find_node_by_request(&self, req: &RequestRecord) -> Option<NodeId> {
        let mut req_keys: Vec<_> = req.query_params().into_iter().map(|(k, _)| k).collect();
        req_keys.sort();

        let mut candidates: Vec<(&DagNode, usize, usize)> = self
            .all_nodes()
            .into_iter()
            .filter_map(|node| {
                let existing = node.kind.request()?;
                if !existing.method.eq_ignore_ascii_case(&req.method)
                    || existing.url.scheme() != req.url.scheme()
                    || existing.url.host_str() != req.url.host_str()
                    || existing.url.path() != req.url.path()
                {
                    return None;
                }
                let mut existing_keys: Vec<_> = existing.query_params().into_iter().map(|(k, _)| k).collect();
                existing_keys.sort();
                if existing_keys != req_keys {
                    return None;
                }

                let existing_values: std::collections::HashSet<_> =
                    existing.query_params().into_iter().map(|(_, v)| v).collect();
                let req_values: std::collections::HashSet<_> =
                    req.query_params().into_iter().map(|(_, v)| v).collect();
                let value_overlap = existing_values.intersection(&req_values).count();

                let existing_headers: std::collections::HashSet<_> =
                    existing.headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.clone())).collect();
                let req_headers: std::collections::HashSet<_> =
                    req.headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.clone())).collect();
                let header_overlap = existing_headers.intersection(&req_headers).count();

                Some((node, value_overlap, header_overlap))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
        candidates.first().map(|(node, ..)| node.id)
    }

    pub fn nodes_by_group(&self, group_id: crate::ids::GroupId) -> Vec<&DagNode> {
        self.all_nodes()
            .into_iter()
            .filter(|n| n.group_id == Some(group_id))
            .collect()
    }

    pub fn node_group(&self, id: NodeId) -> Result<Option<crate::ids::GroupId>> {
        Ok(self.get_node(id)?.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use url::Url;

    fn req(url: &str) -> RequestRecord {
        RequestRecord {
            method: "GET".into(),
            url: Url::parse(url).unwrap(),
            headers: vec![],
            body: None,
            response: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_edge_that_would_close_a_cycle() {
        let mut dag = Dag::new();
        let a = dag.add_node(NodeKind::Request(req("https://svc/a")), None).unwrap();
        let b = dag.add_node(NodeKind::Request(req("https://svc/b")), None).unwrap();
        dag.add_edge(a, b).unwrap();
        let err = dag.add_edge(b, a).unwrap_err();
        assert!(matches!(err, Error::CircularDependencies { .. }));
        // no mutation visible after the failed call
        assert!(dag.successors(b).is_empty());
    }

    #[test]
    fn is_complete_requires_no_not_found_nodes() {
        let mut dag = Dag::new();
        let a = dag.add_node(NodeKind::NotFound, None).unwrap();
        assert!(!dag.is_complete());
        dag.update_node(a, |_| {}).unwrap();
        assert!(!dag.is_complete());
    }

    #[test]
    fn topological_sort_respects_edges() {
        let mut dag = Dag::new();
        let a = dag.add_node(NodeKind::Request(req("https://svc/a")), None).unwrap();
        let b = dag.add_node(NodeKind::Request(req("https://svc/b")), None).unwrap();
        dag.add_edge(a, b).unwrap();
        let order = dag.topological_sort().unwrap();
        let pos_a = order.iter().position(|id| *id == a).unwrap();
        let pos_b = order.iter().position(|id| *id == b).unwrap();
        assert!(pos_b < pos_a, "producer b must come before consumer a");
    }

    #[test]
    fn only_one_master_node_per_group() {
        let mut dag = Dag::new();
        let group = crate::ids::GroupId::new();
        dag.add_node(NodeKind::MasterRequest(req("https://svc/a")), Some(group))
            .unwrap();
        let err = dag
            .add_node(NodeKind::MasterRequest(req("https://svc/b")), Some(group))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
