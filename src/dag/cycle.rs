//! Cycle detection and topological sort for [`super::Dag`].
//!
//! Cycle detection uses depth-first traversal with tri-coloring: white
//! (unvisited), gray (on the current DFS stack), black (finished). A
//! back-edge to a gray node means a cycle; it is reconstructed by
//! walking the DFS stack back to that node (§4.4).

use std::collections::HashMap;

use super::{DagEdge, NodeId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn adjacency(edges: &[DagEdge]) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for e in edges {
        adj.entry(e.from).or_default().push(e.to);
    }
    adj
}

pub fn detect(order: &[NodeId], edges: &[DagEdge]) -> Option<Vec<NodeId>> {
    let adj = adjacency(edges);
    let mut color: HashMap<NodeId, Color> = order.iter().map(|id| (*id, Color::White)).collect();
    let mut stack: Vec<NodeId> = Vec::new();

    fn visit(
        node: NodeId,
        adj: &HashMap<NodeId, Vec<NodeId>>,
        color: &mut HashMap<NodeId, Color>,
        stack: &mut Vec<NodeId>,
    ) -> Option<Vec<NodeId>> {
        color.insert(node, Color::Gray);
        stack.push(node);

        if let Some(neighbors) = adj.get(&node) {
            for &next in neighbors {
                match color.get(&next).copied().unwrap_or(Color::White) {
                    Color::White => {
                        if let Some(cycle) = visit(next, adj, color, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Gray => {
                        let start = stack.iter().position(|id| *id == next).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    for &start in order {
        if color.get(&start).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = visit(start, &adj, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Kahn's algorithm producing an execution order where, for every edge
/// consumer -> producer, the producer appears first — the order the
/// Code Emitter calls node functions in (§4.9), not the raw DFS order
/// of the stored consumer->producer edges.
pub fn topological_sort(order: &[NodeId], edges: &[DagEdge]) -> crate::error::Result<Vec<NodeId>> {
    if let Some(cycle) = detect(order, edges) {
        return Err(crate::error::Error::circular_dependencies(cycle));
    }

    // Precedence pairs: (producer, consumer) — producer must precede consumer.
    let mut out_edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut in_degree: HashMap<NodeId, usize> = order.iter().map(|id| (*id, 0)).collect();
    for e in edges {
        out_edges.entry(e.to).or_default().push(e.from);
        *in_degree.entry(e.from).or_insert(0) += 1;
    }

    let mut ready: Vec<NodeId> = order
        .iter()
        .copied()
        .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
        .collect();
    let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut result = Vec::with_capacity(order.len());
    while !ready.is_empty() {
        ready.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        let next = ready.remove(0);
        result.push(next);
        if let Some(consumers) = out_edges.get(&next) {
            for &consumer in consumers {
                if let Some(deg) = in_degree.get_mut(&consumer) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(consumer);
                    }
                }
            }
        }
    }

    Ok(result)
}
