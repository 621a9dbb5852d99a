//! Execution order: depth-first post-order over upstream links.
//!
//! Every execution node is a traversal root, taken in document order. Before a
//! node is emitted all nodes it links to (on any port) are emitted first, so
//! the result is a topological order of the link graph. Nodes are colored
//! white (unseen), gray (on the current path) or black (emitted); meeting a
//! gray node again means the graph has a cycle.

use std::collections::HashMap;

use nfpipe_document::NodeDef;
use nfpipe_types::{NfpipeError, Result};

use crate::graph::PipelineGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// One frame of the explicit traversal stack: a node and the index of the
/// next link to follow.
struct Frame<'g> {
    node: &'g NodeDef,
    next_link: usize,
}

pub fn resolve_execution_order(graph: &PipelineGraph) -> Result<Vec<&NodeDef>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order = Vec::new();

    for root in graph.execution_nodes() {
        if marks.contains_key(root.id.as_str()) {
            continue;
        }
        visit(graph, root, &mut marks, &mut order)?;
    }

    tracing::debug!(
        steps = order.len(),
        order = ?order.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        "Resolved execution order"
    );
    Ok(order)
}

fn visit<'g>(
    graph: &'g PipelineGraph,
    root: &'g NodeDef,
    marks: &mut HashMap<&'g str, Mark>,
    order: &mut Vec<&'g NodeDef>,
) -> Result<()> {
    let mut stack = vec![Frame {
        node: root,
        next_link: 0,
    }];
    marks.insert(root.id.as_str(), Mark::InProgress);

    while let Some(frame) = stack.last_mut() {
        let node = frame.node;
        let link = node.links().nth(frame.next_link);
        frame.next_link += 1;

        let Some(link) = link else {
            // All upstream nodes are emitted.
            marks.insert(node.id.as_str(), Mark::Done);
            order.push(node);
            stack.pop();
            continue;
        };

        let upstream = graph.resolve_link(node, link)?;
        match marks.get(upstream.id.as_str()) {
            Some(Mark::Done) => {}
            Some(Mark::InProgress) => {
                let start = stack
                    .iter()
                    .position(|f| f.node.id == upstream.id)
                    .unwrap_or(0);
                let mut path: Vec<&str> = stack[start..].iter().map(|f| f.node.id.as_str()).collect();
                path.push(upstream.id.as_str());
                return Err(NfpipeError::CyclicGraph {
                    node_id: upstream.id.clone(),
                    path: path.join(" -> "),
                });
            }
            None => {
                marks.insert(upstream.id.as_str(), Mark::InProgress);
                stack.push(Frame {
                    node: upstream,
                    next_link: 0,
                });
            }
        }
    }
    Ok(())
}
