use std::collections::{HashMap, HashSet};

use nfpipe_document::{LinkDef, NodeDef, PipelineDocument};
use nfpipe_types::{NfpipeError, Result};

/// Port id that marks a link as carrying the upstream node's outputs.
pub const OUTPUT_PORT: &str = "outPort";

/// Immutable, id-indexed view over every node of a pipeline document.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    /// Nodes flattened across pipelines, in document order.
    nodes: Vec<NodeDef>,
    index: HashMap<String, usize>,
    /// Maps node id to the ids of nodes that link to it, in document order.
    downstream: HashMap<String, Vec<String>>,
    output_port: String,
}

impl PipelineGraph {
    pub fn from_document(document: PipelineDocument) -> Self {
        Self::with_output_port(document, OUTPUT_PORT)
    }

    pub fn with_output_port(document: PipelineDocument, output_port: impl Into<String>) -> Self {
        let nodes: Vec<NodeDef> = document
            .pipelines
            .into_iter()
            .flat_map(|pipeline| pipeline.nodes)
            .collect();

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();

        let mut downstream: HashMap<String, Vec<String>> = HashMap::new();
        for node in &nodes {
            for link in node.links() {
                let consumers = downstream.entry(link.node_id_ref.clone()).or_default();
                if !consumers.contains(&node.id) {
                    consumers.push(node.id.clone());
                }
            }
        }

        PipelineGraph {
            nodes,
            index,
            downstream,
            output_port: output_port.into(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.iter()
    }

    pub fn execution_nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.iter().filter(|n| n.is_execution())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn output_port(&self) -> &str {
        &self.output_port
    }

    /// Ids of nodes that link to `id`.
    pub fn downstream_ids(&self, id: &str) -> &[String] {
        self.downstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Follow a link of `from` to the node it references.
    pub fn resolve_link(&self, from: &NodeDef, link: &LinkDef) -> Result<&NodeDef> {
        self.node(&link.node_id_ref)
            .ok_or_else(|| NfpipeError::DanglingReference {
                node_id: from.id.clone(),
                missing_id: link.node_id_ref.clone(),
            })
    }

    /// Whether a link carries data, i.e. leaves the upstream node's output port.
    pub fn is_data_link(&self, link: &LinkDef) -> bool {
        link.port_id_ref.as_deref() == Some(self.output_port.as_str())
    }

    /// Upstream nodes feeding `node` through data links, deduplicated, in
    /// link order.
    pub fn data_upstream(&self, node: &NodeDef) -> Result<Vec<&NodeDef>> {
        let mut seen = HashSet::new();
        let mut upstream = Vec::new();
        for link in node.links().filter(|l| self.is_data_link(l)) {
            let from = self.resolve_link(node, link)?;
            if seen.insert(from.id.as_str()) {
                upstream.push(from);
            }
        }
        Ok(upstream)
    }
}
