use std::collections::HashSet;
use std::path::Path;

use nfpipe_types::{NfpipeError, Result};

use crate::ast::PipelineDocument;

/// Parse a pipeline document from JSON source.
///
/// Besides JSON well-formedness this only checks node identity: every node
/// needs a non-empty `id` and ids must be unique across all pipelines.
/// Link targets are resolved later, when a link is actually followed.
pub fn parse(input: &str) -> Result<PipelineDocument> {
    let document: PipelineDocument = serde_json::from_str(input).map_err(|e| {
        NfpipeError::Document(format!(
            "at line {}, col {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })?;

    let mut seen = HashSet::new();
    for pipeline in &document.pipelines {
        for node in &pipeline.nodes {
            if node.id.trim().is_empty() {
                return Err(NfpipeError::Document(format!(
                    "pipeline '{}' contains a node without an id",
                    pipeline.id
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(NfpipeError::Document(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
    }

    tracing::debug!(
        pipelines = document.pipelines.len(),
        nodes = seen.len(),
        "Parsed pipeline document"
    );
    Ok(document)
}

/// Read and parse a pipeline document from disk.
pub fn parse_file(path: &Path) -> Result<PipelineDocument> {
    let source = std::fs::read_to_string(path)?;
    parse(&source)
}
