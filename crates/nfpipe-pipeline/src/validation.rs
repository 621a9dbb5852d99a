//! Pipeline validation: lint rules and diagnostics.
//!
//! Provides 7 built-in rules that check a [`PipelineGraph`] before any file is
//! generated. Call [`validate`] for advisory diagnostics or
//! [`validate_or_raise`] to fail on `Error`-severity issues.

use std::collections::BTreeMap;

use nfpipe_document::{NodeDef, NodeOperator};
use nfpipe_types::NfpipeError;

use crate::binding::{producers_of, UpstreamCandidate};
use crate::graph::PipelineGraph;
use crate::naming::NodeName;
use crate::order::resolve_execution_order;

/// Minimum length of an inline environment YAML for it to be provisioned.
pub const MIN_ENVIRONMENT_YAML_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

impl Diagnostic {
    fn new(rule: &str, severity: Severity, message: String) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message,
            node_id: None,
            fix: None,
        }
    }

    fn at(mut self, node: &NodeDef) -> Self {
        self.node_id = Some(node.id.clone());
        self
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic>;
}

/// Whether a node will be provisioned from its inline environment YAML.
pub fn has_environment_yaml(node: &NodeDef) -> bool {
    node.app_data.environment_yaml.len() > MIN_ENVIRONMENT_YAML_LEN
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct DanglingReferenceRule;
impl LintRule for DanglingReferenceRule {
    fn name(&self) -> &str { "dangling_reference" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .flat_map(move |node| {
                node.links()
                    .filter(move |link| graph.node(&link.node_id_ref).is_none())
                    .map(move |link| {
                        Diagnostic::new(
                            self.name(),
                            Severity::Error,
                            format!(
                                "Node '{}' links to non-existent node '{}'",
                                node.id, link.node_id_ref
                            ),
                        )
                        .at(node)
                        .with_fix("Remove the link or restore the missing node")
                    })
            })
            .collect()
    }
}

struct ExecutionOrderRule;
impl LintRule for ExecutionOrderRule {
    fn name(&self) -> &str { "execution_order" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        match resolve_execution_order(graph) {
            Err(NfpipeError::CyclicGraph { node_id, path }) => vec![Diagnostic {
                node_id: Some(node_id),
                ..Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("Pipeline contains a cycle: {path}"),
                )
                .with_fix("Remove one of the links on the cycle")
            }],
            // Dangling links are reported by their own rule.
            _ => vec![],
        }
    }
}

struct SupportedOperatorRule;
impl LintRule for SupportedOperatorRule {
    fn name(&self) -> &str { "supported_operator" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .execution_nodes()
            .filter_map(|node| match &node.op {
                Some(NodeOperator::Unknown(op)) => Some(
                    Diagnostic::new(
                        self.name(),
                        Severity::Error,
                        format!("Node '{}' uses unsupported operator '{op}'", node.id),
                    )
                    .at(node)
                    .with_fix("Use one of python-node, r-node, notebook-node"),
                ),
                None => Some(
                    Diagnostic::new(
                        self.name(),
                        Severity::Warning,
                        format!("Node '{}' has no operator and will be skipped", node.id),
                    )
                    .at(node),
                ),
                Some(_) => None,
            })
            .collect()
    }
}

struct FilenamePresentRule;
impl LintRule for FilenamePresentRule {
    fn name(&self) -> &str { "filename_present" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .execution_nodes()
            .filter(|node| {
                node.app_data
                    .filename
                    .as_deref()
                    .map_or(true, |f| f.trim().is_empty())
            })
            .map(|node| {
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("Node '{}' has no filename", node.id),
                )
                .at(node)
                .with_fix("Set app_data.filename to the script or notebook to run")
            })
            .collect()
    }
}

struct NameCollisionRule;
impl LintRule for NameCollisionRule {
    fn name(&self) -> &str { "name_collision" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut by_name: BTreeMap<NodeName, Vec<&NodeDef>> = BTreeMap::new();
        for node in graph.execution_nodes() {
            if let Ok(name) = NodeName::resolve(node) {
                by_name.entry(name).or_default().push(node);
            }
        }

        by_name
            .into_iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(name, nodes)| {
                let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
                Diagnostic::new(
                    self.name(),
                    Severity::Warning,
                    format!("Nodes {} all resolve to the name '{name}'", ids.join(", ")),
                )
                .at(nodes[0])
                .with_fix("Give the nodes distinct labels")
            })
            .collect()
    }
}

struct AmbiguousOutputRule;
impl LintRule for AmbiguousOutputRule {
    fn name(&self) -> &str { "ambiguous_output" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in graph.execution_nodes() {
            let Ok(upstream) = graph.data_upstream(node) else {
                continue;
            };
            let candidates: Vec<UpstreamCandidate> = upstream
                .into_iter()
                .filter_map(|u| NodeName::resolve(u).ok().map(|name| UpstreamCandidate::new(u, name)))
                .collect();

            for filename in node.app_data.input_files() {
                let producers = producers_of(filename, &candidates);
                if producers.len() > 1 {
                    let list: Vec<String> = producers
                        .iter()
                        .map(|(process, output)| format!("{process}.output{output}"))
                        .collect();
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Warning,
                            format!(
                                "Input '{filename}' of node '{}' is produced by {}; the first is used",
                                node.id,
                                list.join(", ")
                            ),
                        )
                        .at(node),
                    );
                }
            }
        }
        diagnostics
    }
}

struct RuntimePresentRule;
impl LintRule for RuntimePresentRule {
    fn name(&self) -> &str { "runtime_present" }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .execution_nodes()
            .filter(|node| {
                node.app_data.runtime_environment.trim().is_empty() && !has_environment_yaml(node)
            })
            .map(|node| {
                Diagnostic::new(
                    self.name(),
                    Severity::Warning,
                    format!("Node '{}' has neither a runtime environment nor an environment YAML", node.id),
                )
                .at(node)
                .with_fix("Set app_data.runtime_environment or app_data.environment_yaml")
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules against a pipeline graph.
pub fn validate(graph: &PipelineGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(DanglingReferenceRule),
        Box::new(ExecutionOrderRule),
        Box::new(SupportedOperatorRule),
        Box::new(FilenamePresentRule),
        Box::new(NameCollisionRule),
        Box::new(AmbiguousOutputRule),
        Box::new(RuntimePresentRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &PipelineGraph) -> nfpipe_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(NfpipeError::Validation(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn build(nodes: serde_json::Value) -> PipelineGraph {
        let doc = serde_json::json!({"pipelines": [{"id": "p", "nodes": nodes}]});
        PipelineGraph::from_document(nfpipe_document::parse(&doc.to_string()).unwrap())
    }

    fn step(id: &str, label: &str, deps: &[&str], outputs: &[&str], upstream: &[&str]) -> serde_json::Value {
        let links: Vec<_> = upstream
            .iter()
            .map(|u| serde_json::json!({"node_id_ref": u, "port_id_ref": "outPort"}))
            .collect();
        serde_json::json!({
            "id": id,
            "type": "execution_node",
            "op": "python-node",
            "app_data": {
                "label": label,
                "filename": format!("{label}.py"),
                "runtime_environment": "/envs/base",
                "dependencies": deps,
                "outputs": outputs,
            },
            "inputs": [{"id": "inPort", "links": links}],
        })
    }

    fn rules_hit(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn valid_pipeline_passes() {
        let graph = build(serde_json::json!([
            step("l01", "load", &[], &["a.csv"], &[]),
            step("t01", "train", &["a.csv"], &[], &["l01"]),
        ]));
        let diags = validate(&graph);
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
        assert!(validate_or_raise(&graph).is_ok());
    }

    #[test]
    fn dangling_link_is_an_error() {
        let graph = build(serde_json::json!([step("t01", "train", &[], &[], &["ghost"])]));
        let diags = validate(&graph);
        assert_eq!(rules_hit(&diags), vec!["dangling_reference"]);
        assert_eq!(diags[0].node_id.as_deref(), Some("t01"));
    }

    #[test]
    fn cycle_is_an_error() {
        let graph = build(serde_json::json!([
            step("aaa", "a", &[], &[], &["bbb"]),
            step("bbb", "b", &[], &[], &["aaa"]),
        ]));
        let diags = validate(&graph);
        assert_eq!(rules_hit(&diags), vec!["execution_order"]);
        assert!(diags[0].message.contains("aaa -> bbb -> aaa"));
    }

    #[test]
    fn unknown_operator_is_an_error_and_missing_one_a_warning() {
        let mut unknown = step("s01", "sql", &[], &[], &[]);
        unknown["op"] = "sql-node".into();
        let mut missing = step("m01", "misc", &[], &[], &[]);
        missing.as_object_mut().unwrap().remove("op");

        let diags = validate(&build(serde_json::json!([unknown, missing])));
        let severities: Vec<_> = diags.iter().map(|d| (d.rule.as_str(), d.severity)).collect();
        assert_eq!(
            severities,
            vec![
                ("supported_operator", Severity::Error),
                ("supported_operator", Severity::Warning),
            ]
        );
    }

    #[test]
    fn missing_filename_is_an_error() {
        let mut s = step("f01", "fit", &[], &[], &[]);
        s["app_data"]["filename"] = "".into();
        let graph = build(serde_json::json!([s]));
        assert_eq!(rules_hit(&validate(&graph)), vec!["filename_present"]);
        let err = validate_or_raise(&graph).unwrap_err();
        assert!(matches!(err, NfpipeError::Validation(_)));
    }

    #[test]
    fn shared_id_prefix_collision_is_flagged() {
        let graph = build(serde_json::json!([
            step("abc-1", "load", &[], &[], &[]),
            step("abc-2", "load", &[], &[], &[]),
        ]));
        let diags = validate(&graph);
        assert_eq!(rules_hit(&diags), vec!["name_collision"]);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("loadAbc"));
    }

    #[test]
    fn several_producers_is_a_warning() {
        let graph = build(serde_json::json!([
            step("aaa", "a", &[], &["x.csv"], &[]),
            step("bbb", "b", &[], &["x.csv"], &[]),
            step("ccc", "c", &["x.csv"], &[], &["aaa", "bbb"]),
        ]));
        let diags = validate(&graph);
        assert_eq!(rules_hit(&diags), vec!["ambiguous_output"]);
        assert!(diags[0].message.contains("AAAA.output1, BBBB.output1"));
        assert!(validate_or_raise(&graph).is_ok());
    }

    #[test]
    fn missing_runtime_is_a_warning_unless_yaml_given() {
        let mut bare = step("r01", "bare", &[], &[], &[]);
        bare["app_data"]["runtime_environment"] = "".into();
        let mut yaml = step("y01", "yaml", &[], &[], &[]);
        yaml["app_data"]["runtime_environment"] = "".into();
        yaml["app_data"]["environment_yaml"] = "name: x\ndependencies:\n  - python=3.11\n".into();

        let diags = validate(&build(serde_json::json!([bare, yaml])));
        assert_eq!(rules_hit(&diags), vec!["runtime_present"]);
        assert_eq!(diags[0].node_id.as_deref(), Some("r01"));
    }

    #[test]
    fn non_execution_nodes_are_not_linted() {
        let graph = build(serde_json::json!([{"id": "c1", "type": "comment"}]));
        assert!(validate(&graph).is_empty());
    }
}
