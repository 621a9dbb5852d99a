//! Parser for the JSON pipeline documents produced by visual pipeline editors.
//!
//! A document holds pipelines, each holding nodes; a node's `inputs` are link
//! groups whose links point at upstream node ids. Produces a typed model:
//! [`PipelineDocument`], [`NodeDef`], [`AppData`], [`LinkGroup`], [`LinkDef`].
//!
//! # Example
//! ```
//! let json = r#"{"pipelines": [{"id": "p", "nodes": [
//!     {"id": "abc123", "type": "execution_node", "op": "python-node",
//!      "app_data": {"filename": "load.py"}}
//! ]}]}"#;
//! let doc = nfpipe_document::parse(json).unwrap();
//! assert_eq!(doc.pipelines[0].nodes.len(), 1);
//! ```

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse, parse_file};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_execution_node() {
        let doc = parse(
            r#"{"pipelines": [{"id": "p1", "nodes": [
                {"id": "a4196a91", "type": "execution_node", "op": "python-node",
                 "app_data": {"label": "Load", "filename": "pipeline/load.py",
                              "runtime_environment": "/opt/envs/base"}}
            ]}]}"#,
        )
        .unwrap();

        let node = &doc.pipelines[0].nodes[0];
        assert!(node.is_execution());
        assert_eq!(node.op, Some(NodeOperator::PythonScript));
        assert_eq!(node.app_data.label.as_deref(), Some("Load"));
        assert_eq!(node.app_data.memory, Some(DEFAULT_MEMORY_GB));
        assert_eq!(node.app_data.cpu, None);
        assert!(node.inputs.is_empty());
    }

    #[test]
    fn operators_parse_into_closed_variants() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [
                {"id": "n1", "type": "execution_node", "op": "r-node"},
                {"id": "n2", "type": "execution_node", "op": "notebook-node"},
                {"id": "n3", "type": "execution_node", "op": "sql-node"},
                {"id": "n4", "type": "execution_node"}
            ]}]}"#,
        )
        .unwrap();

        let ops: Vec<_> = doc.pipelines[0].nodes.iter().map(|n| n.op.clone()).collect();
        assert_eq!(
            ops,
            vec![
                Some(NodeOperator::RScript),
                Some(NodeOperator::Notebook),
                Some(NodeOperator::Unknown("sql-node".into())),
                None,
            ]
        );
    }

    #[test]
    fn non_execution_kinds_are_preserved() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "c1", "type": "super_node"}]}]}"#,
        )
        .unwrap();
        let node = &doc.pipelines[0].nodes[0];
        assert_eq!(node.kind, NodeKind::Other("super_node".into()));
        assert!(!node.is_execution());
    }

    #[test]
    fn null_node_type_is_unspecified() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [
                {"id": "n1", "type": null, "op": "python-node"},
                {"id": "n2", "type": "execution_node", "op": "python-node"}
            ]}]}"#,
        )
        .unwrap();
        let nodes = &doc.pipelines[0].nodes;
        assert_eq!(nodes[0].kind, NodeKind::Unspecified);
        assert!(!nodes[0].is_execution());
        assert!(nodes[1].is_execution());
    }

    #[test]
    fn blank_dependencies_and_outputs_are_filtered() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n1", "type": "execution_node",
                "app_data": {"dependencies": ["a.csv", "", "  ", "b.csv"],
                             "outputs": ["", "model.pkl"]}}]}]}"#,
        )
        .unwrap();
        let app = &doc.pipelines[0].nodes[0].app_data;
        assert_eq!(app.input_files(), vec!["a.csv", "b.csv"]);
        assert_eq!(app.output_files(), vec!["model.pkl"]);
    }

    #[test]
    fn legacy_output_key_is_accepted() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n1",
                "app_data": {"output": ["x.txt"]}}]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.pipelines[0].nodes[0].app_data.outputs, vec!["x.txt"]);
    }

    #[test]
    fn null_memory_disables_the_default() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n1", "app_data": {"memory": null, "cpu": 2}}]}]}"#,
        )
        .unwrap();
        let app = &doc.pipelines[0].nodes[0].app_data;
        assert_eq!(app.memory, None);
        assert_eq!(app.cpu, Some(2));
    }

    #[test]
    fn env_vars_accept_both_key_spellings_and_scalars() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n1", "app_data": {"env_vars": [
                {"key": "VAR1", "value": "100"},
                {"env_var": "VAR2", "value": 7}
            ]}}]}]}"#,
        )
        .unwrap();
        let vars = &doc.pipelines[0].nodes[0].app_data.env_vars;
        assert_eq!(vars[0], EnvVar { key: "VAR1".into(), value: "100".into() });
        assert_eq!(vars[1], EnvVar { key: "VAR2".into(), value: "7".into() });
    }

    #[test]
    fn links_flatten_across_groups() {
        let doc = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n3", "inputs": [
                {"id": "inPort", "links": [{"node_id_ref": "n1", "port_id_ref": "outPort"}]},
                {"id": "other", "links": null},
                {"links": [{"node_id_ref": "n2"}]}
            ]}]}]}"#,
        )
        .unwrap();
        let refs: Vec<_> = doc.pipelines[0].nodes[0]
            .links()
            .map(|l| l.node_id_ref.as_str())
            .collect();
        assert_eq!(refs, vec!["n1", "n2"]);
    }

    #[test]
    fn null_inputs_are_empty() {
        let doc = parse(r#"{"pipelines": [{"nodes": [{"id": "n1", "inputs": null}]}]}"#).unwrap();
        assert!(doc.pipelines[0].nodes[0].inputs.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse(
            r#"{"pipelines": [{"nodes": [{"id": "n1"}]}, {"nodes": [{"id": "n1"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'n1'"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = parse(r#"{"pipelines": [{"id": "p", "nodes": [{"id": " "}]}]}"#).unwrap_err();
        assert!(matches!(err, nfpipe_types::NfpipeError::Document(_)));
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse("{\n  \"pipelines\": [\n    {,\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid pipeline document: at line 3"), "{msg}");
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.pipeline");
        std::fs::write(&path, r#"{"pipelines": []}"#).unwrap();
        let doc = parse_file(&path).unwrap();
        assert!(doc.pipelines.is_empty());
    }
}
