//! Data-flow binding: decides where every declared input of a step comes from.

use nfpipe_document::NodeDef;
use nfpipe_types::{NfpipeError, Result};

use crate::naming::NodeName;

/// How to resolve a dependency that several upstream outputs produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingPolicy {
    /// The first upstream output in link order wins.
    #[default]
    FirstMatch,
    /// More than one producer is an `AmbiguousBinding` error.
    Strict,
}

impl std::str::FromStr for BindingPolicy {
    type Err = NfpipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-match" => Ok(BindingPolicy::FirstMatch),
            "strict" => Ok(BindingPolicy::Strict),
            other => Err(NfpipeError::Other(format!(
                "unknown binding policy '{other}' (expected first-match or strict)"
            ))),
        }
    }
}

/// An already-emitted upstream step whose outputs may satisfy an input.
#[derive(Debug, Clone)]
pub struct UpstreamCandidate {
    pub node_id: String,
    pub name: NodeName,
    /// Declared, non-blank outputs in declaration order.
    pub outputs: Vec<String>,
}

impl UpstreamCandidate {
    pub fn new(node: &NodeDef, name: NodeName) -> Self {
        Self {
            node_id: node.id.clone(),
            name,
            outputs: node
                .app_data
                .output_files()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSource {
    /// Collected results of an upstream process's named output.
    Wired {
        process: String,
        /// 1-based position of the output on the upstream process.
        output: usize,
    },
    /// Paths read from the filesystem parameter of this input.
    Raw,
}

/// Where one input slot of a step reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    /// 1-based input slot.
    pub position: usize,
    pub filename: String,
    pub source: ChannelSource,
}

impl ChannelBinding {
    pub fn is_wired(&self) -> bool {
        matches!(self.source, ChannelSource::Wired { .. })
    }

    /// Workflow variable that carries this input.
    pub fn channel_name(&self, node: &NodeName) -> String {
        format!("{node}_channel_input{}", self.position)
    }

    /// Parameter holding the filesystem pattern of this input.
    pub fn param_name(&self, node: &NodeName) -> String {
        format!("{node}_input{}", self.position)
    }

    /// The channel declaration line for the workflow body.
    pub fn statement(&self, node: &NodeName) -> String {
        let channel = self.channel_name(node);
        match &self.source {
            ChannelSource::Wired { process, output } => {
                format!("{channel}={process}.out.output{output}.collect()")
            }
            ChannelSource::Raw => format!(
                "{channel}=Channel.fromPath(params.{}).toSortedList()",
                self.param_name(node)
            ),
        }
    }
}

/// Every upstream output equal to `filename`, as `(process label, 1-based output)`.
pub fn producers_of(filename: &str, upstream: &[UpstreamCandidate]) -> Vec<(String, usize)> {
    upstream
        .iter()
        .flat_map(|candidate| {
            candidate
                .outputs
                .iter()
                .enumerate()
                .filter(move |(_, output)| output.as_str() == filename)
                .map(move |(j, _)| (candidate.name.process_label(), j + 1))
        })
        .collect()
}

/// Bind each non-blank dependency of `node`, in declaration order.
pub fn bind_inputs(
    node: &NodeDef,
    name: &NodeName,
    upstream: &[UpstreamCandidate],
    policy: BindingPolicy,
) -> Result<Vec<ChannelBinding>> {
    let mut bindings = Vec::new();

    for (i, filename) in node.app_data.input_files().into_iter().enumerate() {
        let producers = producers_of(filename, upstream);

        if producers.len() > 1 {
            if policy == BindingPolicy::Strict {
                return Err(NfpipeError::AmbiguousBinding {
                    node_id: node.id.clone(),
                    node_name: name.to_string(),
                    filename: filename.to_string(),
                    candidates: producers
                        .iter()
                        .map(|(process, output)| format!("{process}.output{output}"))
                        .collect(),
                });
            }
            tracing::warn!(
                node_id = %node.id,
                node_name = %name,
                filename,
                producers = producers.len(),
                "Input produced by several upstream outputs; using the first"
            );
        }

        let source = match producers.into_iter().next() {
            Some((process, output)) => {
                tracing::debug!(node_name = %name, filename, %process, output, "Wired input");
                ChannelSource::Wired { process, output }
            }
            None => ChannelSource::Raw,
        };

        bindings.push(ChannelBinding {
            position: i + 1,
            filename: filename.to_string(),
            source,
        });
    }

    Ok(bindings)
}
