use serde::{Deserialize, Deserializer, Serialize};

/// Node `type` value marking a runnable step.
pub const EXECUTION_NODE: &str = "execution_node";

/// Memory limit (GB) applied when a node does not declare one.
pub const DEFAULT_MEMORY_GB: u64 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    #[serde(default, deserialize_with = "null_default")]
    pub pipelines: Vec<PipelineDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: NodeKind,
    #[serde(default)]
    pub op: Option<NodeOperator>,
    #[serde(default, deserialize_with = "null_default")]
    pub app_data: AppData,
    #[serde(default, deserialize_with = "null_default")]
    pub inputs: Vec<LinkGroup>,
}

impl NodeDef {
    pub fn is_execution(&self) -> bool {
        self.kind == NodeKind::Execution
    }

    /// Every link across all input groups, in document order.
    pub fn links(&self) -> impl Iterator<Item = &LinkDef> {
        self.inputs.iter().flat_map(|group| group.links.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Execution,
    /// Any other node type; never emitted.
    Other(String),
    #[default]
    Unspecified,
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            EXECUTION_NODE => NodeKind::Execution,
            "" => NodeKind::Unspecified,
            _ => NodeKind::Other(value),
        }
    }
}

impl From<NodeKind> for String {
    fn from(value: NodeKind) -> Self {
        match value {
            NodeKind::Execution => EXECUTION_NODE.to_string(),
            NodeKind::Other(s) => s,
            NodeKind::Unspecified => String::new(),
        }
    }
}

/// Closed set of step kinds the generator knows how to emit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeOperator {
    PythonScript,
    RScript,
    Notebook,
    /// Unrecognized operator; always rejected at emission time.
    Unknown(String),
}

impl NodeOperator {
    pub fn as_str(&self) -> &str {
        match self {
            NodeOperator::PythonScript => "python-node",
            NodeOperator::RScript => "r-node",
            NodeOperator::Notebook => "notebook-node",
            NodeOperator::Unknown(s) => s,
        }
    }
}

impl From<String> for NodeOperator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "python-node" => NodeOperator::PythonScript,
            "r-node" => NodeOperator::RScript,
            "notebook-node" => NodeOperator::Notebook,
            _ => NodeOperator::Unknown(value),
        }
    }
}

impl From<NodeOperator> for String {
    fn from(value: NodeOperator) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for NodeOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub runtime_environment: String,
    #[serde(default, deserialize_with = "null_default")]
    pub environment_yaml: String,
    #[serde(default)]
    pub cpu: Option<u64>,
    #[serde(default = "default_memory")]
    pub memory: Option<u64>,
    #[serde(default, deserialize_with = "null_default")]
    pub dependencies: Vec<String>,
    #[serde(default, alias = "output", deserialize_with = "null_default")]
    pub outputs: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub env_vars: Vec<EnvVar>,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            label: None,
            filename: None,
            runtime_environment: String::new(),
            environment_yaml: String::new(),
            cpu: None,
            memory: default_memory(),
            dependencies: Vec::new(),
            outputs: Vec::new(),
            env_vars: Vec::new(),
        }
    }
}

impl AppData {
    /// Dependencies with blank entries removed.
    pub fn input_files(&self) -> Vec<&str> {
        non_blank(&self.dependencies)
    }

    /// Declared outputs with blank entries removed.
    pub fn output_files(&self) -> Vec<&str> {
        non_blank(&self.outputs)
    }
}

fn non_blank(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn default_memory() -> Option<u64> {
    Some(DEFAULT_MEMORY_GB)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    #[serde(alias = "env_var")]
    pub key: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkGroup {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub links: Vec<LinkDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDef {
    pub node_id_ref: String,
    #[serde(default)]
    pub port_id_ref: Option<String>,
}

/// Treat an explicit JSON `null` the same as an absent field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept strings, numbers and booleans as an environment value.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar env value, found {other}"
        ))),
    }
}
