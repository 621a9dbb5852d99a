//! Process emitter: one Nextflow process definition per execution step.

use std::path::Path;

use nfpipe_document::{EnvVar, NodeDef, NodeOperator};
use nfpipe_kernel::{KernelFamily, KernelProvisioner};
use nfpipe_types::{NfpipeError, Result};

use crate::naming::{file_name, NodeName};

const PROCESS_TAG: &str = "\"running\"";
const PROCESS_LABEL: &str = "unspecific_label";
const INDENT: &str = "    ";

/// Rule selecting the kernel family requested for a notebook's declared
/// language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KernelMapping {
    /// `R` notebooks request a python kernel and `python` notebooks an R
    /// kernel. This is the mapping existing deployments rely on.
    #[default]
    Inverted,
    /// Each language requests its own kernel family.
    Direct,
}

impl KernelMapping {
    /// Kernel family requested for a notebook language. Languages outside the
    /// R and python families are `UnsupportedLanguage`.
    pub fn family_for(&self, language: &str) -> Result<KernelFamily> {
        let declared = KernelFamily::from_hint(&language.to_ascii_lowercase()).map_err(|_| {
            NfpipeError::UnsupportedLanguage {
                language: language.to_string(),
            }
        })?;
        Ok(match (self, declared) {
            (KernelMapping::Direct, family) => family,
            (KernelMapping::Inverted, KernelFamily::R) => KernelFamily::Python,
            (KernelMapping::Inverted, KernelFamily::Python) => KernelFamily::R,
        })
    }
}

impl std::str::FromStr for KernelMapping {
    type Err = NfpipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inverted" => Ok(KernelMapping::Inverted),
            "direct" => Ok(KernelMapping::Direct),
            other => Err(NfpipeError::Other(format!(
                "unknown kernel mapping '{other}' (expected inverted or direct)"
            ))),
        }
    }
}

/// Language declared in a notebook's `metadata.kernelspec.language`.
pub fn notebook_language(path: &Path) -> Result<Option<String>> {
    let data = std::fs::read_to_string(path)?;
    let notebook: serde_json::Value = serde_json::from_str(&data)?;
    Ok(notebook
        .pointer("/metadata/kernelspec/language")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

/// The shell command a process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCommand {
    Python {
        filename: String,
    },
    R {
        filename: String,
    },
    /// Executed through papermill with the step's env vars as parameters.
    Notebook {
        kernel: String,
        cwd: String,
        parameters: Vec<EnvVar>,
        filename: String,
        output_notebook: String,
    },
}

impl ProcessCommand {
    pub fn render(&self) -> String {
        match self {
            ProcessCommand::Python { filename } => format!("python {filename}"),
            ProcessCommand::R { filename } => format!("Rscript {filename}"),
            ProcessCommand::Notebook {
                kernel,
                cwd,
                parameters,
                filename,
                output_notebook,
            } => {
                let mut parts = vec![
                    "papermill".to_string(),
                    format!("--cwd {cwd}"),
                    "--log-output --log-level DEBUG".to_string(),
                    "--request-save-on-cell-execute".to_string(),
                    "--autosave-cell-every 10".to_string(),
                    "--progress-bar".to_string(),
                    format!("-k {kernel}"),
                ];
                parts.extend(
                    parameters
                        .iter()
                        .map(|p| format!("-p {} {}", p.key, shell_quote(&p.value))),
                );
                parts.push(filename.clone());
                parts.push(output_notebook.clone());
                parts.join(" ")
            }
        }
    }
}

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A fully resolved process, ready to render as a module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    pub label: String,
    pub runtime: String,
    pub cpu: Option<u64>,
    /// Memory limit in GB.
    pub memory: Option<u64>,
    pub env_vars: Vec<EnvVar>,
    pub input_count: usize,
    /// Effective outputs, including the executed notebook for notebook steps.
    pub outputs: Vec<String>,
    pub command: ProcessCommand,
}

impl ProcessDefinition {
    pub fn render(&self) -> String {
        let mut lines = vec![format!("process {} {{", self.label)];
        let mut body = vec![
            format!("tag {{ {PROCESS_TAG} }}"),
            format!("label \"{PROCESS_LABEL}\""),
        ];

        if !self.runtime.is_empty() {
            body.push(String::new());
            body.push(format!("conda \"{}\"", self.runtime));
        }

        let limits: Vec<String> = self
            .memory
            .filter(|&gb| gb > 0)
            .map(|gb| format!("memory '{gb}GB'"))
            .into_iter()
            .chain(self.cpu.filter(|&n| n > 0).map(|n| format!("cpus {n}")))
            .collect();
        if !limits.is_empty() {
            body.push(String::new());
            body.extend(limits);
        }

        if self.input_count > 0 {
            body.push(String::new());
            body.push("input:".into());
            body.extend((1..=self.input_count).map(|i| format!("path input{i}")));
        }

        if !self.outputs.is_empty() {
            body.push(String::new());
            body.push("output:".into());
            body.extend(
                self.outputs
                    .iter()
                    .enumerate()
                    .map(|(j, out)| format!("path \"{out}\", emit: output{}", j + 1)),
            );
        }

        body.push(String::new());
        body.push("script:".into());
        body.push("\"\"\"".into());
        body.extend(
            self.env_vars
                .iter()
                .map(|e| format!("{}={}", e.key, shell_quote(&e.value))),
        );
        body.push(self.command.render());
        body.push("\"\"\"".into());

        lines.extend(body.into_iter().map(|line| {
            if line.is_empty() {
                line
            } else {
                format!("{INDENT}{line}")
            }
        }));
        lines.push("}".into());
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Turns execution nodes into process definitions, resolving notebook
/// kernels through the provisioning collaborator.
pub struct ProcessEmitter<'a> {
    kernels: &'a dyn KernelProvisioner,
    mapping: KernelMapping,
    notebook_cwd: &'a str,
}

impl<'a> ProcessEmitter<'a> {
    pub fn new(kernels: &'a dyn KernelProvisioner, mapping: KernelMapping, notebook_cwd: &'a str) -> Self {
        Self {
            kernels,
            mapping,
            notebook_cwd,
        }
    }

    /// Build the process for `node`. `filename` is the absolute source path,
    /// `runtime` the resolved environment location.
    pub fn emit(
        &self,
        node: &NodeDef,
        name: &NodeName,
        filename: &str,
        runtime: &str,
        input_count: usize,
    ) -> Result<ProcessDefinition> {
        let unsupported = |detail: String| NfpipeError::UnsupportedNodeKind {
            node_id: node.id.clone(),
            node_name: name.to_string(),
            detail,
        };

        let mut outputs: Vec<String> = node
            .app_data
            .output_files()
            .into_iter()
            .map(str::to_string)
            .collect();

        let command = match &node.op {
            Some(NodeOperator::PythonScript) => ProcessCommand::Python {
                filename: filename.to_string(),
            },
            Some(NodeOperator::RScript) => ProcessCommand::R {
                filename: filename.to_string(),
            },
            Some(NodeOperator::Notebook) => {
                let language = notebook_language(Path::new(filename))
                    .map_err(|e| {
                        unsupported(format!("cannot read notebook language from {filename}: {e}"))
                    })?
                    .unwrap_or_default();
                tracing::info!(node_name = %name, filename, language = %language, "Detected notebook language");
                let family = self.mapping.family_for(&language).map_err(|e| {
                    unsupported(format!("notebook {filename}: {e}"))
                })?;

                let kernel = self.kernels.provision_kernel(Path::new(runtime), family)?;
                tracing::info!(node_name = %name, kernel = %kernel, runtime, "Notebook kernel resolved");

                let output_notebook = format!("run_{}", file_name(filename));
                outputs.push(output_notebook.clone());
                ProcessCommand::Notebook {
                    kernel,
                    cwd: self.notebook_cwd.to_string(),
                    parameters: node.app_data.env_vars.clone(),
                    filename: filename.to_string(),
                    output_notebook,
                }
            }
            Some(NodeOperator::Unknown(op)) => {
                return Err(unsupported(format!("operator '{op}'")));
            }
            None => return Err(unsupported("missing operator".into())),
        };

        Ok(ProcessDefinition {
            label: name.process_label(),
            runtime: runtime.to_string(),
            cpu: node.app_data.cpu,
            memory: node.app_data.memory,
            env_vars: node.app_data.env_vars.clone(),
            input_count,
            outputs,
            command,
        })
    }
}
